//! OS boundary
//!
//! Production code uses `HostSystem`, which spawns real processes and reads
//! real system state. Tests use `FakeSystem` with scripted outcomes and an
//! invocation log, so no shell is ever touched.
//!
//! Nothing here decides whether a command is allowed; the executor does that
//! before calling in.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{LeoError, Result};

/// Maximum captured output per stream (64KB)
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

const SEARCH_TIMEOUT_SECS: u64 = 10;

/// What happened when a process was run to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Ran and exited; stdout followed by stderr
    Exited { code: Option<i32>, output: String },
    /// Killed after the deadline
    TimedOut,
    /// Could not be started at all
    SpawnFailed(String),
}

impl ProcessOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        ProcessOutcome::Exited {
            code: Some(0),
            output: output.into(),
        }
    }

    pub fn failed(code: i32, output: impl Into<String>) -> Self {
        ProcessOutcome::Exited {
            code: Some(code),
            output: output.into(),
        }
    }
}

/// One row of the top-processes report
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSummary {
    pub pid: u32,
    pub name: String,
    pub memory_bytes: u64,
    pub memory_percent: f32,
}

/// Everything the executor needs from the machine
#[async_trait]
pub trait SystemOps: Send + Sync {
    /// Run argv to completion, capturing combined output
    async fn run(&self, argv: &[String], limit: Duration) -> ProcessOutcome;

    /// Start argv in the background without waiting for it
    async fn spawn_detached(&self, argv: &[String]) -> std::result::Result<(), String>;

    /// Processes sorted by resident memory, largest first
    async fn top_processes(&self, count: usize) -> Vec<ProcessSummary>;

    /// Free space on the filesystem holding `path`, in MB
    async fn available_disk_mb(&self, path: &Path) -> Option<u64>;

    /// Can a TCP connection to `addr` be opened within `limit`?
    async fn network_reachable(&self, addr: &str, limit: Duration) -> bool;

    /// URL of the first web search result
    async fn first_search_result(&self, endpoint: &str, query: &str) -> Option<String>;

    /// Effective uid is root
    fn is_root(&self) -> bool;
}

// ============================================================================
// Host System (Production)
// ============================================================================

pub struct HostSystem {
    http: reqwest::Client,
}

impl HostSystem {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| LeoError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SystemOps for HostSystem {
    async fn run(&self, argv: &[String], limit: Duration) -> ProcessOutcome {
        let Some((program, args)) = argv.split_first() else {
            return ProcessOutcome::SpawnFailed("empty command".to_string());
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match timeout(limit, child).await {
            Ok(Ok(output)) => {
                let (stdout, stdout_cut) = truncate_output(&output.stdout);
                let (stderr, stderr_cut) = truncate_output(&output.stderr);
                if stdout_cut || stderr_cut {
                    debug!("Output of '{}' truncated", argv.join(" "));
                }
                ProcessOutcome::Exited {
                    code: output.status.code(),
                    output: combine_streams(&stdout, &stderr),
                }
            }
            Ok(Err(e)) => ProcessOutcome::SpawnFailed(e.to_string()),
            Err(_) => ProcessOutcome::TimedOut,
        }
    }

    async fn spawn_detached(&self, argv: &[String]) -> std::result::Result<(), String> {
        let Some((program, args)) = argv.split_first() else {
            return Err("empty command".to_string());
        };
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn top_processes(&self, count: usize) -> Vec<ProcessSummary> {
        tokio::task::spawn_blocking(move || {
            let mut sys = sysinfo::System::new();
            sys.refresh_memory();
            sys.refresh_processes();
            let total = sys.total_memory().max(1) as f32;

            let mut rows: Vec<ProcessSummary> = sys
                .processes()
                .values()
                .map(|p| ProcessSummary {
                    pid: p.pid().as_u32(),
                    name: p.name().to_string(),
                    memory_bytes: p.memory(),
                    memory_percent: p.memory() as f32 / total * 100.0,
                })
                .collect();
            rows.sort_by(|a, b| b.memory_bytes.cmp(&a.memory_bytes));
            rows.truncate(count);
            rows
        })
        .await
        .unwrap_or_default()
    }

    async fn available_disk_mb(&self, path: &Path) -> Option<u64> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let disks = sysinfo::Disks::new_with_refreshed_list();
            disks
                .list()
                .iter()
                .filter(|d| path.starts_with(d.mount_point()))
                .max_by_key(|d| d.mount_point().as_os_str().len())
                .map(|d| d.available_space() / (1024 * 1024))
        })
        .await
        .ok()
        .flatten()
    }

    async fn network_reachable(&self, addr: &str, limit: Duration) -> bool {
        matches!(timeout(limit, TcpStream::connect(addr)).await, Ok(Ok(_)))
    }

    async fn first_search_result(&self, endpoint: &str, query: &str) -> Option<String> {
        let response = match self.http.get(endpoint).query(&[("q", query)]).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("Search returned HTTP {}", r.status());
                return None;
            }
            Err(e) => {
                warn!("Search request failed: {}", e);
                return None;
            }
        };
        let body = response.text().await.ok()?;
        extract_first_result(&body, endpoint)
    }

    fn is_root(&self) -> bool {
        crate::paths::running_as_root()
    }
}

/// First `.result__a` link of a DuckDuckGo HTML page, with redirects unwrapped
pub fn extract_first_result(html: &str, base: &str) -> Option<String> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse(".result__a").ok()?;
    let href = document
        .select(&selector)
        .next()?
        .value()
        .attr("href")?
        .trim()
        .to_string();
    if href.is_empty() {
        return None;
    }

    let resolved = match reqwest::Url::parse(base).and_then(|b| b.join(&href)) {
        Ok(url) => url,
        Err(_) => return Some(href),
    };
    let target = resolved
        .query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.into_owned());
    Some(target.unwrap_or(href))
}

fn truncate_output(bytes: &[u8]) -> (String, bool) {
    let truncated = bytes.len() > MAX_OUTPUT_BYTES;
    let slice = if truncated {
        &bytes[..MAX_OUTPUT_BYTES]
    } else {
        bytes
    };

    let output = String::from_utf8_lossy(slice).to_string();
    (output, truncated)
}

fn combine_streams(stdout: &str, stderr: &str) -> String {
    match (stdout.trim_end().is_empty(), stderr.trim_end().is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr),
    }
}

// ============================================================================
// Fake System (Testing)
// ============================================================================

/// Scripted OS collaborator for deterministic testing
///
/// Outcomes are matched by substring against the space-joined argv; a
/// sequence is consumed in order and its last entry repeats.
///
/// ```rust,ignore
/// let fake = FakeSystem::new()
///     .with_response("dpkg-query", ProcessOutcome::ok("install ok installed"))
///     .with_free_disk_mb(50);
/// ```
pub struct FakeSystem {
    responses: Mutex<Vec<(String, VecDeque<ProcessOutcome>)>>,
    default_outcome: ProcessOutcome,
    invocations: Mutex<Vec<Vec<String>>>,
    launches: Mutex<Vec<Vec<String>>>,
    processes: Vec<ProcessSummary>,
    free_disk_mb: Option<u64>,
    network_up: bool,
    search_result: Option<String>,
    root: bool,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            default_outcome: ProcessOutcome::ok(""),
            invocations: Mutex::new(Vec::new()),
            launches: Mutex::new(Vec::new()),
            processes: Vec::new(),
            free_disk_mb: Some(10_000),
            network_up: true,
            search_result: None,
            root: false,
        }
    }

    pub fn with_response(self, pattern: &str, outcome: ProcessOutcome) -> Self {
        self.with_responses(pattern, vec![outcome])
    }

    pub fn with_responses(self, pattern: &str, outcomes: Vec<ProcessOutcome>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push((pattern.to_string(), outcomes.into()));
        self
    }

    pub fn with_processes(mut self, processes: Vec<ProcessSummary>) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_free_disk_mb(mut self, mb: u64) -> Self {
        self.free_disk_mb = Some(mb);
        self
    }

    pub fn with_network(mut self, up: bool) -> Self {
        self.network_up = up;
        self
    }

    pub fn with_search_result(mut self, url: &str) -> Self {
        self.search_result = Some(url.to_string());
        self
    }

    pub fn as_root(mut self) -> Self {
        self.root = true;
        self
    }

    /// Every argv passed to `run`, in order
    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations.lock().unwrap().clone()
    }

    /// Every `run` as a single command line
    pub fn commands(&self) -> Vec<String> {
        self.invocations().iter().map(|argv| argv.join(" ")).collect()
    }

    /// Every argv passed to `spawn_detached`
    pub fn launches(&self) -> Vec<Vec<String>> {
        self.launches.lock().unwrap().clone()
    }

    /// Number of `run` calls whose command line contains `pattern`
    pub fn run_count(&self, pattern: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(pattern)).count()
    }
}

impl Default for FakeSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemOps for FakeSystem {
    async fn run(&self, argv: &[String], _limit: Duration) -> ProcessOutcome {
        self.invocations.lock().unwrap().push(argv.to_vec());
        let joined = argv.join(" ");

        let mut responses = self.responses.lock().unwrap();
        for (pattern, queue) in responses.iter_mut() {
            if joined.contains(pattern.as_str()) {
                if queue.len() > 1 {
                    if let Some(next) = queue.pop_front() {
                        return next;
                    }
                }
                if let Some(last) = queue.front() {
                    return last.clone();
                }
            }
        }
        self.default_outcome.clone()
    }

    async fn spawn_detached(&self, argv: &[String]) -> std::result::Result<(), String> {
        self.launches.lock().unwrap().push(argv.to_vec());
        Ok(())
    }

    async fn top_processes(&self, count: usize) -> Vec<ProcessSummary> {
        self.processes.iter().take(count).cloned().collect()
    }

    async fn available_disk_mb(&self, _path: &Path) -> Option<u64> {
        self.free_disk_mb
    }

    async fn network_reachable(&self, _addr: &str, _limit: Duration) -> bool {
        self.network_up
    }

    async fn first_search_result(&self, _endpoint: &str, _query: &str) -> Option<String> {
        self.search_result.clone()
    }

    fn is_root(&self) -> bool {
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(cmd: &str) -> Vec<String> {
        cmd.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_extract_first_result_unwraps_redirect() {
        let html = r#"<html><body>
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc">Rust</a>
            <a class="result__a" href="https://second.example">Second</a>
        </body></html>"#;
        assert_eq!(
            extract_first_result(html, "https://html.duckduckgo.com/html/").as_deref(),
            Some("https://www.rust-lang.org/")
        );
    }

    #[test]
    fn test_extract_first_result_direct_link() {
        let html = r#"<a class="result__a" href="https://docs.rs/tokio">tokio</a>"#;
        assert_eq!(
            extract_first_result(html, "https://html.duckduckgo.com/html/").as_deref(),
            Some("https://docs.rs/tokio")
        );
    }

    #[test]
    fn test_extract_first_result_none() {
        assert!(
            extract_first_result("<p>no results</p>", "https://html.duckduckgo.com/html/").is_none()
        );
    }

    #[test]
    fn test_combine_streams() {
        assert_eq!(combine_streams("out\n", ""), "out\n");
        assert_eq!(combine_streams("", "err\n"), "err\n");
        assert_eq!(combine_streams("out\n", "err\n"), "out\nerr\n");
    }

    #[test]
    fn test_truncate_output() {
        let big = vec![b'a'; MAX_OUTPUT_BYTES + 10];
        let (text, cut) = truncate_output(&big);
        assert!(cut);
        assert_eq!(text.len(), MAX_OUTPUT_BYTES);
    }

    #[tokio::test]
    async fn test_fake_system_sequences() {
        let fake = FakeSystem::new().with_responses(
            "apt-get install",
            vec![
                ProcessOutcome::failed(100, "E: permission denied"),
                ProcessOutcome::ok("Setting up nginx"),
            ],
        );
        let limit = Duration::from_secs(1);
        let cmd = argv("apt-get install -y nginx");
        assert_eq!(
            fake.run(&cmd, limit).await,
            ProcessOutcome::failed(100, "E: permission denied")
        );
        assert_eq!(fake.run(&cmd, limit).await, ProcessOutcome::ok("Setting up nginx"));
        assert_eq!(fake.run(&cmd, limit).await, ProcessOutcome::ok("Setting up nginx"));
        assert_eq!(fake.run(&argv("df -h"), limit).await, ProcessOutcome::ok(""));
        assert_eq!(fake.run_count("apt-get install"), 3);
    }

    #[tokio::test]
    async fn test_host_run_captures_output() {
        let host = HostSystem::new().unwrap();
        let outcome = host
            .run(&argv("sh -c echo"), Duration::from_secs(5))
            .await;
        assert!(matches!(outcome, ProcessOutcome::Exited { code: Some(0), .. }));
    }

    #[tokio::test]
    async fn test_host_run_missing_program() {
        let host = HostSystem::new().unwrap();
        let outcome = host
            .run(&argv("leo-no-such-program-xyz"), Duration::from_secs(5))
            .await;
        assert!(matches!(outcome, ProcessOutcome::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn test_host_run_times_out() {
        let host = HostSystem::new().unwrap();
        let outcome = host
            .run(&argv("sleep 5"), Duration::from_millis(100))
            .await;
        assert_eq!(outcome, ProcessOutcome::TimedOut);
    }
}
