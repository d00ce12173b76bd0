//! Action Executor
//!
//! Turns a typed intent, or a raw command line from a routed task, into a
//! side effect on the machine. Every argv is checked against the Safety
//! Policy here, elevated here when privileged, and written to the audit log
//! here. Nothing else in the crate calls `SystemOps::run`.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditLog, AuditOutcome};
use crate::config::ExecutorSettings;
use crate::confirm::Confirmer;
use crate::intent::{Intent, ServiceVerb};
use crate::safety::{program_name, strip_elevation, SafetyPolicy, ELEVATION_WRAPPER};
use crate::system::{ProcessOutcome, ProcessSummary, SystemOps};

/// Substrings that get a raw command refused before anything else is checked
pub const RAW_DENYLIST: &[&str] = &[
    "rm -rf", "rm -fr", ":(){", "shutdown", "reboot", "poweroff", "halt", "mkfs", "format",
];

pub const CANCELLED: &str = "Cancelled.";
pub const SAFETY_REJECTED: &str = "Action rejected by safety policy.";

const FALLBACK_SEARCH_URL: &str = "https://duckduckgo.com/?q=";

/// Result of running one raw command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutcome {
    /// The process ran; combined output is kept for the observer
    Completed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },
    TimedOut {
        command: String,
        after: Duration,
    },
    /// Refused before reaching the OS
    Rejected { command: String, reason: String },
}

impl RawOutcome {
    /// User-facing rendering
    pub fn message(&self) -> String {
        match self {
            RawOutcome::Completed { output, .. } => {
                if output.trim().is_empty() {
                    "(no output)".to_string()
                } else {
                    output.trim_end().to_string()
                }
            }
            RawOutcome::TimedOut { command, after } => {
                format!("'{}' timed out after {} seconds.", command, after.as_secs())
            }
            RawOutcome::Rejected { command, reason } => {
                format!("Refused to run '{}': {}.", command, reason)
            }
        }
    }
}

pub struct ActionExecutor {
    system: Arc<dyn SystemOps>,
    policy: SafetyPolicy,
    confirmer: Arc<dyn Confirmer>,
    settings: ExecutorSettings,
    audit: AuditLog,
}

impl ActionExecutor {
    pub fn new(
        system: Arc<dyn SystemOps>,
        policy: SafetyPolicy,
        confirmer: Arc<dyn Confirmer>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            system,
            policy,
            confirmer,
            settings,
            audit: AuditLog::disabled(),
        }
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    /// Carry out one intent; every outcome is a reply, never an error
    pub async fn run(&self, intent: &Intent) -> String {
        info!("Executing intent: {}", intent.name());
        match intent {
            Intent::CheckDisk => self.report(&["df", "-h"]).await,
            Intent::CheckMemory => self.report(&["free", "-h"]).await,
            Intent::TopProcesses { count } => {
                format_top(&self.system.top_processes(*count).await)
            }
            Intent::KillPid { pid } => self.kill_pid(*pid).await,
            Intent::KillName { pattern } => self.kill_name(pattern).await,
            Intent::CheckInstalled { package } => {
                format!("{} installed: {}", package, self.is_installed(package).await)
            }
            Intent::PackagePolicy { package } => {
                self.report(&["apt-cache", "policy", package.as_str()]).await
            }
            Intent::InstallPackage { package, version } => {
                self.install_package(package, version.as_deref()).await
            }
            Intent::DiskCleanup => self.disk_cleanup().await,
            Intent::Service { verb, service } => self.service(*verb, service).await,
            Intent::OpenApp { app } => match self.launch(&["nohup", app.as_str()]).await {
                Ok(()) => format!("Launched {}.", app),
                Err(e) => format!("Could not launch {}: {}", app, e),
            },
            Intent::OpenUrl { url } => self.open_url(url).await,
            Intent::ComposeMail {
                recipient,
                subject,
                body,
            } => {
                let url = mailto_url(recipient, subject.as_deref(), body.as_deref());
                match self.launch(&["xdg-open", url.as_str()]).await {
                    Ok(()) => format!("Opening a new message to {}.", recipient),
                    Err(e) => format!("Could not open the mail client: {}", e),
                }
            }
            Intent::Search { query } => self.search(query).await,
            Intent::Speak { text } => text.clone(),
        }
    }

    /// Run one raw command line from a routed task
    pub async fn execute_raw(&self, command: &str) -> RawOutcome {
        let trimmed = command.trim();

        if let Some(pattern) = denylisted(trimmed) {
            return self.reject(trimmed, &format!("contains denylisted '{}'", pattern));
        }

        let words: Vec<String> = trimmed.split_whitespace().map(String::from).collect();
        let argv = strip_elevation(&words).to_vec();
        if argv.is_empty() {
            return self.reject(trimmed, "empty command");
        }

        self.exec(argv, self.settings.effective_command_timeout())
            .await
    }

    /// `execute_raw`, rendered for the user
    pub async fn run_raw_command(&self, command: &str) -> String {
        self.execute_raw(command).await.message()
    }

    /// Note a command the user declined
    pub fn record_cancelled(&self, command: &str) {
        self.audit
            .record(&AuditEntry::new(command, AuditOutcome::Cancelled));
    }

    // ------------------------------------------------------------------
    // Execution boundary
    // ------------------------------------------------------------------

    async fn exec(&self, argv: Vec<String>, limit: Duration) -> RawOutcome {
        if let Some(pid) = self.protected_target(&argv).await {
            return self.reject(&argv.join(" "), &format!("system PID {} is protected", pid));
        }
        self.exec_checked(argv, limit).await
    }

    /// First pid at or below `protected_pid_max` that a kill-family argv would signal
    async fn protected_target(&self, argv: &[String]) -> Option<i64> {
        let max = i64::from(self.settings.protected_pid_max);
        match program_name(argv)? {
            "kill" => kill_targets(&argv[1..]).into_iter().find(|pid| *pid <= max),
            "pkill" => {
                let mut matcher = vec!["pgrep".to_string()];
                matcher.extend(pgrep_args(&argv[1..]));
                let limit = self.settings.effective_command_timeout();
                match self.exec_checked(matcher, limit).await {
                    RawOutcome::Completed { output, .. } => output
                        .split_whitespace()
                        .filter_map(|t| t.parse::<i64>().ok())
                        .find(|pid| *pid <= max),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    async fn exec_checked(&self, argv: Vec<String>, limit: Duration) -> RawOutcome {
        let command = argv.join(" ");
        if !self.policy.is_safe(&argv) {
            let program = program_name(&argv).unwrap_or_default().to_string();
            return self.reject(
                &command,
                &format!("'{}' is not allowed by the safety policy", program),
            );
        }

        let full = self.elevate(argv);
        debug!("Running: {}", full.join(" "));
        let started = Instant::now();
        let outcome = self.system.run(&full, limit).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            ProcessOutcome::Exited { code, output } => {
                debug!("'{}' exited with {:?}", command, code);
                self.audit.record(
                    &AuditEntry::new(&command, AuditOutcome::Completed)
                        .with_exit_code(code)
                        .with_duration_ms(elapsed_ms),
                );
                RawOutcome::Completed {
                    command,
                    exit_code: code,
                    output,
                }
            }
            ProcessOutcome::TimedOut => {
                warn!("'{}' timed out after {:?}", command, limit);
                self.audit.record(
                    &AuditEntry::new(&command, AuditOutcome::TimedOut).with_duration_ms(elapsed_ms),
                );
                RawOutcome::TimedOut {
                    command,
                    after: limit,
                }
            }
            ProcessOutcome::SpawnFailed(e) => {
                warn!("'{}' could not start: {}", command, e);
                self.audit.record(
                    &AuditEntry::new(&command, AuditOutcome::Completed)
                        .with_reason(&e)
                        .with_duration_ms(elapsed_ms),
                );
                let program = full.first().cloned().unwrap_or_default();
                RawOutcome::Completed {
                    command,
                    exit_code: None,
                    output: format!("{}: failed to start: {}", program, e),
                }
            }
        }
    }

    async fn exec_default(&self, argv: &[&str]) -> RawOutcome {
        self.exec(
            argv.iter().map(|s| s.to_string()).collect(),
            self.settings.effective_command_timeout(),
        )
        .await
    }

    async fn launch(&self, argv: &[&str]) -> Result<(), String> {
        let command = argv.join(" ");
        if argv.first() == Some(&"nohup") {
            if let Some(pattern) = denylisted(&argv[1..].join(" ")) {
                let reason = format!("contains denylisted '{}'", pattern);
                self.reject(&command, &reason);
                return Err(reason);
            }
        }
        if !self.policy.is_safe(argv) {
            self.reject(&command, "not allowed by the safety policy");
            return Err("not allowed by the safety policy".to_string());
        }
        let owned: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        let result = self.system.spawn_detached(&owned).await;
        let entry = AuditEntry::new(&command, AuditOutcome::Completed);
        self.audit.record(&match &result {
            Ok(()) => entry,
            Err(e) => entry.with_reason(e),
        });
        result
    }

    fn elevate(&self, argv: Vec<String>) -> Vec<String> {
        if self.policy.is_admin(&argv) && !self.system.is_root() {
            let mut full = Vec::with_capacity(argv.len() + 1);
            full.push(ELEVATION_WRAPPER.to_string());
            full.extend(argv);
            full
        } else {
            argv
        }
    }

    fn reject(&self, command: &str, reason: &str) -> RawOutcome {
        warn!("Rejected '{}': {}", command, reason);
        self.audit
            .record(&AuditEntry::new(command, AuditOutcome::Rejected).with_reason(reason));
        RawOutcome::Rejected {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }

    fn confirm(&self, question: &str, command: &str) -> bool {
        let yes = self.confirmer.confirm(question);
        if !yes {
            self.record_cancelled(command);
        }
        yes
    }

    async fn report(&self, argv: &[&str]) -> String {
        self.exec_default(argv).await.message()
    }

    // ------------------------------------------------------------------
    // Intent handlers
    // ------------------------------------------------------------------

    async fn kill_pid(&self, pid: u32) -> String {
        if pid <= self.settings.protected_pid_max {
            return protected_pid_message(pid);
        }
        let pid_arg = pid.to_string();
        let argv = ["kill", pid_arg.as_str()];
        if self.policy.needs_confirmation(&argv)
            && !self.confirm(
                &format!("Kill process {}? This is potentially destructive.", pid),
                &argv.join(" "),
            )
        {
            return CANCELLED.to_string();
        }
        self.kill(pid).await
    }

    async fn kill_name(&self, pattern: &str) -> String {
        let own_pid = std::process::id();
        let pids: Vec<u32> = match self.exec_default(&["pgrep", "-f", pattern]).await {
            RawOutcome::Completed { output, .. } => output
                .split_whitespace()
                .filter_map(|t| t.parse::<u32>().ok())
                .filter(|pid| *pid != own_pid)
                .collect(),
            other => return other.message(),
        };
        if pids.is_empty() {
            return format!("No processes matching {}.", pattern);
        }

        let mut argv = vec!["kill".to_string()];
        argv.extend(pids.iter().map(u32::to_string));
        if self.policy.needs_confirmation(&argv)
            && !self.confirm(&format!("Kill processes {:?}?", pids), &argv.join(" "))
        {
            return CANCELLED.to_string();
        }

        let mut lines = Vec::with_capacity(pids.len());
        for pid in pids {
            lines.push(self.kill(pid).await);
        }
        lines.join("\n")
    }

    async fn kill(&self, pid: u32) -> String {
        if pid <= self.settings.protected_pid_max {
            return protected_pid_message(pid);
        }
        let pid_arg = pid.to_string();
        match self.exec_default(&["kill", "-9", pid_arg.as_str()]).await {
            RawOutcome::Completed {
                output, exit_code, ..
            } => {
                if !output.trim().is_empty() {
                    output.trim().to_string()
                } else if exit_code == Some(0) {
                    format!("Killed process {}.", pid)
                } else {
                    format!("kill returned {}", exit_code.unwrap_or(-1))
                }
            }
            other => other.message(),
        }
    }

    async fn is_installed(&self, package: &str) -> bool {
        match self
            .exec_default(&["dpkg-query", "-W", "-f=${Status}", package])
            .await
        {
            RawOutcome::Completed { output, .. } => output.contains("install ok installed"),
            _ => false,
        }
    }

    async fn in_repository(&self, package: &str) -> bool {
        match self.exec_default(&["apt-cache", "policy", package]).await {
            RawOutcome::Completed { output, .. } => {
                output.contains("Candidate:") && !output.contains("Candidate: (none)")
            }
            _ => false,
        }
    }

    async fn install_package(&self, package: &str, version: Option<&str>) -> String {
        if self.is_installed(package).await {
            return format!("{} is already installed.", package);
        }

        let probe_timeout = self.settings.effective_network_probe_timeout();
        if !self
            .system
            .network_reachable(&self.settings.network_probe_addr, probe_timeout)
            .await
        {
            return format!("No internet connection. Cannot install {}.", package);
        }

        if !self.in_repository(package).await {
            return format!("Package {} not found in apt cache.", package);
        }

        match self.system.available_disk_mb(Path::new("/")).await {
            Some(free_mb) if free_mb < self.settings.min_free_disk_mb => {
                return format!(
                    "Low disk space: only {} MB free. Aborting install.",
                    free_mb
                );
            }
            Some(_) => {}
            None => warn!("Free disk space unknown, continuing with install"),
        }

        let target = match version {
            Some(v) => format!("{}={}", package, v),
            None => package.to_string(),
        };
        let question = match version {
            Some(v) => format!("Install {} version {}?", package, v),
            None => format!("Install {}?", package),
        };
        let argv = ["apt-get", "install", target.as_str()];
        if self.policy.needs_confirmation(&argv) && !self.confirm(&question, &argv.join(" ")) {
            return "Installation cancelled.".to_string();
        }

        let limit = self.settings.effective_install_timeout();
        let mut lines = Vec::new();
        let update = self
            .exec(vec!["apt-get".to_string(), "update".to_string()], limit)
            .await;
        if let RawOutcome::Completed { output, .. } = &update {
            lines.push(output.trim_end().to_string());
        } else {
            return update.message();
        }

        let install = self
            .exec(
                ["apt-get", "install", "-y", target.as_str()]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                limit,
            )
            .await;
        match install {
            RawOutcome::Completed {
                output, exit_code, ..
            } => {
                lines.push(output.trim_end().to_string());
                lines.push(format!("[exit {}]", exit_code.unwrap_or(-1)));
            }
            other => lines.push(other.message()),
        }
        lines.retain(|l| !l.is_empty());
        lines.join("\n")
    }

    async fn disk_cleanup(&self) -> String {
        let argv = ["apt-get", "autoremove", "-y"];
        if self.policy.needs_confirmation(&argv)
            && !self.confirm(
                "Remove unused packages and clear the package cache to free disk space?",
                "apt-get autoremove -y && apt-get clean",
            )
        {
            return CANCELLED.to_string();
        }

        let clean = ["apt-get", "clean"];
        let mut lines = Vec::new();
        for step in [&argv[..], &clean[..]] {
            match self.exec_default(step).await {
                RawOutcome::Completed { output, .. } => {
                    if !output.trim().is_empty() {
                        lines.push(output.trim_end().to_string());
                    }
                }
                other => return other.message(),
            }
        }
        if lines.is_empty() {
            "Disk cleanup finished.".to_string()
        } else {
            lines.join("\n")
        }
    }

    async fn service(&self, verb: ServiceVerb, service: &str) -> String {
        let argv = ["systemctl", verb.as_str(), service];
        if !self.policy.is_safe(&argv) {
            self.reject(&argv.join(" "), "not allowed by the safety policy");
            return SAFETY_REJECTED.to_string();
        }
        if self.policy.needs_confirmation(&argv)
            && !self.confirm(
                &format!("{} service {}?", capitalize(verb.as_str()), service),
                &argv.join(" "),
            )
        {
            return CANCELLED.to_string();
        }
        self.report(&argv).await
    }

    async fn open_url(&self, url: &str) -> String {
        match self.launch(&["xdg-open", url]).await {
            Ok(()) => format!("Opening {}.", url),
            Err(e) => format!("Could not open {}: {}", url, e),
        }
    }

    async fn search(&self, query: &str) -> String {
        match self
            .system
            .first_search_result(&self.settings.search_endpoint, query)
            .await
        {
            Some(url) => match self.launch(&["xdg-open", url.as_str()]).await {
                Ok(()) => format!("Opening the top result for {}: {}", query, url),
                Err(e) => format!("Could not open {}: {}", url, e),
            },
            None => {
                let url = format!("{}{}", FALLBACK_SEARCH_URL, urlencoding::encode(query));
                match self.launch(&["xdg-open", url.as_str()]).await {
                    Ok(()) => format!("Searching the web for {}.", query),
                    Err(e) => format!("Could not open a browser: {}", e),
                }
            }
        }
    }
}

fn protected_pid_message(pid: u32) -> String {
    format!("Refusing to kill system PID {} (protected).", pid)
}

/// First `RAW_DENYLIST` pattern found in a command line
fn denylisted(command: &str) -> Option<&'static str> {
    let lowered = command.to_lowercase();
    RAW_DENYLIST.iter().copied().find(|p| lowered.contains(p))
}

/// Pid operands of `kill`; one leading signal option is skipped, so `-1` after it is a target
fn kill_targets(args: &[String]) -> Vec<i64> {
    let mut targets = Vec::new();
    let mut signal_seen = false;
    let mut options_done = false;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if !options_done {
            match arg.as_str() {
                "--" => {
                    options_done = true;
                    continue;
                }
                "-l" | "-L" | "--list" | "--table" => return Vec::new(),
                "-s" | "-n" | "--signal" => {
                    iter.next();
                    signal_seen = true;
                    continue;
                }
                a if a.starts_with('-') && !signal_seen => {
                    signal_seen = true;
                    continue;
                }
                _ => {}
            }
        }
        if let Ok(pid) = arg.parse::<i64>() {
            targets.push(pid);
        }
    }
    targets
}

/// `pkill` arguments as `pgrep` takes them, signal options removed
fn pgrep_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--signal" {
            iter.next();
            continue;
        }
        if arg.starts_with("--signal=") || is_signal_option(arg) {
            continue;
        }
        out.push(arg.clone());
    }
    out
}

/// `-9`, `-HUP`, `-SIGKILL`; single capitals like `-U` are pgrep options
fn is_signal_option(arg: &str) -> bool {
    let Some(rest) = arg.strip_prefix('-') else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }
    rest.chars().all(|c| c.is_ascii_digit())
        || (rest.len() > 1 && rest.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()))
}

fn format_top(rows: &[ProcessSummary]) -> String {
    let mut lines = vec![format!(
        "{:>7}  {:>6}  {:>10}  {}",
        "PID", "%MEM", "RSS(KB)", "COMMAND"
    )];
    for row in rows {
        lines.push(format!(
            "{:>7}  {:>6.1}  {:>10}  {}",
            row.pid,
            row.memory_percent,
            row.memory_bytes / 1024,
            row.name
        ));
    }
    lines.join("\n")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `mailto:` URL with optional subject and body
pub fn mailto_url(recipient: &str, subject: Option<&str>, body: Option<&str>) -> String {
    let mut params = Vec::new();
    if let Some(subject) = subject.filter(|s| !s.is_empty()) {
        params.push(format!("subject={}", urlencoding::encode(subject)));
    }
    if let Some(body) = body.filter(|b| !b.is_empty()) {
        params.push(format!("body={}", urlencoding::encode(body)));
    }
    if params.is_empty() {
        format!("mailto:{}", recipient)
    } else {
        format!("mailto:{}?{}", recipient, params.join("&"))
    }
}
