//! Intent Classifier - deterministic text to intent mapping
//!
//! Ordered, first-match-wins patterns. Anything that does not match is handed
//! to the natural-language router instead.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// A single recognized user request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Install a package, optionally pinned to a version
    InstallPackage {
        package: String,
        version: Option<String>,
    },
    CheckInstalled {
        package: String,
    },
    PackagePolicy {
        package: String,
    },
    CheckDisk,
    /// Free space by dropping package caches
    DiskCleanup,
    CheckMemory,
    Service {
        verb: ServiceVerb,
        service: String,
    },
    KillPid {
        pid: u32,
    },
    /// Kill every process whose command line matches
    KillName {
        pattern: String,
    },
    TopProcesses {
        count: usize,
    },
    OpenUrl {
        url: String,
    },
    OpenApp {
        app: String,
    },
    ComposeMail {
        recipient: String,
        subject: Option<String>,
        body: Option<String>,
    },
    Search {
        query: String,
    },
    Speak {
        text: String,
    },
}

impl Intent {
    /// Stable name for logs and the audit trail
    pub fn name(&self) -> &'static str {
        match self {
            Intent::InstallPackage { .. } => "install_package",
            Intent::CheckInstalled { .. } => "check_installed",
            Intent::PackagePolicy { .. } => "package_policy",
            Intent::CheckDisk => "check_disk",
            Intent::DiskCleanup => "disk_cleanup",
            Intent::CheckMemory => "check_memory",
            Intent::Service { .. } => "service",
            Intent::KillPid { .. } => "kill_pid",
            Intent::KillName { .. } => "kill_name",
            Intent::TopProcesses { .. } => "top_processes",
            Intent::OpenUrl { .. } => "open_url",
            Intent::OpenApp { .. } => "open_app",
            Intent::ComposeMail { .. } => "compose_mail",
            Intent::Search { .. } => "search",
            Intent::Speak { .. } => "speak",
        }
    }
}

/// systemctl verbs a spoken request may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceVerb {
    Status,
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
}

impl ServiceVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceVerb::Status => "status",
            ServiceVerb::Start => "start",
            ServiceVerb::Stop => "stop",
            ServiceVerb::Restart => "restart",
            ServiceVerb::Enable => "enable",
            ServiceVerb::Disable => "disable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "status" => Some(ServiceVerb::Status),
            "start" => Some(ServiceVerb::Start),
            "stop" => Some(ServiceVerb::Stop),
            "restart" => Some(ServiceVerb::Restart),
            "enable" => Some(ServiceVerb::Enable),
            "disable" => Some(ServiceVerb::Disable),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static NOISE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s\-._@/:]").unwrap());

static INSTALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:install|setup|add)\s+([a-z0-9\-._+:]+)(?:\s+version\s+(\S+))?").unwrap()
});
static CHECK_INSTALLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:check if|is there|is)\s+([a-z0-9\-._]+)\s+(?:is\s+)?(?:installed|present)\b")
        .unwrap()
});
static POLICY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:apt policy|policy)\s+([a-z0-9\-._]+)").unwrap());
static RAM_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bram\b").unwrap());
static SERVICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(status|start|stop|restart|enable|disable)\s+([a-z0-9@.\-_]+)").unwrap()
});
static KILL_PID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^kill\s+pid\s+(\d+)").unwrap());
static KILL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^kill\s+([a-z0-9\-._]+)").unwrap());
static TOP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^top\b(?:\s+(\d+))?").unwrap());
static OPEN_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:open|go to|visit)\s+(\S+)").unwrap());
static DOMAIN_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+\.[a-zA-Z]{2,}(/.*)?$").unwrap());
static OPEN_APP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:open|launch|start)\s+([a-z0-9\-._]+)").unwrap());
static MAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:send|compose|mail)\s+to\s+(\S+@\S+)\s+(.+)").unwrap()
});
static SEARCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:search|find|look for)\s+(.+)").unwrap());
static SPEAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:say|speak|echo)\s+(.+)").unwrap());

const DEFAULT_TOP_COUNT: usize = 10;

/// Normalize raw text the way every pattern expects it
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    NOISE.replace_all(&lower, " ").trim().to_string()
}

/// Map free text to an intent, or None when nothing matches
pub fn parse_intent(text: &str) -> Option<Intent> {
    let t = normalize(text);
    if t.is_empty() {
        return None;
    }

    // Package management
    if let Some(caps) = INSTALL.captures(&t) {
        return Some(Intent::InstallPackage {
            package: caps[1].to_string(),
            version: caps.get(2).map(|m| m.as_str().to_string()),
        });
    }
    if let Some(caps) = CHECK_INSTALLED.captures(&t) {
        return Some(Intent::CheckInstalled {
            package: caps[1].to_string(),
        });
    }
    if let Some(caps) = POLICY.captures(&t) {
        return Some(Intent::PackagePolicy {
            package: caps[1].to_string(),
        });
    }

    // System state
    if t.contains("disk") || t.contains("storage") {
        if t.contains("cleanup") || t.contains("save space") || t.contains("free space") {
            return Some(Intent::DiskCleanup);
        }
        return Some(Intent::CheckDisk);
    }
    if t.contains("memory") || RAM_WORD.is_match(&t) {
        return Some(Intent::CheckMemory);
    }

    if let Some(caps) = SERVICE.captures(&t) {
        let verb = ServiceVerb::parse(&caps[1])?;
        return Some(Intent::Service {
            verb,
            service: caps[2].to_string(),
        });
    }

    // Processes
    if let Some(caps) = KILL_PID.captures(&t) {
        // A pid that does not fit is not a pid
        let pid = caps[1].parse::<u32>().ok()?;
        return Some(Intent::KillPid { pid });
    }
    if let Some(caps) = KILL_NAME.captures(&t) {
        return Some(Intent::KillName {
            pattern: caps[1].to_string(),
        });
    }
    if let Some(caps) = TOP.captures(&t) {
        let count = match caps.get(1) {
            Some(n) => n.as_str().parse::<usize>().ok()?,
            None => DEFAULT_TOP_COUNT,
        };
        return Some(Intent::TopProcesses { count });
    }

    // Desktop
    if let Some(caps) = OPEN_TARGET.captures(&t) {
        let target = &caps[1];
        if target.starts_with("http://") || target.starts_with("https://") {
            return Some(Intent::OpenUrl {
                url: target.to_string(),
            });
        }
        if DOMAIN_LIKE.is_match(target) {
            return Some(Intent::OpenUrl {
                url: format!("https://{}", target),
            });
        }
    }
    if let Some(caps) = OPEN_APP.captures(&t) {
        return Some(Intent::OpenApp {
            app: caps[1].to_string(),
        });
    }
    if let Some(caps) = MAIL.captures(&t) {
        let body = caps[2].trim();
        return Some(Intent::ComposeMail {
            recipient: caps[1].to_string(),
            subject: None,
            body: (!body.is_empty()).then(|| body.to_string()),
        });
    }
    if let Some(caps) = SEARCH.captures(&t) {
        return Some(Intent::Search {
            query: caps[1].trim().to_string(),
        });
    }
    if let Some(caps) = SPEAK.captures(&t) {
        return Some(Intent::Speak {
            text: caps[1].trim().to_string(),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_intent() {
        assert_eq!(
            parse_intent("Install vim"),
            Some(Intent::InstallPackage {
                package: "vim".to_string(),
                version: None
            })
        );
        assert_eq!(
            parse_intent("install nginx version 1.18.0"),
            Some(Intent::InstallPackage {
                package: "nginx".to_string(),
                version: Some("1.18.0".to_string())
            })
        );
    }

    #[test]
    fn test_check_installed_intent() {
        assert_eq!(
            parse_intent("is vim installed?"),
            Some(Intent::CheckInstalled {
                package: "vim".to_string()
            })
        );
        assert_eq!(
            parse_intent("check if curl is installed"),
            Some(Intent::CheckInstalled {
                package: "curl".to_string()
            })
        );
    }

    #[test]
    fn test_is_question_without_installed_falls_through() {
        // Not a package question; must reach the disk rule
        assert_eq!(parse_intent("is the disk full"), Some(Intent::CheckDisk));
    }

    #[test]
    fn test_policy_intent() {
        assert_eq!(
            parse_intent("apt policy firefox"),
            Some(Intent::PackagePolicy {
                package: "firefox".to_string()
            })
        );
    }

    #[test]
    fn test_disk_intents() {
        assert_eq!(parse_intent("how much disk space do I have"), Some(Intent::CheckDisk));
        assert_eq!(parse_intent("storage"), Some(Intent::CheckDisk));
        assert_eq!(parse_intent("disk cleanup please"), Some(Intent::DiskCleanup));
        assert_eq!(parse_intent("free space on my disk"), Some(Intent::DiskCleanup));
    }

    #[test]
    fn test_memory_intent() {
        assert_eq!(parse_intent("show memory usage"), Some(Intent::CheckMemory));
        assert_eq!(parse_intent("how much ram is free"), Some(Intent::CheckMemory));
        // "ram" only as a whole word
        assert_ne!(parse_intent("search program files"), Some(Intent::CheckMemory));
    }

    #[test]
    fn test_service_intent() {
        assert_eq!(
            parse_intent("restart nginx"),
            Some(Intent::Service {
                verb: ServiceVerb::Restart,
                service: "nginx".to_string()
            })
        );
        assert_eq!(
            parse_intent("status ssh@1.service"),
            Some(Intent::Service {
                verb: ServiceVerb::Status,
                service: "ssh@1.service".to_string()
            })
        );
    }

    #[test]
    fn test_kill_intents() {
        assert_eq!(parse_intent("kill pid 4242"), Some(Intent::KillPid { pid: 4242 }));
        assert_eq!(
            parse_intent("kill firefox"),
            Some(Intent::KillName {
                pattern: "firefox".to_string()
            })
        );
        assert_eq!(parse_intent("kill pid 99999999999999999999"), None);
    }

    #[test]
    fn test_top_intent() {
        assert_eq!(parse_intent("top"), Some(Intent::TopProcesses { count: 10 }));
        assert_eq!(parse_intent("top 5"), Some(Intent::TopProcesses { count: 5 }));
        assert_ne!(parse_intent("topology"), Some(Intent::TopProcesses { count: 10 }));
    }

    #[test]
    fn test_open_url_and_app() {
        assert_eq!(
            parse_intent("open https://example.com/docs"),
            Some(Intent::OpenUrl {
                url: "https://example.com/docs".to_string()
            })
        );
        assert_eq!(
            parse_intent("go to rust-lang.org"),
            Some(Intent::OpenUrl {
                url: "https://rust-lang.org".to_string()
            })
        );
        assert_eq!(
            parse_intent("launch gimp"),
            Some(Intent::OpenApp {
                app: "gimp".to_string()
            })
        );
        assert_eq!(
            parse_intent("open firefox"),
            Some(Intent::OpenApp {
                app: "firefox".to_string()
            })
        );
    }

    #[test]
    fn test_start_prefers_service() {
        assert_eq!(
            parse_intent("start docker"),
            Some(Intent::Service {
                verb: ServiceVerb::Start,
                service: "docker".to_string()
            })
        );
    }

    #[test]
    fn test_mail_intent() {
        assert_eq!(
            parse_intent("send to bob@example.com running late today"),
            Some(Intent::ComposeMail {
                recipient: "bob@example.com".to_string(),
                subject: None,
                body: Some("running late today".to_string()),
            })
        );
    }

    #[test]
    fn test_search_and_speak() {
        assert_eq!(
            parse_intent("look for rust async book"),
            Some(Intent::Search {
                query: "rust async book".to_string()
            })
        );
        assert_eq!(
            parse_intent("say hello world!"),
            Some(Intent::Speak {
                text: "hello world".to_string()
            })
        );
    }

    #[test]
    fn test_no_match() {
        assert_eq!(parse_intent("what's the weather like"), None);
        assert_eq!(parse_intent("   "), None);
        assert_eq!(parse_intent("?!"), None);
    }

    #[test]
    fn test_intent_names() {
        assert_eq!(Intent::CheckDisk.name(), "check_disk");
        assert_eq!(Intent::KillPid { pid: 1 }.name(), "kill_pid");
    }
}
