//! Suggestion Sanitizer
//!
//! Screens anything the reasoning engine proposes before it may run:
//! structure, allowed action families, dangerous content, vocabulary anomaly,
//! and per-argument character set. A suggestion is only usable when `ok` is
//! true; the Safety Policy is still applied afterwards.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::info;

use crate::safety::{program_name, DEFAULT_SAFE_BINARIES};

/// Action families a suggestion may name (anything starting with `install` is also accepted)
pub const DEFAULT_ALLOWED_ACTIONS: &[&str] = &[
    "install_package",
    "svc_action",
    "open_url",
    "list_files",
    "check_disk",
    "check_memory",
    "list_processes",
    "query_package",
    "kill_process",
    "manage_packages",
    "search_text",
];

/// Tokens considered normal in a command line
pub const DEFAULT_VOCABULARY: &[&str] = &[
    // Package and service words
    "install", "update", "upgrade", "clean", "autoremove", "policy", "service", "start", "stop",
    "restart", "status", "enable", "disable", "reload", "is-active", "list-units",
    // Common programs
    "firefox", "curl", "wget", "sudo",
    // Common flags
    "-y", "-h", "-l", "-a", "-la", "-al", "-lh", "-e", "-ef", "aux", "-f", "-n", "-q", "-s",
    "-w", "-9", "-15", "--no-pager", "--all", "--type",
    // Punctuation tokens
    ".", "/", "-", "_", ":", "@",
];

/// Share of unknown tokens above which a command line is anomalous
pub const ANOMALY_RATIO: f64 = 0.4;

static DANGEROUS_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?i)rm\s+-rf").unwrap(), "rm -rf"),
        (Regex::new(r"(?i)rm\s+-fr").unwrap(), "rm -fr"),
        (
            Regex::new(r"(?i):\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\};\s*:").unwrap(),
            "fork bomb",
        ),
        (Regex::new(r"(?i)dd\s+if=").unwrap(), "dd if="),
        (Regex::new(r"(?i)>>\s*/dev/sd").unwrap(), ">> /dev/sd"),
        (Regex::new(r"(?i):\s*>/dev").unwrap(), ": >/dev"),
        (Regex::new(r"(?i)mkfs\.").unwrap(), "mkfs."),
        (Regex::new(r"(?i)chmod\s+777\s+/").unwrap(), "chmod 777 /"),
        (Regex::new(r"(?i)curl\s+.*\|.*sh").unwrap(), "curl piped to shell"),
        (Regex::new(r"(?i)wget\s+.*\|.*sh").unwrap(), "wget piped to shell"),
        (Regex::new(r"(?i)bash\s+-c").unwrap(), "bash -c"),
        (Regex::new(r"(?i)\bsh\s+-c").unwrap(), "sh -c"),
    ]
});

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\w\-./:@]+").unwrap());
static SAFE_ARG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\w\-./:@]+$").unwrap());

/// What survives sanitization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedSuggestion {
    pub propose_command: bool,
    pub action: String,
    pub args: Vec<String>,
    pub explanation: String,
    pub confidence: f64,
}

impl SanitizedSuggestion {
    pub fn command_line(&self) -> String {
        self.args.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SanitizeVerdict {
    pub ok: bool,
    pub sanitized: Option<SanitizedSuggestion>,
    pub reasons: Vec<String>,
}

impl SanitizeVerdict {
    fn rejected(reasons: Vec<String>) -> Self {
        Self {
            ok: false,
            sanitized: None,
            reasons,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuggestionSanitizer {
    allowed_actions: HashSet<String>,
    vocabulary: HashSet<String>,
}

impl SuggestionSanitizer {
    pub fn new<I, J>(allowed_actions: I, vocabulary: J) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        J: IntoIterator,
        J::Item: Into<String>,
    {
        Self {
            allowed_actions: allowed_actions.into_iter().map(Into::into).collect(),
            vocabulary: vocabulary
                .into_iter()
                .map(|t| t.into().to_lowercase())
                .collect(),
        }
    }

    /// Add site-specific tokens (from `[safety] extra_vocabulary`)
    pub fn with_extra_vocabulary<I>(mut self, extra: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.vocabulary
            .extend(extra.into_iter().map(|t| t.as_ref().to_lowercase()));
        self
    }

    pub fn verify_and_sanitize(&self, suggestion: &Value) -> SanitizeVerdict {
        self.screen(suggestion, &HashSet::new())
    }

    /// Screen one planned command line. Words from the user's own request
    /// count as known, so `which nginx` asked for by name is not anomalous.
    pub fn verify_command<S: AsRef<str>>(
        &self,
        argv: &[S],
        explanation: Option<&str>,
        request: &str,
    ) -> SanitizeVerdict {
        let known: HashSet<String> = tokens(request).into_iter().collect();
        self.screen(&suggestion_for_command(argv, explanation), &known)
    }

    fn screen(&self, suggestion: &Value, known: &HashSet<String>) -> SanitizeVerdict {
        let Some(obj) = suggestion.as_object() else {
            return SanitizeVerdict::rejected(vec!["Suggestion not an object".to_string()]);
        };

        let action = match obj.get("action").and_then(Value::as_str) {
            Some(a) if !a.trim().is_empty() => a.trim().to_string(),
            _ => return SanitizeVerdict::rejected(vec!["No action present".to_string()]),
        };

        let mut reasons = Vec::new();
        if !self.allowed_actions.contains(&action) && !action.starts_with("install") {
            reasons.push(format!("Action '{}' not in allowed list", action));
        }

        let raw_args: Vec<&Value> = match obj.get("args") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().collect(),
            Some(other) => {
                reasons.push("Arguments are not a list".to_string());
                vec![other]
            }
        };
        let joined_args = raw_args
            .iter()
            .map(|a| arg_text(a))
            .collect::<Vec<_>>()
            .join(" ");
        let explanation = obj
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let danger = dangerous_matches(&format!("{} {}", explanation, joined_args));
        if !danger.is_empty() {
            info!("Dangerous patterns in suggestion: {:?}", danger);
            reasons.extend(danger);
            return SanitizeVerdict::rejected(reasons);
        }

        if self.ratio(&joined_args, known) > ANOMALY_RATIO {
            reasons.push("Token sequence flagged as anomalous".to_string());
            return SanitizeVerdict::rejected(reasons);
        }

        let mut safe_args = Vec::new();
        for arg in raw_args {
            match arg.as_str() {
                Some(s) if SAFE_ARG.is_match(s) => safe_args.push(s.to_string()),
                _ => reasons.push(format!("Argument rejected: {}", arg_text(arg))),
            }
        }

        let sanitized = SanitizedSuggestion {
            propose_command: true,
            action,
            args: safe_args,
            explanation,
            confidence: clamp_confidence(obj.get("confidence")),
        };

        SanitizeVerdict {
            ok: reasons.is_empty(),
            sanitized: Some(sanitized),
            reasons,
        }
    }

    /// Ratio of unknown tokens, pure digits never counting as unknown
    pub fn anomaly_ratio(&self, text: &str) -> f64 {
        self.ratio(text, &HashSet::new())
    }

    fn ratio(&self, text: &str, known: &HashSet<String>) -> f64 {
        let tokens = tokens(text);
        if tokens.is_empty() {
            return 0.0;
        }
        let unknown = tokens
            .iter()
            .filter(|t| !self.vocabulary.contains(*t) && !known.contains(*t))
            .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
            .count();
        unknown as f64 / tokens.len() as f64
    }
}

impl Default for SuggestionSanitizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALLOWED_ACTIONS.iter().copied(),
            DEFAULT_VOCABULARY
                .iter()
                .chain(DEFAULT_SAFE_BINARIES.iter())
                .copied(),
        )
    }
}

/// One reason per dangerous pattern found in `text`
pub fn dangerous_matches(text: &str) -> Vec<String> {
    DANGEROUS_PATTERNS
        .iter()
        .filter(|(rx, _)| rx.is_match(text))
        .map(|(_, label)| format!("Dangerous pattern matched: {}", label))
        .collect()
}

/// Action family of a planned command, derived from its program
pub fn action_for_command<S: AsRef<str>>(argv: &[S]) -> &'static str {
    let Some(program) = program_name(argv) else {
        return "run_command";
    };
    match program {
        "apt-get" | "apt" => {
            if argv.iter().skip(1).any(|a| a.as_ref() == "install") {
                "install_package"
            } else {
                "manage_packages"
            }
        }
        "apt-cache" | "dpkg" | "dpkg-query" => "query_package",
        "systemctl" => "svc_action",
        "xdg-open" => "open_url",
        "ls" => "list_files",
        "df" => "check_disk",
        "free" => "check_memory",
        "ps" | "top" | "pgrep" => "list_processes",
        "kill" | "pkill" => "kill_process",
        "grep" | "awk" | "sed" | "which" => "search_text",
        _ => "run_command",
    }
}

/// Wrap a planned command in the suggestion shape the sanitizer screens
pub fn suggestion_for_command<S: AsRef<str>>(argv: &[S], explanation: Option<&str>) -> Value {
    let args: Vec<&str> = argv.iter().map(AsRef::as_ref).collect();
    json!({
        "propose_command": true,
        "action": action_for_command(argv),
        "args": args,
        "explanation": explanation.unwrap_or_default(),
        "confidence": 1.0,
    })
}

/// Lowercased word and path tokens of `text`
fn tokens(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

fn arg_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn clamp_confidence(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}
