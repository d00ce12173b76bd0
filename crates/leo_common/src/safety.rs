//! Safety Policy
//!
//! The ONLY programs Leo may execute, which of them are privileged, and which
//! systemctl verbs are acceptable. Every command, whether it came from a typed
//! intent or from the reasoning engine, is checked here before it reaches the OS.
//!
//! Verdicts are computed fresh per call from immutable sets.

use std::collections::HashSet;
use std::path::Path;

/// Programs that may run at all
pub const DEFAULT_SAFE_BINARIES: &[&str] = &[
    "df", "free", "systemctl", "ps", "pgrep", "bash", "sh", "grep", "awk", "sed", "xdg-open",
    "which", "apt-get", "apt", "apt-cache", "dpkg", "dpkg-query", "nohup", "kill", "pkill", "top",
    "ls",
];

/// Programs that need confirmation and run elevated
pub const DEFAULT_PRIVILEGED_BINARIES: &[&str] = &["apt-get", "apt", "systemctl", "kill", "pkill"];

pub const DEFAULT_SERVICE_VERBS: &[&str] =
    &["start", "stop", "restart", "status", "enable", "disable"];

/// Elevation wrapper prepended to privileged commands
pub const ELEVATION_WRAPPER: &str = "sudo";

#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    safe_binaries: HashSet<String>,
    privileged_binaries: HashSet<String>,
    service_verbs: HashSet<String>,
}

impl SafetyPolicy {
    pub fn new<I, J, K>(safe: I, privileged: J, service_verbs: K) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        J: IntoIterator,
        J::Item: Into<String>,
        K: IntoIterator,
        K::Item: Into<String>,
    {
        Self {
            safe_binaries: safe.into_iter().map(Into::into).collect(),
            privileged_binaries: privileged.into_iter().map(Into::into).collect(),
            service_verbs: service_verbs.into_iter().map(Into::into).collect(),
        }
    }

    /// May this argv run at all?
    pub fn is_safe<S: AsRef<str>>(&self, argv: &[S]) -> bool {
        let Some(program) = program_name(argv) else {
            return false;
        };
        if !self.safe_binaries.contains(program) {
            return false;
        }
        if program == "systemctl" {
            if let Some(verb) = argv.get(1) {
                return self.service_verbs.contains(verb.as_ref());
            }
        }
        true
    }

    /// Must the user say yes before this argv runs?
    pub fn needs_confirmation<S: AsRef<str>>(&self, argv: &[S]) -> bool {
        self.is_privileged(argv)
    }

    /// Must this argv run elevated?
    pub fn is_admin<S: AsRef<str>>(&self, argv: &[S]) -> bool {
        self.is_privileged(argv)
    }

    fn is_privileged<S: AsRef<str>>(&self, argv: &[S]) -> bool {
        program_name(argv)
            .map(|p| self.privileged_binaries.contains(p))
            .unwrap_or(false)
    }
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_SAFE_BINARIES.iter().copied(),
            DEFAULT_PRIVILEGED_BINARIES.iter().copied(),
            DEFAULT_SERVICE_VERBS.iter().copied(),
        )
    }
}

/// Program name with any directory stripped
pub fn program_name<S: AsRef<str>>(argv: &[S]) -> Option<&str> {
    let first = argv.first()?.as_ref();
    if first.is_empty() {
        return None;
    }
    Path::new(first).file_name().and_then(|n| n.to_str())
}

/// Drop a leading elevation wrapper; elevation is decided by the policy, not the caller
pub fn strip_elevation<S: AsRef<str>>(argv: &[S]) -> &[S] {
    match argv.first() {
        Some(first) if first.as_ref() == ELEVATION_WRAPPER => &argv[1..],
        _ => argv,
    }
}
