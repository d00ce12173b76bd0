//! Audit log for commands at the execution boundary
//!
//! XDG-compliant JSONL with a fallback chain (see `paths::audit_log_path`).
//! A failed write is dropped; auditing never breaks a turn.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Completed,
    TimedOut,
    Rejected,
    Cancelled,
}

/// One line of the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp
    pub ts: String,

    /// Request ID (UUID)
    pub req_id: String,

    pub command: String,

    pub outcome: AuditOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Why the command was refused, when it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl AuditEntry {
    pub fn new(command: &str, outcome: AuditOutcome) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339(),
            req_id: uuid::Uuid::new_v4().to_string(),
            command: command.to_string(),
            outcome,
            exit_code: None,
            reason: None,
            duration_ms: 0,
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Log to the discovered XDG location
    pub fn discover() -> Self {
        Self {
            path: crate::paths::audit_log_path(),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, entry: &AuditEntry) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = Self::write_to_file(entry, path) {
            debug!("Audit write to {} failed: {}", path.display(), e);
        }
    }

    fn write_to_file(entry: &AuditEntry, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string(entry)?;

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_append_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/audit.jsonl");
        let log = AuditLog::at(&path);

        log.record(
            &AuditEntry::new("df -h", AuditOutcome::Completed)
                .with_exit_code(Some(0))
                .with_duration_ms(12),
        );
        log.record(&AuditEntry::new("rm -rf /", AuditOutcome::Rejected).with_reason("denylisted"));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["outcome"], "completed");
        assert_eq!(first["exit_code"], 0);
        assert_eq!(first["duration_ms"], 12);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["outcome"], "rejected");
        assert_eq!(second["reason"], "denylisted");
        assert!(second.get("exit_code").is_none());
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let log = AuditLog::disabled();
        assert!(log.path().is_none());
        log.record(&AuditEntry::new("df -h", AuditOutcome::Completed));
    }

    #[test]
    fn test_unwritable_path_is_ignored() {
        let log = AuditLog::at("/proc/leo-cannot-write-here/audit.jsonl");
        log.record(&AuditEntry::new("df -h", AuditOutcome::TimedOut));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = AuditEntry::new("x", AuditOutcome::Cancelled);
        let b = AuditEntry::new("x", AuditOutcome::Cancelled);
        assert_ne!(a.req_id, b.req_id);
    }
}
