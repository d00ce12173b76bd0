//! Outcome Observer - keyword heuristic over command output
//!
//! Exit codes are logged by the executor but never used here.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Failure keywords, highest priority first
pub const FAILURE_KEYWORDS: &[&str] = &[
    "error",
    "failed",
    "not found",
    "permission denied",
    "unable",
    "no such file",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub status: ObservationStatus,
    /// First matched keyword when the status is failure
    pub reason: Option<String>,
    pub command: String,
    pub output: String,
}

impl Observation {
    pub fn is_success(&self) -> bool {
        self.status == ObservationStatus::Success
    }
}

/// Classify the output of `command`
pub fn observe(command: &str, output: &str) -> Observation {
    let lowered = output.to_lowercase();
    let reason = FAILURE_KEYWORDS
        .iter()
        .find(|kw| lowered.contains(**kw))
        .map(|kw| kw.to_string());

    debug!("Observed '{}': {:?}", command, reason);

    Observation {
        status: if reason.is_some() {
            ObservationStatus::Failure
        } else {
            ObservationStatus::Success
        },
        reason,
        command: command.to_string(),
        output: output.to_string(),
    }
}
