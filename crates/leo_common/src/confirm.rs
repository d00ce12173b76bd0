//! Confirmation capability
//!
//! Injected into the executor and orchestrator. Declining is a normal
//! outcome, never an error.

use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::info;

pub trait Confirmer: Send + Sync {
    /// Ask a yes/no question; true only on an explicit yes
    fn confirm(&self, question: &str) -> bool;
}

/// Answers yes to everything (`--yes`)
#[derive(Debug, Default)]
pub struct AutoConfirm;

impl Confirmer for AutoConfirm {
    fn confirm(&self, question: &str) -> bool {
        info!("Auto-confirmed: {}", question);
        true
    }
}

/// Scripted answers for tests; falls back to `default` when the script runs out
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<bool>>,
    default: bool,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    pub fn new(answers: Vec<bool>, default: bool) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            default,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn always(answer: bool) -> Self {
        Self::new(Vec::new(), answer)
    }

    /// Questions asked so far, in order
    pub fn questions(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    pub fn ask_count(&self) -> usize {
        self.asked.lock().unwrap().len()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&self, question: &str) -> bool {
        self.asked.lock().unwrap().push(question.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default)
    }
}
