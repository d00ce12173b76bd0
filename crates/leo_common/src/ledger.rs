//! Retry Ledger
//!
//! Commands that already got their one retry-after-recovery in this session.
//! Entries are added, never removed.

use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct RetryLedger {
    retried: HashSet<String>,
}

impl RetryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, command: &str) -> bool {
        self.retried.contains(command)
    }

    /// Record a retry; false when the command was already ledgered
    pub fn record(&mut self, command: &str) -> bool {
        self.retried.insert(command.to_string())
    }

    pub fn len(&self) -> usize {
        self.retried.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retried.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_once() {
        let mut ledger = RetryLedger::new();
        assert!(ledger.is_empty());
        assert!(ledger.record("apt-get install -y nginx"));
        assert!(!ledger.record("apt-get install -y nginx"));
        assert!(ledger.contains("apt-get install -y nginx"));
        assert!(!ledger.contains("apt-get install -y vim"));
        assert_eq!(ledger.len(), 1);
    }
}
