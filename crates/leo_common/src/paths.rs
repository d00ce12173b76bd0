//! Path helpers for Leo
//!
//! Citation: [archwiki:XDG_Base_Directory]

use std::path::PathBuf;

const APP_DIR: &str = "leo";

/// Candidate config file locations, highest priority first.
///
/// Priority:
/// 1. $LEO_CONFIG
/// 2. $XDG_CONFIG_HOME/leo/config.toml
/// 3. ~/.config/leo/config.toml
pub fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(explicit) = std::env::var("LEO_CONFIG") {
        if !explicit.is_empty() {
            candidates.push(PathBuf::from(explicit));
        }
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            candidates.push(PathBuf::from(xdg).join(APP_DIR).join("config.toml"));
        }
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".config").join(APP_DIR).join("config.toml"));
    }
    candidates
}

/// Audit log path
///
/// Priority:
/// 1. $LEO_AUDIT_LOG
/// 2. $XDG_STATE_HOME/leo/audit.jsonl
/// 3. ~/.local/state/leo/audit.jsonl
pub fn audit_log_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("LEO_AUDIT_LOG") {
        if !explicit.is_empty() {
            return Some(PathBuf::from(explicit));
        }
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg).join(APP_DIR).join("audit.jsonl"));
        }
    }
    dirs::home_dir().map(|home| home.join(".local/state").join(APP_DIR).join("audit.jsonl"))
}

/// Default memory database: $XDG_DATA_HOME/leo/memory.db or ~/.local/share/leo/memory.db
pub fn memory_db_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg).join(APP_DIR).join("memory.db"));
        }
    }
    dirs::home_dir().map(|home| home.join(".local/share").join(APP_DIR).join("memory.db"))
}

/// True when the effective uid is root, so `sudo` would be redundant.
pub fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_candidates_end_with_home_default() {
        let candidates = config_candidates();
        if let Some(last) = candidates.last() {
            assert!(last.ends_with("leo/config.toml"));
        }
    }

    #[test]
    fn test_memory_db_file_name() {
        if let Some(path) = memory_db_path() {
            assert!(path.ends_with("leo/memory.db"));
        }
    }
}
