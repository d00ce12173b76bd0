//! Leo Configuration
//!
//! Configuration lives in ~/.config/leo/config.toml (see `paths::config_candidates`).
//! Every field has a serde default, so a partial file or no file at all is valid.

use crate::error::{LeoError, Result};
use crate::llm_client::LlmConfig;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Top-level config file layout
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LeoConfig {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub executor: ExecutorSettings,

    #[serde(default)]
    pub safety: SafetySettings,

    #[serde(default)]
    pub memory: MemorySettings,

    #[serde(default)]
    pub log: LogConfig,
}

impl LeoConfig {
    /// Load from an explicit path, or the first existing candidate, or defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(LeoError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Self::load_from(path);
        }

        for candidate in paths::config_candidates() {
            if candidate.exists() {
                return Self::load_from(&candidate);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Conversation surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// When set, only turns starting with this word are handled
    #[serde(default)]
    pub wake_word: Option<String>,

    #[serde(default = "default_speech_max_words")]
    pub speech_max_words: usize,

    /// Replies longer than this are announced instead of spoken
    #[serde(default = "default_long_output_chars")]
    pub long_output_chars: usize,
}

fn default_speech_max_words() -> usize {
    60
}

fn default_long_output_chars() -> usize {
    500
}

impl GeneralSettings {
    /// Validate and clamp speech_max_words to valid range (5-500)
    pub fn effective_speech_max_words(&self) -> usize {
        self.speech_max_words.clamp(5, 500)
    }

    /// Validate and clamp long_output_chars to valid range (50-20000)
    pub fn effective_long_output_chars(&self) -> usize {
        self.long_output_chars.clamp(50, 20_000)
    }

    /// Lower-cased wake word, or None when gating is off
    pub fn normalized_wake_word(&self) -> Option<String> {
        self.wake_word
            .as_deref()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
    }
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            wake_word: None,
            speech_max_words: default_speech_max_words(),
            long_output_chars: default_long_output_chars(),
        }
    }
}

/// Action executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Hard timeout for raw commands
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Timeout for package index refresh and install
    #[serde(default = "default_install_timeout_secs")]
    pub install_timeout_secs: u64,

    #[serde(default = "default_min_free_disk_mb")]
    pub min_free_disk_mb: u64,

    /// PIDs at or below this value are never killed
    #[serde(default = "default_protected_pid_max")]
    pub protected_pid_max: u32,

    #[serde(default = "default_network_probe_addr")]
    pub network_probe_addr: String,

    #[serde(default = "default_network_probe_timeout_secs")]
    pub network_probe_timeout_secs: u64,

    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_install_timeout_secs() -> u64 {
    900
}

fn default_min_free_disk_mb() -> u64 {
    200
}

fn default_protected_pid_max() -> u32 {
    100
}

fn default_network_probe_addr() -> String {
    "8.8.8.8:53".to_string()
}

fn default_network_probe_timeout_secs() -> u64 {
    3
}

fn default_search_endpoint() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}

impl ExecutorSettings {
    /// Validate and clamp command_timeout_secs to valid range (1-600)
    pub fn effective_command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.clamp(1, 600))
    }

    /// Validate and clamp install_timeout_secs to valid range (30-3600)
    pub fn effective_install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs.clamp(30, 3600))
    }

    /// Validate and clamp network_probe_timeout_secs to valid range (1-30)
    pub fn effective_network_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.network_probe_timeout_secs.clamp(1, 30))
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
            install_timeout_secs: default_install_timeout_secs(),
            min_free_disk_mb: default_min_free_disk_mb(),
            protected_pid_max: default_protected_pid_max(),
            network_probe_addr: default_network_probe_addr(),
            network_probe_timeout_secs: default_network_probe_timeout_secs(),
            search_endpoint: default_search_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SafetySettings {
    /// Extra tokens treated as expected by the anomaly score
    #[serde(default)]
    pub extra_vocabulary: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,

    /// Overrides the XDG data location
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Conversation turns handed to the router as context
    #[serde(default = "default_recent_turns")]
    pub recent_turns: usize,
}

fn default_memory_enabled() -> bool {
    true
}

fn default_recent_turns() -> usize {
    10
}

impl MemorySettings {
    /// Validate and clamp recent_turns to valid range (0-100)
    pub fn effective_recent_turns(&self) -> usize {
        self.recent_turns.min(100)
    }

    pub fn resolved_db_path(&self) -> Option<PathBuf> {
        self.db_path.clone().or_else(paths::memory_db_path)
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            db_path: None,
            recent_turns: default_recent_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
