//! Error types for Leo.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LeoError {
    /// Configuration faults are fatal at startup; everything else is logged.
    pub fn is_config(&self) -> bool {
        matches!(self, LeoError::Config(_) | LeoError::Toml(_))
    }
}

pub type Result<T> = std::result::Result<T, LeoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_classification() {
        assert!(LeoError::Config("bad".into()).is_config());
        assert!(!LeoError::Internal("bad".into()).is_config());
        let io = LeoError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(!io.is_config());
        let toml = toml::from_str::<toml::Value>("[broken").unwrap_err();
        assert!(LeoError::from(toml).is_config());
    }
}
