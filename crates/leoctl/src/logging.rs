//! Diagnostic logging setup
//!
//! `RUST_LOG` wins; otherwise the `[log] level` from config. Always stderr,
//! so replies on stdout stay clean.

use tracing_subscriber::EnvFilter;

const FALLBACK_LEVEL: &str = "warn";

pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(level));

    // A second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL))
}
