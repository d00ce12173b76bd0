//! Exit status for leoctl

use leo_common::LeoError;

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for general errors
pub const EXIT_GENERAL_ERROR: i32 = 1;

/// Exit code when the config file cannot be read or parsed (EX_CONFIG)
pub const EXIT_CONFIG_ERROR: i32 = 78;

/// Map a fatal startup error to an exit code
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<LeoError>() {
        Some(e) if e.is_config() => EXIT_CONFIG_ERROR,
        _ => EXIT_GENERAL_ERROR,
    }
}
