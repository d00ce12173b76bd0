//! Leoctl library - exposes modules for testing

pub mod cli;
pub mod console;
pub mod errors;
pub mod logging;
pub mod repl;
pub mod runtime;
