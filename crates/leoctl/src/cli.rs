//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from execution logic.

use clap::Parser;
use std::path::PathBuf;

/// Leo Assistant CLI
#[derive(Parser, Debug)]
#[command(name = "leoctl")]
#[command(about = "Leo - local Linux assistant", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Run one turn with this text and exit (no text starts the interactive loop)
    #[arg(long, short = 't')]
    pub text: Option<String>,

    /// Config file (overrides $LEO_CONFIG and the XDG location)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Do not open the conversation and task history
    #[arg(long)]
    pub no_memory: bool,

    /// Answer yes to every confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}
