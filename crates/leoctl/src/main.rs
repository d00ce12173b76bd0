//! Leo Control - text front end for the Leo assistant
//!
//! `leoctl --text "..."` runs one turn; with no text it starts the
//! interactive loop.

use clap::Parser;
use leoctl::cli::Cli;
use leoctl::errors::{exit_code_for, EXIT_SUCCESS};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match leoctl::runtime::run(cli).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("leoctl: {:#}", e);
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}
