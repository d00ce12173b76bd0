//! REPL - interactive loop
//!
//! Reads a line, hands it to the orchestrator, prints the reply. Stdin is
//! locked per line only, so confirmations can read from it mid-turn.

use anyhow::Result;
use leo_common::response::present;
use leo_common::{GeneralSettings, Orchestrator, Responder};
use owo_colors::OwoColorize;
use std::io::{self, IsTerminal, Write};

/// Lines that end the session
pub const EXIT_WORDS: &[&str] = &["exit", "quit", "bye"];

pub fn is_exit(line: &str) -> bool {
    let line = line.trim().to_lowercase();
    EXIT_WORDS.contains(&line.as_str())
}

pub async fn run(
    orchestrator: &mut Orchestrator,
    responder: &dyn Responder,
    general: &GeneralSettings,
) -> Result<()> {
    let color = io::stdout().is_terminal();
    println!("Leo is listening. Type 'exit' to leave.");

    loop {
        if color {
            print!("{} ", ">".green().bold());
        } else {
            print!("> ");
        }
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            // EOF
            println!();
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit(input) {
            responder.say("Goodbye.");
            break;
        }

        if let Some(reply) = orchestrator.handle_text(input).await {
            present(responder, &reply, general);
        }
    }

    Ok(())
}
