//! Terminal confirmation and reply output

use leo_common::{Confirmer, Responder};
use owo_colors::OwoColorize;
use std::io::{self, IsTerminal, Write};

/// Asks on stdout, reads the answer from stdin; anything but yes is no
pub struct ConsoleConfirmer;

impl Confirmer for ConsoleConfirmer {
    fn confirm(&self, question: &str) -> bool {
        print!("{} [y/N] ", question);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_yes(&answer),
        }
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Prints replies; colored only on a terminal
pub struct ConsoleResponder {
    color: bool,
}

impl ConsoleResponder {
    pub fn new() -> Self {
        Self {
            color: io::stdout().is_terminal(),
        }
    }
}

impl Default for ConsoleResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Responder for ConsoleResponder {
    fn say(&self, text: &str) {
        if self.color {
            println!("{} {}", "Leo:".cyan().bold(), text);
        } else {
            println!("Leo: {}", text);
        }
    }

    fn show(&self, text: &str) {
        if self.color {
            println!("{}", text.dimmed());
        } else {
            println!("{}", text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
        assert!(!is_yes("yeah sure"));
    }
}
