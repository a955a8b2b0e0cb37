use std::io::{self, Write};

/// Where AI commands show proposals and ask for confirmation.
pub trait Console: Send + Sync {
    fn print(&self, text: &str);

    fn confirm(&self, question: &str) -> bool;
}

/// Writes to stdout and reads answers from stdin, like psql's own prompts.
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn print(&self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
    }

    fn confirm(&self, question: &str) -> bool {
        {
            let mut out = io::stdout().lock();
            let _ = write!(out, "\n{question} [Y/n]: ");
            let _ = out.flush();
        }
        let mut answer = String::new();
        let read = io::stdin().read_line(&mut answer);
        let _ = writeln!(io::stdout());
        match read {
            // EOF is a refusal, not an empty (default yes) answer.
            Ok(0) | Err(_) => false,
            Ok(_) => parse_confirmation(&answer),
        }
    }
}

pub fn parse_confirmation(answer: &str) -> bool {
    let answer = answer.trim().to_ascii_lowercase();
    answer.is_empty() || answer == "y" || answer == "yes"
}
