use std::io::{self, BufRead, Write};

use crate::error::ConvertError;

/// Blocking question/answer seam. Resolution logic only ever talks to this
/// trait, so tests substitute a scripted implementation.
pub trait Prompter {
    /// Ask a free-text question when `choices` is empty, otherwise keep
    /// asking until the answer is one of `choices` (case-insensitive).
    fn ask(&self, question: &str, choices: &[&str]) -> Result<String, ConvertError>;
}

/// Yes/no convenience wrapper; empty answer takes the default.
pub fn confirm<P: Prompter>(
    prompter: &P,
    question: &str,
    default_yes: bool,
) -> Result<bool, ConvertError> {
    let suffix = if default_yes { "[Y/n]" } else { "[y/N]" };
    let answer = prompter.ask(&format!("{question} {suffix}"), &["y", "yes", "n", "no", ""])?;
    let answer = answer.trim().to_lowercase();
    if answer.is_empty() {
        return Ok(default_yes);
    }
    Ok(matches!(answer.as_str(), "y" | "yes"))
}

pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&self, question: &str, choices: &[&str]) -> Result<String, ConvertError> {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            print!("{question}: ");
            io::stdout()
                .flush()
                .map_err(|err| ConvertError::Prompt(err.to_string()))?;
            line.clear();
            stdin
                .lock()
                .read_line(&mut line)
                .map_err(|err| ConvertError::Prompt(err.to_string()))?;
            let answer = line.trim();
            if choices.is_empty() {
                return Ok(answer.to_string());
            }
            if choices
                .iter()
                .any(|choice| choice.eq_ignore_ascii_case(answer))
            {
                return Ok(answer.to_lowercase());
            }
            let listed = choices
                .iter()
                .filter(|choice| !choice.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(", ");
            println!("Invalid choice. Please enter one of: {listed}");
        }
    }
}
