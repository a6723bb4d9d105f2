use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use client_core::ConfirmationPrompt;
use tracing::warn;

/// Asks on stderr and reads the answer from stdin. Anything but an explicit
/// yes declines.
pub struct TerminalConfirmation;

#[async_trait]
impl ConfirmationPrompt for TerminalConfirmation {
    async fn confirm(&self, message: &str) -> bool {
        let message = message.to_string();
        let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut stderr = io::stderr();
            write!(stderr, "{message} [y/N] ")?;
            stderr.flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => is_affirmative(&line),
            Ok(Err(err)) => {
                warn!(error = %err, "prompt: failed to read answer");
                false
            }
            Err(err) => {
                warn!(error = %err, "prompt: reader task failed");
                false
            }
        }
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "はい"
    )
}

#[cfg(test)]
#[path = "tests/prompt_tests.rs"]
mod tests;
