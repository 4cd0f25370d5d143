//! Human input — where the reply policy asks a person for feedback.

use async_trait::async_trait;
use tandem_core::error::ChatError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Source of human feedback.
///
/// An empty answer means "no input"; `exit` asks to end the conversation.
#[async_trait]
pub trait HumanInput: Send + Sync {
    async fn prompt(&self, prompt: &str) -> Result<String, ChatError>;
}

/// Never has anything to say. Used for unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHumanInput;

#[async_trait]
impl HumanInput for NoHumanInput {
    async fn prompt(&self, _prompt: &str) -> Result<String, ChatError> {
        Ok(String::new())
    }
}

/// Reads one line per prompt, from stdin unless built over another reader.
///
/// One buffered reader lives for the whole run, so lines piped in ahead of
/// their prompt are kept for the next one. End of input reads as empty.
pub struct StdinHumanInput<R = BufReader<Stdin>> {
    lines: Mutex<Lines<R>>,
}

impl StdinHumanInput {
    pub fn new() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl Default for StdinHumanInput {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: AsyncBufRead + Unpin + Send> StdinHumanInput<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> HumanInput for StdinHumanInput<R> {
    async fn prompt(&self, prompt: &str) -> Result<String, ChatError> {
        // Let transcript printers catch up before the prompt is shown
        tokio::task::yield_now().await;

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| ChatError::HumanInput(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| ChatError::HumanInput(e.to_string()))?;

        let line = self
            .lines
            .lock()
            .await
            .next_line()
            .await
            .map_err(|e| ChatError::HumanInput(e.to_string()))?;

        Ok(line.map(|l| l.trim().to_string()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn piped_lines_survive_between_prompts() {
        let human = StdinHumanInput::from_reader(&b"first answer\n  exit \n"[..]);
        assert_eq!(human.prompt("> ").await.unwrap(), "first answer");
        assert_eq!(human.prompt("> ").await.unwrap(), "exit");
        assert_eq!(human.prompt("> ").await.unwrap(), "");
    }

    #[tokio::test]
    async fn no_human_input_is_always_empty() {
        assert_eq!(NoHumanInput.prompt("> ").await.unwrap(), "");
    }
}
