//! Code execution — the contract between the orchestrator and a sandbox.
//!
//! The orchestrator only hands over code blocks and reads back a transcript;
//! how and where the code runs is up to the [`CodeExecutor`] implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;

/// A fenced code block taken from a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// Language tag of the fence; empty when the fence had none
    pub language: String,
    pub code: String,
}

impl CodeBlock {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
        }
    }
}

/// Outcome of running one or more code blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Exit code of the last block that ran (0 when all succeeded)
    pub exit_code: i32,

    /// Combined stdout/stderr of every block that ran
    pub output: String,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// The text sent back to the agent that wrote the code.
    pub fn transcript(&self) -> String {
        let status = if self.succeeded() {
            "execution succeeded"
        } else {
            "execution failed"
        };
        format!("exitcode: {} ({status})\nCode output: {}", self.exit_code, self.output)
    }
}

/// Runs code blocks in an isolated working directory.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Run the blocks in order, stopping at the first failure.
    ///
    /// Failures of the code itself are reported through the exit code;
    /// `Err` is reserved for the sandbox being unusable.
    async fn execute(&self, blocks: &[CodeBlock]) -> Result<ExecutionReport, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_reports_success() {
        let report = ExecutionReport {
            exit_code: 0,
            output: "15\n30\n".into(),
        };
        assert_eq!(
            report.transcript(),
            "exitcode: 0 (execution succeeded)\nCode output: 15\n30\n"
        );
    }

    #[test]
    fn transcript_reports_failure() {
        let report = ExecutionReport {
            exit_code: 1,
            output: "NameError".into(),
        };
        assert!(report.transcript().starts_with("exitcode: 1 (execution failed)"));
    }
}
