//! Error types for the Tandem domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; failures that must not
//! abort a chat are turned into message text by their callers.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Transient failures worth another attempt within the retry period.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid arguments for {action}: {reason}")]
    InvalidArguments { action: String, reason: String },

    #[error("Action {action} failed: {reason}")]
    ExecutionFailed { action: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Working directory unavailable: {0}")]
    WorkDir(String),

    #[error("File name escapes the working directory: {0}")]
    PathEscape(String),

    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Failed to write code file {path}: {reason}")]
    WriteFailed { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Failed to load corpus from {source_path}: {reason}")]
    LoadFailed { source_path: String, reason: String },

    #[error("Corpus is empty: {0}")]
    EmptyCorpus(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Agent {0} cannot chat with itself")]
    SelfChat(String),

    #[error("Human input failed: {0}")]
    HumanInput(String),

    #[error("Conversation has no message for {0} to reply to")]
    NoMessage(String),
}
