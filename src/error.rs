//! Error types for the financial education assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // External Collaborators
    // =============================

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    // =============================
    // Local Failures
    // =============================

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Feedback worker shut down: {0}")]
    WorkerShutdown(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistantError {
    /// Failures of a remote collaborator that may succeed on a second attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AssistantError::Llm(_)
                | AssistantError::Embedding(_)
                | AssistantError::Retrieval(_)
                | AssistantError::Http(_)
        )
    }
}
