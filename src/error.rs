//! Error types for the conversational agent core

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Planning error: {0}")]
    PlanningError(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Record store error: {0}")]
    StoreError(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Model rate limited: {0}")]
    ModelRateLimited(String),

    #[error("Model timed out: {0}")]
    ModelTimeout(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AgentError {
    /// Rate-limit-class failures get one retry against the fallback model
    /// tier; every other model failure resolves to a fallback sentence.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AgentError::ModelRateLimited(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentError::ModelTimeout(_))
    }
}
