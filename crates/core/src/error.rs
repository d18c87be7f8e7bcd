//! Error types for the stepwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all stepwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Agent run errors ---
    #[error("{0}")]
    Agent(#[from] AgentError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

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

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{kind} record already exists: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("{kind} record not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Also the persisted result text of a step whose tool is missing, so
    /// the wording is part of what rethink prompts and stored history see.
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Fatal outcomes of a single agent run.
///
/// Stored in the run's context; `Clone` so snapshots can carry it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentError {
    #[error("Planning produced no plan: {0}")]
    EmptyPlan(String),

    #[error("Reached the maximum of {rounds} rethink rounds without a final answer")]
    MaxRethinkReached { rounds: u32 },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Task was cancelled")]
    Cancelled,

    #[error("Output stream closed by consumer")]
    StreamClosed,

    #[error("{0}")]
    Failed(String),
}

impl From<Error> for AgentError {
    fn from(err: Error) -> Self {
        match err {
            Error::Agent(inner) => inner,
            other => AgentError::Failed(other.to_string()),
        }
    }
}
