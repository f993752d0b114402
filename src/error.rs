//! Error types for ralphloop
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur while driving the agent loop
#[derive(Debug, Error)]
pub enum LoopError {
    /// The agent process could not be started (exec or pipe setup)
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// The agent process exited unsuccessfully for a reason other than cancellation
    #[error("Process failed (exit code {code:?}): {detail}")]
    ProcessFailed { code: Option<i32>, detail: String },

    /// The iteration or the whole run was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// Reading one of the process output streams failed
    #[error("Stream error: {0}")]
    Stream(String),

    /// `Engine::start` was called on an engine that is already running
    #[error("Engine already started")]
    AlreadyStarted,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LoopError {
    /// Cancellation-induced exits are not failures and are never reported as errors.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, LoopError::Cancelled)
    }
}

/// Result type alias for ralphloop operations
pub type Result<T> = std::result::Result<T, LoopError>;
