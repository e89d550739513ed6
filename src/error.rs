//! Error types for the change stream pipeline.
//!
//! Includes error classification so the retry policy can distinguish
//! transient source failures from permanent ones.

use thiserror::Error;

/// Errors produced by the change stream pipeline.
#[derive(Error, Debug)]
pub enum ChangeStreamError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Change source query failed (max-position lookup, fetch, or
    /// next-position computation)
    #[error("Source query error: {0}")]
    Query(String),

    /// Invalid LSN format
    #[error("Invalid LSN: {0}")]
    InvalidLsn(String),

    /// CDC not enabled on database
    #[error("CDC not enabled on database '{0}'. Run: EXEC sys.sp_cdc_enable_db")]
    CdcNotEnabled(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Change queue rejected a batch
    #[error("Queue error: {0}")]
    Queue(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChangeStreamError {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new source query error
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create a new connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a queue error
    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    /// Check if this error is retriable.
    ///
    /// Returns true for transient errors that may succeed on a later poll
    /// cycle. Configuration and state errors are never retriable.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,

            Self::Query(msg) => {
                msg.contains("temporarily")
                    || msg.contains("connection reset")
                    || msg.contains("connection lost")
                    || msg.contains("deadlock")
            }

            Self::Io(e) => {
                use std::io::ErrorKind;
                matches!(
                    e.kind(),
                    ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::TimedOut
                        | ErrorKind::Interrupted
                )
            }

            Self::Config(_)
            | Self::InvalidLsn(_)
            | Self::CdcNotEnabled(_)
            | Self::InvalidState(_)
            | Self::Queue(_)
            | Self::Json(_) => false,
        }
    }
}

/// Result type for change stream operations
pub type Result<T> = std::result::Result<T, ChangeStreamError>;
