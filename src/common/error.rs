//! Common error types for the timeframe generator
//!
//! # Design Principles (KISS)
//! - Fatal conditions (allocation, I/O, malformed input) are errors
//! - Counted, non-fatal conditions (overflow, out-of-range) never appear here,
//!   they are surfaced through `TimeframeCounters`
//! - Use thiserror for ergonomic error handling

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that abort a timeframe run
#[derive(Error, Debug)]
pub enum TimeframeError {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed text input (dump file, table)
    #[error("Parse error in {source_name} line {line}: {message}")]
    Parse {
        source_name: String,
        line: usize,
        message: String,
    },

    /// Sample storage could not be allocated
    #[error("Failed to allocate sample buffer of {requested} samples")]
    Allocation { requested: usize },

    /// MessagePack serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid argument passed to an operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl TimeframeError {
    /// Create a parse error
    pub fn parse(source_name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Result type alias using TimeframeError
pub type TimeframeResult<T> = Result<T, TimeframeError>;
