//! Error types for the leaky-bucket limiter.

use thiserror::Error;

/// Main error type for limiter operations.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Rejected limiter parameters (capacity or leak rate)
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Rejected admission input (key or timestamp); no state was changed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration file could not be parsed
    #[error("configuration file error: {0}")]
    ConfigFile(String),

    /// Malformed line in a replay trace
    #[error("invalid event on line {line}: {reason}")]
    InvalidEvent { line: usize, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
