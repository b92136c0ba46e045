//! Shared error types for the agent relay.

use thiserror::Error;

/// Top-level error type, used where crate-specific errors meet.
#[derive(Error, Debug)]
pub enum RelayError {
    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A network error occurred.
    #[error("Network error: {0}")]
    Network(String),

    /// The broker could not start.
    #[error("Broker startup failed: {0}")]
    Startup(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias for relay results.
pub type RelayResult<T> = Result<T, RelayError>;
