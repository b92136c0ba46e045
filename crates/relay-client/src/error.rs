//! Client-side error types.

use std::time::Duration;
use thiserror::Error;

/// Transport-level failures. Every one of these sends the session back to
/// its reconnect loop.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),
    #[error("Connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Connection closed")]
    Disconnected,
}

/// Failure of one unit of responder work. Never ends the session.
#[derive(Debug, Error)]
pub enum WorkError {
    #[error("{0}")]
    Failed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to start process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("process exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("worker panicked: {0}")]
    Panicked(String),
}
