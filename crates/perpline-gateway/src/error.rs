//! Gateway error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Client sent something that is not a well-formed message.
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("Invalid account: {0}")]
    InvalidAccount(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
