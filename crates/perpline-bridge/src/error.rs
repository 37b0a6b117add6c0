//! Change-feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Subscription to {table} rejected: {reason}")]
    JoinRejected { table: String, reason: String },

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
