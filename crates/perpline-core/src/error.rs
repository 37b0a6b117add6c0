//! Error types for perpline-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
