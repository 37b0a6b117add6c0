//! Price aggregator error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PriceError {
    /// Asset identity mapping is inconsistent. Raised at startup only.
    #[error("Asset mapping error: {0}")]
    Mapping(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Price source timed out: {0}")]
    Timeout(String),

    #[error("Malformed price response: {0}")]
    Malformed(String),
}

pub type PriceResult<T> = Result<T, PriceError>;
