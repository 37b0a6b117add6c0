//! Upstream error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Address segment failed `^0x[0-9a-fA-F]{64}$`. Never forwarded.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Upstream returned 502 Bad Gateway")]
    BadGateway,

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream timed out: {0}")]
    Timeout(String),

    #[error("Upstream HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed upstream response: {0}")]
    Malformed(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl UpstreamError {
    /// HTTP status to report to callers of the gateway's REST surface.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidAddress(_) => 400,
            Self::Unavailable(_) => 503,
            Self::Timeout(_) => 504,
            Self::BadGateway | Self::Status { .. } | Self::Malformed(_) | Self::HttpClient(_) => {
                502
            }
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Unavailable(e.to_string())
        } else {
            Self::HttpClient(format!("HTTP request failed: {e}"))
        }
    }
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;
