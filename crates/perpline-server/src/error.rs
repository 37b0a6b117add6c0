//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Price error: {0}")]
    Price(#[from] perpline_price::PriceError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] perpline_upstream::UpstreamError),

    #[error("Change feed error: {0}")]
    Bridge(#[from] perpline_bridge::BridgeError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] perpline_gateway::GatewayError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] perpline_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
