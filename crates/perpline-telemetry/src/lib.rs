//! Prometheus metrics and structured logging for perpline.
//!
//! - Structured JSON logging with tracing
//! - Prometheus metrics for connections, fan-out, price fetches and the
//!   change feed

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
