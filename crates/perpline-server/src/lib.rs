//! perpline - live market data relay and leveraged-position risk service.
//!
//! Orchestrates the workspace crates:
//! - Price aggregation with TTL cache and pegged-asset mapping
//! - Risk formulas, constraints, cooldown and order preparation
//! - Row-level change feed bridge
//! - Realtime WebSocket gateway and HTTP API

pub mod app;
pub mod config;
pub mod context;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use context::AppContext;
pub use error::{AppError, AppResult};
