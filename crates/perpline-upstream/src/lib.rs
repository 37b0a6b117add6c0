//! Upstream collaborators for perpline.
//!
//! - `TradingApiClient`: positions from the versioned trading API
//! - `PortfolioService`: per-account positions with fallback to the last good answer
//! - `RestHistoryStore`: latest APR rows from the history store

pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod portfolio;

pub use client::{parse_positions_body, PositionsApi, TradingApiClient};
pub use config::{HistoryConfig, UpstreamConfig};
pub use error::{UpstreamError, UpstreamResult};
pub use history::{AprHistorySource, NoHistory, RestHistoryStore};
pub use portfolio::PortfolioService;
