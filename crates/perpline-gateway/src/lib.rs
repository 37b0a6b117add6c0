//! perpline-gateway - realtime client gateway.
//!
//! Clients connect over WebSocket, optionally bind an account with an
//! `auth` message, and subscribe to channels. The gateway pushes a
//! snapshot on subscribe and then every matching feed event.
//!
//! ```text
//!  change feed ──► ChangeFeedBridge ──► Gateway (EventSink) ──┐
//!  price refresh tick ─► PriceAggregator ─► Gateway ───────────┤
//!                                                             ▼
//!                                   ConnectionRegistry fan-out (per channel,
//!                                   per account for `portfolio`)
//!                                                             │
//!                                   one bounded queue + writer task per socket
//! ```
//!
//! The axum router also exposes health, metrics and REST helpers for
//! prices, order validation, cooldown and positions.

mod config;
mod error;
mod gateway;
mod protocol;
mod registry;
mod server;
mod timers;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use protocol::{ClientMessage, ServerMessage};
pub use registry::{ConnectionId, ConnectionRegistry, FanOut, Outbound, SendOutcome};
pub use server::{create_router, serve, ApiState, ConnectionLimiter, ConnectionPermit};
pub use timers::{run_heartbeat, run_price_refresh};
