//! Change-feed bridge for perpline.
//!
//! Subscribes to row-level changes on `positions`, `price_history` and
//! `apr_history` over a realtime WebSocket, tracks a per-table
//! subscription state machine, and hands normalized `FeedEvent`s to
//! registered sinks.

pub mod bridge;
pub mod config;
pub mod error;
pub mod protocol;
pub mod sink;
pub mod state;
pub mod translate;

pub use bridge::ChangeFeedBridge;
pub use config::ChangeFeedConfig;
pub use error::{BridgeError, BridgeResult};
pub use protocol::{ChangeKind, ChangeNotification, PhoenixFrame, Table};
pub use sink::{EventSink, SinkHandle, SinkRegistry};
pub use state::{FeedState, TableStates};
pub use translate::translate;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the TLS crypto provider.
/// Must be called before the first `wss://` connection.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
