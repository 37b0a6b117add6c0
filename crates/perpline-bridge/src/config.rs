//! Change-feed configuration.

use crate::protocol::Table;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeFeedConfig {
    /// Connect to the change feed at startup.
    #[serde(default)]
    pub enabled: bool,
    /// Realtime WebSocket endpoint, e.g. `wss://<project>.supabase.co/realtime/v1/websocket`.
    #[serde(default)]
    pub url: String,
    /// API key sent as `apikey` query parameter and join access token.
    #[serde(default)]
    pub api_key: String,
    /// Database schema the tables live in.
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_tables")]
    pub tables: Vec<Table>,
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Protocol-level heartbeat interval.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_tables() -> Vec<Table> {
    vec![Table::Positions, Table::PriceHistory, Table::AprHistory]
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

impl Default for ChangeFeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            api_key: String::new(),
            schema: default_schema(),
            tables: default_tables(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl ChangeFeedConfig {
    /// Socket URL with `apikey` and protocol version query parameters.
    pub fn socket_url(&self) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{sep}apikey={}&vsn=1.0.0", self.url, self.api_key)
    }
}
