//! Gateway configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interval between ping rounds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Connections silent for longer than this are terminated.
    #[serde(default = "default_liveness_timeout_ms")]
    pub liveness_timeout_ms: u64,
    #[serde(default = "default_price_refresh_interval_ms")]
    pub price_refresh_interval_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Per-connection outbound queue; a full queue skips the delivery.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Rows in an `apr_rates` snapshot.
    #[serde(default = "default_apr_snapshot_limit")]
    pub apr_snapshot_limit: usize,
    /// Assets fetched by the periodic price refresh.
    #[serde(default = "default_watch_list")]
    pub watch_list: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_liveness_timeout_ms() -> u64 {
    60_000
}

fn default_price_refresh_interval_ms() -> u64 {
    5_000
}

fn default_max_connections() -> usize {
    1_000
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_apr_snapshot_limit() -> usize {
    50
}

fn default_watch_list() -> Vec<String> {
    ["APT", "BTC", "ETH", "SOL", "USDC"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            liveness_timeout_ms: default_liveness_timeout_ms(),
            price_refresh_interval_ms: default_price_refresh_interval_ms(),
            max_connections: default_max_connections(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            apr_snapshot_limit: default_apr_snapshot_limit(),
            watch_list: default_watch_list(),
        }
    }
}

impl GatewayConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
