//! Application configuration.

use crate::error::{AppError, AppResult};
use perpline_bridge::ChangeFeedConfig;
use perpline_gateway::GatewayConfig;
use perpline_price::{AssetIdentityMapping, PriceConfig};
use perpline_risk::RiskConfig;
use perpline_upstream::{HistoryConfig, UpstreamConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable consulted when no `--config` flag is given.
pub const CONFIG_ENV_VAR: &str = "PERPLINE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub change_feed: ChangeFeedConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl AppConfig {
    /// Resolve the config path (`cli` > `PERPLINE_CONFIG` > default) and
    /// load it. A missing file yields defaults.
    pub fn load(cli_path: Option<String>) -> AppResult<Self> {
        let path = cli_path
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        if Path::new(&path).exists() {
            tracing::info!(config_path = %path, "Loading configuration");
            Self::from_file(&path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Startup checks. Every failure here is fatal.
    pub fn validate(&self) -> AppResult<()> {
        AssetIdentityMapping::from_entries(&self.price.assets)
            .map_err(|e| AppError::Config(format!("price.assets: {e}")))?;
        if self.price.ttl_ms == 0 {
            return Err(AppError::Config("price.ttl_ms must be positive".to_string()));
        }
        if self.price.base_url.trim().is_empty() {
            return Err(AppError::Config("price.base_url is required".to_string()));
        }
        if self.upstream.api_base_url.trim().is_empty() {
            return Err(AppError::Config(
                "upstream.api_base_url is required".to_string(),
            ));
        }

        let gateway = &self.gateway;
        if gateway.heartbeat_interval_ms == 0 || gateway.price_refresh_interval_ms == 0 {
            return Err(AppError::Config(
                "gateway intervals must be positive".to_string(),
            ));
        }
        if gateway.liveness_timeout_ms <= gateway.heartbeat_interval_ms {
            return Err(AppError::Config(format!(
                "gateway.liveness_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                gateway.liveness_timeout_ms, gateway.heartbeat_interval_ms
            )));
        }
        if gateway.max_connections == 0 || gateway.outbound_queue_capacity == 0 {
            return Err(AppError::Config(
                "gateway.max_connections and outbound_queue_capacity must be positive"
                    .to_string(),
            ));
        }

        if self.change_feed.enabled {
            if self.change_feed.url.trim().is_empty() {
                return Err(AppError::Config(
                    "change_feed.url is required when the change feed is enabled".to_string(),
                ));
            }
            if self.change_feed.tables.is_empty() {
                return Err(AppError::Config(
                    "change_feed.tables must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpline_bridge::Table;

    #[test]
    fn test_empty_file_is_default() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.price.ttl_ms, 30_000);
        assert_eq!(config.risk.cooldown_ms, 60_000);
        assert_eq!(config.upstream.timeout_ms, 30_000);
        assert!(!config.change_feed.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sections_parse() {
        let config = AppConfig::from_toml(
            r#"
            [gateway]
            port = 9100
            watch_list = ["APT"]

            [price]
            ttl_ms = 10000

            [[price.assets]]
            asset = "APT"
            feed_id = "aptos"

            [[price.assets]]
            asset = "stAPT"
            pegged_to = "APT"

            [risk]
            cooldown_ms = 1000

            [risk.pair_overrides.BTC_USD]
            max_leverage = 100

            [change_feed]
            enabled = true
            url = "wss://example.supabase.co/realtime/v1/websocket"
            tables = ["positions"]
            "#,
        )
        .unwrap();
        assert_eq!(config.gateway.port, 9100);
        assert_eq!(config.gateway.heartbeat_interval_ms, 30_000);
        assert_eq!(config.price.assets.len(), 2);
        assert_eq!(config.risk.cooldown_ms, 1_000);
        assert!(config.risk.pair_overrides.contains_key("BTC_USD"));
        assert_eq!(config.change_feed.tables, vec![Table::Positions]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mapping_cycle_is_rejected() {
        let config = AppConfig::from_toml(
            r#"
            [[price.assets]]
            asset = "A"
            pegged_to = "B"

            [[price.assets]]
            asset = "B"
            pegged_to = "A"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = AppConfig::default();
        config.price.ttl_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.gateway.liveness_timeout_ms = config.gateway.heartbeat_interval_ms;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.change_feed.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shipped_default_config_is_valid() {
        let config = AppConfig::from_toml(include_str!("../../../config/default.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.price.assets.len(), 10);
        assert_eq!(config.change_feed.tables.len(), 3);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load(Some("does/not/exist.toml".to_string())).unwrap();
        assert_eq!(config.gateway.port, 8080);
    }
}
