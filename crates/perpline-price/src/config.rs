//! Price aggregator configuration.

use serde::{Deserialize, Serialize};

/// One `[[price.assets]]` entry.
///
/// Exactly one of `feed_id` or `pegged_to` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMappingEntry {
    /// On-chain asset key.
    pub asset: String,
    /// Upstream feed identifier, for assets with a direct feed.
    #[serde(default)]
    pub feed_id: Option<String>,
    /// Asset key whose feed this asset borrows.
    #[serde(default)]
    pub pegged_to: Option<String>,
}

impl AssetMappingEntry {
    pub fn direct(asset: &str, feed_id: &str) -> Self {
        Self {
            asset: asset.to_string(),
            feed_id: Some(feed_id.to_string()),
            pegged_to: None,
        }
    }

    pub fn pegged(asset: &str, pegged_to: &str) -> Self {
        Self {
            asset: asset.to_string(),
            feed_id: None,
            pegged_to: Some(pegged_to.to_string()),
        }
    }
}

/// Price aggregator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    /// Base URL of the upstream quote service.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Cache time-to-live in milliseconds.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// HTTP timeout for a batched quote request.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Asset identity mapping.
    #[serde(default = "default_assets")]
    pub assets: Vec<AssetMappingEntry>,
}

fn default_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_ttl_ms() -> u64 {
    30_000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_assets() -> Vec<AssetMappingEntry> {
    vec![
        AssetMappingEntry::direct("APT", "aptos"),
        AssetMappingEntry::direct("0x1::aptos_coin::AptosCoin", "aptos"),
        AssetMappingEntry::direct("BTC", "bitcoin"),
        AssetMappingEntry::direct("ETH", "ethereum"),
        AssetMappingEntry::direct("SOL", "solana"),
        AssetMappingEntry::direct("USDC", "usd-coin"),
        AssetMappingEntry::direct("USDT", "tether"),
        AssetMappingEntry::pegged("WBTC", "BTC"),
        AssetMappingEntry::pegged("WETH", "ETH"),
        AssetMappingEntry::pegged("stAPT", "APT"),
    ]
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ttl_ms: default_ttl_ms(),
            timeout_ms: default_timeout_ms(),
            assets: default_assets(),
        }
    }
}
