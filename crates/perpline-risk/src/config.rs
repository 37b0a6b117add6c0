//! Risk engine configuration.

use crate::constraints::MarketConstraints;
use crate::cooldown::DEFAULT_COOLDOWN_MS;
use crate::formula::{DEFAULT_MAX_SKEW, DEFAULT_TRADING_FEE_RATE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Minimum time between confirmed trades per account.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Taker fee rate applied by `trading_fee`.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// Skew scale for price impact.
    #[serde(default = "default_max_skew")]
    pub max_skew: Decimal,
    /// Constraints shared by every pair without an override.
    #[serde(default)]
    pub constraints: MarketConstraints,
    /// Per-pair overrides keyed by pair name (e.g. "BTC_USD").
    #[serde(default)]
    pub pair_overrides: HashMap<String, MarketConstraints>,
}

fn default_cooldown_ms() -> u64 {
    DEFAULT_COOLDOWN_MS
}

fn default_fee_rate() -> Decimal {
    DEFAULT_TRADING_FEE_RATE
}

fn default_max_skew() -> Decimal {
    DEFAULT_MAX_SKEW
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            fee_rate: default_fee_rate(),
            max_skew: default_max_skew(),
            constraints: MarketConstraints::default(),
            pair_overrides: HashMap::new(),
        }
    }
}
