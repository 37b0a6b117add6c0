//! Identifiers and payload types.

use crate::decimal::deserialize_lenient_opt;
use crate::error::{CoreError, Result};
use chrono::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// On-chain asset identifier (e.g. `0x1::aptos_coin::AptosCoin` or `APT`).
///
/// Case is preserved: Move type tags are case sensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey(String);

impl AssetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Upstream price-feed identifier (e.g. `aptos`, `bitcoin`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account identifier (wallet address).
///
/// Normalized to trimmed lowercase so that an address typed by a client
/// matches the one stored in position rows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(CoreError::InvalidIdentifier(
                "account identifier is empty".to_string(),
            ));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for a full-length `0x` + 64 hex digit address.
    pub fn is_full_address(&self) -> bool {
        is_full_address(&self.0)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check `^0x[0-9a-fA-F]{64}$`.
pub fn is_full_address(s: &str) -> bool {
    match s.strip_prefix("0x") {
        Some(hex) => hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

// ============================================================================
// Prices
// ============================================================================

/// A resolved USD price for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub asset_key: AssetKey,
    #[serde(with = "rust_decimal::serde::float")]
    pub usd_price: Decimal,
    /// Observation time (Unix milliseconds).
    pub observed_at: u64,
}

/// A price-history tick as broadcast on the `prices` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// 24h change in percent. Always present; 0 when it cannot be computed.
    #[serde(rename = "change24h", with = "rust_decimal::serde::float")]
    pub change_24h: Decimal,
    #[serde(
        rename = "volume24h",
        with = "rust_decimal::serde::float_option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub volume_24h: Option<Decimal>,
    pub timestamp: i64,
}

/// A funding APR observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AprRate {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub apr: Decimal,
    #[serde(
        with = "rust_decimal::serde::float_option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub funding_rate: Option<Decimal>,
    pub timestamp: i64,
}

// ============================================================================
// Positions
// ============================================================================

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    #[inline]
    pub fn is_long(self) -> bool {
        matches!(self, Self::Long)
    }

    pub fn from_is_long(is_long: bool) -> Self {
        if is_long {
            Self::Long
        } else {
            Self::Short
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => Some(Self::Long),
            "short" | "sell" => Some(Self::Short),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Position lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Closed,
}

impl PositionStatus {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" | "open" => Some(Self::Active),
            "closed" | "liquidated" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Normalized view of a leveraged position, as pushed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSnapshot {
    pub position_id: String,
    pub account_id: AccountId,
    pub asset_pair: String,
    pub direction: Direction,
    #[serde(rename = "sizeUSD", with = "rust_decimal::serde::float")]
    pub size_usd: Decimal,
    #[serde(rename = "collateralUSD", with = "rust_decimal::serde::float")]
    pub collateral_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub leverage: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub mark_price: Decimal,
    #[serde(rename = "unrealizedPnlUSD", with = "rust_decimal::serde::float")]
    pub unrealized_pnl_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub liquidation_price: Decimal,
    #[serde(rename = "fundingFeeUSD", with = "rust_decimal::serde::float")]
    pub funding_fee_usd: Decimal,
    pub status: PositionStatus,
    /// Last update (Unix milliseconds).
    pub updated_at: i64,
}

/// Raw position row as stored upstream.
///
/// Field names and numeric representations vary between the change feed
/// and the REST API, so every field is optional and numerics are parsed
/// leniently. Use `perpline_risk` to turn a record into a snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionRecord {
    #[serde(default, alias = "position_id", alias = "positionId", deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    #[serde(
        default,
        alias = "user_address",
        alias = "userAddress",
        alias = "account_id",
        alias = "accountId"
    )]
    pub address: Option<String>,
    #[serde(default, alias = "asset_pair", alias = "pair_type", alias = "pairType", alias = "market")]
    pub pair: Option<String>,
    #[serde(default, alias = "isLong")]
    pub is_long: Option<bool>,
    #[serde(default, alias = "direction")]
    pub side: Option<String>,
    #[serde(default, alias = "size_usd", deserialize_with = "deserialize_lenient_opt")]
    pub size: Option<Decimal>,
    #[serde(default, alias = "collateral_usd", deserialize_with = "deserialize_lenient_opt")]
    pub collateral: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_lenient_opt")]
    pub leverage: Option<Decimal>,
    #[serde(default, alias = "entryPrice", alias = "avg_price", alias = "avgPrice", deserialize_with = "deserialize_lenient_opt")]
    pub entry_price: Option<Decimal>,
    #[serde(default, alias = "markPrice", deserialize_with = "deserialize_lenient_opt")]
    pub mark_price: Option<Decimal>,
    #[serde(default, alias = "unrealized_pnl", alias = "unrealizedPnl", deserialize_with = "deserialize_lenient_opt")]
    pub pnl: Option<Decimal>,
    #[serde(default, alias = "liquidationPrice", deserialize_with = "deserialize_lenient_opt")]
    pub liquidation_price: Option<Decimal>,
    #[serde(default, alias = "fundingFee", deserialize_with = "deserialize_lenient_opt")]
    pub funding_fee: Option<Decimal>,
    /// Hourly funding rate, used to accrue the fee when it is absent.
    #[serde(default, alias = "fundingRate", deserialize_with = "deserialize_lenient_opt")]
    pub funding_rate: Option<Decimal>,
    #[serde(default, alias = "openedAt", alias = "created_at", alias = "createdAt")]
    pub opened_at: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "updatedAt", alias = "timestamp")]
    pub updated_at: Option<serde_json::Value>,
}

impl PositionRecord {
    /// Owning account, if present and well formed.
    pub fn account(&self) -> Option<AccountId> {
        self.address.as_deref().and_then(|a| AccountId::parse(a).ok())
    }

    /// Direction from `is_long`, falling back to a textual side.
    pub fn direction(&self) -> Option<Direction> {
        self.is_long
            .map(Direction::from_is_long)
            .or_else(|| self.side.as_deref().and_then(Direction::parse))
    }

    /// Status, defaulting to active when absent.
    pub fn status(&self) -> PositionStatus {
        self.status
            .as_deref()
            .and_then(PositionStatus::parse)
            .unwrap_or(PositionStatus::Active)
    }

    /// Update time in Unix milliseconds, if parseable.
    pub fn updated_at_ms(&self) -> Option<i64> {
        self.updated_at.as_ref().and_then(parse_timestamp_ms)
    }

    /// Open time in Unix milliseconds, if parseable.
    pub fn opened_at_ms(&self) -> Option<i64> {
        self.opened_at.as_ref().and_then(parse_timestamp_ms)
    }
}

// ============================================================================
// History rows
// ============================================================================

/// Raw `price_history` row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceRecord {
    #[serde(default, alias = "asset", alias = "asset_symbol")]
    pub symbol: Option<String>,
    #[serde(default, alias = "price_usd", deserialize_with = "deserialize_lenient_opt")]
    pub price: Option<Decimal>,
    #[serde(
        default,
        alias = "change24h",
        alias = "price_change_24h",
        alias = "change_percent_24h",
        deserialize_with = "deserialize_lenient_opt"
    )]
    pub change_24h: Option<Decimal>,
    /// Price 24h earlier, used to compute the change when it is absent.
    #[serde(
        default,
        alias = "open_24h",
        alias = "price_24h_ago",
        deserialize_with = "deserialize_lenient_opt"
    )]
    pub open_price_24h: Option<Decimal>,
    #[serde(
        default,
        alias = "volume24h",
        alias = "volume",
        deserialize_with = "deserialize_lenient_opt"
    )]
    pub volume_24h: Option<Decimal>,
    #[serde(default, alias = "created_at", alias = "recorded_at")]
    pub timestamp: Option<serde_json::Value>,
}

impl PriceRecord {
    /// Normalize into a tick. `None` without a symbol or positive price.
    ///
    /// The 24h change is taken from the row, computed from the 24h-ago
    /// price when present, and 0 otherwise.
    pub fn to_tick(&self, fallback_ts: i64) -> Option<PriceTick> {
        let symbol = self.symbol.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let price = self.price.filter(|p| *p > Decimal::ZERO)?;
        let change_24h = self
            .change_24h
            .or_else(|| {
                self.open_price_24h
                    .filter(|open| *open > Decimal::ZERO)
                    .and_then(|open| percent_change(open, price))
            })
            .unwrap_or(Decimal::ZERO);
        Some(PriceTick {
            symbol: symbol.to_string(),
            price,
            change_24h,
            volume_24h: self.volume_24h,
            timestamp: self
                .timestamp
                .as_ref()
                .and_then(parse_timestamp_ms)
                .unwrap_or(fallback_ts),
        })
    }
}

/// `(price - open) / open × 100` to 4dp; `None` when out of range.
fn percent_change(open: Decimal, price: Decimal) -> Option<Decimal> {
    price
        .checked_sub(open)?
        .checked_div(open)?
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|pct| pct.round_dp(4))
}

/// Raw `apr_history` row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AprRecord {
    #[serde(default, alias = "asset", alias = "pair", alias = "market")]
    pub symbol: Option<String>,
    #[serde(default, alias = "apr_value", alias = "rate", deserialize_with = "deserialize_lenient_opt")]
    pub apr: Option<Decimal>,
    #[serde(default, alias = "fundingRate", deserialize_with = "deserialize_lenient_opt")]
    pub funding_rate: Option<Decimal>,
    #[serde(default, alias = "created_at", alias = "recorded_at")]
    pub timestamp: Option<serde_json::Value>,
}

impl AprRecord {
    /// Normalize into a rate. `None` without a symbol or APR value.
    pub fn to_rate(&self, fallback_ts: i64) -> Option<AprRate> {
        let symbol = self.symbol.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(AprRate {
            symbol: symbol.to_string(),
            apr: self.apr?,
            funding_rate: self.funding_rate,
            timestamp: self
                .timestamp
                .as_ref()
                .and_then(parse_timestamp_ms)
                .unwrap_or(fallback_ts),
        })
    }
}

/// Parse a timestamp given as RFC 3339 text or Unix milliseconds.
pub fn parse_timestamp_ms(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.timestamp_millis())
            .or_else(|| s.trim().parse::<i64>().ok()),
        _ => None,
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
