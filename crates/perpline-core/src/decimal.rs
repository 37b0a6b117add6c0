//! Decimal helpers for trading amounts.
//!
//! Uses `rust_decimal` for exact arithmetic. Upstream rows carry numerics
//! either as JSON numbers or as decimal strings, so parsing is lenient about
//! the representation but strict about the value.
//!
//! The on-chain protocol takes USD amounts as integer microunits
//! (1 USD = 1_000_000). Conversion truncates toward zero, matching the
//! protocol's integer arithmetic.

use crate::error::{CoreError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Microunits per whole USD.
pub const MICRO_UNITS_PER_USD: u64 = 1_000_000;

/// An amount expressed in integer microunits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MicroUnits(pub u64);

impl MicroUnits {
    pub const ZERO: Self = Self(0);

    /// Scale a USD amount into microunits, truncating toward zero.
    ///
    /// Negative amounts and amounts that overflow `u64` are rejected.
    pub fn from_usd(amount: Decimal) -> Result<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(CoreError::InvalidAmount(format!(
                "negative amount {amount} cannot be scaled"
            )));
        }
        let scaled = amount
            .checked_mul(Decimal::from(MICRO_UNITS_PER_USD))
            .ok_or_else(|| CoreError::InvalidAmount(format!("amount {amount} overflows")))?
            .trunc();
        scaled
            .to_u64()
            .map(Self)
            .ok_or_else(|| CoreError::InvalidAmount(format!("amount {amount} overflows u64")))
    }

    /// Convert back to a USD amount.
    #[inline]
    pub fn to_usd(self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(MICRO_UNITS_PER_USD)
    }

    #[inline]
    pub fn inner(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for MicroUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a decimal from a JSON value that may be a number or a string.
///
/// Returns `Ok(None)` for `null`. Scientific notation is accepted because
/// some upstream serializers emit it for very small floats.
pub fn parse_decimal(value: &serde_json::Value) -> Result<Option<Decimal>> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => parse_str(&n.to_string()).map(Some),
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                parse_str(trimmed).map(Some)
            }
        }
        other => Err(CoreError::InvalidDecimal(format!(
            "expected number or string, got {other}"
        ))),
    }
}

fn parse_str(s: &str) -> Result<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|e| CoreError::InvalidDecimal(format!("{s}: {e}")))
}

/// Serde adapter: optional decimal from number, string or null.
pub fn deserialize_lenient_opt<'de, D>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(v) => parse_decimal(&v).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_micro_units_truncate() {
        assert_eq!(MicroUnits::from_usd(dec!(10)).unwrap(), MicroUnits(10_000_000));
        assert_eq!(MicroUnits::from_usd(dec!(1.2345678)).unwrap(), MicroUnits(1_234_567));
        assert_eq!(MicroUnits::from_usd(dec!(0)).unwrap(), MicroUnits::ZERO);
    }

    #[test]
    fn test_micro_units_rejects_negative() {
        assert!(MicroUnits::from_usd(dec!(-0.5)).is_err());
    }

    #[test]
    fn test_micro_units_back_to_usd() {
        assert_eq!(MicroUnits(8_500_000).to_usd(), dec!(8.5));
    }

    #[test]
    fn test_parse_decimal_representations() {
        assert_eq!(parse_decimal(&json!("8.50")).unwrap(), Some(dec!(8.50)));
        assert_eq!(parse_decimal(&json!(8.5)).unwrap(), Some(dec!(8.5)));
        assert_eq!(parse_decimal(&json!(42)).unwrap(), Some(dec!(42)));
        assert_eq!(parse_decimal(&json!(null)).unwrap(), None);
        assert_eq!(parse_decimal(&json!("  ")).unwrap(), None);
        assert_eq!(parse_decimal(&json!("1e-3")).unwrap(), Some(dec!(0.001)));
        assert!(parse_decimal(&json!("abc")).is_err());
        assert!(parse_decimal(&json!(true)).is_err());
    }
}
