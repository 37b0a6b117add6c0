//! Market constraint validation.
//!
//! Checks run in a fixed order and all of them run, so a caller sees every
//! problem with an order at once.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Per-pair order limits, in USD and leverage multiples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConstraints {
    #[serde(default = "default_min_collateral")]
    pub min_collateral: Decimal,
    #[serde(default = "default_min_position_size")]
    pub min_position_size: Decimal,
    #[serde(default = "default_min_leverage")]
    pub min_leverage: Decimal,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: Decimal,
    /// Allowed relative gap between size and `collateral × leverage`.
    #[serde(default = "default_size_tolerance")]
    pub size_tolerance: Decimal,
}

fn default_min_collateral() -> Decimal {
    Decimal::TWO
}

fn default_min_position_size() -> Decimal {
    Decimal::TWO
}

fn default_min_leverage() -> Decimal {
    Decimal::from(3)
}

fn default_max_leverage() -> Decimal {
    Decimal::from(150)
}

fn default_size_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

impl Default for MarketConstraints {
    fn default() -> Self {
        Self {
            min_collateral: default_min_collateral(),
            min_position_size: default_min_position_size(),
            min_leverage: default_min_leverage(),
            max_leverage: default_max_leverage(),
            size_tolerance: default_size_tolerance(),
        }
    }
}

/// A single failed constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintViolation {
    CollateralBelowMinimum {
        collateral: Decimal,
        minimum: Decimal,
    },
    /// `suggested_leverage` is set when raising leverage alone would reach
    /// the minimum size without exceeding the leverage ceiling.
    PositionBelowMinimum {
        size: Decimal,
        minimum: Decimal,
        suggested_leverage: Option<Decimal>,
    },
    LeverageAboveMaximum {
        leverage: Decimal,
        maximum: Decimal,
    },
    LeverageBelowMinimum {
        leverage: Decimal,
        minimum: Decimal,
    },
    SizeLeverageMismatch {
        size: Decimal,
        expected: Decimal,
    },
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CollateralBelowMinimum {
                collateral,
                minimum,
            } => write!(f, "Collateral ${collateral} is below the minimum of ${minimum}"),
            Self::PositionBelowMinimum {
                size,
                minimum,
                suggested_leverage: Some(lev),
            } => write!(
                f,
                "Position size ${size} is below the minimum of ${minimum}; raise leverage to at least {lev}x"
            ),
            Self::PositionBelowMinimum { size, minimum, .. } => write!(
                f,
                "Position size ${size} is below the minimum of ${minimum}; add collateral"
            ),
            Self::LeverageAboveMaximum { leverage, maximum } => {
                write!(f, "Leverage {leverage}x exceeds the maximum of {maximum}x")
            }
            Self::LeverageBelowMinimum { leverage, minimum } => {
                write!(f, "Leverage {leverage}x is below the minimum of {minimum}x")
            }
            Self::SizeLeverageMismatch { size, expected } => write!(
                f,
                "Position size ${size} does not match collateral x leverage (${expected})"
            ),
        }
    }
}

impl MarketConstraints {
    /// Validate an increase order. Empty result means valid.
    pub fn validate(
        &self,
        size_delta: Decimal,
        collateral_delta: Decimal,
        leverage: Decimal,
    ) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        if collateral_delta < self.min_collateral {
            violations.push(ConstraintViolation::CollateralBelowMinimum {
                collateral: collateral_delta,
                minimum: self.min_collateral,
            });
        }

        if size_delta < self.min_position_size {
            violations.push(ConstraintViolation::PositionBelowMinimum {
                size: size_delta,
                minimum: self.min_position_size,
                suggested_leverage: self.leverage_to_reach_minimum(collateral_delta),
            });
        }

        if leverage > self.max_leverage {
            violations.push(ConstraintViolation::LeverageAboveMaximum {
                leverage,
                maximum: self.max_leverage,
            });
        }

        if leverage < self.min_leverage {
            violations.push(ConstraintViolation::LeverageBelowMinimum {
                leverage,
                minimum: self.min_leverage,
            });
        }

        if let Some(expected) = collateral_delta.checked_mul(leverage) {
            // Out-of-range deltas cannot be within tolerance.
            let within = size_delta
                .checked_sub(expected)
                .zip(expected.abs().checked_mul(self.size_tolerance))
                .is_some_and(|(gap, allowed)| gap.abs() <= allowed);
            if !within {
                violations.push(ConstraintViolation::SizeLeverageMismatch {
                    size: size_delta,
                    expected,
                });
            }
        }

        violations
    }

    /// Smallest whole leverage reaching the minimum size, if within bounds.
    fn leverage_to_reach_minimum(&self, collateral: Decimal) -> Option<Decimal> {
        if collateral <= Decimal::ZERO {
            return None;
        }
        let needed = self
            .min_position_size
            .checked_div(collateral)?
            .ceil()
            .max(self.min_leverage);
        (needed <= self.max_leverage).then_some(needed)
    }
}

/// Default constraints plus per-pair overrides.
#[derive(Debug, Clone, Default)]
pub struct ConstraintTable {
    default: MarketConstraints,
    overrides: HashMap<String, MarketConstraints>,
}

impl ConstraintTable {
    pub fn new(default: MarketConstraints, overrides: HashMap<String, MarketConstraints>) -> Self {
        Self {
            default,
            overrides: overrides
                .into_iter()
                .map(|(pair, c)| (pair.to_ascii_uppercase(), c))
                .collect(),
        }
    }

    /// Constraints for a trading pair (case-insensitive).
    pub fn for_pair(&self, pair: &str) -> &MarketConstraints {
        self.overrides
            .get(&pair.trim().to_ascii_uppercase())
            .unwrap_or(&self.default)
    }

    /// `validateConstraints(pair, sizeDelta, collateralDelta, leverage)`.
    pub fn validate(
        &self,
        pair: &str,
        size_delta: Decimal,
        collateral_delta: Decimal,
        leverage: Decimal,
    ) -> Vec<ConstraintViolation> {
        self.for_pair(pair)
            .validate(size_delta, collateral_delta, leverage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_valid_order_has_no_violations() {
        let table = ConstraintTable::default();
        assert!(table.validate("BTC_USD", dec!(500), dec!(10), dec!(50)).is_empty());
    }

    #[test]
    fn test_max_leverage_violation() {
        let table = ConstraintTable::default();
        let violations = table.validate("ETH_USD", dec!(1510), dec!(10), dec!(151));
        assert_eq!(
            violations,
            vec![ConstraintViolation::LeverageAboveMaximum {
                leverage: dec!(151),
                maximum: dec!(150)
            }]
        );
    }

    #[test]
    fn test_violations_accumulate_in_order() {
        let c = MarketConstraints::default();
        let violations = c.validate(dec!(1), dec!(0.5), dec!(2));
        assert_eq!(violations.len(), 3);
        assert!(matches!(
            violations[0],
            ConstraintViolation::CollateralBelowMinimum { .. }
        ));
        assert!(matches!(
            violations[1],
            ConstraintViolation::PositionBelowMinimum {
                suggested_leverage: Some(_),
                ..
            }
        ));
        assert!(matches!(
            violations[2],
            ConstraintViolation::LeverageBelowMinimum { .. }
        ));
    }

    #[test]
    fn test_size_guidance() {
        let c = MarketConstraints::default();
        // 0.1 collateral needs 20x to reach $2.
        let v = c.validate(dec!(0.3), dec!(0.1), dec!(3));
        let guidance = v
            .iter()
            .find_map(|v| match v {
                ConstraintViolation::PositionBelowMinimum {
                    suggested_leverage, ..
                } => *suggested_leverage,
                _ => None,
            })
            .unwrap();
        assert_eq!(guidance, dec!(20));
        // 0.001 collateral would need 2000x: no leverage guidance.
        let v = c.validate(dec!(0.003), dec!(0.001), dec!(3));
        assert!(v.iter().any(|v| matches!(
            v,
            ConstraintViolation::PositionBelowMinimum {
                suggested_leverage: None,
                ..
            }
        )));
        assert!(v.iter().any(|v| v.to_string().contains("add collateral")));
    }

    #[test]
    fn test_size_tolerance_one_percent() {
        let c = MarketConstraints::default();
        assert!(c.validate(dec!(505), dec!(10), dec!(50)).is_empty());
        let v = c.validate(dec!(506), dec!(10), dec!(50));
        assert_eq!(
            v,
            vec![ConstraintViolation::SizeLeverageMismatch {
                size: dec!(506),
                expected: dec!(500)
            }]
        );
    }

    #[test]
    fn test_extreme_deltas_are_violations() {
        let c = MarketConstraints::default();
        let v = c.validate(Decimal::MIN, dec!(10), dec!(50));
        assert_eq!(
            v.last(),
            Some(&ConstraintViolation::SizeLeverageMismatch {
                size: Decimal::MIN,
                expected: dec!(500)
            })
        );

        // min size / collateral overflows while computing guidance.
        let c = MarketConstraints {
            min_position_size: Decimal::from(10u64.pow(18)),
            ..MarketConstraints::default()
        };
        let v = c.validate(dec!(1), Decimal::new(1, 28), dec!(3));
        assert!(v.iter().any(|v| matches!(
            v,
            ConstraintViolation::PositionBelowMinimum {
                suggested_leverage: None,
                ..
            }
        )));
    }

    #[test]
    fn test_pair_override() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "apt_usd".to_string(),
            MarketConstraints {
                max_leverage: dec!(20),
                ..MarketConstraints::default()
            },
        );
        let table = ConstraintTable::new(MarketConstraints::default(), overrides);
        assert_eq!(table.for_pair("APT_USD").max_leverage, dec!(20));
        assert_eq!(table.for_pair("BTC_USD").max_leverage, dec!(150));
        assert!(!table.validate("APT_USD", dec!(500), dec!(10), dec!(50)).is_empty());
    }
}
