//! Property-based tests for the position formulas and order checks.
//!
//! These tests verify invariants hold under random inputs.

use perpline_core::{AccountId, ManualClock, OrderRequest, PositionRecord};
use perpline_risk::formula::*;
use perpline_risk::{
    derive_snapshot, ConstraintTable, MarketConstraints, RiskConfig, RiskEngine, TradeCooldown,
    DEFAULT_COOLDOWN_MS,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.01 to $100,000
}

fn collateral_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.01 to $1,000,000
}

fn leverage_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=1_500i64).prop_map(|x| Decimal::new(x, 1)) // 0.1x to 150x
}

/// Any representable decimal, from `Decimal::MIN` to `Decimal::MAX` at
/// every scale.
fn any_decimal() -> impl Strategy<Value = Decimal> {
    (any::<u32>(), any::<u32>(), any::<u32>(), any::<bool>(), 0u32..=28)
        .prop_map(|(lo, mid, hi, negative, scale)| Decimal::from_parts(lo, mid, hi, negative, scale))
}

proptest! {
    /// Long liquidation sits below entry, short liquidation above.
    #[test]
    fn liquidation_brackets_entry(
        entry in price_strategy(),
        leverage in leverage_strategy(),
    ) {
        let long = liquidation_price(entry, leverage, true).unwrap();
        let short = liquidation_price(entry, leverage, false).unwrap();
        prop_assert!(long < entry);
        prop_assert!(entry < short);
    }

    /// Size divided by collateral gives back the leverage.
    #[test]
    fn position_size_roundtrips_leverage(
        collateral in collateral_strategy(),
        lev in leverage_strategy(),
    ) {
        let size = position_size(collateral, lev).unwrap();
        prop_assert_eq!(size / collateral, lev);
        prop_assert_eq!(leverage(size, collateral).unwrap(), lev);
    }

    /// Non-positive leverage is an error, never a panic.
    #[test]
    fn non_positive_leverage_rejected(
        entry in price_strategy(),
        lev in -1_000i64..=0i64,
        is_long in any::<bool>(),
    ) {
        prop_assert!(liquidation_price(entry, Decimal::new(lev, 1), is_long).is_err());
    }

    /// Price impact stays within [0, 5%].
    #[test]
    fn price_impact_bounded(
        skew in -10_000_000i64..10_000_000i64,
        size in -10_000_000i64..10_000_000i64,
    ) {
        let impact = price_impact(Decimal::from(skew), Decimal::from(size), DEFAULT_MAX_SKEW).unwrap();
        prop_assert!(impact >= Decimal::ZERO);
        prop_assert!(impact <= dec!(0.05));
    }

    /// Capped PnL never exceeds nine times collateral.
    #[test]
    fn capped_pnl_respects_cap(
        collateral in collateral_strategy(),
        entry in price_strategy(),
        mark in price_strategy(),
        lev in leverage_strategy(),
        is_long in any::<bool>(),
    ) {
        let size = position_size(collateral, lev).unwrap();
        let raw = pnl(mark, entry, size, is_long).unwrap();
        let capped = capped_pnl(raw, collateral).unwrap();
        prop_assert!(capped <= collateral * dec!(9));
        prop_assert!(capped <= raw);
    }

    /// Leverage above 150x is always flagged.
    #[test]
    fn excessive_leverage_always_flagged(
        collateral in collateral_strategy(),
        extra in 1i64..10_000i64,
    ) {
        let lev = dec!(150) + Decimal::new(extra, 1);
        let size = collateral * lev;
        let violations = ConstraintTable::default().validate("BTC_USD", size, collateral, lev);
        prop_assert!(!violations.is_empty());
    }

    /// Cooldown blocks strictly inside the window and releases at its end.
    #[test]
    fn cooldown_window(elapsed_ms in 0u64..120_000u64) {
        let clock = Arc::new(ManualClock::new(10_000_000));
        let cooldown = TradeCooldown::new(DEFAULT_COOLDOWN_MS, clock.clone());
        let account = AccountId::parse("0xabc").unwrap();

        cooldown.mark_traded(&account);
        clock.advance(Duration::from_millis(elapsed_ms));

        prop_assert_eq!(cooldown.can_trade(&account), elapsed_ms >= DEFAULT_COOLDOWN_MS);
        prop_assert_eq!(
            cooldown.time_remaining_ms(&account),
            DEFAULT_COOLDOWN_MS.saturating_sub(elapsed_ms)
        );
    }
}

proptest! {
    /// Constraint checks return violations for any input instead of panicking.
    #[test]
    fn constraints_total_over_full_range(
        size in any_decimal(),
        collateral in any_decimal(),
        lev in any_decimal(),
    ) {
        let violations = MarketConstraints::default().validate(size, collateral, lev);
        prop_assert!(violations.len() <= 5);
    }

    /// Price impact is either an error or within [0, 5%].
    #[test]
    fn price_impact_total_over_full_range(
        skew in any_decimal(),
        size in any_decimal(),
        max_skew in any_decimal(),
    ) {
        if let Ok(impact) = price_impact(skew, size, max_skew) {
            prop_assert!(impact >= Decimal::ZERO);
            prop_assert!(impact <= MAX_PRICE_IMPACT);
        }
    }

    /// Remaining formulas return a result for any input.
    #[test]
    fn formulas_total_over_full_range(
        a in any_decimal(),
        b in any_decimal(),
        c in any_decimal(),
        is_long in any::<bool>(),
    ) {
        let _ = pnl(a, b, c, is_long);
        let _ = liquidation_price(a, b, is_long);
        let _ = effective_entry_price(a, b, is_long);
        let _ = funding_fee(a, b, c);
        let _ = margin_ratio(a, b, c);
        let _ = capped_pnl(a, b);
        let _ = is_liquidatable(a, b, c);
    }

    /// Order validation through the engine never panics.
    #[test]
    fn engine_validation_total_over_full_range(
        size in any_decimal(),
        collateral in any_decimal(),
        lev in prop::option::of(any_decimal()),
        is_increase in any::<bool>(),
    ) {
        let engine = RiskEngine::new(&RiskConfig::default(), Arc::new(ManualClock::new(0)));
        let request = OrderRequest {
            pair: "BTC_USD".to_string(),
            size_delta: size,
            collateral_delta: collateral,
            leverage: lev,
            is_long: true,
            is_increase,
            price: None,
            stop_loss: None,
            take_profit: None,
        };
        let _ = engine.validate_order(&request);
        let _ = engine.prepare_order(&AccountId::parse("0xabc").unwrap(), &request, None);
    }

    /// Position derivation rejects or derives any numeric row.
    #[test]
    fn derive_snapshot_total_over_full_range(
        size in any_decimal(),
        collateral in any_decimal(),
        entry in any_decimal(),
        stored_leverage in prop::option::of(any_decimal()),
        mark in prop::option::of(any_decimal()),
    ) {
        let record = PositionRecord {
            id: Some("p1".to_string()),
            address: Some("0xabc".to_string()),
            pair: Some("BTC_USD".to_string()),
            is_long: Some(true),
            size: Some(size),
            collateral: Some(collateral),
            leverage: stored_leverage,
            entry_price: Some(entry),
            ..PositionRecord::default()
        };
        if let Ok(snapshot) = derive_snapshot(&record, mark, 0) {
            prop_assert!(snapshot.collateral_usd > Decimal::ZERO);
        }
    }
}

#[test]
fn reference_order_is_valid() {
    let violations = ConstraintTable::default().validate("BTC_USD", dec!(500), dec!(10), dec!(50));
    assert!(violations.is_empty());
}
