//! Property-based tests for upstream row normalization and amount scaling.
//!
//! Rows come from the change feed unvalidated, so normalization must hold
//! over the whole decimal range.

use perpline_core::{MicroUnits, PriceRecord};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn any_decimal() -> impl Strategy<Value = Decimal> {
    (any::<u32>(), any::<u32>(), any::<u32>(), any::<bool>(), 0u32..=28)
        .prop_map(|(lo, mid, hi, negative, scale)| Decimal::from_parts(lo, mid, hi, negative, scale))
}

proptest! {
    /// A positive price always yields a tick carrying that price and a
    /// change value, whatever the 24h-ago price is.
    #[test]
    fn to_tick_total_over_full_range(
        price in any_decimal(),
        open in prop::option::of(any_decimal()),
    ) {
        let record = PriceRecord {
            symbol: Some("APT".to_string()),
            price: Some(price),
            open_price_24h: open,
            ..PriceRecord::default()
        };
        match record.to_tick(0) {
            Some(tick) => {
                prop_assert!(price > Decimal::ZERO);
                prop_assert_eq!(tick.price, price);
            }
            None => prop_assert!(price <= Decimal::ZERO),
        }
    }

    /// Scaling either succeeds for non-negative amounts or reports an error.
    #[test]
    fn micro_units_total_over_full_range(amount in any_decimal()) {
        match MicroUnits::from_usd(amount) {
            Ok(_) => prop_assert!(!amount.is_sign_negative() || amount.is_zero()),
            Err(_) => prop_assert!(amount < Decimal::ZERO || amount >= Decimal::from(u64::MAX / 1_000_000)),
        }
    }
}
