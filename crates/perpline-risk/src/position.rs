//! Position derivation from raw upstream rows.

use crate::error::{RiskError, RiskResult};
use crate::formula;
use perpline_core::{PositionRecord, PositionSnapshot};
use rust_decimal::Decimal;

/// Relative leverage drift above which a row's stored leverage is replaced
/// by `size / collateral`.
const LEVERAGE_DRIFT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

const MS_PER_HOUR: Decimal = Decimal::from_parts(3_600_000, 0, 0, false, 0);

/// Build a snapshot from a position row.
///
/// Derived fields missing from the row are filled in: leverage,
/// liquidation price, unrealized PnL (from `mark_price`, falling back to
/// the row's mark then entry price) capped by the profit cap.
pub fn derive_snapshot(
    record: &PositionRecord,
    mark_price: Option<Decimal>,
    now_ms: i64,
) -> RiskResult<PositionSnapshot> {
    let position_id = record
        .id
        .clone()
        .ok_or_else(|| missing("id"))?;
    let account_id = record.account().ok_or_else(|| missing("account"))?;
    let asset_pair = record
        .pair
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| missing("pair"))?
        .to_string();
    let direction = record.direction().ok_or_else(|| missing("direction"))?;
    let size_usd = record.size.ok_or_else(|| missing("size"))?;
    let collateral_usd = record.collateral.ok_or_else(|| missing("collateral"))?;
    let entry_price = record.entry_price.ok_or_else(|| missing("entry_price"))?;

    if size_usd < Decimal::ZERO || collateral_usd <= Decimal::ZERO || entry_price <= Decimal::ZERO {
        return Err(RiskError::InvalidPosition(format!(
            "{position_id}: size, collateral and entry price must be positive"
        )));
    }

    let computed = formula::leverage(size_usd, collateral_usd)?;
    let leverage = match record.leverage {
        Some(stored) if stored > Decimal::ZERO && within_drift(stored, computed) => stored,
        _ => computed,
    };

    let liquidation_price = match record.liquidation_price {
        Some(price) if price > Decimal::ZERO => price,
        _ if leverage > Decimal::ZERO => {
            formula::liquidation_price(entry_price, leverage, direction.is_long())?
        }
        _ => Decimal::ZERO,
    };

    let mark = mark_price
        .filter(|p| *p > Decimal::ZERO)
        .or(record.mark_price.filter(|p| *p > Decimal::ZERO))
        .unwrap_or(entry_price);

    let raw_pnl = match (mark_price, record.pnl) {
        (None, Some(stored)) => stored,
        _ => formula::pnl(mark, entry_price, size_usd, direction.is_long())?,
    };
    let unrealized_pnl_usd = formula::capped_pnl(raw_pnl, collateral_usd)?;

    Ok(PositionSnapshot {
        position_id,
        account_id,
        asset_pair,
        direction,
        size_usd,
        collateral_usd,
        leverage,
        entry_price,
        mark_price: mark,
        unrealized_pnl_usd,
        liquidation_price,
        funding_fee_usd: funding_fee_usd(record, size_usd, now_ms),
        status: record.status(),
        updated_at: record.updated_at_ms().unwrap_or(now_ms),
    })
}

/// Stored fee, else `size × hourly rate × hours open`, else zero.
fn funding_fee_usd(record: &PositionRecord, size_usd: Decimal, now_ms: i64) -> Decimal {
    if let Some(fee) = record.funding_fee {
        return fee;
    }
    let (Some(rate), Some(opened)) = (record.funding_rate, record.opened_at_ms()) else {
        return Decimal::ZERO;
    };
    let hours = Decimal::from(now_ms.saturating_sub(opened).max(0)) / MS_PER_HOUR;
    formula::funding_fee(size_usd, rate, hours).unwrap_or(Decimal::ZERO)
}

fn within_drift(stored: Decimal, computed: Decimal) -> bool {
    if computed.is_zero() {
        return stored.is_zero();
    }
    // Out-of-range ratios count as drift.
    stored
        .checked_sub(computed)
        .and_then(|gap| gap.abs().checked_div(computed))
        .is_some_and(|drift| drift <= LEVERAGE_DRIFT_TOLERANCE)
}

fn missing(field: &str) -> RiskError {
    RiskError::InvalidPosition(format!("missing {field}"))
}
