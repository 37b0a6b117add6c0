//! Leveraged perpetual formulas.
//!
//! Pure functions over `Decimal`. All arithmetic is checked, so bad or
//! out-of-range input comes back as `FormulaError`.

use crate::error::{FormulaError, FormulaResult};
use rust_decimal::Decimal;

/// Default taker fee rate (0.06%).
pub const DEFAULT_TRADING_FEE_RATE: Decimal = Decimal::from_parts(6, 0, 0, false, 4);

/// Realized PnL ceiling as a multiple of collateral.
pub const PROFIT_CAP_MULTIPLIER: Decimal = Decimal::from_parts(9, 0, 0, false, 0);

/// Skew at which price impact reaches its slope scale.
pub const DEFAULT_MAX_SKEW: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Impact per unit of skew ratio (2%).
const IMPACT_SLOPE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

/// Price impact ceiling (5%).
pub const MAX_PRICE_IMPACT: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

fn add(a: Decimal, b: Decimal, what: &'static str) -> FormulaResult<Decimal> {
    a.checked_add(b).ok_or(FormulaError::Overflow(what))
}

fn sub(a: Decimal, b: Decimal, what: &'static str) -> FormulaResult<Decimal> {
    a.checked_sub(b).ok_or(FormulaError::Overflow(what))
}

fn mul(a: Decimal, b: Decimal, what: &'static str) -> FormulaResult<Decimal> {
    a.checked_mul(b).ok_or(FormulaError::Overflow(what))
}

fn div(a: Decimal, b: Decimal, what: &'static str) -> FormulaResult<Decimal> {
    if b.is_zero() {
        return Err(FormulaError::DivisionByZero(what));
    }
    a.checked_div(b).ok_or(FormulaError::Overflow(what))
}

/// `collateral × leverage`.
pub fn position_size(collateral: Decimal, leverage: Decimal) -> FormulaResult<Decimal> {
    mul(collateral, leverage, "position_size")
}

/// Unrealized PnL in USD.
///
/// `(current - entry) × size / entry` for longs, sign flipped for shorts.
pub fn pnl(
    current_price: Decimal,
    entry_price: Decimal,
    position_size: Decimal,
    is_long: bool,
) -> FormulaResult<Decimal> {
    let move_ = if is_long {
        sub(current_price, entry_price, "pnl")?
    } else {
        sub(entry_price, current_price, "pnl")?
    };
    div(mul(move_, position_size, "pnl")?, entry_price, "entry_price")
}

/// `size / collateral`.
pub fn leverage(position_size: Decimal, collateral: Decimal) -> FormulaResult<Decimal> {
    div(position_size, collateral, "collateral")
}

/// Mark price at which the position is liquidated.
///
/// Long: `entry × (1 - 1/L)`. Short: `entry × (1 + 1/L)`.
pub fn liquidation_price(
    entry_price: Decimal,
    leverage: Decimal,
    is_long: bool,
) -> FormulaResult<Decimal> {
    if leverage <= Decimal::ZERO {
        return Err(FormulaError::InvalidLeverage(leverage));
    }
    let step = div(Decimal::ONE, leverage, "leverage")?;
    let factor = if is_long {
        sub(Decimal::ONE, step, "liquidation_price")?
    } else {
        add(Decimal::ONE, step, "liquidation_price")?
    };
    mul(entry_price, factor, "liquidation_price")
}

/// Execution price after impact: up for longs, down for shorts.
pub fn effective_entry_price(
    oracle_price: Decimal,
    price_impact: Decimal,
    is_long: bool,
) -> FormulaResult<Decimal> {
    let factor = if is_long {
        add(Decimal::ONE, price_impact, "effective_entry_price")?
    } else {
        sub(Decimal::ONE, price_impact, "effective_entry_price")?
    };
    mul(oracle_price, factor, "effective_entry_price")
}

/// `size × rate × hours`.
pub fn funding_fee(
    position_size: Decimal,
    funding_rate: Decimal,
    hours: Decimal,
) -> FormulaResult<Decimal> {
    mul(
        mul(position_size, funding_rate, "funding_fee")?,
        hours,
        "funding_fee",
    )
}

/// `size × fee_rate`.
pub fn trading_fee(position_size: Decimal, fee_rate: Decimal) -> FormulaResult<Decimal> {
    mul(position_size, fee_rate, "trading_fee")
}

/// `collateral / (size / leverage)`.
pub fn margin_ratio(
    collateral: Decimal,
    position_size: Decimal,
    leverage: Decimal,
) -> FormulaResult<Decimal> {
    if leverage <= Decimal::ZERO {
        return Err(FormulaError::InvalidLeverage(leverage));
    }
    let required = div(position_size, leverage, "leverage")?;
    div(collateral, required, "required_margin")
}

/// Maximum realized profit: `9 × collateral`.
pub fn profit_cap(collateral: Decimal) -> FormulaResult<Decimal> {
    mul(PROFIT_CAP_MULTIPLIER, collateral, "profit_cap")
}

/// PnL clamped to the profit cap. Losses are not floored.
pub fn capped_pnl(pnl: Decimal, collateral: Decimal) -> FormulaResult<Decimal> {
    Ok(pnl.min(profit_cap(collateral)?))
}

/// `min(|skew + size| / max_skew × 0.02, 0.05)`.
pub fn price_impact(
    current_skew: Decimal,
    trade_size: Decimal,
    max_skew: Decimal,
) -> FormulaResult<Decimal> {
    if max_skew <= Decimal::ZERO {
        return Err(FormulaError::DivisionByZero("max_skew"));
    }
    let skew = add(current_skew, trade_size, "price_impact")?.abs();
    let impact = mul(div(skew, max_skew, "max_skew")?, IMPACT_SLOPE, "price_impact")?;
    Ok(impact.min(MAX_PRICE_IMPACT))
}

/// Collateral no longer covers `size / max_leverage`.
pub fn is_liquidatable(
    collateral: Decimal,
    position_size: Decimal,
    max_leverage: Decimal,
) -> FormulaResult<bool> {
    if max_leverage <= Decimal::ZERO {
        return Err(FormulaError::InvalidLeverage(max_leverage));
    }
    Ok(collateral < div(position_size, max_leverage, "max_leverage")?)
}
