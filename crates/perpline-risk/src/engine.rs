//! Order preparation.
//!
//! Turns a client order into the microunit tuple the transaction builder
//! consumes, after the cooldown and constraint checks pass.

use crate::config::RiskConfig;
use crate::constraints::{ConstraintTable, ConstraintViolation};
use crate::cooldown::TradeCooldown;
use crate::error::{FormulaResult, RiskError, RiskResult};
use crate::formula;
use perpline_core::{AccountId, Clock, MicroUnits, OrderParams, OrderRequest, PositionSnapshot};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Expected fill for a market order at the current oracle price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryEstimate {
    pub price_impact: Decimal,
    pub entry_price: Decimal,
}

/// Margin state of an open position against its pair's leverage ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionHealth {
    pub margin_ratio: Decimal,
    pub liquidatable: bool,
}

pub struct RiskEngine {
    constraints: ConstraintTable,
    cooldown: TradeCooldown,
    fee_rate: Decimal,
    max_skew: Decimal,
}

impl RiskEngine {
    pub fn new(config: &RiskConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            constraints: ConstraintTable::new(
                config.constraints.clone(),
                config.pair_overrides.clone(),
            ),
            cooldown: TradeCooldown::new(config.cooldown_ms, clock),
            fee_rate: config.fee_rate,
            max_skew: config.max_skew,
        }
    }

    pub fn cooldown(&self) -> &TradeCooldown {
        &self.cooldown
    }

    pub fn constraints(&self) -> &ConstraintTable {
        &self.constraints
    }

    /// Constraint check for an order, without touching cooldown state.
    ///
    /// Decrease orders only need a positive size or collateral delta.
    pub fn validate_order(&self, request: &OrderRequest) -> Vec<String> {
        if !request.is_increase {
            return match decrease_problem(request) {
                Some(problem) => vec![problem],
                None => Vec::new(),
            };
        }
        match effective_leverage(request) {
            Some(leverage) => self
                .constraints
                .validate(
                    &request.pair,
                    request.size_delta,
                    request.collateral_delta,
                    leverage,
                )
                .iter()
                .map(ConstraintViolation::to_string)
                .collect(),
            None => vec!["Leverage is required when collateral is zero".to_string()],
        }
    }

    /// Validate an order and shape the transaction-builder tuple.
    ///
    /// `reference_price` is the current mark for the pair. A limit price
    /// takes precedence when checking stop-loss/take-profit sides.
    pub fn prepare_order(
        &self,
        account: &AccountId,
        request: &OrderRequest,
        reference_price: Option<Decimal>,
    ) -> RiskResult<OrderParams> {
        let remaining_ms = self.cooldown.time_remaining_ms(account);
        if remaining_ms > 0 {
            debug!(account = %account, remaining_ms, "Order blocked by cooldown");
            return Err(RiskError::Cooldown { remaining_ms });
        }

        if request.is_increase {
            let leverage = effective_leverage(request).ok_or_else(|| {
                RiskError::InvalidOrder("leverage is required when collateral is zero".to_string())
            })?;
            let violations = self.constraints.validate(
                &request.pair,
                request.size_delta,
                request.collateral_delta,
                leverage,
            );
            if !violations.is_empty() {
                return Err(RiskError::Constraints(violations));
            }
        } else if let Some(problem) = decrease_problem(request) {
            return Err(RiskError::InvalidOrder(problem));
        }

        let reference = request.price.or(reference_price);
        check_protection_sides(request, reference)?;

        let params = OrderParams {
            pair: request.pair.trim().to_string(),
            size_delta: MicroUnits::from_usd(request.size_delta)?,
            collateral_delta: MicroUnits::from_usd(request.collateral_delta)?,
            is_long: request.is_long,
            is_increase: request.is_increase,
            price: scale_optional(request.price)?,
            stop_loss: scale_optional(request.stop_loss)?,
            take_profit: scale_optional(request.take_profit)?,
        };
        debug!(account = %account, pair = %params.pair, market = params.is_market(), "Order prepared");
        Ok(params)
    }

    /// Mark an accepted trade; starts the account's cooldown.
    pub fn confirm_order(&self, account: &AccountId) {
        self.cooldown.mark_traded(account);
        info!(account = %account, cooldown_ms = self.cooldown.cooldown_ms(), "Trade confirmed");
    }

    /// Taker fee at the configured rate.
    pub fn trading_fee(&self, position_size: Decimal) -> FormulaResult<Decimal> {
        formula::trading_fee(position_size, self.fee_rate)
    }

    /// Price impact at the configured skew scale.
    pub fn price_impact(&self, current_skew: Decimal, trade_size: Decimal) -> FormulaResult<Decimal> {
        formula::price_impact(current_skew, trade_size, self.max_skew)
    }

    /// Impact and effective entry price for `size` against zero skew.
    pub fn entry_estimate(
        &self,
        oracle_price: Decimal,
        size: Decimal,
        is_long: bool,
    ) -> FormulaResult<EntryEstimate> {
        let signed = if is_long { size } else { -size };
        let price_impact = self.price_impact(Decimal::ZERO, signed)?;
        Ok(EntryEstimate {
            price_impact,
            entry_price: formula::effective_entry_price(oracle_price, price_impact, is_long)?,
        })
    }

    pub fn position_health(&self, position: &PositionSnapshot) -> FormulaResult<PositionHealth> {
        let max_leverage = self.constraints.for_pair(&position.asset_pair).max_leverage;
        Ok(PositionHealth {
            margin_ratio: formula::margin_ratio(
                position.collateral_usd,
                position.size_usd,
                position.leverage,
            )?,
            liquidatable: formula::is_liquidatable(
                position.collateral_usd,
                position.size_usd,
                max_leverage,
            )?,
        })
    }

    /// Funding owed over `hours` at an hourly `rate`.
    pub fn funding_fee(&self, size: Decimal, rate: Decimal, hours: Decimal) -> FormulaResult<Decimal> {
        formula::funding_fee(size, rate, hours)
    }
}

/// Requested leverage, or `size / collateral` when omitted.
fn effective_leverage(request: &OrderRequest) -> Option<Decimal> {
    request
        .leverage
        .or_else(|| formula::leverage(request.size_delta, request.collateral_delta).ok())
}

fn decrease_problem(request: &OrderRequest) -> Option<String> {
    if request.size_delta < Decimal::ZERO || request.collateral_delta < Decimal::ZERO {
        return Some("Deltas must not be negative".to_string());
    }
    if request.size_delta.is_zero() && request.collateral_delta.is_zero() {
        return Some("Decrease order needs a positive size or collateral delta".to_string());
    }
    None
}

fn check_protection_sides(request: &OrderRequest, reference: Option<Decimal>) -> RiskResult<()> {
    for (name, value) in [("stop loss", request.stop_loss), ("take profit", request.take_profit)] {
        if matches!(value, Some(v) if v <= Decimal::ZERO) {
            return Err(RiskError::InvalidOrder(format!("{name} must be positive")));
        }
    }
    let Some(reference) = reference else {
        return Ok(());
    };
    // Longs lose below the reference, shorts above.
    let (sl_ok, tp_ok) = if request.is_long {
        (
            request.stop_loss.map_or(true, |sl| sl < reference),
            request.take_profit.map_or(true, |tp| tp > reference),
        )
    } else {
        (
            request.stop_loss.map_or(true, |sl| sl > reference),
            request.take_profit.map_or(true, |tp| tp < reference),
        )
    };
    if !sl_ok {
        return Err(RiskError::InvalidOrder(format!(
            "stop loss is on the wrong side of {reference}"
        )));
    }
    if !tp_ok {
        return Err(RiskError::InvalidOrder(format!(
            "take profit is on the wrong side of {reference}"
        )));
    }
    Ok(())
}

fn scale_optional(value: Option<Decimal>) -> RiskResult<MicroUnits> {
    Ok(match value {
        Some(v) => MicroUnits::from_usd(v)?,
        None => MicroUnits::ZERO,
    })
}
