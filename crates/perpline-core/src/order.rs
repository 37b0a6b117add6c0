//! Order request and transaction-builder parameters.

use crate::decimal::MicroUnits;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An order as requested by a client, in whole USD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Trading pair (e.g. "BTC_USD").
    pub pair: String,
    /// Notional size change in USD.
    pub size_delta: Decimal,
    /// Collateral change in USD.
    pub collateral_delta: Decimal,
    /// Requested leverage. Only consulted for increase orders.
    #[serde(default)]
    pub leverage: Option<Decimal>,
    pub is_long: bool,
    #[serde(default = "default_is_increase")]
    pub is_increase: bool,
    /// Limit price; `None` for a market order.
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
}

fn default_is_increase() -> bool {
    true
}

/// Validated, microunit-scaled parameters for the transaction builder.
///
/// `price` is 0 for market orders; `stop_loss`/`take_profit` are 0 when
/// not set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderParams {
    pub pair: String,
    pub size_delta: MicroUnits,
    pub collateral_delta: MicroUnits,
    pub is_long: bool,
    pub is_increase: bool,
    pub price: MicroUnits,
    pub stop_loss: MicroUnits,
    pub take_profit: MicroUnits,
}

impl OrderParams {
    /// Whether this is a market order.
    pub fn is_market(&self) -> bool {
        self.price.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_request_defaults() {
        let req: OrderRequest = serde_json::from_str(
            r#"{"pair":"BTC_USD","sizeDelta":500,"collateralDelta":"10","leverage":50,"isLong":true}"#,
        )
        .unwrap();
        assert!(req.is_increase);
        assert_eq!(req.size_delta, dec!(500));
        assert_eq!(req.collateral_delta, dec!(10));
        assert_eq!(req.leverage, Some(dec!(50)));
        assert!(req.price.is_none());
    }

    #[test]
    fn test_order_params_wire_shape() {
        let params = OrderParams {
            pair: "ETH_USD".to_string(),
            size_delta: MicroUnits(500_000_000),
            collateral_delta: MicroUnits(10_000_000),
            is_long: false,
            is_increase: true,
            price: MicroUnits::ZERO,
            stop_loss: MicroUnits::ZERO,
            take_profit: MicroUnits::ZERO,
        };
        assert!(params.is_market());
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["sizeDelta"], 500_000_000u64);
        assert_eq!(json["price"], 0);
    }
}
