#![allow(dead_code)]

use parking_lot::Mutex;
use perpline_core::{
    types::is_full_address, AprRate, BoxFuture, ManualClock, PositionRecord,
};
use perpline_gateway::{Gateway, GatewayConfig, Outbound};
use perpline_price::{AssetIdentityMapping, MockPriceSource, PriceAggregator, PriceConfig};
use perpline_risk::{RiskConfig, RiskEngine};
use perpline_upstream::{
    AprHistorySource, PortfolioService, PositionsApi, UpstreamError, UpstreamResult,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const START_MS: u64 = 1_700_000_000_000;
pub const ACCOUNT_A: &str = "0x00000000000000000000000000000000000000000000000000000000000000aa";
pub const ACCOUNT_B: &str = "0x00000000000000000000000000000000000000000000000000000000000000bb";

/// Positions keyed by address; behaves like the trading API client.
#[derive(Default)]
pub struct StaticPositions {
    rows: Mutex<HashMap<String, Vec<PositionRecord>>>,
    unavailable: AtomicBool,
}

impl StaticPositions {
    pub fn insert(&self, address: &str, rows: Vec<PositionRecord>) {
        self.rows.lock().insert(address.to_string(), rows);
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }
}

impl PositionsApi for StaticPositions {
    fn fetch_positions<'a>(
        &'a self,
        address: &'a str,
    ) -> BoxFuture<'a, UpstreamResult<Vec<PositionRecord>>> {
        Box::pin(async move {
            if !is_full_address(address) {
                return Err(UpstreamError::InvalidAddress(address.to_string()));
            }
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(UpstreamError::Unavailable("connection refused".to_string()));
            }
            Ok(self.rows.lock().get(address).cloned().unwrap_or_default())
        })
    }
}

pub struct FixedHistory(pub Vec<AprRate>);

impl AprHistorySource for FixedHistory {
    fn latest_apr_rates(&self, limit: usize) -> BoxFuture<'_, Vec<AprRate>> {
        let rows = self.0.iter().take(limit).cloned().collect();
        Box::pin(async move { rows })
    }
}

pub struct Harness {
    pub gateway: Arc<Gateway>,
    pub risk: Arc<RiskEngine>,
    pub clock: Arc<ManualClock>,
    pub source: Arc<MockPriceSource>,
    pub positions: Arc<StaticPositions>,
}

pub fn harness() -> Harness {
    harness_with(GatewayConfig::default())
}

pub fn harness_with(config: GatewayConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(START_MS));
    let source = Arc::new(MockPriceSource::new());
    let mapping = AssetIdentityMapping::from_entries(&PriceConfig::default().assets).unwrap();
    let prices = Arc::new(PriceAggregator::new(
        mapping,
        source.clone(),
        30_000,
        clock.clone(),
    ));
    let positions = Arc::new(StaticPositions::default());
    let portfolio = Arc::new(PortfolioService::new(positions.clone(), clock.clone()));
    let history = Arc::new(FixedHistory(vec![AprRate {
        symbol: "BTC_USD".to_string(),
        apr: rust_decimal_macros::dec!(12.5),
        funding_rate: None,
        timestamp: START_MS as i64,
    }]));
    let gateway = Arc::new(Gateway::new(
        config,
        prices,
        portfolio,
        history,
        clock.clone(),
    ));
    let risk = Arc::new(RiskEngine::new(&RiskConfig::default(), clock.clone()));
    Harness {
        gateway,
        risk,
        clock,
        source,
        positions,
    }
}

pub fn position_row(id: &str, owner: &str) -> PositionRecord {
    serde_json::from_value(json!({
        "id": id,
        "user_address": owner,
        "pair": "BTC_USD",
        "is_long": true,
        "size": "500",
        "collateral": "10",
        "entry_price": "65000",
        "status": "active"
    }))
    .unwrap()
}

/// Text frames queued so far, parsed. Pings and closes are skipped.
pub fn messages(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let Outbound::Text(text) = frame {
            out.push(serde_json::from_str(&text).unwrap());
        }
    }
    out
}

pub fn types(messages: &[Value]) -> Vec<String> {
    messages
        .iter()
        .map(|m| m["type"].as_str().unwrap_or_default().to_string())
        .collect()
}
