//! Portfolio service.
//!
//! Reads an account's positions from the trading API and keeps the last
//! good answer per account. When the API fails, callers get that answer
//! (or nothing) instead of an error.

use crate::client::PositionsApi;
use crate::error::UpstreamResult;
use dashmap::DashMap;
use perpline_core::{AccountId, Clock, PositionSnapshot, PositionStatus};
use perpline_risk::derive_snapshot;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct PortfolioService {
    api: Arc<dyn PositionsApi>,
    cache: DashMap<AccountId, Vec<PositionSnapshot>>,
    clock: Arc<dyn Clock>,
}

impl PortfolioService {
    pub fn new(api: Arc<dyn PositionsApi>, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            cache: DashMap::new(),
            clock,
        }
    }

    /// Active positions for an account, never failing.
    ///
    /// Falls back to the last good list on upstream failure.
    pub async fn positions(&self, account: &AccountId) -> Vec<PositionSnapshot> {
        match self.refresh(account).await {
            Ok(positions) => positions,
            Err(e) => {
                let cached = self.cached(account);
                warn!(
                    account = %account,
                    error = %e,
                    cached = cached.len(),
                    "Position fetch failed, serving cached portfolio"
                );
                cached
            }
        }
    }

    /// Fetch active positions and refresh the cache. Errors are returned.
    pub async fn refresh(&self, account: &AccountId) -> UpstreamResult<Vec<PositionSnapshot>> {
        let records = self.api.fetch_positions(account.as_str()).await?;
        let now = self.clock.now_ms() as i64;
        let positions: Vec<PositionSnapshot> = records
            .iter()
            .filter_map(|record| match derive_snapshot(record, None, now) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(account = %account, error = %e, "Skipping malformed position row");
                    None
                }
            })
            .filter(|p| p.status == PositionStatus::Active && &p.account_id == account)
            .collect();
        self.cache.insert(account.clone(), positions.clone());
        debug!(account = %account, count = positions.len(), "Portfolio refreshed");
        Ok(positions)
    }

    /// Last good list for an account.
    pub fn cached(&self, account: &AccountId) -> Vec<PositionSnapshot> {
        self.cache
            .get(account)
            .map(|p| p.value().clone())
            .unwrap_or_default()
    }

    /// Fold a pushed position change into the cached list.
    ///
    /// Closed positions are removed; active ones are inserted or replaced.
    pub fn apply_update(&self, position: &PositionSnapshot) {
        let mut entry = self.cache.entry(position.account_id.clone()).or_default();
        entry.retain(|p| p.position_id != position.position_id);
        if position.status == PositionStatus::Active {
            entry.push(position.clone());
        }
    }
}
