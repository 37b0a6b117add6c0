//! Per-account trade cooldown.
//!
//! In-memory only: a process restart clears every cooldown.

use dashmap::DashMap;
use perpline_core::{AccountId, Clock};
use std::sync::Arc;
use tracing::debug;

/// Default cooldown between trades for one account.
pub const DEFAULT_COOLDOWN_MS: u64 = 60_000;

pub struct TradeCooldown {
    cooldown_ms: u64,
    last_trade_ms: DashMap<AccountId, u64>,
    clock: Arc<dyn Clock>,
}

impl TradeCooldown {
    #[must_use]
    pub fn new(cooldown_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown_ms,
            last_trade_ms: DashMap::new(),
            clock,
        }
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    /// Unseen accounts are always eligible.
    pub fn can_trade(&self, account: &AccountId) -> bool {
        self.time_remaining_ms(account) == 0
    }

    /// `max(0, cooldown - (now - last_trade))`.
    pub fn time_remaining_ms(&self, account: &AccountId) -> u64 {
        let Some(last) = self.last_trade_ms.get(account).map(|t| *t) else {
            return 0;
        };
        let elapsed = self.clock.now_ms().saturating_sub(last);
        self.cooldown_ms.saturating_sub(elapsed)
    }

    /// Record a confirmed trade. Call on acceptance, never on submission.
    pub fn mark_traded(&self, account: &AccountId) {
        let now = self.clock.now_ms();
        self.last_trade_ms.insert(account.clone(), now);
        debug!(account = %account, now, "Trade cooldown started");
    }

    /// Accounts with an entry, cooling or not.
    pub fn tracked_accounts(&self) -> usize {
        self.last_trade_ms.len()
    }
}
