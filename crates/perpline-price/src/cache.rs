//! TTL price cache keyed by asset.

use dashmap::DashMap;
use perpline_core::{AssetKey, PriceQuote};

/// Concurrent quote cache.
///
/// An entry is fresh while `now - observed_at < ttl`. Expired entries are
/// never handed out; they stay in the map until superseded.
#[derive(Debug)]
pub struct PriceCache {
    quotes: DashMap<AssetKey, PriceQuote>,
    ttl_ms: u64,
}

impl PriceCache {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            quotes: DashMap::new(),
            ttl_ms,
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Store a quote unless a fresher one is already cached.
    pub fn insert(&self, quote: PriceQuote) {
        match self.quotes.get_mut(&quote.asset_key) {
            Some(mut existing) => {
                if quote.observed_at >= existing.observed_at {
                    *existing = quote;
                }
            }
            None => {
                self.quotes.insert(quote.asset_key.clone(), quote);
            }
        }
    }

    /// Fresh quote for an asset, if any.
    pub fn get_fresh(&self, key: &AssetKey, now_ms: u64) -> Option<PriceQuote> {
        self.quotes
            .get(key)
            .filter(|q| self.is_fresh(q, now_ms))
            .map(|q| q.clone())
    }

    /// All fresh quotes, sorted by asset key.
    pub fn fresh_quotes(&self, now_ms: u64) -> Vec<PriceQuote> {
        let mut quotes: Vec<PriceQuote> = self
            .quotes
            .iter()
            .filter(|q| self.is_fresh(q.value(), now_ms))
            .map(|q| q.value().clone())
            .collect();
        quotes.sort_by(|a, b| a.asset_key.cmp(&b.asset_key));
        quotes
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    fn is_fresh(&self, quote: &PriceQuote, now_ms: u64) -> bool {
        now_ms.saturating_sub(quote.observed_at) < self.ttl_ms
    }
}
