//! Price aggregator.
//!
//! Resolves asset keys to USD quotes through the identity mapping, one
//! batched upstream request per call, caching by asset key. Upstream
//! failures never escape: the caller gets whatever is still fresh.

use crate::cache::PriceCache;
use crate::mapping::AssetIdentityMapping;
use crate::source::PriceSource;
use perpline_core::{AssetKey, Clock, FeedId, PriceQuote};
use perpline_telemetry::Metrics;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct PriceAggregator {
    mapping: AssetIdentityMapping,
    source: Arc<dyn PriceSource>,
    cache: PriceCache,
    clock: Arc<dyn Clock>,
}

impl PriceAggregator {
    pub fn new(
        mapping: AssetIdentityMapping,
        source: Arc<dyn PriceSource>,
        ttl_ms: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            mapping,
            source,
            cache: PriceCache::new(ttl_ms),
            clock,
        }
    }

    /// Resolve quotes for a set of assets.
    ///
    /// Unmapped assets are omitted. On upstream failure the result holds
    /// only assets with fresh cache entries.
    pub async fn resolve(&self, keys: &[AssetKey]) -> HashMap<AssetKey, PriceQuote> {
        let routed: Vec<(AssetKey, FeedId)> = keys
            .iter()
            .filter_map(|k| self.mapping.feed_for(k).map(|feed| (k.clone(), feed)))
            .collect();
        if routed.is_empty() {
            return HashMap::new();
        }

        let ids: Vec<FeedId> = routed
            .iter()
            .map(|(_, feed)| feed.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        match self.source.fetch(&ids).await {
            Ok(prices) => {
                Metrics::price_fetch(true);
                let now = self.clock.now_ms();
                for (asset, feed) in &routed {
                    if let Some(price) = prices.get(feed) {
                        self.cache.insert(PriceQuote {
                            asset_key: asset.clone(),
                            usd_price: *price,
                            observed_at: now,
                        });
                    }
                }
                debug!(requested = routed.len(), feeds = ids.len(), "Prices resolved");
            }
            Err(e) => {
                Metrics::price_fetch(false);
                warn!(error = %e, feeds = ids.len(), "Price fetch failed, serving fresh cache");
            }
        }

        let now = self.clock.now_ms();
        routed
            .into_iter()
            .filter_map(|(asset, _)| {
                self.cache
                    .get_fresh(&asset, now)
                    .map(|quote| (asset, quote))
            })
            .collect()
    }

    /// Quote for one asset, served from cache while fresh.
    pub async fn get_single(&self, key: &AssetKey) -> Option<PriceQuote> {
        if let Some(quote) = self.cache.get_fresh(key, self.clock.now_ms()) {
            return Some(quote);
        }
        self.resolve(std::slice::from_ref(key)).await.remove(key)
    }

    /// All currently fresh quotes.
    pub fn cached_quotes(&self) -> Vec<PriceQuote> {
        self.cache.fresh_quotes(self.clock.now_ms())
    }

    pub fn mapping(&self) -> &AssetIdentityMapping {
        &self.mapping
    }
}
