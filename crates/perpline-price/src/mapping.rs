//! Asset identity mapping.
//!
//! Maps on-chain asset keys to upstream feed identifiers. A pegged asset
//! has no feed of its own and borrows the feed of the asset it is pegged
//! to. Pegs may chain; the chain must end at a direct feed.

use crate::config::AssetMappingEntry;
use crate::error::{PriceError, PriceResult};
use perpline_core::{AssetKey, FeedId};
use std::collections::{HashMap, HashSet};

/// Where an asset's price comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedRoute {
    Direct(FeedId),
    Pegged(AssetKey),
}

/// Immutable asset → feed mapping.
#[derive(Debug, Clone, Default)]
pub struct AssetIdentityMapping {
    routes: HashMap<AssetKey, FeedRoute>,
}

impl AssetIdentityMapping {
    /// Build and validate a mapping from config entries.
    pub fn from_entries(entries: &[AssetMappingEntry]) -> PriceResult<Self> {
        let mut routes = HashMap::with_capacity(entries.len());
        for entry in entries {
            let asset = AssetKey::new(entry.asset.as_str());
            if asset.as_str().is_empty() {
                return Err(PriceError::Mapping("asset key is empty".to_string()));
            }
            let route = match (&entry.feed_id, &entry.pegged_to) {
                (Some(feed), None) if !feed.trim().is_empty() => {
                    FeedRoute::Direct(FeedId::new(feed.trim()))
                }
                (None, Some(peg)) if !peg.trim().is_empty() => {
                    FeedRoute::Pegged(AssetKey::new(peg.as_str()))
                }
                _ => {
                    return Err(PriceError::Mapping(format!(
                        "{asset}: exactly one of feed_id or pegged_to must be set"
                    )))
                }
            };
            if routes.insert(asset.clone(), route).is_some() {
                return Err(PriceError::Mapping(format!("{asset}: duplicate entry")));
            }
        }
        let mapping = Self { routes };
        mapping.validate()?;
        Ok(mapping)
    }

    /// Check that every peg chain terminates at a direct feed.
    pub fn validate(&self) -> PriceResult<()> {
        for asset in self.routes.keys() {
            self.follow(asset)?;
        }
        Ok(())
    }

    /// Feed identifier for an asset, following pegs.
    ///
    /// Returns `None` for unmapped assets.
    pub fn feed_for(&self, asset: &AssetKey) -> Option<FeedId> {
        if !self.routes.contains_key(asset) {
            return None;
        }
        self.follow(asset).ok()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn follow(&self, start: &AssetKey) -> PriceResult<FeedId> {
        let mut seen = HashSet::new();
        let mut current = start;
        loop {
            if !seen.insert(current) {
                return Err(PriceError::Mapping(format!(
                    "{start}: peg cycle through {current}"
                )));
            }
            match self.routes.get(current) {
                Some(FeedRoute::Direct(feed)) => return Ok(feed.clone()),
                Some(FeedRoute::Pegged(next)) => current = next,
                None => {
                    return Err(PriceError::Mapping(format!(
                        "{start}: pegged to unmapped asset {current}"
                    )))
                }
            }
        }
    }
}
