//! Price aggregation for perpline.
//!
//! Resolves on-chain asset keys to USD prices: asset identity mapping
//! (direct feeds and pegged substitution), batched upstream lookups and a
//! TTL cache keyed by asset.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod mapping;
pub mod source;

pub use aggregator::PriceAggregator;
pub use cache::PriceCache;
pub use config::{AssetMappingEntry, PriceConfig};
pub use error::{PriceError, PriceResult};
pub use mapping::{AssetIdentityMapping, FeedRoute};
pub use source::{parse_quote_body, HttpPriceSource, MockPriceSource, PriceSource};
