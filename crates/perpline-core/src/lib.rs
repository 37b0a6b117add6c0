//! Core domain types for perpline.
//!
//! This crate provides the vocabulary shared by every component:
//! - `AssetKey`, `FeedId`, `AccountId`: identifiers
//! - `Channel`, `FeedEvent`: broadcast topics and normalized events
//! - `PriceQuote`, `PositionSnapshot`, `AprRate`: payload types
//! - `MicroUnits`: exact fixed-point scaling for transaction parameters
//! - `Clock`: injectable time source

pub mod channel;
pub mod clock;
pub mod decimal;
pub mod error;
pub mod order;
pub mod types;

pub use channel::{Channel, EventScope, FeedEvent, FeedPayload};
pub use clock::{Clock, ManualClock, SystemClock};
pub use decimal::{parse_decimal, MicroUnits, MICRO_UNITS_PER_USD};
pub use error::{CoreError, Result};
pub use order::{OrderParams, OrderRequest};
pub use types::{
    AccountId, AprRate, AprRecord, AssetKey, Direction, FeedId, PositionRecord,
    PositionSnapshot, PositionStatus, PriceQuote, PriceRecord, PriceTick,
};

use std::future::Future;
use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
