//! Broadcast channels and normalized feed events.

use crate::types::{AccountId, AprRate, PositionSnapshot, PriceTick};
use serde::{Serialize, Serializer};
use std::fmt;

/// Longest channel name a client may subscribe to.
pub const MAX_CHANNEL_NAME_LEN: usize = 64;

/// A named broadcast topic.
///
/// Known channels get point-in-time snapshots on subscribe. Other
/// well-formed names are accepted as plain topics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Prices,
    Portfolio,
    AprRates,
    Other(String),
}

impl Channel {
    /// Parse a client-supplied channel name.
    ///
    /// Returns `None` for empty, overlong or non `[a-z0-9_:-]` names.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_CHANNEL_NAME_LEN {
            return None;
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b':' | b'-'))
        {
            return None;
        }
        Some(match name {
            "prices" => Self::Prices,
            "portfolio" => Self::Portfolio,
            "apr_rates" => Self::AprRates,
            other => Self::Other(other.to_string()),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Prices => "prices",
            Self::Portfolio => "portfolio",
            Self::AprRates => "apr_rates",
            Self::Other(name) => name,
        }
    }

    /// Whether events on this channel are scoped to a single account.
    pub fn is_account_scoped(&self) -> bool {
        matches!(self, Self::Portfolio)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Who an event is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventScope {
    /// Every subscriber of the channel.
    Global,
    /// Only subscribers authenticated as this account.
    Account(AccountId),
}

/// Normalized event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedPayload {
    Price(PriceTick),
    Position(PositionSnapshot),
    Apr(AprRate),
}

/// A `{channel, payload, timestamp}` triple ready for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEvent {
    pub channel: Channel,
    pub scope: EventScope,
    pub payload: FeedPayload,
    /// Production time (Unix milliseconds).
    pub timestamp_ms: i64,
}

impl FeedEvent {
    pub fn price(tick: PriceTick, timestamp_ms: i64) -> Self {
        Self {
            channel: Channel::Prices,
            scope: EventScope::Global,
            payload: FeedPayload::Price(tick),
            timestamp_ms,
        }
    }

    pub fn position(position: PositionSnapshot, timestamp_ms: i64) -> Self {
        Self {
            channel: Channel::Portfolio,
            scope: EventScope::Account(position.account_id.clone()),
            payload: FeedPayload::Position(position),
            timestamp_ms,
        }
    }

    pub fn apr(rate: AprRate, timestamp_ms: i64) -> Self {
        Self {
            channel: Channel::AprRates,
            scope: EventScope::Global,
            payload: FeedPayload::Apr(rate),
            timestamp_ms,
        }
    }
}
