//! Change notification → feed event translation.
//!
//! - `positions` (insert/update/delete) → `portfolio`, scoped to the owning account
//! - `price_history` insert → `prices`, global
//! - `apr_history` insert → `apr_rates`, global
//!
//! Malformed rows are dropped with a warning.

use crate::protocol::{ChangeKind, ChangeNotification, Table};
use perpline_core::{AprRecord, FeedEvent, PositionRecord, PositionStatus, PriceRecord};
use perpline_risk::derive_snapshot;
use perpline_telemetry::Metrics;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Translate one notification. `None` means nothing to broadcast.
pub fn translate(notification: &ChangeNotification, now_ms: i64) -> Option<FeedEvent> {
    let table = notification.table;
    match (table, notification.kind) {
        (Table::Positions, kind) => {
            let row = match kind {
                ChangeKind::Delete => notification
                    .old_record
                    .as_ref()
                    .or(notification.record.as_ref()),
                _ => notification.record.as_ref(),
            };
            let record: PositionRecord = parse_row(table, row)?;
            match derive_snapshot(&record, None, now_ms) {
                Ok(mut snapshot) => {
                    if kind == ChangeKind::Delete {
                        snapshot.status = PositionStatus::Closed;
                    }
                    Some(FeedEvent::position(snapshot, now_ms))
                }
                Err(e) => drop_row(table, &e.to_string()),
            }
        }
        (Table::PriceHistory, ChangeKind::Insert) => {
            let record: PriceRecord = parse_row(table, notification.record.as_ref())?;
            match record.to_tick(now_ms) {
                Some(tick) => Some(FeedEvent::price(tick, now_ms)),
                None => drop_row(table, "missing symbol or price"),
            }
        }
        (Table::AprHistory, ChangeKind::Insert) => {
            let record: AprRecord = parse_row(table, notification.record.as_ref())?;
            match record.to_rate(now_ms) {
                Some(rate) => Some(FeedEvent::apr(rate, now_ms)),
                None => drop_row(table, "missing symbol or apr"),
            }
        }
        (table, kind) => {
            debug!(%table, kind = kind.as_str(), "Ignoring non-insert history change");
            None
        }
    }
}

fn parse_row<T: DeserializeOwned>(table: Table, row: Option<&Value>) -> Option<T> {
    let Some(row) = row.filter(|r| r.is_object()) else {
        return drop_row(table, "null or non-object record");
    };
    match serde_json::from_value(row.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => drop_row(table, &e.to_string()),
    }
}

fn drop_row<T>(table: Table, reason: &str) -> Option<T> {
    warn!(%table, reason, "Dropping malformed change record");
    Metrics::change_event_dropped(table.as_str());
    None
}
