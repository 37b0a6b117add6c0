//! Prometheus metrics for perpline.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration
//! failure means duplicate metric names, a programming error that should
//! crash at first use rather than silently drop data.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_int_gauge, CounterVec, Encoder, GaugeVec,
    IntGauge, TextEncoder,
};

/// Live gateway connections.
pub static GATEWAY_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "perpline_gateway_connections",
        "Currently registered gateway connections"
    )
    .unwrap()
});

/// Messages delivered by fan-out, per channel.
pub static BROADCAST_DELIVERED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpline_broadcast_delivered_total",
        "Messages queued to subscribers by fan-out",
        &["channel"]
    )
    .unwrap()
});

/// Deliveries skipped by fan-out, per channel and reason (closed/full).
pub static BROADCAST_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpline_broadcast_dropped_total",
        "Deliveries skipped during fan-out",
        &["channel", "reason"]
    )
    .unwrap()
});

/// Connections closed by the gateway, per reason.
pub static CONNECTIONS_TERMINATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpline_connections_terminated_total",
        "Connections removed from the registry",
        &["reason"]
    )
    .unwrap()
});

/// Upstream price fetches, per outcome (ok/error).
pub static PRICE_FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpline_price_fetch_total",
        "Batched upstream price requests",
        &["outcome"]
    )
    .unwrap()
});

/// Change notifications received, per table and event type.
pub static CHANGE_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpline_change_events_total",
        "Row-level change notifications received",
        &["table", "event"]
    )
    .unwrap()
});

/// Change notifications dropped as malformed, per table.
pub static CHANGE_EVENTS_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpline_change_events_dropped_total",
        "Row-level change notifications dropped as malformed",
        &["table"]
    )
    .unwrap()
});

/// Change-feed subscription state per table (1 = active state).
pub static CHANGE_FEED_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "perpline_change_feed_state",
        "Change-feed subscription state per table (1=active, 0=inactive)",
        &["table", "state"]
    )
    .unwrap()
});

const FEED_STATES: [&str; 5] = [
    "disconnected",
    "subscribing",
    "streaming",
    "error",
    "resubscribing",
];

/// Metric recording facade.
pub struct Metrics;

impl Metrics {
    /// Set the live connection gauge.
    pub fn connections_set(count: usize) {
        GATEWAY_CONNECTIONS.set(count as i64);
    }

    pub fn broadcast_delivered(channel: &str) {
        BROADCAST_DELIVERED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn broadcast_dropped(channel: &str, reason: &str) {
        BROADCAST_DROPPED_TOTAL
            .with_label_values(&[channel, reason])
            .inc();
    }

    pub fn connection_terminated(reason: &str) {
        CONNECTIONS_TERMINATED_TOTAL
            .with_label_values(&[reason])
            .inc();
    }

    pub fn price_fetch(ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        PRICE_FETCH_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn change_event(table: &str, event: &str) {
        CHANGE_EVENTS_TOTAL.with_label_values(&[table, event]).inc();
    }

    pub fn change_event_dropped(table: &str) {
        CHANGE_EVENTS_DROPPED_TOTAL.with_label_values(&[table]).inc();
    }

    /// Set the active change-feed state for a table.
    /// Only the active state is set to 1, all others to 0.
    pub fn change_feed_state(table: &str, state: &str) {
        for s in FEED_STATES {
            CHANGE_FEED_STATE.with_label_values(&[table, s]).set(0.0);
        }
        CHANGE_FEED_STATE.with_label_values(&[table, state]).set(1.0);
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
