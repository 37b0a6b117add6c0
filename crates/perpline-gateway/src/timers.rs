//! Periodic gateway tasks.

use crate::gateway::Gateway;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Ping every connection each interval and terminate silent ones.
pub async fn run_heartbeat(gateway: Arc<Gateway>, shutdown: CancellationToken) {
    let period = Duration::from_millis(gateway.config().heartbeat_interval_ms.max(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let terminated = gateway.heartbeat_tick();
                if !terminated.is_empty() {
                    info!(
                        terminated = terminated.len(),
                        connections = gateway.connection_count(),
                        "Heartbeat removed unresponsive connections"
                    );
                } else {
                    trace!(connections = gateway.connection_count(), "Heartbeat round");
                }
            }
        }
    }
    debug!("Heartbeat task stopped");
}

/// Broadcast the watch-list prices each interval. The first round runs
/// immediately so the cache is warm for early snapshots.
pub async fn run_price_refresh(gateway: Arc<Gateway>, shutdown: CancellationToken) {
    let period = Duration::from_millis(gateway.config().price_refresh_interval_ms.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let delivered = gateway.refresh_prices().await;
                trace!(delivered, "Price refresh round");
            }
        }
    }
    debug!("Price refresh task stopped");
}
