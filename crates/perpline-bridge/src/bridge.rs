//! Change-feed bridge.
//!
//! Holds one realtime connection, joins every configured table, and turns
//! row changes into feed events for the registered sinks. Reconnects with
//! exponential backoff until shutdown.

use crate::config::ChangeFeedConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{ChangeNotification, PhoenixFrame, Table};
use crate::sink::{EventSink, SinkHandle, SinkRegistry};
use crate::state::{FeedState, TableStates};
use crate::translate::translate;
use futures_util::{SinkExt, StreamExt};
use perpline_core::{Clock, FeedEvent};
use perpline_telemetry::Metrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct ChangeFeedBridge {
    config: ChangeFeedConfig,
    sinks: SinkRegistry,
    states: TableStates,
    clock: Arc<dyn Clock>,
    next_ref: AtomicU64,
    shutdown_token: CancellationToken,
}

impl ChangeFeedBridge {
    pub fn new(config: ChangeFeedConfig, clock: Arc<dyn Clock>) -> Self {
        let states = TableStates::new(&config.tables);
        Self {
            config,
            sinks: SinkRegistry::new(),
            states,
            clock,
            next_ref: AtomicU64::new(1),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Register a consumer of translated events.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) -> SinkHandle {
        self.sinks.subscribe(sink)
    }

    pub fn unsubscribe(&self, handle: SinkHandle) -> bool {
        self.sinks.unsubscribe(handle)
    }

    pub fn state(&self, table: Table) -> Option<FeedState> {
        self.states.get(table)
    }

    pub fn states(&self) -> &TableStates {
        &self.states
    }

    /// Signal graceful shutdown.
    pub fn shutdown(&self) {
        info!("Change-feed shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Translate and dispatch a notification.
    ///
    /// Notifications for tables that are not streaming are discarded.
    pub fn handle_notification(&self, notification: &ChangeNotification) -> Option<FeedEvent> {
        let table = notification.table;
        Metrics::change_event(table.as_str(), notification.kind.as_str());
        if !self.states.is_streaming(table) {
            debug!(%table, "Discarding change for table that is not streaming");
            return None;
        }
        let event = translate(notification, self.clock.now_ms() as i64)?;
        self.sinks.dispatch(&event);
        Some(event)
    }

    /// Process one inbound frame.
    pub fn handle_frame(&self, text: &str) -> BridgeResult<()> {
        let frame: PhoenixFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable change-feed frame");
                return Ok(());
            }
        };

        match frame.event.as_str() {
            "phx_reply" => self.handle_reply(&frame),
            "postgres_changes" => {
                match ChangeNotification::from_payload(&frame.payload, &frame.topic) {
                    Some(notification) => {
                        self.handle_notification(&notification);
                    }
                    None => {
                        warn!(topic = %frame.topic, "Dropping unrecognized change notification");
                    }
                }
                Ok(())
            }
            "phx_error" | "phx_close" => {
                if let Some(table) = Table::from_topic(&frame.topic) {
                    warn!(%table, event = %frame.event, "Channel closed by server");
                    self.states.transition(table, FeedState::Error);
                }
                Ok(())
            }
            other => {
                debug!(event = other, topic = %frame.topic, "Ignoring change-feed frame");
                Ok(())
            }
        }
    }

    fn handle_reply(&self, frame: &PhoenixFrame) -> BridgeResult<()> {
        let Some(table) = Table::from_topic(&frame.topic) else {
            // heartbeat acknowledgements on the `phoenix` topic
            return Ok(());
        };
        match frame.reply_status() {
            Some("ok") => {
                let current = self.states.get(table);
                if matches!(
                    current,
                    Some(FeedState::Subscribing) | Some(FeedState::Resubscribing)
                ) {
                    self.states.transition(table, FeedState::Streaming);
                }
                Ok(())
            }
            status => {
                let reason = frame
                    .payload
                    .get("response")
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| status.unwrap_or("unknown").to_string());
                self.states.transition(table, FeedState::Error);
                Err(BridgeError::JoinRejected {
                    table: table.to_string(),
                    reason,
                })
            }
        }
    }

    fn next_ref(&self) -> u64 {
        self.next_ref.fetch_add(1, Ordering::Relaxed)
    }

    /// Connect and stream until shutdown.
    pub async fn run(&self) -> BridgeResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                self.states.disconnect_all();
                return Ok(());
            }

            match self.try_connect().await {
                Ok(()) => info!("Change-feed connection closed"),
                Err(e) => error!(error = %e, "Change-feed connection error"),
            }
            self.states.fail_all();

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                self.states.disconnect_all();
                return Ok(());
            }

            attempt += 1;
            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max change-feed reconnection attempts reached");
                self.states.disconnect_all();
                return Err(BridgeError::Connection(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            let delay = backoff_delay(
                attempt,
                self.config.reconnect_base_delay_ms,
                self.config.reconnect_max_delay_ms,
            );
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting change feed");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    self.states.disconnect_all();
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self) -> BridgeResult<()> {
        info!(url = %self.config.url, "Connecting to change feed");
        let (ws_stream, _response) =
            connect_async_tls_with_config(self.config.socket_url(), None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();
        info!("Change feed connected");

        for table in &self.config.tables {
            let join = PhoenixFrame::join(
                *table,
                &self.config.schema,
                &self.config.api_key,
                self.next_ref(),
            );
            write
                .send(Message::Text(serde_json::to_string(&join)?))
                .await?;
            let state = self.states.begin_subscribe(*table);
            debug!(%table, %state, "Join sent");
        }

        let period = Duration::from_millis(self.config.heartbeat_interval_ms.max(1));
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_frame(&text) {
                                warn!(error = %e, "Change-feed frame rejected");
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Change feed closed by server");
                            return Err(BridgeError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!("Change-feed stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                _ = heartbeat.tick() => {
                    let frame = PhoenixFrame::heartbeat(self.next_ref());
                    write.send(Message::Text(serde_json::to_string(&frame)?)).await?;
                    debug!("Sent change-feed heartbeat");
                }
            }
        }
    }
}

/// `base × 2^(attempt-1)`, capped at `max`, plus up to 1s of jitter.
fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    let delay = base_ms.saturating_mul(1u64 << exponent).min(max_ms);
    Duration::from_millis(delay.saturating_add(jitter_ms()))
}

fn jitter_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}
