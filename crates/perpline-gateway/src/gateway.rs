//! Realtime gateway.
//!
//! Owns the connection registry and implements the client protocol:
//! welcome on connect, auth binding, channel subscriptions with
//! point-in-time snapshots, and filtered fan-out of feed events.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ConnectionId, ConnectionRegistry, Outbound, SendOutcome};
use perpline_bridge::EventSink;
use perpline_core::{
    AccountId, AssetKey, Channel, Clock, EventScope, FeedEvent, FeedPayload, PriceQuote,
};
use perpline_price::PriceAggregator;
use perpline_telemetry::Metrics;
use perpline_upstream::{AprHistorySource, PortfolioService};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct Gateway {
    config: GatewayConfig,
    registry: ConnectionRegistry,
    prices: Arc<PriceAggregator>,
    portfolio: Arc<PortfolioService>,
    history: Arc<dyn AprHistorySource>,
    clock: Arc<dyn Clock>,
    watch_list: Vec<AssetKey>,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        prices: Arc<PriceAggregator>,
        portfolio: Arc<PortfolioService>,
        history: Arc<dyn AprHistorySource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let watch_list = config.watch_list.iter().map(AssetKey::new).collect();
        Self {
            registry: ConnectionRegistry::new(config.outbound_queue_capacity),
            config,
            prices,
            portfolio,
            history,
            clock,
            watch_list,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn prices(&self) -> &Arc<PriceAggregator> {
        &self.prices
    }

    pub fn portfolio(&self) -> &Arc<PortfolioService> {
        &self.portfolio
    }

    pub fn watch_list(&self) -> &[AssetKey] {
        &self.watch_list
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms() as i64
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Register a new connection and queue its welcome.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let (id, receiver) = self.registry.register(self.clock.now_ms());
        Metrics::connections_set(self.registry.len());
        info!(conn_id = %id, connections = self.registry.len(), "Client connected");
        self.reply(
            id,
            &ServerMessage::Welcome {
                client_id: id.to_string(),
                timestamp: self.now_ms(),
            },
        );
        (id, receiver)
    }

    /// Deregister a connection. Idempotent.
    pub fn disconnect(&self, id: ConnectionId, reason: &str) {
        if self.registry.remove(id) {
            Metrics::connection_terminated(reason);
            Metrics::connections_set(self.registry.len());
            info!(conn_id = %id, reason, connections = self.registry.len(), "Client disconnected");
        }
    }

    /// Record a liveness signal (pong or any inbound frame).
    pub fn touch(&self, id: ConnectionId) {
        self.registry.touch(id, self.clock.now_ms());
    }

    /// Close every connection.
    pub fn close_all(&self, reason: &str) {
        for id in self.registry.ids() {
            self.registry.send(id, Outbound::Close);
            self.disconnect(id, reason);
        }
    }

    // ------------------------------------------------------------------
    // Inbound messages
    // ------------------------------------------------------------------

    /// Handle one text frame from a client.
    ///
    /// Protocol errors are answered with an `error` message and leave the
    /// connection's state untouched.
    pub async fn handle_message(&self, id: ConnectionId, raw: &str) {
        match ClientMessage::parse(raw) {
            Ok(message) => {
                self.touch(id);
                if let Err(e) = self.dispatch(id, message).await {
                    self.reply(id, &ServerMessage::error(&e, self.now_ms()));
                }
            }
            Err(e) => {
                debug!(conn_id = %id, error = %e, "Rejected client message");
                self.reply(id, &ServerMessage::error(&e, self.now_ms()));
            }
        }
    }

    async fn dispatch(&self, id: ConnectionId, message: ClientMessage) -> GatewayResult<()> {
        match message {
            ClientMessage::Auth { user_id } => {
                let account = AccountId::parse(&user_id)
                    .map_err(|e| GatewayError::InvalidAccount(e.to_string()))?;
                self.registry.set_account(id, account.clone());
                info!(conn_id = %id, account = %account, "Client authenticated");
                self.reply(
                    id,
                    &ServerMessage::AuthSuccess {
                        user_id: account.to_string(),
                        timestamp: self.now_ms(),
                    },
                );
            }
            ClientMessage::Subscribe { channel } => {
                let channel = Channel::parse(&channel)
                    .ok_or_else(|| GatewayError::InvalidChannel(channel.clone()))?;
                if !self.registry.subscribe(id, channel.clone()) {
                    return Ok(());
                }
                debug!(conn_id = %id, %channel, "Subscribed");
                self.reply(
                    id,
                    &ServerMessage::Subscribed {
                        channel: channel.to_string(),
                        timestamp: self.now_ms(),
                    },
                );
                self.send_snapshot(id, &channel).await;
            }
            ClientMessage::Unsubscribe { channel } => {
                let channel = Channel::parse(&channel)
                    .ok_or_else(|| GatewayError::InvalidChannel(channel.clone()))?;
                self.registry.unsubscribe(id, &channel);
                debug!(conn_id = %id, %channel, "Unsubscribed");
                self.reply(
                    id,
                    &ServerMessage::Unsubscribed {
                        channel: channel.to_string(),
                        timestamp: self.now_ms(),
                    },
                );
            }
            ClientMessage::Ping => {
                self.reply(
                    id,
                    &ServerMessage::Pong {
                        timestamp: self.now_ms(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Push the point-in-time state of a known channel.
    async fn send_snapshot(&self, id: ConnectionId, channel: &Channel) {
        let message = match channel {
            Channel::Prices => ServerMessage::PricesSnapshot {
                data: self.prices.cached_quotes(),
                timestamp: self.now_ms(),
            },
            Channel::Portfolio => {
                let Some(account) = self.registry.account(id) else {
                    debug!(conn_id = %id, "Portfolio snapshot skipped, not authenticated");
                    return;
                };
                ServerMessage::PortfolioSnapshot {
                    data: self.portfolio.positions(&account).await,
                    timestamp: self.now_ms(),
                }
            }
            Channel::AprRates => ServerMessage::AprRatesSnapshot {
                data: self
                    .history
                    .latest_apr_rates(self.config.apr_snapshot_limit)
                    .await,
                timestamp: self.now_ms(),
            },
            Channel::Other(_) => return,
        };
        self.reply(id, &message);
    }

    fn reply(&self, id: ConnectionId, message: &ServerMessage) {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize server message");
                return;
            }
        };
        match self.registry.send(id, Outbound::Text(text)) {
            SendOutcome::Queued | SendOutcome::Missing => {}
            SendOutcome::Full => debug!(conn_id = %id, "Outbound queue full, reply dropped"),
            SendOutcome::Closed => self.disconnect(id, "closed"),
        }
    }

    // ------------------------------------------------------------------
    // Fan-out
    // ------------------------------------------------------------------

    /// Deliver to every subscriber of `channel`. Returns deliveries queued.
    pub fn broadcast(&self, channel: &Channel, message: &ServerMessage) -> usize {
        self.fan_out(channel, None, message)
    }

    /// Deliver to subscribers of `channel` authenticated as `account`.
    pub fn broadcast_to_account(
        &self,
        account: &AccountId,
        channel: &Channel,
        message: &ServerMessage,
    ) -> usize {
        self.fan_out(channel, Some(account), message)
    }

    fn fan_out(&self, channel: &Channel, account: Option<&AccountId>, message: &ServerMessage) -> usize {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(%channel, error = %e, "Failed to serialize broadcast");
                return 0;
            }
        };
        let report = self.registry.fan_out(channel, account, &text);
        let label = channel.as_str();
        for _ in 0..report.delivered {
            Metrics::broadcast_delivered(label);
        }
        for _ in 0..report.skipped {
            Metrics::broadcast_dropped(label, "full");
        }
        if report.skipped > 0 {
            debug!(%channel, skipped = report.skipped, "Fan-out skipped full queues");
        }
        for id in &report.removed {
            Metrics::broadcast_dropped(label, "closed");
            Metrics::connection_terminated("closed");
            debug!(conn_id = %id, %channel, "Deregistered closed connection during fan-out");
        }
        if !report.removed.is_empty() {
            Metrics::connections_set(self.registry.len());
        }
        report.delivered
    }

    /// Route a normalized feed event to its subscribers.
    pub fn publish(&self, event: &FeedEvent) -> usize {
        let timestamp = event.timestamp_ms;
        let message = match &event.payload {
            FeedPayload::Price(tick) => ServerMessage::PriceUpdate {
                data: tick.clone(),
                timestamp,
            },
            FeedPayload::Position(position) => ServerMessage::PositionUpdate {
                data: position.clone(),
                timestamp,
            },
            FeedPayload::Apr(rate) => ServerMessage::AprUpdate {
                data: rate.clone(),
                timestamp,
            },
        };
        match &event.scope {
            EventScope::Global => self.broadcast(&event.channel, &message),
            EventScope::Account(account) => {
                self.broadcast_to_account(account, &event.channel, &message)
            }
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// One heartbeat round: terminate silent connections, ping the rest.
    ///
    /// Returns the terminated connection ids.
    pub fn heartbeat_tick(&self) -> Vec<ConnectionId> {
        let now = self.clock.now_ms();
        let stale = self.registry.stale(now, self.config.liveness_timeout_ms);
        for id in &stale {
            self.registry.send(*id, Outbound::Close);
            if self.registry.remove(*id) {
                Metrics::connection_terminated("liveness");
                info!(conn_id = %id, timeout_ms = self.config.liveness_timeout_ms, "Terminated unresponsive connection");
            }
        }
        if !stale.is_empty() {
            Metrics::connections_set(self.registry.len());
        }

        for id in self.registry.ids() {
            if self.registry.send(id, Outbound::Ping) == SendOutcome::Closed {
                self.disconnect(id, "closed");
            }
        }
        stale
    }

    /// Fetch the watch list and broadcast it on `prices`, changed or not.
    pub async fn refresh_prices(&self) -> usize {
        let resolved = self.prices.resolve(&self.watch_list).await;
        let mut quotes: Vec<PriceQuote> = resolved.into_values().collect();
        quotes.sort_by(|a, b| a.asset_key.cmp(&b.asset_key));
        if quotes.is_empty() {
            debug!("Price refresh produced no quotes");
            return 0;
        }
        self.broadcast(
            &Channel::Prices,
            &ServerMessage::PricesUpdate {
                data: quotes,
                timestamp: self.now_ms(),
            },
        )
    }
}

impl EventSink for Gateway {
    fn deliver(&self, event: &FeedEvent) {
        if let FeedPayload::Position(position) = &event.payload {
            self.portfolio.apply_update(position);
        }
        let delivered = self.publish(event);
        debug!(channel = %event.channel, delivered, "Feed event published");
    }
}
