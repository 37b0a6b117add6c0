//! Connection registry.
//!
//! Each live socket owns a bounded outbound queue. The registry holds the
//! sending half; removing an entry drops the sender, which ends the
//! socket's writer task.

use dashmap::DashMap;
use perpline_core::{AccountId, Channel};
use std::collections::HashSet;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Opaque connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frame queued for a socket's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queue full; this frame was skipped.
    Full,
    /// Writer gone; the entry should be deregistered.
    Closed,
    Missing,
}

/// Result of one fan-out pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub skipped: usize,
    pub removed: Vec<ConnectionId>,
}

struct Connection {
    sender: mpsc::Sender<Outbound>,
    account: Option<AccountId>,
    channels: HashSet<Channel>,
    last_seen_ms: u64,
}

pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new anonymous connection with no subscriptions.
    pub fn register(&self, now_ms: u64) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let id = ConnectionId::new();
        self.connections.insert(
            id,
            Connection {
                sender,
                account: None,
                channels: HashSet::new(),
                last_seen_ms: now_ms,
            },
        );
        (id, receiver)
    }

    pub fn remove(&self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| *e.key()).collect()
    }

    /// Record liveness.
    pub fn touch(&self, id: ConnectionId, now_ms: u64) {
        if let Some(mut conn) = self.connections.get_mut(&id) {
            conn.last_seen_ms = conn.last_seen_ms.max(now_ms);
        }
    }

    pub fn set_account(&self, id: ConnectionId, account: AccountId) -> bool {
        match self.connections.get_mut(&id) {
            Some(mut conn) => {
                conn.account = Some(account);
                true
            }
            None => false,
        }
    }

    pub fn account(&self, id: ConnectionId) -> Option<AccountId> {
        self.connections.get(&id).and_then(|c| c.account.clone())
    }

    /// Returns `false` if the connection is gone.
    pub fn subscribe(&self, id: ConnectionId, channel: Channel) -> bool {
        match self.connections.get_mut(&id) {
            Some(mut conn) => {
                conn.channels.insert(channel);
                true
            }
            None => false,
        }
    }

    /// Returns whether the channel was subscribed.
    pub fn unsubscribe(&self, id: ConnectionId, channel: &Channel) -> bool {
        self.connections
            .get_mut(&id)
            .map(|mut conn| conn.channels.remove(channel))
            .unwrap_or(false)
    }

    pub fn is_subscribed(&self, id: ConnectionId, channel: &Channel) -> bool {
        self.connections
            .get(&id)
            .map(|conn| conn.channels.contains(channel))
            .unwrap_or(false)
    }

    pub fn subscriptions(&self, id: ConnectionId) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self
            .connections
            .get(&id)
            .map(|conn| conn.channels.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    /// Queue a frame for one connection without waiting.
    pub fn send(&self, id: ConnectionId, frame: Outbound) -> SendOutcome {
        let Some(conn) = self.connections.get(&id) else {
            return SendOutcome::Missing;
        };
        outcome(conn.sender.try_send(frame))
    }

    /// Queue `text` for every subscriber of `channel`, optionally only
    /// those authenticated as `account`.
    ///
    /// Connections whose writer has gone away are removed. A full queue
    /// skips that connection only.
    pub fn fan_out(&self, channel: &Channel, account: Option<&AccountId>, text: &str) -> FanOut {
        let mut report = FanOut::default();
        for entry in self.connections.iter() {
            let conn = entry.value();
            if !conn.channels.contains(channel) {
                continue;
            }
            if let Some(account) = account {
                if conn.account.as_ref() != Some(account) {
                    continue;
                }
            }
            match outcome(conn.sender.try_send(Outbound::Text(text.to_string()))) {
                SendOutcome::Queued => report.delivered += 1,
                SendOutcome::Full => report.skipped += 1,
                SendOutcome::Closed | SendOutcome::Missing => report.removed.push(*entry.key()),
            }
        }
        // removal after iteration; shard locks are held while iterating
        for id in &report.removed {
            self.connections.remove(id);
        }
        report
    }

    /// Connections not heard from for longer than `timeout_ms`.
    pub fn stale(&self, now_ms: u64, timeout_ms: u64) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|e| now_ms.saturating_sub(e.value().last_seen_ms) > timeout_ms)
            .map(|e| *e.key())
            .collect()
    }
}

fn outcome(result: Result<(), TrySendError<Outbound>>) -> SendOutcome {
    match result {
        Ok(()) => SendOutcome::Queued,
        Err(TrySendError::Full(_)) => SendOutcome::Full,
        Err(TrySendError::Closed(_)) => SendOutcome::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(s: &str) -> AccountId {
        AccountId::parse(s).unwrap()
    }

    #[test]
    fn test_register_and_remove() {
        let registry = ConnectionRegistry::new(8);
        let (a, _rx_a) = registry.register(0);
        let (b, _rx_b) = registry.register(0);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.remove(a));
        assert!(!registry.remove(a));
        assert!(registry.contains(b));
    }

    #[test]
    fn test_subscriptions() {
        let registry = ConnectionRegistry::new(8);
        let (id, _rx) = registry.register(0);
        assert!(registry.subscribe(id, Channel::Prices));
        assert!(registry.subscribe(id, Channel::AprRates));
        assert_eq!(
            registry.subscriptions(id),
            vec![Channel::Prices, Channel::AprRates]
        );
        assert!(registry.unsubscribe(id, &Channel::Prices));
        assert!(!registry.unsubscribe(id, &Channel::Prices));
        assert!(!registry.is_subscribed(id, &Channel::Prices));
    }

    #[test]
    fn test_fan_out_filters_by_channel_and_account() {
        let registry = ConnectionRegistry::new(8);
        let (a, mut rx_a) = registry.register(0);
        let (b, mut rx_b) = registry.register(0);
        let (c, mut rx_c) = registry.register(0);
        registry.subscribe(a, Channel::Portfolio);
        registry.subscribe(b, Channel::Portfolio);
        registry.set_account(a, account("0xa"));
        registry.set_account(b, account("0xb"));
        registry.set_account(c, account("0xa"));

        let report = registry.fan_out(&Channel::Portfolio, Some(&account("0xa")), "hi");
        assert_eq!(report.delivered, 1);
        assert_eq!(rx_a.try_recv().unwrap(), Outbound::Text("hi".to_string()));
        assert!(rx_b.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn test_fan_out_removes_closed_and_skips_full() {
        let registry = ConnectionRegistry::new(1);
        let (open, mut rx_open) = registry.register(0);
        let (full, _rx_full) = registry.register(0);
        let (closed, rx_closed) = registry.register(0);
        for id in [open, full, closed] {
            registry.subscribe(id, Channel::Prices);
        }
        assert_eq!(registry.send(full, Outbound::Ping), SendOutcome::Queued);
        drop(rx_closed);

        let report = registry.fan_out(&Channel::Prices, None, "tick");
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.removed, vec![closed]);
        assert!(!registry.contains(closed));
        assert!(registry.contains(full));
        assert_eq!(rx_open.try_recv().unwrap(), Outbound::Text("tick".to_string()));
    }

    #[test]
    fn test_stale_uses_last_seen() {
        let registry = ConnectionRegistry::new(4);
        let (quiet, _rx1) = registry.register(0);
        let (chatty, _rx2) = registry.register(0);
        registry.touch(chatty, 50_000);
        assert_eq!(registry.stale(61_000, 60_000), vec![quiet]);
        assert!(registry.stale(60_000, 60_000).is_empty());
    }
}
