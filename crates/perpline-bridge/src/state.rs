//! Per-table subscription state machine.
//!
//! ```text
//! Disconnected -> Subscribing -> Streaming
//!                     |             |
//!                     v             v
//!                   Error  ->  Resubscribing -> Streaming
//! ```
//!
//! Any state may drop to `Disconnected` on shutdown.

use crate::protocol::Table;
use parking_lot::RwLock;
use perpline_telemetry::Metrics;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedState {
    Disconnected,
    Subscribing,
    Streaming,
    Error,
    Resubscribing,
}

impl FeedState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Subscribing => "subscribing",
            Self::Streaming => "streaming",
            Self::Error => "error",
            Self::Resubscribing => "resubscribing",
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition(self, next: FeedState) -> bool {
        use FeedState::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Subscribing)
                | (Subscribing, Streaming)
                | (Subscribing, Error)
                | (Streaming, Error)
                | (Error, Resubscribing)
                | (Resubscribing, Streaming)
                | (Resubscribing, Error)
        )
    }
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of every followed table.
#[derive(Debug)]
pub struct TableStates {
    states: RwLock<HashMap<Table, FeedState>>,
}

impl TableStates {
    pub fn new(tables: &[Table]) -> Self {
        let states = tables
            .iter()
            .map(|t| {
                Metrics::change_feed_state(t.as_str(), FeedState::Disconnected.as_str());
                (*t, FeedState::Disconnected)
            })
            .collect();
        Self {
            states: RwLock::new(states),
        }
    }

    pub fn get(&self, table: Table) -> Option<FeedState> {
        self.states.read().get(&table).copied()
    }

    pub fn is_streaming(&self, table: Table) -> bool {
        self.get(table) == Some(FeedState::Streaming)
    }

    pub fn tables(&self) -> Vec<Table> {
        let mut tables: Vec<Table> = self.states.read().keys().copied().collect();
        tables.sort();
        tables
    }

    /// Apply a transition. Illegal transitions and unknown tables are ignored.
    pub fn transition(&self, table: Table, next: FeedState) -> bool {
        let mut states = self.states.write();
        let Some(current) = states.get_mut(&table) else {
            return false;
        };
        if *current == next {
            return true;
        }
        if !current.can_transition(next) {
            debug!(%table, from = %current, to = %next, "Ignoring illegal change-feed transition");
            return false;
        }
        info!(%table, from = %current, to = %next, "Change-feed state");
        *current = next;
        Metrics::change_feed_state(table.as_str(), next.as_str());
        true
    }

    /// Start (re)subscribing a table: `Disconnected -> Subscribing`,
    /// `Error -> Resubscribing`.
    pub fn begin_subscribe(&self, table: Table) -> FeedState {
        let next = match self.get(table) {
            Some(FeedState::Error) => FeedState::Resubscribing,
            _ => FeedState::Subscribing,
        };
        self.transition(table, next);
        next
    }

    /// Connection lost: anything live goes to `Error`.
    pub fn fail_all(&self) {
        for table in self.tables() {
            self.transition(table, FeedState::Error);
        }
    }

    pub fn disconnect_all(&self) {
        for table in self.tables() {
            self.transition(table, FeedState::Disconnected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let states = TableStates::new(&[Table::Positions]);
        assert_eq!(states.begin_subscribe(Table::Positions), FeedState::Subscribing);
        assert!(states.transition(Table::Positions, FeedState::Streaming));
        assert!(states.is_streaming(Table::Positions));
    }

    #[test]
    fn test_error_then_resubscribe() {
        let states = TableStates::new(&[Table::AprHistory]);
        states.begin_subscribe(Table::AprHistory);
        states.transition(Table::AprHistory, FeedState::Streaming);
        states.fail_all();
        assert_eq!(states.get(Table::AprHistory), Some(FeedState::Error));
        assert_eq!(
            states.begin_subscribe(Table::AprHistory),
            FeedState::Resubscribing
        );
        assert!(states.transition(Table::AprHistory, FeedState::Streaming));
    }

    #[test]
    fn test_illegal_transition_ignored() {
        let states = TableStates::new(&[Table::Positions]);
        assert!(!states.transition(Table::Positions, FeedState::Streaming));
        assert_eq!(states.get(Table::Positions), Some(FeedState::Disconnected));
        assert!(!states.transition(Table::PriceHistory, FeedState::Subscribing));
    }

    #[test]
    fn test_fail_all_from_disconnected_is_noop() {
        let states = TableStates::new(&[Table::Positions]);
        states.fail_all();
        assert_eq!(states.get(Table::Positions), Some(FeedState::Disconnected));
    }
}
