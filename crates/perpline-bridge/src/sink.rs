//! Event sink registry.
//!
//! Consumers register a sink and get back an opaque handle; dropping
//! interest is an explicit `unsubscribe(handle)`.

use parking_lot::RwLock;
use perpline_core::FeedEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receiver of normalized feed events.
///
/// Called on the bridge's read loop; implementations must not block.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &FeedEvent);
}

/// Opaque registration handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkHandle(u64);

#[derive(Default)]
pub struct SinkRegistry {
    next_id: AtomicU64,
    sinks: RwLock<Vec<(SinkHandle, Arc<dyn EventSink>)>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) -> SinkHandle {
        let handle = SinkHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sinks.write().push((handle, sink));
        handle
    }

    /// Returns `false` if the handle was not registered.
    pub fn unsubscribe(&self, handle: SinkHandle) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|(h, _)| *h != handle);
        sinks.len() != before
    }

    /// Hand an event to every sink, in registration order.
    pub fn dispatch(&self, event: &FeedEvent) {
        let sinks: Vec<Arc<dyn EventSink>> =
            self.sinks.read().iter().map(|(_, s)| s.clone()).collect();
        for sink in sinks {
            sink.deliver(event);
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }
}
