//! Event Dispatcher
//!
//! Process-wide publish/subscribe bus keyed by topic string. Listeners are
//! invoked synchronously in registration order. The dispatcher owns nothing
//! but the registration table; all side effects happen inside listeners.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use super::messages::BusMessage;

/// Listener callback invoked for every message dispatched on its topic.
pub type Listener = Arc<dyn Fn(&BusMessage) + Send + Sync>;

type ListenerTable = RwLock<HashMap<String, Vec<(u64, Listener)>>>;

/// Process-wide publish/subscribe bus.
pub struct EventDispatcher {
    listeners: Arc<ListenerTable>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register `listener` under `topic`.
    ///
    /// Multiple listeners per topic are allowed; invocation order follows
    /// registration order. Returns the disposer handle for this listener
    /// slot: dropping it (or calling [`ListenerGuard::dispose`]) releases
    /// the registration.
    pub fn on<F>(&self, topic: &str, listener: F) -> ListenerGuard
    where
        F: Fn(&BusMessage) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut table = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        table
            .entry(topic.to_string())
            .or_default()
            .push((id, Arc::new(listener)));

        tracing::trace!(topic = %topic, listener_id = id, "listener registered");

        ListenerGuard {
            topic: topic.to_string(),
            id,
            table: Arc::downgrade(&self.listeners),
        }
    }

    /// Dispatch `message` to every listener registered under `topic`.
    ///
    /// No registered listeners is a silent no-op. A panicking listener is
    /// caught and logged; the remaining listeners of the same dispatch still
    /// run and the panic never reaches the caller.
    pub fn dispatch(&self, topic: &str, message: &BusMessage) {
        let snapshot: Vec<Listener> = {
            let table = self
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match table.get(topic) {
                Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => return,
            }
        };

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(message))).is_err() {
                tracing::error!(topic = %topic, "listener panicked during dispatch");
            }
        }
    }

    /// Number of listeners currently registered under `topic`.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Disposer handle for a registered listener.
///
/// Unregisters the listener when dropped, so a subscriber that keeps the
/// guard for its own lifetime cannot leak its slot.
#[must_use = "the listener is unregistered when this guard is dropped"]
pub struct ListenerGuard {
    topic: String,
    id: u64,
    table: Weak<ListenerTable>,
}

impl ListenerGuard {
    /// Release the listener slot explicitly.
    pub fn dispose(self) {
        // Drop does the work.
    }

    fn release(&self) {
        if let Some(table) = self.table.upgrade() {
            let mut table = table.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(entries) = table.get_mut(&self.topic) {
                entries.retain(|(id, _)| *id != self.id);
                if entries.is_empty() {
                    table.remove(&self.topic);
                }
            }
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.release();
    }
}
