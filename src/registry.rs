//! Subscription Registry
//!
//! Holds the de-duplicated, insertion-ordered set of bucket names the user
//! is watching. Insertion order matters: it determines path-segment order in
//! the push endpoint and, practically, tab/legend order in the views.
//!
//! Every state-changing call publishes exactly one `ActiveGraphChange` event
//! on the bus, after the mutation is visible to readers.

use std::sync::{Arc, PoisonError, RwLock};

use crate::bus::{BusMessage, EventDispatcher, ACTIVE_GRAPH_CHANGE};

/// Ordered set of watched bucket names.
pub struct SubscriptionRegistry {
    dispatcher: Arc<EventDispatcher>,
    buckets: RwLock<Vec<String>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry publishing change events on `dispatcher`.
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            dispatcher,
            buckets: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of the watched buckets in insertion order.
    pub fn buckets(&self) -> Vec<String> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether `name` is currently watched.
    pub fn has_bucket(&self, name: &str) -> bool {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|b| b == name)
    }

    /// Number of watched buckets.
    pub fn len(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing is watched.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `name` to the watched set.
    ///
    /// Empty names and duplicates are silently ignored (returns false, no
    /// event). On an actual change the new snapshot is published under
    /// `ActiveGraphChange` and true is returned.
    pub fn add_bucket(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }

        let snapshot = {
            let mut buckets = self
                .buckets
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if buckets.iter().any(|b| b == name) {
                return false;
            }
            buckets.push(name.to_string());
            buckets.clone()
        };

        tracing::debug!(bucket = %name, total = snapshot.len(), "bucket subscribed");
        self.publish_change(snapshot);
        true
    }

    /// Remove `name` from the watched set.
    ///
    /// Absent names are silently ignored (returns false, no event).
    pub fn remove_bucket(&self, name: &str) -> bool {
        let snapshot = {
            let mut buckets = self
                .buckets
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(pos) = buckets.iter().position(|b| b == name) else {
                return false;
            };
            buckets.remove(pos);
            buckets.clone()
        };

        tracing::debug!(bucket = %name, total = snapshot.len(), "bucket unsubscribed");
        self.publish_change(snapshot);
        true
    }

    /// Remove the bucket at `index`.
    ///
    /// The index is resolved against the ordered set as it is at call time,
    /// never against a caller-cached ordering. Out-of-range indexes are
    /// ignored. Returns the removed name.
    pub fn remove_at(&self, index: usize) -> Option<String> {
        let (name, snapshot) = {
            let mut buckets = self
                .buckets
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if index >= buckets.len() {
                return None;
            }
            let name = buckets.remove(index);
            (name, buckets.clone())
        };

        tracing::debug!(bucket = %name, index, total = snapshot.len(), "bucket unsubscribed");
        self.publish_change(snapshot);
        Some(name)
    }

    fn publish_change(&self, buckets: Vec<String>) {
        self.dispatcher
            .dispatch(ACTIVE_GRAPH_CHANGE, &BusMessage::GraphSetChanged { buckets });
    }
}
