//! Metric Session
//!
//! Composition root for the live-streaming core: one dispatcher, one
//! registry, one multiplexer, constructed together at application start and
//! handed around by reference. The session wires registry mutations to
//! connection renewals so that every actual change is followed by exactly
//! one renewal, completed before the mutating call returns.

use std::sync::Arc;
use std::time::Duration;

use crate::bus::{metric_topic, BusMessage, EventDispatcher, ListenerGuard, MetricEvent};
use crate::config::Config;
use crate::registry::SubscriptionRegistry;
use crate::stream::{
    ReconnectPolicy, SseTransport, StreamMultiplexer, StreamTransport, TransportError,
};

/// Owns the live-streaming core for one dashboard instance.
pub struct MetricSession {
    dispatcher: Arc<EventDispatcher>,
    registry: Arc<SubscriptionRegistry>,
    multiplexer: StreamMultiplexer,
}

impl MetricSession {
    /// Build a session against the configured server.
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let transport = SseTransport::new(
            &config.server.base_url,
            Duration::from_secs(config.server.request_timeout_secs),
        )?;
        Ok(Self::with_transport(
            Arc::new(transport),
            config.stream.reconnect_policy(),
        ))
    }

    /// Build a session over an explicit transport.
    ///
    /// Used by tests and by alternative wire implementations.
    pub fn with_transport(transport: Arc<dyn StreamTransport>, policy: ReconnectPolicy) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new());
        let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&dispatcher)));
        let multiplexer = StreamMultiplexer::new(
            transport,
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            policy,
        );
        Self {
            dispatcher,
            registry,
            multiplexer,
        }
    }

    /// The shared event bus. Views register their own topic listeners here.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// The subscription registry.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// The stream multiplexer.
    pub fn multiplexer(&self) -> &StreamMultiplexer {
        &self.multiplexer
    }

    /// Subscribe to a bucket.
    ///
    /// On an actual change the push connection is renewed before this
    /// returns; duplicates and empty names return `Ok(false)` without
    /// touching the connection. A renewal error leaves the bucket in the
    /// registry; background retries will keep trying the current set.
    pub async fn add_bucket(&self, name: &str) -> Result<bool, TransportError> {
        if !self.registry.add_bucket(name) {
            return Ok(false);
        }
        self.multiplexer.renew().await?;
        Ok(true)
    }

    /// Unsubscribe from a bucket. Counterpart of [`add_bucket`].
    ///
    /// [`add_bucket`]: MetricSession::add_bucket
    pub async fn remove_bucket(&self, name: &str) -> Result<bool, TransportError> {
        if !self.registry.remove_bucket(name) {
            return Ok(false);
        }
        self.multiplexer.renew().await?;
        Ok(true)
    }

    /// Unsubscribe the bucket at `index` in current registry order.
    pub async fn remove_at(&self, index: usize) -> Result<Option<String>, TransportError> {
        match self.registry.remove_at(index) {
            Some(name) => {
                self.multiplexer.renew().await?;
                Ok(Some(name))
            }
            None => Ok(None),
        }
    }

    /// Register a listener for one metric's live values.
    ///
    /// The listener fires once per decoded frame for `metric`, in arrival
    /// order, and never for any other metric. Keep the returned guard alive
    /// for as long as the view is mounted; dropping it unsubscribes.
    pub fn watch_metric<F>(&self, metric: &str, listener: F) -> ListenerGuard
    where
        F: Fn(&MetricEvent) + Send + Sync + 'static,
    {
        self.dispatcher.on(&metric_topic(metric), move |msg| {
            if let BusMessage::MetricValue(event) = msg {
                listener(event);
            }
        })
    }

    /// Close the push connection.
    pub async fn shutdown(&self) {
        self.multiplexer.shutdown().await;
    }
}
