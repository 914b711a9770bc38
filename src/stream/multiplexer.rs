//! Stream Multiplexer
//!
//! Owns the single live push connection. The wire protocol has no
//! subscribe/unsubscribe frames, only "connect with this full set", so every
//! registry change renews the connection: the old one is closed first, then
//! a new one is opened scoped to the current bucket set. Decoded frames are
//! republished on the bus under `MetricValue.{metric}`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::bus::{metric_topic, BusMessage, EventDispatcher, MetricEvent};
use crate::registry::SubscriptionRegistry;

use super::error::{FrameError, TransportError};
use super::transport::{FrameStream, StreamTransport};

/// Path prefix of the push-stream endpoint.
pub const VALUES_PATH: &str = "/values/";

/// Observable connection state. There is no `Connecting`: a renewal is
/// complete, success or failure, by the time it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Reconnect policy for refused or dropped connections.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts before giving up
    pub max_attempts: u32,
    /// Base delay, doubled on every attempt
    pub base_delay_ms: u64,
    /// Upper bound on the per-attempt delay
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectPolicy {
    fn delay(&self, attempt: u32) -> std::time::Duration {
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_delay_ms);
        std::time::Duration::from_millis(ms)
    }
}

/// Build the push endpoint path for an ordered bucket set.
///
/// Each name is followed by the `/` delimiter: `["a", "b"]` becomes
/// `/values/a/b/`. Registry order is preserved.
pub fn stream_path(buckets: &[String]) -> String {
    let mut path = String::from(VALUES_PATH);
    for bucket in buckets {
        path.push_str(bucket);
        path.push('/');
    }
    path
}

/// Decode one frame body into a [`MetricEvent`].
pub fn decode_frame(body: &str) -> Result<MetricEvent, FrameError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(FrameError::Empty);
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Maintains at most one open push connection whose subscription matches
/// the registry, and translates inbound frames into bus events.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct StreamMultiplexer {
    inner: Arc<MuxInner>,
}

struct MuxInner {
    transport: Arc<dyn StreamTransport>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<EventDispatcher>,
    policy: ReconnectPolicy,
    /// Bumped on every renewal and shutdown. A reader stamped with an older
    /// generation may no longer dispatch, which is what makes
    /// close-before-open airtight even with frames already in flight.
    generation: AtomicU64,
    /// Consecutive failed connection attempts
    attempts: AtomicU32,
    conn: Mutex<Connection>,
}

struct Connection {
    state: ConnectionState,
    endpoint: Option<String>,
    reader: Option<JoinHandle<()>>,
}

impl StreamMultiplexer {
    /// Create a closed multiplexer over `transport`.
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        registry: Arc<SubscriptionRegistry>,
        dispatcher: Arc<EventDispatcher>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(MuxInner {
                transport,
                registry,
                dispatcher,
                policy,
                generation: AtomicU64::new(0),
                attempts: AtomicU32::new(0),
                conn: Mutex::new(Connection {
                    state: ConnectionState::Closed,
                    endpoint: None,
                    reader: None,
                }),
            }),
        }
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.conn.lock().await.state
    }

    /// Endpoint path of the open connection, if any.
    pub async fn endpoint(&self) -> Option<String> {
        self.inner.conn.lock().await.endpoint.clone()
    }

    /// Close any open connection and reopen scoped to the current bucket
    /// set. An empty set leaves the connection closed.
    ///
    /// On failure the multiplexer stays closed and retries in the
    /// background with exponential backoff, re-reading the live set on
    /// every attempt. A call to `renew` resets the retry budget.
    pub async fn renew(&self) -> Result<(), TransportError> {
        self.inner.attempts.store(0, Ordering::SeqCst);
        Self::renew_inner(&self.inner).await
    }

    /// Close the connection and stop dispatching frames.
    ///
    /// Terminal until the next `renew`; pending reconnect attempts are
    /// abandoned.
    pub async fn shutdown(&self) {
        let mut conn = self.inner.conn.lock().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        Self::close_locked(&mut conn);
        tracing::info!("stream multiplexer shut down");
    }

    async fn renew_inner(inner: &Arc<MuxInner>) -> Result<(), TransportError> {
        // The lock serializes the whole close-then-open swap; no second
        // connection can be opened while one is being torn down.
        let mut conn = inner.conn.lock().await;

        let my_gen = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Self::close_locked(&mut conn);

        let buckets = inner.registry.buckets();
        if buckets.is_empty() {
            tracing::debug!("no buckets watched, connection stays closed");
            return Ok(());
        }

        let path = stream_path(&buckets);
        match inner.transport.open(&path).await {
            Ok(frames) => {
                inner.attempts.store(0, Ordering::SeqCst);
                let reader = tokio::spawn(Self::read_frames(Arc::clone(inner), frames, my_gen));
                conn.state = ConnectionState::Open;
                conn.endpoint = Some(path.clone());
                conn.reader = Some(reader);
                tracing::info!(endpoint = %path, buckets = buckets.len(), "push connection renewed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(endpoint = %path, error = %e, "push connection failed to open");
                Self::schedule_retry(inner, my_gen);
                Err(e)
            }
        }
    }

    fn close_locked(conn: &mut Connection) {
        if let Some(reader) = conn.reader.take() {
            reader.abort();
        }
        if conn.state == ConnectionState::Open {
            tracing::debug!(endpoint = ?conn.endpoint, "push connection closed");
        }
        conn.state = ConnectionState::Closed;
        conn.endpoint = None;
    }

    async fn read_frames(inner: Arc<MuxInner>, mut frames: FrameStream, my_gen: u64) {
        while let Some(item) = frames.next().await {
            if inner.generation.load(Ordering::SeqCst) != my_gen {
                // A renewal or shutdown superseded this connection while a
                // frame was in flight; it must not be delivered.
                return;
            }
            match item {
                Ok(body) => match decode_frame(&body) {
                    Ok(event) => {
                        let topic = metric_topic(&event.metric);
                        inner
                            .dispatcher
                            .dispatch(&topic, &BusMessage::MetricValue(event));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, body = %body, "dropping malformed frame");
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "push stream interrupted");
                    break;
                }
            }
        }

        // The stream ended or failed. If this reader is still current, the
        // connection is gone underneath us: record the closed state and
        // reconnect against whatever the set is by then.
        let mut conn = inner.conn.lock().await;
        if inner.generation.load(Ordering::SeqCst) != my_gen {
            return;
        }
        conn.state = ConnectionState::Closed;
        conn.endpoint = None;
        conn.reader = None;
        drop(conn);

        tracing::warn!("push connection dropped");
        Self::schedule_retry(&inner, my_gen);
    }

    fn schedule_retry(inner: &Arc<MuxInner>, failed_gen: u64) {
        let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt >= inner.policy.max_attempts {
            tracing::error!(
                attempts = attempt,
                "reconnect budget exhausted, staying closed"
            );
            return;
        }

        let delay = inner.policy.delay(attempt);
        tracing::info!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "scheduling reconnect");

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.generation.load(Ordering::SeqCst) != failed_gen {
                // A newer renewal already ran; this retry is stale.
                return;
            }
            let _ = Self::renew_inner(&inner).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::transport::mock::MockTransport;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 3,
            base_delay_ms: 2,
            max_delay_ms: 10,
        }
    }

    fn setup(
        policy: ReconnectPolicy,
    ) -> (
        Arc<MockTransport>,
        Arc<EventDispatcher>,
        Arc<SubscriptionRegistry>,
        StreamMultiplexer,
    ) {
        let transport = MockTransport::new();
        let dispatcher = Arc::new(EventDispatcher::new());
        let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&dispatcher)));
        let mux = StreamMultiplexer::new(
            transport.clone(),
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            policy,
        );
        (transport, dispatcher, registry, mux)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[test]
    fn test_stream_path() {
        assert_eq!(stream_path(&[]), "/values/");
        assert_eq!(stream_path(&["a".to_string()]), "/values/a/");
        assert_eq!(
            stream_path(&["cpu.load".to_string(), "mem.used".to_string()]),
            "/values/cpu.load/mem.used/"
        );
    }

    #[test]
    fn test_decode_frame() {
        let event = decode_frame(r#"{"metric":"cpu.load","ts":1000,"value":42}"#).unwrap();
        assert_eq!(event.metric, "cpu.load");
        assert_eq!(event.ts, 1000);
        assert_eq!(event.value, 42.0);

        assert!(matches!(decode_frame(""), Err(FrameError::Empty)));
        assert!(matches!(decode_frame("   "), Err(FrameError::Empty)));
        assert!(matches!(decode_frame("not json"), Err(FrameError::Json(_))));
        // Missing required field
        assert!(matches!(
            decode_frame(r#"{"metric":"cpu.load","ts":1000}"#),
            Err(FrameError::Json(_))
        ));
    }

    #[test]
    fn test_reconnect_delay_doubles_and_caps() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        };
        assert_eq!(policy.delay(0).as_millis(), 1000);
        assert_eq!(policy.delay(1).as_millis(), 2000);
        assert_eq!(policy.delay(2).as_millis(), 4000);
        assert_eq!(policy.delay(10).as_millis(), 30_000);
    }

    #[tokio::test]
    async fn test_renew_with_empty_set_stays_closed() {
        let (transport, _dispatcher, _registry, mux) = setup(fast_policy());

        mux.renew().await.unwrap();

        assert_eq!(mux.state().await, ConnectionState::Closed);
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    async fn test_renew_targets_current_set() {
        let (transport, _dispatcher, registry, mux) = setup(fast_policy());
        registry.add_bucket("a");
        registry.add_bucket("b");

        mux.renew().await.unwrap();

        assert_eq!(mux.state().await, ConnectionState::Open);
        assert_eq!(mux.endpoint().await.as_deref(), Some("/values/a/b/"));
        assert_eq!(transport.opened(), vec!["/values/a/b/"]);
    }

    #[tokio::test]
    async fn test_old_connection_closed_before_new_open() {
        let (transport, _dispatcher, registry, mux) = setup(fast_policy());
        registry.add_bucket("a");
        mux.renew().await.unwrap();

        registry.add_bucket("b");
        mux.renew().await.unwrap();
        settle().await;

        assert_eq!(transport.opened(), vec!["/values/a/", "/values/a/b/"]);
        // The first reader was torn down, nothing drains its stream anymore.
        assert!(transport.is_closed(0));
        assert!(!transport.is_closed(1));
    }

    #[tokio::test]
    async fn test_frames_dispatch_to_metric_topic_exactly_once() {
        let (transport, dispatcher, registry, mux) = setup(fast_policy());
        registry.add_bucket("cpu.load");
        mux.renew().await.unwrap();

        let received = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        let _cpu = dispatcher.on("MetricValue.cpu.load", move |msg| {
            if let BusMessage::MetricValue(e) = msg {
                received_clone.lock().unwrap().push(e.clone());
            }
        });

        let off_topic = Arc::new(AtomicUsize::new(0));
        let off_topic_clone = Arc::clone(&off_topic);
        let _mem = dispatcher.on("MetricValue.mem.used", move |_| {
            off_topic_clone.fetch_add(1, Ordering::SeqCst);
        });

        transport.push_frame(r#"{"metric":"cpu.load","ts":1000,"value":42}"#);
        settle().await;

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].ts, 1000);
        assert_eq!(received[0].value, 42.0);
        assert_eq!(off_topic.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_frames_delivered_in_arrival_order() {
        let (transport, dispatcher, registry, mux) = setup(fast_policy());
        registry.add_bucket("cpu.load");
        mux.renew().await.unwrap();

        let values = Arc::new(StdMutex::new(Vec::new()));
        let values_clone = Arc::clone(&values);
        let _g = dispatcher.on("MetricValue.cpu.load", move |msg| {
            if let BusMessage::MetricValue(e) = msg {
                values_clone.lock().unwrap().push(e.value);
            }
        });

        for v in [1.0, 2.0, 3.0] {
            transport.push_frame(&format!(
                r#"{{"metric":"cpu.load","ts":1000,"value":{}}}"#,
                v
            ));
        }
        settle().await;

        assert_eq!(*values.lock().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped_stream_continues() {
        let (transport, dispatcher, registry, mux) = setup(fast_policy());
        registry.add_bucket("cpu.load");
        mux.renew().await.unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let _g = dispatcher.on("MetricValue.cpu.load", move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        transport.push_frame("this is not json");
        transport.push_frame(r#"{"metric":"cpu.load","ts":2000,"value":7}"#);
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(mux.state().await, ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_connect_failure_retries_then_gives_up() {
        let (transport, _dispatcher, registry, mux) = setup(ReconnectPolicy {
            max_attempts: 2,
            base_delay_ms: 2,
            max_delay_ms: 10,
        });
        registry.add_bucket("a");
        transport.set_fail_connect(true);

        assert!(mux.renew().await.is_err());
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Initial attempt plus two bounded retries.
        assert_eq!(transport.open_count(), 3);
        assert_eq!(mux.state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_dropped_stream_reconnects_with_live_set() {
        let (transport, _dispatcher, registry, mux) = setup(fast_policy());
        registry.add_bucket("a");
        mux.renew().await.unwrap();

        // The set changes while connected; the reconnect after the drop
        // must pick up the current set, not the one at connect time.
        registry.add_bucket("b");
        transport.interrupt();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(mux.state().await, ConnectionState::Open);
        assert_eq!(transport.opened().last().map(String::as_str), Some("/values/a/b/"));
    }

    #[tokio::test]
    async fn test_stale_retry_superseded_by_renew() {
        let (transport, _dispatcher, registry, mux) = setup(ReconnectPolicy {
            max_attempts: 3,
            base_delay_ms: 40,
            max_delay_ms: 40,
        });
        registry.add_bucket("a");
        transport.set_fail_connect(true);
        assert!(mux.renew().await.is_err());

        // A user-triggered renewal lands before the pending retry fires.
        transport.set_fail_connect(false);
        registry.add_bucket("b");
        mux.renew().await.unwrap();
        let opens_after_renew = transport.open_count();

        tokio::time::sleep(Duration::from_millis(120)).await;

        // The stale retry saw the newer generation and did nothing.
        assert_eq!(transport.open_count(), opens_after_renew);
        assert_eq!(mux.endpoint().await.as_deref(), Some("/values/a/b/"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_and_stops_dispatch() {
        let (transport, dispatcher, registry, mux) = setup(fast_policy());
        registry.add_bucket("cpu.load");
        mux.renew().await.unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let _g = dispatcher.on("MetricValue.cpu.load", move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        mux.shutdown().await;
        transport.push_frame(r#"{"metric":"cpu.load","ts":1000,"value":1}"#);
        settle().await;

        assert_eq!(mux.state().await, ConnectionState::Closed);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        // No reconnect after an explicit shutdown.
        assert_eq!(transport.open_count(), 1);
    }
}
