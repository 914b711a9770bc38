//! # Pulseboard
//!
//! Live metric dashboard client: one push connection to the server,
//! multiplexed onto per-metric topics for whatever wants to render them.
//!
//! ## Features
//!
//! - **Single push connection**: the server speaks "connect with this full
//!   set", so the client renews one connection instead of juggling many
//! - **Per-metric fan-out**: decoded frames are republished on an in-process
//!   bus under `MetricValue.{metric}`, so a chart follows exactly one metric
//! - **Ordered subscriptions**: bucket order is preserved end to end, from
//!   the registry through the endpoint path to the legend
//! - **Bounded reconnect**: exponential backoff against the live bucket set
//!
//! ## Modules
//!
//! - [`bus`]: topic-keyed publish/subscribe dispatcher
//! - [`registry`]: the ordered set of watched buckets
//! - [`stream`]: push-connection multiplexing and frame decoding
//! - [`catalog`]: read-only client for the server's bucket list
//! - [`session`]: composition root wiring the core together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pulseboard::{Config, MetricSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let session = MetricSession::new(&config)?;
//!
//!     // A view follows one metric; the guard unsubscribes on drop.
//!     let _tap = session.watch_metric("cpu.load", |event| {
//!         println!("{} = {}", event.metric, event.value);
//!     });
//!
//!     // Watching a bucket renews the push connection before returning.
//!     session.add_bucket("cpu.load").await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod catalog;
pub mod config;
pub mod registry;
pub mod session;
pub mod stream;

// Re-export top-level types for convenience
pub use bus::{
    metric_topic, BusMessage, EventDispatcher, Listener, ListenerGuard, MetricEvent,
    ACTIVE_GRAPH_CHANGE, METRIC_VALUE_PREFIX,
};

pub use catalog::{Bucket, CatalogClient, CatalogError};

pub use config::{Config, ConfigError, LoggingConfig, ServerConfig, StreamConfig};

pub use registry::SubscriptionRegistry;

pub use session::MetricSession;

pub use stream::{
    decode_frame, stream_path, ConnectionState, FrameError, ReconnectPolicy, SseDecoder,
    SseTransport, StreamMultiplexer, StreamTransport, TransportError, VALUES_PATH,
};
