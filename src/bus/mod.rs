//! Event Bus
//!
//! Process-wide publish/subscribe for the dashboard core.
//!
//! ## Architecture
//!
//! - **EventDispatcher**: routes messages to listeners by topic string
//! - **Messages**: the payloads and the topic naming scheme
//!
//! ## Topics
//!
//! - `MetricValue.{metric}` - decoded value frames for one metric
//! - `ActiveGraphChange` - the watched bucket set changed
//!
//! The stream layer publishes, view components listen. The bus itself has
//! no transport knowledge and never inspects payloads beyond routing.

mod dispatcher;
mod messages;

pub use dispatcher::{EventDispatcher, Listener, ListenerGuard};
pub use messages::{metric_topic, BusMessage, MetricEvent, ACTIVE_GRAPH_CHANGE, METRIC_VALUE_PREFIX};
