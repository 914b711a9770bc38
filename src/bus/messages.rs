//! Bus Message Types
//!
//! Defines the payloads routed by the event dispatcher and the topic naming
//! scheme shared between the stream layer and view subscribers.

use serde::{Deserialize, Serialize};

/// Topic prefix for decoded metric frames.
///
/// A frame for metric `cpu.load` is published under `MetricValue.cpu.load`,
/// so a listener can follow one metric without receiving any other.
pub const METRIC_VALUE_PREFIX: &str = "MetricValue.";

/// Topic for subscription registry mutations.
pub const ACTIVE_GRAPH_CHANGE: &str = "ActiveGraphChange";

/// Build the dispatcher topic for a metric name.
pub fn metric_topic(metric: &str) -> String {
    format!("{}{}", METRIC_VALUE_PREFIX, metric)
}

/// One decoded value frame from the push stream.
///
/// Immutable once constructed; the wire body is a single JSON object
/// `{"metric": ..., "ts": ..., "value": ...}` with `ts` in epoch millis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    /// Metric name
    pub metric: String,
    /// Timestamp in epoch milliseconds
    pub ts: i64,
    /// Sampled value
    pub value: f64,
}

impl MetricEvent {
    /// Timestamp as a UTC datetime, if representable.
    pub fn datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.ts)
    }
}

/// Messages routed by the dispatcher.
///
/// The dispatcher never inspects these beyond the topic they were published
/// under; consumers match on the variant they care about.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// A decoded metric frame, published under `MetricValue.{metric}`.
    MetricValue(MetricEvent),
    /// The watched bucket set changed, published under `ActiveGraphChange`.
    /// Carries the post-mutation snapshot in registry order.
    GraphSetChanged {
        /// The full bucket set after the mutation
        buckets: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_topic() {
        assert_eq!(metric_topic("cpu.load"), "MetricValue.cpu.load");
        assert_eq!(metric_topic("mem.used"), "MetricValue.mem.used");
    }

    #[test]
    fn test_metric_event_deserialize() {
        let json = r#"{"metric": "cpu.load", "ts": 1000, "value": 42}"#;
        let event: MetricEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.metric, "cpu.load");
        assert_eq!(event.ts, 1000);
        assert_eq!(event.value, 42.0);
    }

    #[test]
    fn test_metric_event_datetime() {
        let event = MetricEvent {
            metric: "mood".to_string(),
            ts: 1699000000000,
            value: 8.0,
        };
        let dt = event.datetime().unwrap();
        assert_eq!(dt.timestamp_millis(), 1699000000000);
    }

    #[test]
    fn test_metric_event_serialize_round_trip_fields() {
        let event = MetricEvent {
            metric: "steps".to_string(),
            ts: 1000,
            value: 7.5,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"metric\":\"steps\""));
        assert!(json.contains("\"ts\":1000"));
        assert!(json.contains("\"value\":7.5"));
    }
}
