//! Metric Record - one point in an append-only time series

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single metric data point.
///
/// A metric key names a sequence, not a scalar: logging the same key again
/// appends another point. Points are kept in insertion order until query
/// time, where they sort by `(step, timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    key: String,
    value: f64,
    step: u64,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Create a metric point at the given step with the current timestamp.
    ///
    /// # Arguments
    ///
    /// * `key` - Metric name (e.g., "loss", "accuracy")
    /// * `value` - Observed value
    /// * `step` - Training step or epoch number (0 for one-shot metrics)
    #[must_use]
    pub fn new(key: impl Into<String>, value: f64, step: u64) -> Self {
        Self {
            key: key.into(),
            value,
            step,
            timestamp: Utc::now(),
        }
    }

    /// Get the metric key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the observed value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the step number.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Get the wall-clock timestamp of the observation.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Sort key for query-time ordering: step first, then timestamp.
    ///
    /// Points with equal steps keep their relative insertion order when
    /// sorted stably by this key.
    #[must_use]
    pub fn order_key(&self) -> (u64, i64) {
        (self.step, self.timestamp.timestamp_micros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_record_new() {
        let metric = MetricRecord::new("accuracy", 0.94, 0);
        assert_eq!(metric.key(), "accuracy");
        assert!((metric.value() - 0.94).abs() < f64::EPSILON);
        assert_eq!(metric.step(), 0);
    }

    #[test]
    fn test_order_key_sorts_by_step_first() {
        let late = MetricRecord::new("loss", 0.1, 5);
        let early = MetricRecord::new("loss", 0.9, 1);
        assert!(early.order_key() < late.order_key());
    }

    #[test]
    fn test_metric_round_trips() {
        let metric = MetricRecord::new("loss", 0.5, 3);
        let json = serde_json::to_string(&metric).unwrap();
        let back: MetricRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(metric, back);
    }
}
