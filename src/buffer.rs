//! Fact accumulation prior to flush.

use crate::client::TrackingClient;
use crate::error::FactKind;
use crate::record::{MetricRecord, Param, ParamValue, RunId, TagRecord};
use crate::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// In-memory accumulation of a run's params, metrics, and tags.
///
/// Single-owner and thread-unsafe: each buffer belongs to exactly one
/// `RunContext`. Writes never touch the network; everything drains in one
/// logical batch per fact kind at flush time.
///
/// Metrics keep insertion order as given - ordering by (step, timestamp)
/// is the backend's query-time concern, not the buffer's.
#[derive(Debug, Default)]
pub struct FactBuffer {
    params: BTreeMap<String, ParamValue>,
    metrics: Vec<MetricRecord>,
    tags: BTreeMap<String, String>,
}

impl FactBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been buffered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.metrics.is_empty() && self.tags.is_empty()
    }

    /// Number of buffered metric points.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Buffer a param. Keys are unique per run: a repeated key keeps the
    /// latest value and records a warning, never an error.
    pub fn push_param(&mut self, param: Param) {
        if let Some(previous) = self
            .params
            .insert(param.key().to_string(), param.value().clone())
        {
            warn!(
                key = param.key(),
                previous = %previous,
                replacement = %param.value(),
                "param overwritten; keeping latest value"
            );
        }
    }

    /// Buffer a metric point. Append-only: repeated keys grow the sequence.
    pub fn push_metric(&mut self, metric: MetricRecord) {
        self.metrics.push(metric);
    }

    /// Buffer a tag. Overwrite is allowed while the run is open.
    pub fn push_tag(&mut self, tag: TagRecord) {
        self.tags.insert(tag.key().to_string(), tag.value().to_string());
    }

    /// Drain everything to the backend, one batch per fact kind, in the
    /// order params → metrics → tags (the more fundamental configuration
    /// becomes durable first).
    ///
    /// All-or-nothing per batch: a failing batch does not stop the remaining
    /// kinds from being attempted; the failures are aggregated into a single
    /// [`Error::Flush`] listing the kinds that did not land.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Flush`] when at least one batch failed.
    pub fn flush(&mut self, client: &dyn TrackingClient, run_id: &RunId) -> Result<()> {
        let mut failed: Vec<(FactKind, String)> = Vec::new();

        if !self.params.is_empty() {
            let batch: Vec<Param> = self
                .params
                .iter()
                .map(|(key, value)| Param::new(key.clone(), value.clone()))
                .collect();
            match client.log_params(run_id, &batch) {
                Ok(()) => self.params.clear(),
                Err(e) => failed.push((FactKind::Params, e.to_string())),
            }
        }

        if !self.metrics.is_empty() {
            match client.log_metrics(run_id, &self.metrics) {
                Ok(()) => self.metrics.clear(),
                Err(e) => failed.push((FactKind::Metrics, e.to_string())),
            }
        }

        if !self.tags.is_empty() {
            let batch: Vec<TagRecord> = self
                .tags
                .iter()
                .map(|(key, value)| TagRecord::new(key.clone(), value.clone()))
                .collect();
            match client.set_tags(run_id, &batch) {
                Ok(()) => self.tags.clear(),
                Err(e) => failed.push((FactKind::Tags, e.to_string())),
            }
        }

        if failed.is_empty() {
            debug!(run_id = %run_id, "fact buffer flushed");
            Ok(())
        } else {
            Err(Error::Flush { failed })
        }
    }
}
