//! In-memory tracking backend using `DashMap`.
//!
//! This is the default backend when no tracking URI is configured - data is
//! lost on process exit. It doubles as the reference implementation for the
//! idempotency contract and as the test double for the lifecycle suites.

use super::TrackingClient;
use crate::record::{
    ArtifactRecord, ExperimentId, ExperimentRecord, MetricRecord, Param, ParamValue, RunId,
    RunRecord, RunState, TagRecord,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Process-local tracking backend.
///
/// Thread-safe: experiment creation is at-most-once under concurrent writers
/// (`DashMap` entry semantics), and independent runs never contend on the
/// same entries.
#[derive(Debug, Default)]
pub struct MemoryClient {
    experiments: DashMap<String, ExperimentRecord>,
    names: DashMap<String, ExperimentId>,
    runs: DashMap<String, RunRecord>,
    params: DashMap<String, BTreeMap<String, ParamValue>>,
    tags: DashMap<String, BTreeMap<String, String>>,
    metrics: DashMap<String, Vec<MetricRecord>>,
    artifacts: DashMap<String, Vec<(ArtifactRecord, Vec<u8>)>>,
}

impl MemoryClient {
    /// Create a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of experiments stored.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Number of runs stored.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Get an experiment record by id.
    #[must_use]
    pub fn experiment(&self, experiment_id: &ExperimentId) -> Option<ExperimentRecord> {
        self.experiments
            .get(experiment_id.as_str())
            .map(|e| e.clone())
    }

    /// Get a run record by id.
    #[must_use]
    pub fn run(&self, run_id: &RunId) -> Option<RunRecord> {
        self.runs.get(run_id.as_str()).map(|r| r.clone())
    }

    /// Ids of every stored run, in no particular order.
    #[must_use]
    pub fn run_ids(&self) -> Vec<RunId> {
        self.runs
            .iter()
            .map(|entry| entry.value().run_id().clone())
            .collect()
    }

    /// Params persisted for a run, latest value per key.
    #[must_use]
    pub fn params_for_run(&self, run_id: &RunId) -> BTreeMap<String, ParamValue> {
        self.params
            .get(run_id.as_str())
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Tags persisted for a run, latest value per key.
    #[must_use]
    pub fn tags_for_run(&self, run_id: &RunId) -> BTreeMap<String, String> {
        self.tags
            .get(run_id.as_str())
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Metric points for a run, ordered by step then timestamp.
    ///
    /// Points with equal order keys keep their insertion order (stable sort),
    /// so a sequence logged at one step reads back as submitted.
    #[must_use]
    pub fn metrics_for_run(&self, run_id: &RunId) -> Vec<MetricRecord> {
        let mut points = self
            .metrics
            .get(run_id.as_str())
            .map(|m| m.clone())
            .unwrap_or_default();
        points.sort_by_key(MetricRecord::order_key);
        points
    }

    /// Metric points for one key of a run, in query order.
    #[must_use]
    pub fn metrics_for_key(&self, run_id: &RunId, key: &str) -> Vec<MetricRecord> {
        self.metrics_for_run(run_id)
            .into_iter()
            .filter(|m| m.key() == key)
            .collect()
    }

    /// Artifact records uploaded for a run.
    #[must_use]
    pub fn artifacts_for_run(&self, run_id: &RunId) -> Vec<ArtifactRecord> {
        self.artifacts
            .get(run_id.as_str())
            .map(|entries| entries.iter().map(|(record, _)| record.clone()).collect())
            .unwrap_or_default()
    }

    /// Uploaded bytes for one artifact of a run.
    #[must_use]
    pub fn artifact_bytes(&self, run_id: &RunId, relative_path: &str) -> Option<Vec<u8>> {
        self.artifacts.get(run_id.as_str()).and_then(|entries| {
            entries
                .iter()
                .find(|(record, _)| record.relative_path() == relative_path)
                .map(|(_, bytes)| bytes.clone())
        })
    }
}

impl TrackingClient for MemoryClient {
    fn create_experiment(&self, name: &str) -> Result<ExperimentId> {
        // entry() makes the name->id insertion at-most-once: the loser of a
        // concurrent race observes the winner's id.
        let id = self
            .names
            .entry(name.to_string())
            .or_insert_with(ExperimentId::mint)
            .value()
            .clone();
        self.experiments
            .entry(id.as_str().to_string())
            .or_insert_with(|| ExperimentRecord::new(id.clone(), name));
        Ok(id)
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentId>> {
        Ok(self.names.get(name).map(|id| id.clone()))
    }

    fn create_run(&self, experiment_id: &ExperimentId) -> Result<RunRecord> {
        if !self.experiments.contains_key(experiment_id.as_str()) {
            return Err(Error::Backend(format!(
                "unknown experiment: {experiment_id}"
            )));
        }
        let run = RunRecord::new(RunId::mint(), experiment_id.clone());
        self.runs
            .insert(run.run_id().as_str().to_string(), run.clone());
        Ok(run)
    }

    fn log_params(&self, run_id: &RunId, params: &[Param]) -> Result<()> {
        let mut entry = self.params.entry(run_id.as_str().to_string()).or_default();
        for param in params {
            entry.insert(param.key().to_string(), param.value().clone());
        }
        Ok(())
    }

    fn log_metrics(&self, run_id: &RunId, metrics: &[MetricRecord]) -> Result<()> {
        self.metrics
            .entry(run_id.as_str().to_string())
            .or_default()
            .extend_from_slice(metrics);
        Ok(())
    }

    fn set_tags(&self, run_id: &RunId, tags: &[TagRecord]) -> Result<()> {
        let mut entry = self.tags.entry(run_id.as_str().to_string()).or_default();
        for tag in tags {
            entry.insert(tag.key().to_string(), tag.value().to_string());
        }
        Ok(())
    }

    fn log_artifact(
        &self,
        run_id: &RunId,
        relative_path: &str,
        bytes: &[u8],
        checksum: &str,
    ) -> Result<()> {
        let record = ArtifactRecord::new(relative_path, bytes.len() as u64, checksum);
        let mut entry = self
            .artifacts
            .entry(run_id.as_str().to_string())
            .or_default();
        // Same path replaces in place: re-uploading after a transient failure
        // must not leave duplicate entries.
        if let Some(existing) = entry
            .iter_mut()
            .find(|(r, _)| r.relative_path() == relative_path)
        {
            *existing = (record, bytes.to_vec());
        } else {
            entry.push((record, bytes.to_vec()));
        }
        Ok(())
    }

    fn update_run_state(
        &self,
        run_id: &RunId,
        state: RunState,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut run = self
            .runs
            .get_mut(run_id.as_str())
            .ok_or_else(|| Error::Backend(format!("unknown run: {run_id}")))?;
        run.finalize(state, ended_at);
        Ok(())
    }
}
