//! Local file-based tracking backend.
//!
//! Records are plain JSON documents under a root directory, so a run's
//! history survives the process and is readable by any later client
//! pointed at the same root:
//!
//! ```text
//! <root>/
//!   by_name/<sha256(name)>                    experiment name index (one id)
//!   run_index/<run_id>                        run -> experiment index
//!   experiments/<exp_id>/experiment.json
//!   experiments/<exp_id>/runs/<run_id>/
//!     run.json                                lifecycle row
//!     params.json                             latest value per key
//!     tags.json                               latest value per key
//!     metrics.jsonl                           append-only, one point per line
//!     artifacts.json                          records keyed by relative path
//!     artifacts/<relative_path>               raw bytes
//! ```
//!
//! Write pattern is append-or-replace: metric points append as JSON lines
//! (a repeated point stays a duplicate data point), everything else is
//! rewritten atomically via temp-file-and-rename, so repeating a call with
//! the same payload leaves the same bytes on disk.

use super::TrackingClient;
use crate::record::{
    ArtifactRecord, ExperimentId, ExperimentRecord, MetricRecord, Param, ParamValue, RunId,
    RunRecord, RunState, TagRecord,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File-based tracking backend rooted at a local directory.
#[derive(Debug)]
pub struct FileStoreClient {
    root: PathBuf,
}

impl FileStoreClient {
    /// Open (or initialize) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendUnavailable`] if the root layout cannot be
    /// created - resolution happens before any work is performed, so this
    /// is surfaced immediately rather than retried.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in ["by_name", "run_index", "experiments"] {
            std::fs::create_dir_all(root.join(dir)).map_err(|e| Error::BackendUnavailable {
                uri: root.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(Self { root })
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn name_index_path(&self, name: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        self.root.join("by_name").join(hex::encode(hasher.finalize()))
    }

    fn experiment_dir(&self, experiment_id: &ExperimentId) -> PathBuf {
        self.root.join("experiments").join(experiment_id.as_str())
    }

    fn run_dir(&self, run_id: &RunId) -> Result<PathBuf> {
        let index = self.root.join("run_index").join(run_id.as_str());
        let experiment_id = match std::fs::read_to_string(&index) {
            Ok(id) => ExperimentId(id.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Backend(format!("unknown run: {run_id}")));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self
            .experiment_dir(&experiment_id)
            .join("runs")
            .join(run_id.as_str()))
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read back a run's lifecycle row.
    pub fn read_run(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        Self::read_json(&self.run_dir(run_id)?.join("run.json"))
    }

    /// Read back a run's params, latest value per key.
    pub fn read_params(&self, run_id: &RunId) -> Result<BTreeMap<String, ParamValue>> {
        Ok(Self::read_json(&self.run_dir(run_id)?.join("params.json"))?.unwrap_or_default())
    }

    /// Read back a run's tags, latest value per key.
    pub fn read_tags(&self, run_id: &RunId) -> Result<BTreeMap<String, String>> {
        Ok(Self::read_json(&self.run_dir(run_id)?.join("tags.json"))?.unwrap_or_default())
    }

    /// Read back a run's metric points, ordered by step then timestamp.
    pub fn read_metrics(&self, run_id: &RunId) -> Result<Vec<MetricRecord>> {
        let path = self.run_dir(run_id)?.join("metrics.jsonl");
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut points = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            points.push(serde_json::from_str(line)?);
        }
        points.sort_by_key(MetricRecord::order_key);
        Ok(points)
    }

    /// Read back a run's artifact records.
    pub fn read_artifacts(&self, run_id: &RunId) -> Result<Vec<ArtifactRecord>> {
        let map: BTreeMap<String, ArtifactRecord> =
            Self::read_json(&self.run_dir(run_id)?.join("artifacts.json"))?.unwrap_or_default();
        Ok(map.into_values().collect())
    }

    /// Filesystem path holding an uploaded artifact's bytes.
    pub fn artifact_path(&self, run_id: &RunId, relative_path: &str) -> Result<PathBuf> {
        Ok(self.run_dir(run_id)?.join("artifacts").join(relative_path))
    }
}

impl TrackingClient for FileStoreClient {
    fn create_experiment(&self, name: &str) -> Result<ExperimentId> {
        let index = self.name_index_path(name);

        // hard_link is the at-most-once primitive: the content is complete
        // before the link lands on the final path, and a concurrent loser
        // gets AlreadyExists with the winner's id readable.
        let id = {
            let tmp = self
                .root
                .join("by_name")
                .join(format!(".tmp-{}", uuid::Uuid::new_v4()));
            let candidate = ExperimentId::mint();
            std::fs::write(&tmp, candidate.as_str())?;
            let outcome = std::fs::hard_link(&tmp, &index);
            std::fs::remove_file(&tmp)?;
            match outcome {
                Ok(()) => candidate,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    ExperimentId(std::fs::read_to_string(&index)?.trim().to_string())
                }
                Err(e) => return Err(e.into()),
            }
        };

        let dir = self.experiment_dir(&id);
        let record_path = dir.join("experiment.json");
        if !record_path.exists() {
            std::fs::create_dir_all(dir.join("runs"))?;
            Self::write_json(&record_path, &ExperimentRecord::new(id.clone(), name))?;
        }
        Ok(id)
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentId>> {
        match std::fs::read_to_string(self.name_index_path(name)) {
            Ok(id) => Ok(Some(ExperimentId(id.trim().to_string()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn create_run(&self, experiment_id: &ExperimentId) -> Result<RunRecord> {
        let experiment_dir = self.experiment_dir(experiment_id);
        if !experiment_dir.join("experiment.json").exists() {
            return Err(Error::Backend(format!(
                "unknown experiment: {experiment_id}"
            )));
        }

        let run = RunRecord::new(RunId::mint(), experiment_id.clone());
        let run_dir = experiment_dir.join("runs").join(run.run_id().as_str());
        std::fs::create_dir_all(run_dir.join("artifacts"))?;
        Self::write_json(&run_dir.join("run.json"), &run)?;
        std::fs::write(
            self.root.join("run_index").join(run.run_id().as_str()),
            experiment_id.as_str(),
        )?;
        Ok(run)
    }

    fn log_params(&self, run_id: &RunId, params: &[Param]) -> Result<()> {
        let path = self.run_dir(run_id)?.join("params.json");
        let mut stored: BTreeMap<String, ParamValue> =
            Self::read_json(&path)?.unwrap_or_default();
        for param in params {
            stored.insert(param.key().to_string(), param.value().clone());
        }
        Self::write_json(&path, &stored)
    }

    fn log_metrics(&self, run_id: &RunId, metrics: &[MetricRecord]) -> Result<()> {
        let path = self.run_dir(run_id)?.join("metrics.jsonl");
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        for metric in metrics {
            serde_json::to_writer(&mut file, metric)?;
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    fn set_tags(&self, run_id: &RunId, tags: &[TagRecord]) -> Result<()> {
        let path = self.run_dir(run_id)?.join("tags.json");
        let mut stored: BTreeMap<String, String> = Self::read_json(&path)?.unwrap_or_default();
        for tag in tags {
            stored.insert(tag.key().to_string(), tag.value().to_string());
        }
        Self::write_json(&path, &stored)
    }

    fn log_artifact(
        &self,
        run_id: &RunId,
        relative_path: &str,
        bytes: &[u8],
        checksum: &str,
    ) -> Result<()> {
        let run_dir = self.run_dir(run_id)?;
        let target = run_dir.join("artifacts").join(relative_path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, bytes)?;

        let index_path = run_dir.join("artifacts.json");
        let mut index: BTreeMap<String, ArtifactRecord> =
            Self::read_json(&index_path)?.unwrap_or_default();
        index.insert(
            relative_path.to_string(),
            ArtifactRecord::new(relative_path, bytes.len() as u64, checksum),
        );
        Self::write_json(&index_path, &index)
    }

    fn update_run_state(
        &self,
        run_id: &RunId,
        state: RunState,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let path = self.run_dir(run_id)?.join("run.json");
        let mut run: RunRecord = Self::read_json(&path)?
            .ok_or_else(|| Error::Backend(format!("unknown run: {run_id}")))?;
        run.finalize(state, ended_at);
        Self::write_json(&path, &run)
    }
}
