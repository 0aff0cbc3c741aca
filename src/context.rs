//! Run lifecycle state machine.
//!
//! `RunContext` owns one active run at a time and is the only way to move it
//! through `Running → {Finished, Failed}`. Logging calls are buffer-only;
//! the network is touched at close, in the order params → metrics → tags →
//! artifacts → state transition, so the more fundamental configuration is
//! durable first if a later step fails.
//!
//! The closure guarantee lives in [`RunContext::scope`]: however control
//! leaves the block, the run reaches a terminal state exactly once, with the
//! outcome derived from whether the caller's error was in flight. A context
//! dropped while still open is salvaged by the drop guard as `Failed`.

use crate::buffer::FactBuffer;
use crate::client::TrackingClient;
use crate::record::{
    ExperimentId, MetricRecord, Param, ParamValue, RunId, RunRecord, RunState, TagRecord,
};
use crate::staging::ArtifactStage;
use crate::{Error, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reserved tag recording a human-readable run name.
pub const RUN_NAME_TAG: &str = "run.name";

/// Reserved tag recording the code version that produced a run.
pub const CODE_VERSION_TAG: &str = "code.version";

/// Reserved tag recording why a run closed as `Failed`.
pub const FAILURE_REASON_TAG: &str = "failure.reason";

/// Outcome handed to [`RunContext::close`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The tracked work completed; flush everything and finish the run.
    Success,
    /// The tracked work failed for the given reason; flush best-effort and
    /// fail the run.
    Failure(String),
}

/// Error surface of [`RunContext::scope`].
///
/// Training errors and telemetry errors stay distinguishable: "my model
/// failed" is `Training`, "my telemetry failed to save" is `Telemetry` (which
/// still hands back the trained value) or `Setup` (the run never opened).
#[derive(Debug)]
pub enum ScopeError<T, E> {
    /// The run could not be opened; the block never ran.
    Setup(Error),
    /// The block itself failed. The run was closed as `Failed` with a
    /// best-effort flush, and the original error is re-surfaced unaltered.
    Training(E),
    /// The block succeeded but closing telemetry failed. The trained value
    /// is carried here so a telemetry failure never costs the caller their
    /// result.
    Telemetry {
        /// The block's return value
        value: T,
        /// The aggregated telemetry failure
        source: Error,
    },
}

impl<T, E> ScopeError<T, E> {
    /// Recover the trained value from a telemetry-only failure.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Telemetry { value, .. } => Some(value),
            Self::Setup(_) | Self::Training(_) => None,
        }
    }
}

impl<T, E: std::fmt::Display> std::fmt::Display for ScopeError<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup(e) => write!(f, "run setup failed: {e}"),
            Self::Training(e) => write!(f, "{e}"),
            Self::Telemetry { source, .. } => {
                write!(f, "run succeeded but telemetry failed to save: {source}")
            }
        }
    }
}

impl<T: std::fmt::Debug, E: std::fmt::Debug + std::fmt::Display> std::error::Error
    for ScopeError<T, E>
{
}

struct ActiveRun {
    run: RunRecord,
    buffer: FactBuffer,
    artifacts: ArtifactStage,
}

/// Owns one active run and exposes the logging/tagging/artifact API.
///
/// One caller thread per context; parallel trials take one context each
/// against a shared client (`Arc<dyn TrackingClient>`).
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use trueno_track::client::TrackingUri;
/// use trueno_track::{ExperimentRegistry, RunContext, RunOutcome};
///
/// # fn example() -> trueno_track::Result<()> {
/// let client = TrackingUri::Memory.connect()?;
/// let registry = ExperimentRegistry::new(Arc::clone(&client));
/// let experiment = registry.resolve_or_create("Wine")?;
///
/// let mut ctx = RunContext::new(client);
/// ctx.open(&experiment)?;
/// ctx.log_param("max_depth", 2i64)?;
/// ctx.log_metric("accuracy", 0.94, 0)?;
/// ctx.close(RunOutcome::Success)?;
/// # Ok(())
/// # }
/// ```
pub struct RunContext {
    client: Arc<dyn TrackingClient>,
    staging_root: PathBuf,
    active: Option<ActiveRun>,
    last_run: Option<RunId>,
}

impl RunContext {
    /// Create a context over a shared backend connection, staging artifacts
    /// under the system temp directory.
    #[must_use]
    pub fn new(client: Arc<dyn TrackingClient>) -> Self {
        Self::with_staging_root(client, std::env::temp_dir().join("trueno-track"))
    }

    /// Create a context with an explicit artifact staging root. Each run
    /// stages under its own run-id subdirectory of this root.
    #[must_use]
    pub fn with_staging_root(client: Arc<dyn TrackingClient>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            staging_root: staging_root.into(),
            active: None,
            last_run: None,
        }
    }

    /// Whether a run is currently open on this context.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// The active run's id, if a run is open.
    #[must_use]
    pub fn run_id(&self) -> Option<&RunId> {
        self.active.as_ref().map(|a| a.run.run_id())
    }

    /// Directory where the active run stages artifacts, if a run is open.
    #[must_use]
    pub fn staging_dir(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.artifacts.dir())
    }

    /// Allocate a backend run in `Running` state and make it active.
    ///
    /// # Errors
    ///
    /// [`Error::RunAlreadyActive`] when a run is already open on this
    /// context (nesting is disallowed; parallel trials take one context
    /// each). Backend failures propagate as-is.
    pub fn open(&mut self, experiment_id: &ExperimentId) -> Result<RunId> {
        if let Some(active) = &self.active {
            return Err(Error::RunAlreadyActive {
                run_id: active.run.run_id().to_string(),
            });
        }
        let run = self.client.create_run(experiment_id)?;
        let run_id = run.run_id().clone();
        let artifacts = ArtifactStage::new(&self.staging_root, &run_id)?;
        debug!(run_id = %run_id, experiment_id = %experiment_id, "run opened");
        self.active = Some(ActiveRun {
            run,
            buffer: FactBuffer::new(),
            artifacts,
        });
        Ok(run_id)
    }

    /// Open a run and record `run_name` under the reserved [`RUN_NAME_TAG`].
    ///
    /// # Errors
    ///
    /// Same as [`RunContext::open`].
    pub fn open_named(&mut self, experiment_id: &ExperimentId, run_name: &str) -> Result<RunId> {
        let run_id = self.open(experiment_id)?;
        if let Some(active) = &mut self.active {
            active.buffer.push_tag(TagRecord::new(RUN_NAME_TAG, run_name));
        }
        Ok(run_id)
    }

    fn active_mut(&mut self) -> Result<&mut ActiveRun> {
        let closed_id = self
            .last_run
            .as_ref()
            .map_or_else(|| "(none)".to_string(), ToString::to_string);
        self.active
            .as_mut()
            .ok_or(Error::RunClosed { run_id: closed_id })
    }

    /// Buffer a param. Local and non-blocking; no network call occurs.
    ///
    /// # Errors
    ///
    /// [`Error::RunClosed`] when no run is open.
    pub fn log_param(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Result<()> {
        self.active_mut()?
            .buffer
            .push_param(Param::new(key, value));
        Ok(())
    }

    /// Buffer a metric point. Local and non-blocking.
    ///
    /// # Errors
    ///
    /// [`Error::RunClosed`] when no run is open.
    pub fn log_metric(&mut self, key: impl Into<String>, value: f64, step: u64) -> Result<()> {
        self.active_mut()?
            .buffer
            .push_metric(MetricRecord::new(key, value, step));
        Ok(())
    }

    /// Buffer a tag. Local and non-blocking.
    ///
    /// # Errors
    ///
    /// [`Error::RunClosed`] when no run is open.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.active_mut()?
            .buffer
            .push_tag(TagRecord::new(key, value));
        Ok(())
    }

    /// Buffer several tags at once.
    ///
    /// # Errors
    ///
    /// [`Error::RunClosed`] when no run is open.
    pub fn set_tags<K, V>(&mut self, tags: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let active = self.active_mut()?;
        for (key, value) in tags {
            active.buffer.push_tag(TagRecord::new(key, value));
        }
        Ok(())
    }

    /// Record the code version that produced this run under the reserved
    /// [`CODE_VERSION_TAG`] (a provenance stamp; a full source snapshot can
    /// be staged as an ordinary artifact).
    ///
    /// # Errors
    ///
    /// [`Error::RunClosed`] when no run is open.
    pub fn set_code_version(&mut self, version: impl Into<String>) -> Result<()> {
        self.set_tag(CODE_VERSION_TAG, version)
    }

    /// Stage a local file as an artifact. The copy is local; upload happens
    /// at close.
    ///
    /// # Errors
    ///
    /// [`Error::RunClosed`] when no run is open, or an IO error from staging.
    pub fn log_artifact(
        &mut self,
        local_path: impl AsRef<Path>,
        relative_path: Option<&str>,
    ) -> Result<()> {
        self.active_mut()?.artifacts.stage(local_path, relative_path)
    }

    /// Stage a serialized model plus its flavor manifest.
    ///
    /// # Errors
    ///
    /// [`Error::RunClosed`] when no run is open, or an IO/serialization
    /// error from staging.
    pub fn log_model(
        &mut self,
        local_path: impl AsRef<Path>,
        name: &str,
        flavor: &str,
    ) -> Result<()> {
        self.active_mut()?.artifacts.stage_model(local_path, name, flavor)
    }

    /// Close the active run. Idempotent: closing an already-closed context
    /// is a no-op, never an error, and never a duplicate flush.
    ///
    /// `Success` flushes the buffer, uploads staged artifacts, and finishes
    /// the run. `Failure(reason)` flushes best-effort (partial telemetry is
    /// more useful than none), records the reason under
    /// [`FAILURE_REASON_TAG`], and fails the run.
    ///
    /// # Errors
    ///
    /// Telemetry failures encountered while closing, aggregated into a
    /// single error surfaced only after every step has been attempted and
    /// the run has reached its terminal state.
    pub fn close(&mut self, outcome: RunOutcome) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        let run_id = active.run.run_id().clone();
        let mut telemetry: Vec<Error> = Vec::new();

        let state = match &outcome {
            RunOutcome::Success => RunState::Finished,
            RunOutcome::Failure(reason) => {
                active
                    .buffer
                    .push_tag(TagRecord::new(FAILURE_REASON_TAG, reason.clone()));
                RunState::Failed
            }
        };

        if let Err(e) = active.buffer.flush(self.client.as_ref(), &run_id) {
            telemetry.push(e);
        }
        if !active.artifacts.is_empty() {
            if let Err(e) = active.artifacts.upload_all(self.client.as_ref(), &run_id) {
                telemetry.push(e);
            }
        }
        if let Err(e) = self.client.update_run_state(&run_id, state, Utc::now()) {
            telemetry.push(e);
        }

        if telemetry.is_empty() {
            if let Err(e) = active.artifacts.cleanup() {
                warn!(run_id = %run_id, error = %e, "staging cleanup failed");
            }
        }

        debug!(run_id = %run_id, state = %state, "run closed");
        self.last_run = Some(run_id);

        match telemetry.len() {
            0 => Ok(()),
            1 => Err(telemetry.remove(0)),
            _ => Err(Error::Backend(format!(
                "telemetry errors during close: {}",
                telemetry
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            ))),
        }
    }

    /// Run a block against an open run with guaranteed closure.
    ///
    /// The run is opened under `experiment_id`, the block runs with this
    /// context, and the run is closed exactly once with the outcome derived
    /// from the block: `Ok` closes `Success`, `Err` closes
    /// `Failure(error.to_string())` and re-surfaces the original error
    /// unaltered. A telemetry failure after a successful block carries the
    /// block's value in [`ScopeError::Telemetry`] - telemetry is best-effort
    /// around a successful computation, but the failure is not silently lost.
    ///
    /// A panic inside the block is covered by the drop guard: the context's
    /// owner unwinds, and dropping the still-open context closes the run as
    /// `Failed` best-effort.
    ///
    /// # Errors
    ///
    /// [`ScopeError::Setup`], [`ScopeError::Training`], or
    /// [`ScopeError::Telemetry`] as described above.
    pub fn scope<T, E, F>(
        &mut self,
        experiment_id: &ExperimentId,
        f: F,
    ) -> std::result::Result<T, ScopeError<T, E>>
    where
        F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        E: std::fmt::Display,
    {
        self.open(experiment_id).map_err(ScopeError::Setup)?;
        match f(self) {
            Ok(value) => match self.close(RunOutcome::Success) {
                Ok(()) => Ok(value),
                Err(source) => Err(ScopeError::Telemetry { value, source }),
            },
            Err(e) => {
                // The caller's failure wins the error surface; a telemetry
                // failure on this path is logged, not substituted for it.
                if let Err(close_error) = self.close(RunOutcome::Failure(e.to_string())) {
                    warn!(error = %close_error, "telemetry failed while closing a failed run");
                }
                Err(ScopeError::Training(e))
            }
        }
    }
}

impl Drop for RunContext {
    /// Salvage guard: a context dropped while its run is still open closes
    /// the run as `Failed` best-effort, so a caller error (including a
    /// panic) never leaves the backend run permanently `Running`.
    fn drop(&mut self) {
        if self.active.is_some() {
            let outcome = RunOutcome::Failure("run context dropped while open".to_string());
            if let Err(e) = self.close(outcome) {
                warn!(error = %e, "best-effort close on drop failed");
            }
        }
    }
}
