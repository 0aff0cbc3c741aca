//! Run Record - one tracked execution with a terminal lifecycle

use super::{ExperimentId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a run.
///
/// `Running → {Finished, Failed}`; both right-hand states are terminal.
/// There is no transition out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Run is currently executing.
    Running,
    /// Run completed and its facts were flushed.
    Finished,
    /// Run ended with an error; whatever facts were buffered were flushed
    /// best-effort.
    Failed,
}

impl RunState {
    /// Whether this state admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A single tracked execution of an experiment.
///
/// A run is born `Running` with its start timestamp already set (allocation
/// and start are one act), and is finalized exactly once by the context that
/// owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    run_id: RunId,
    experiment_id: ExperimentId,
    state: RunState,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Create a run record in `Running` state, started now.
    #[must_use]
    pub fn new(run_id: RunId, experiment_id: ExperimentId) -> Self {
        Self {
            run_id,
            experiment_id,
            state: RunState::Running,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Get the parent experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &ExperimentId {
        &self.experiment_id
    }

    /// Get the current state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get the end timestamp, if the run has reached a terminal state.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Move the run into a terminal state with the given end timestamp.
    ///
    /// Backends apply this when handling `update_run_state`; the lifecycle
    /// rules (exactly-once, only by the owning context) are enforced upstream.
    pub fn finalize(&mut self, state: RunState, ended_at: DateTime<Utc>) {
        self.state = state;
        self.ended_at = Some(ended_at);
    }
}
