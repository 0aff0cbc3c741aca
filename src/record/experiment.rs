//! Experiment Record - named grouping of runs

use super::ExperimentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked experiment: the root entity runs hang off.
///
/// Experiment names are unique per backend; the name→id mapping is stable,
/// so resolving the same name twice always yields the same record.
/// Experiments are created once and never deleted by this core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    experiment_id: ExperimentId,
    name: String,
    created_at: DateTime<Utc>,
}

impl ExperimentRecord {
    /// Create a new experiment record with the current timestamp.
    ///
    /// # Arguments
    ///
    /// * `experiment_id` - Backend-minted identifier
    /// * `name` - Human-readable, backend-unique name
    #[must_use]
    pub fn new(experiment_id: ExperimentId, name: impl Into<String>) -> Self {
        Self {
            experiment_id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &ExperimentId {
        &self.experiment_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
