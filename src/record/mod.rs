//! Tracking data model
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N)
//!                              │
//!                              ├──< Param (unique per key)
//!                              ├──< MetricRecord (N) [append-only time series]
//!                              ├──< TagRecord (unique per key, overwritable)
//!                              └──< ArtifactRecord (N) [checksummed bytes]
//! ```
//!
//! Records are dumb rows: lifecycle rules (who may transition a run, when facts
//! may be written) are enforced by `RunContext`, not here. Every record is a
//! serde JSON document so each backend can persist it verbatim.

mod artifact;
mod experiment;
mod fact;
mod metric;
mod run;

pub use artifact::{ArtifactRecord, ModelManifest, MODEL_MANIFEST_FILE};
pub use experiment::ExperimentRecord;
pub use fact::{Param, ParamValue, TagRecord};
pub use metric::MetricRecord;
pub use run::{RunRecord, RunState};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for an experiment. Minted once by the backend, stable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(pub String);

impl ExperimentId {
    /// Mint a fresh experiment id.
    #[must_use]
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier for a run. Globally unique and immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Mint a fresh run id.
    #[must_use]
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minted_ids_are_unique() {
        assert_ne!(ExperimentId::mint(), ExperimentId::mint());
        assert_ne!(RunId::mint(), RunId::mint());
    }

    #[test]
    fn test_id_serde_is_transparent() {
        let id = RunId("run-1".to_string());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"run-1\"");
    }
}
