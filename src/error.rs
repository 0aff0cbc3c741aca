//! Error types for Trueno-Track
//!
//! The taxonomy separates programmer errors (`RunClosed`, `RunAlreadyActive`)
//! from substrate failures (`BackendUnavailable`, `Flush`, `ArtifactUpload`),
//! so a caller can tell "my model failed" apart from "my telemetry failed to save".

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Fact categories drained by a flush, used to report partial batch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    /// Run parameters (unique per key)
    Params,
    /// Metric data points (append-only sequences)
    Metrics,
    /// Freeform tags (unique per key, overwritable)
    Tags,
}

impl std::fmt::Display for FactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Params => write!(f, "params"),
            Self::Metrics => write!(f, "metrics"),
            Self::Tags => write!(f, "tags"),
        }
    }
}

/// Trueno-Track error types
#[derive(Error, Debug)]
pub enum Error {
    /// Tracking backend cannot be reached. Not retried silently: resolution
    /// happens before any work is performed, so the retry decision belongs
    /// to the caller.
    #[error("tracking backend unavailable at {uri}: {reason}")]
    BackendUnavailable {
        /// Backend target that failed to respond
        uri: String,
        /// Underlying transport failure
        reason: String,
    },

    /// Operation attempted against a run that already reached a terminal state
    /// (or a context that was never opened).
    #[error("run {run_id} is closed; params, metrics, tags, and artifacts can only be recorded while it is running")]
    RunClosed {
        /// The terminal run
        run_id: String,
    },

    /// A second run was opened on a context that already owns an active run.
    /// Parallel trials need one context each.
    #[error("run {run_id} is still active on this context; close it before opening another")]
    RunAlreadyActive {
        /// The currently active run
        run_id: String,
    },

    /// One or more fact batches failed to flush. The remaining batches were
    /// still attempted before this surfaced.
    #[error("flush failed for {} fact batch(es): {}", failed.len(), describe_failed(failed))]
    Flush {
        /// The fact kinds whose batch did not reach the backend, with the
        /// backend's reason for each
        failed: Vec<(FactKind, String)>,
    },

    /// One or more artifacts could not be uploaded after retries. Failures are
    /// aggregated once every staged file has been attempted.
    #[error("artifact upload failed for {} file(s): {}", failures.len(), describe_artifacts(failures))]
    ArtifactUpload {
        /// (relative path, reason) per file that exhausted its retries
        failures: Vec<(String, String)>,
    },

    /// Tracking URI could not be parsed into a known backend scheme
    #[error("invalid tracking URI: {0}\nExpected mem:, file:<path>, a bare path, or http(s)://<endpoint>")]
    InvalidUri(String),

    /// Backend rejected a request (well-formed transport, bad outcome)
    #[error("backend error: {0}")]
    Backend(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization error
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// HTTP transport error from the remote backend
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(String),
}

fn describe_failed(failed: &[(FactKind, String)]) -> String {
    failed
        .iter()
        .map(|(kind, reason)| format!("{kind} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_artifacts(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(path, reason)| format!("{path} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_error_lists_failed_kinds() {
        let error = Error::Flush {
            failed: vec![(FactKind::Metrics, "connection reset".to_string())],
        };
        let text = format!("{error}");
        assert!(text.contains("metrics"));
        assert!(text.contains("connection reset"));
    }

    #[test]
    fn test_artifact_upload_error_lists_paths() {
        let error = Error::ArtifactUpload {
            failures: vec![("Confusion-matrix.png".to_string(), "timeout".to_string())],
        };
        let text = format!("{error}");
        assert!(text.contains("Confusion-matrix.png"));
        assert!(text.contains("timeout"));
    }

    #[test]
    fn test_run_closed_names_the_run() {
        let error = Error::RunClosed { run_id: "run-9".to_string() };
        assert!(format!("{error}").contains("run-9"));
    }
}
