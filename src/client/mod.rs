//! Tracking backend clients
//!
//! The tracking substrate is polymorphic over backends behind one trait:
//! an in-process store (default), a local file-based store, and a remote
//! HTTP service (`http` feature). The core depends only on the logical
//! contract below; transport is the backend's business.
//!
//! # Example
//!
//! ```rust
//! use trueno_track::client::{TrackingClient, TrackingUri};
//!
//! # fn example() -> trueno_track::Result<()> {
//! let client = TrackingUri::Memory.connect()?;
//! let experiment_id = client.create_experiment("Wine")?;
//! let _run = client.create_run(&experiment_id)?;
//! # Ok(())
//! # }
//! ```

mod file;
mod memory;

#[cfg(feature = "http")]
mod http;

pub use file::FileStoreClient;
pub use memory::MemoryClient;

#[cfg(feature = "http")]
pub use http::HttpClient;

use crate::record::{
    ExperimentId, MetricRecord, Param, RunId, RunRecord, RunState, TagRecord,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable selecting the tracking backend target.
pub const TRACKING_URI_ENV: &str = "TRUENO_TRACKING_URI";

/// Transport-agnostic interface to a tracking backend.
///
/// One client connection is shared across run contexts (`Arc<dyn
/// TrackingClient>`), so implementations must be safe for concurrent use.
///
/// ## Idempotency
///
/// Every method is idempotent - repeating a call with the same payload
/// leaves backend state unchanged - except [`log_metrics`], where a repeated
/// point is accepted as a duplicate data point: metric sequences are
/// append-only, not upserts.
///
/// [`log_metrics`]: TrackingClient::log_metrics
pub trait TrackingClient: Send + Sync {
    /// Create an experiment with the given name, or return the existing id
    /// when the name is already taken. At-most-once under concurrent callers.
    fn create_experiment(&self, name: &str) -> Result<ExperimentId>;

    /// Look up an experiment id by name. `None` when no such experiment.
    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentId>>;

    /// Allocate a run in `Running` state under the given experiment.
    fn create_run(&self, experiment_id: &ExperimentId) -> Result<RunRecord>;

    /// Persist a batch of params. Latest value per key wins.
    fn log_params(&self, run_id: &RunId, params: &[Param]) -> Result<()>;

    /// Append a batch of metric points.
    fn log_metrics(&self, run_id: &RunId, metrics: &[MetricRecord]) -> Result<()>;

    /// Persist a batch of tags. Latest value per key wins.
    fn set_tags(&self, run_id: &RunId, tags: &[TagRecord]) -> Result<()>;

    /// Store artifact bytes under the run's artifact namespace. Repeating the
    /// call with the same path and checksum leaves one entry, not two.
    fn log_artifact(
        &self,
        run_id: &RunId,
        relative_path: &str,
        bytes: &[u8],
        checksum: &str,
    ) -> Result<()>;

    /// Move a run into a terminal state.
    fn update_run_state(
        &self,
        run_id: &RunId,
        state: RunState,
        ended_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Backend target, parsed from a tracking URI.
///
/// Absent configuration means the process-local in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingUri {
    /// Process-local in-memory backend (the default)
    Memory,
    /// Local file-based store rooted at the given directory
    File(PathBuf),
    /// Remote tracking service over HTTP+JSON
    #[cfg(feature = "http")]
    Http(String),
}

impl TrackingUri {
    /// Parse a tracking URI.
    ///
    /// Accepted forms: `mem:`, `file:<path>`, a bare filesystem path, or
    /// `http(s)://<endpoint>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUri`] for empty input or an `http(s)://`
    /// target when the `http` feature is disabled.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(Error::InvalidUri(uri.to_string()));
        }
        if uri == "mem:" {
            return Ok(Self::Memory);
        }
        if let Some(path) = uri.strip_prefix("file:") {
            return Ok(Self::File(PathBuf::from(path)));
        }
        if uri.starts_with("http://") || uri.starts_with("https://") {
            #[cfg(feature = "http")]
            {
                return Ok(Self::Http(uri.to_string()));
            }
            #[cfg(not(feature = "http"))]
            {
                return Err(Error::InvalidUri(format!(
                    "{uri} (crate built without the `http` feature)"
                )));
            }
        }
        Ok(Self::File(PathBuf::from(uri)))
    }

    /// Read the backend target from [`TRACKING_URI_ENV`].
    ///
    /// An absent variable selects the in-memory default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUri`] if the variable is set but unparseable.
    pub fn from_env() -> Result<Self> {
        match std::env::var(TRACKING_URI_ENV) {
            Ok(value) => Self::parse(&value),
            Err(_) => Ok(Self::Memory),
        }
    }

    /// Connect to the selected backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendUnavailable`] if the backend cannot be
    /// prepared (e.g. the file store root cannot be created).
    pub fn connect(&self) -> Result<Arc<dyn TrackingClient>> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryClient::new())),
            Self::File(root) => Ok(Arc::new(FileStoreClient::new(root)?)),
            #[cfg(feature = "http")]
            Self::Http(base_url) => Ok(Arc::new(HttpClient::new(base_url.clone()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory() {
        assert_eq!(TrackingUri::parse("mem:").unwrap(), TrackingUri::Memory);
    }

    #[test]
    fn test_parse_file_prefix_and_bare_path() {
        assert_eq!(
            TrackingUri::parse("file:/tmp/runs").unwrap(),
            TrackingUri::File(PathBuf::from("/tmp/runs"))
        );
        assert_eq!(
            TrackingUri::parse("/tmp/runs").unwrap(),
            TrackingUri::File(PathBuf::from("/tmp/runs"))
        );
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_parse_http() {
        assert_eq!(
            TrackingUri::parse("http://127.0.0.1:5000").unwrap(),
            TrackingUri::Http("http://127.0.0.1:5000".to_string())
        );
    }

    #[test]
    fn test_parse_empty_is_invalid() {
        assert!(TrackingUri::parse("").is_err());
        assert!(TrackingUri::parse("   ").is_err());
    }
}
