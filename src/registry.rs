//! Experiment name resolution with a concurrent cache.

use crate::client::TrackingClient;
use crate::record::ExperimentId;
use crate::Result;
use dashmap::DashMap;
use std::sync::Arc;

/// Resolves experiment names to ids, creating the experiment on first use.
///
/// The name→id mapping is stable and idempotent: resolving the same name
/// twice yields the same id, including across concurrent callers (the
/// backend enforces at-most-once creation; the loser of a race observes
/// the winner's id). The cache is the only mutable state shared between
/// run contexts besides the client connection itself.
///
/// # Example
///
/// ```rust
/// use trueno_track::client::TrackingUri;
/// use trueno_track::ExperimentRegistry;
///
/// # fn example() -> trueno_track::Result<()> {
/// let client = TrackingUri::Memory.connect()?;
/// let registry = ExperimentRegistry::new(client);
/// let id = registry.resolve_or_create("Wine")?;
/// assert_eq!(registry.resolve_or_create("Wine")?, id);
/// # Ok(())
/// # }
/// ```
pub struct ExperimentRegistry {
    client: Arc<dyn TrackingClient>,
    cache: DashMap<String, ExperimentId>,
}

impl ExperimentRegistry {
    /// Create a registry over a shared backend connection.
    #[must_use]
    pub fn new(client: Arc<dyn TrackingClient>) -> Self {
        Self {
            client,
            cache: DashMap::new(),
        }
    }

    /// The backend connection this registry resolves against.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn TrackingClient> {
        &self.client
    }

    /// Resolve an experiment name to its id, creating it on first use.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error::BackendUnavailable`] without retrying:
    /// resolution happens before any work has been performed, so the retry
    /// decision belongs to the caller.
    pub fn resolve_or_create(&self, name: &str) -> Result<ExperimentId> {
        if let Some(id) = self.cache.get(name) {
            return Ok(id.clone());
        }

        let id = match self.client.get_experiment_by_name(name)? {
            Some(id) => id,
            None => self.client.create_experiment(name)?,
        };
        self.cache.insert(name.to_string(), id.clone());
        Ok(id)
    }
}
