//! Artifact staging and upload.
//!
//! Files are staged locally first - the backend does not need to be
//! reachable until close - then uploaded with bounded retries. The staging
//! area is a run-id-scoped subdirectory exclusively owned by one
//! `RunContext`, so concurrent runs never collide.

use crate::client::TrackingClient;
use crate::record::{ModelManifest, RunId, MODEL_MANIFEST_FILE};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Upload attempts per file before the failure is reported.
const MAX_UPLOAD_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between attempts.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Compute the `sha256:<hex>` checksum of a byte slice.
#[must_use]
pub fn checksum_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Run-scoped staging area for artifacts.
///
/// `stage` is a local copy (never blocks on the network); `upload_all`
/// transmits every staged file, retrying each with exponential backoff and
/// aggregating per-file failures so one bad file does not block the rest.
/// Already-uploaded files are skipped on a later pass (checksum-keyed), so
/// retrying after a partial failure produces no duplicates.
#[derive(Debug)]
pub struct ArtifactStage {
    dir: PathBuf,
    staged: Vec<String>,
    uploaded: HashMap<String, String>,
}

impl ArtifactStage {
    /// Create the staging area for one run under `staging_root`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the run-scoped subdirectory cannot be created.
    pub fn new(staging_root: impl AsRef<Path>, run_id: &RunId) -> Result<Self> {
        let dir = staging_root.as_ref().join(run_id.as_str());
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            staged: Vec::new(),
            uploaded: HashMap::new(),
        })
    }

    /// The run-scoped staging directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of files staged and not yet confirmed uploaded.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.staged
            .iter()
            .filter(|path| !self.uploaded.contains_key(*path))
            .count()
    }

    /// Whether anything is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Copy a local file into the staging area under `relative_path`
    /// (defaults to the file's own name).
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read or copied; the
    /// backend is not contacted.
    pub fn stage(&mut self, local_path: impl AsRef<Path>, relative_path: Option<&str>) -> Result<()> {
        let local_path = local_path.as_ref();
        let relative = match relative_path {
            Some(path) => path.to_string(),
            None => local_path
                .file_name()
                .ok_or_else(|| {
                    Error::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("artifact path has no file name: {}", local_path.display()),
                    ))
                })?
                .to_string_lossy()
                .into_owned(),
        };

        let target = self.dir.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(local_path, &target)?;
        if !self.staged.contains(&relative) {
            self.staged.push(relative);
        }
        Ok(())
    }

    /// Stage raw bytes directly under `relative_path`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the staging file cannot be written.
    pub fn stage_bytes(&mut self, relative_path: &str, bytes: &[u8]) -> Result<()> {
        let target = self.dir.join(relative_path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, bytes)?;
        if !self.staged.iter().any(|p| p == relative_path) {
            self.staged.push(relative_path.to_string());
        }
        Ok(())
    }

    /// Stage a serialized model under `models/<name>/`, alongside a flavor
    /// manifest recording how to deserialize it. A model is a specialized
    /// artifact, not a separate storage mechanism.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error from staging either file.
    pub fn stage_model(
        &mut self,
        local_path: impl AsRef<Path>,
        name: &str,
        flavor: &str,
    ) -> Result<()> {
        let local_path = local_path.as_ref();
        let file_name = local_path
            .file_name()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("model path has no file name: {}", local_path.display()),
                ))
            })?
            .to_string_lossy()
            .into_owned();
        let model_relative = format!("models/{name}/{file_name}");
        self.stage(local_path, Some(&model_relative))?;

        let manifest = ModelManifest::new(flavor, model_relative);
        let manifest_relative = format!("models/{name}/{MODEL_MANIFEST_FILE}");
        self.stage_bytes(&manifest_relative, &serde_json::to_vec_pretty(&manifest)?)
    }

    /// Upload every staged file not yet confirmed uploaded.
    ///
    /// Each file gets up to [`MAX_UPLOAD_ATTEMPTS`] attempts with exponential
    /// backoff. A file that still fails is recorded and does not block the
    /// remaining files; failures are aggregated and raised once all uploads
    /// have been attempted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactUpload`] listing every file that exhausted
    /// its retries.
    pub fn upload_all(&mut self, client: &dyn TrackingClient, run_id: &RunId) -> Result<()> {
        let mut failures: Vec<(String, String)> = Vec::new();

        for relative in &self.staged {
            let bytes = match std::fs::read(self.dir.join(relative)) {
                Ok(bytes) => bytes,
                Err(e) => {
                    failures.push((relative.clone(), e.to_string()));
                    continue;
                }
            };
            let checksum = checksum_bytes(&bytes);
            if self.uploaded.get(relative) == Some(&checksum) {
                debug!(path = relative.as_str(), "artifact already uploaded; skipping");
                continue;
            }

            let mut last_error = String::new();
            let mut succeeded = false;
            for attempt in 1..=MAX_UPLOAD_ATTEMPTS {
                match client.log_artifact(run_id, relative, &bytes, &checksum) {
                    Ok(()) => {
                        self.uploaded.insert(relative.clone(), checksum.clone());
                        succeeded = true;
                        break;
                    }
                    Err(e) => {
                        last_error = e.to_string();
                        warn!(
                            path = relative.as_str(),
                            attempt,
                            error = last_error.as_str(),
                            "artifact upload attempt failed"
                        );
                        if attempt < MAX_UPLOAD_ATTEMPTS {
                            std::thread::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1));
                        }
                    }
                }
            }
            if !succeeded {
                failures.push((relative.clone(), last_error));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::ArtifactUpload { failures })
        }
    }

    /// Remove the run-scoped staging directory.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be removed.
    pub fn cleanup(&self) -> Result<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}
