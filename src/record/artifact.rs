//! Artifact Record - opaque checksummed bytes attached to a run

use serde::{Deserialize, Serialize};

/// File name of the flavor manifest written next to a logged model.
pub const MODEL_MANIFEST_FILE: &str = "model.json";

/// A stored artifact: opaque bytes under a relative path in the run's
/// artifact namespace. The store never interprets content; an image, a
/// script snapshot, and a serialized model are all just artifacts.
///
/// ## Checksum Format
///
/// `algorithm:hex_digest`, e.g.
/// `sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855`.
/// The checksum doubles as the skip-if-unchanged key on upload retry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    relative_path: String,
    size_bytes: u64,
    checksum: String,
}

impl ArtifactRecord {
    /// Create an artifact record.
    ///
    /// # Arguments
    ///
    /// * `relative_path` - Path under the run's artifact namespace
    /// * `size_bytes` - Content length
    /// * `checksum` - Content checksum (`sha256:<hex>`)
    #[must_use]
    pub fn new(
        relative_path: impl Into<String>,
        size_bytes: u64,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            size_bytes,
            checksum: checksum.into(),
        }
    }

    /// Get the path under the run's artifact namespace.
    #[must_use]
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Get the content length in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Get the content checksum.
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

/// Flavor manifest for a logged model.
///
/// A model is a specialized artifact, not a distinct storage mechanism: the
/// serialized predictor goes in as ordinary bytes, and this manifest (stored
/// beside it as [`MODEL_MANIFEST_FILE`]) records how to deserialize it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelManifest {
    flavor: String,
    relative_path: String,
}

impl ModelManifest {
    /// Create a manifest for a model stored at `relative_path`.
    #[must_use]
    pub fn new(flavor: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self {
            flavor: flavor.into(),
            relative_path: relative_path.into(),
        }
    }

    /// Get the flavor tag describing how to deserialize the model.
    #[must_use]
    pub fn flavor(&self) -> &str {
        &self.flavor
    }

    /// Get the model's path under the run's artifact namespace.
    #[must_use]
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }
}
