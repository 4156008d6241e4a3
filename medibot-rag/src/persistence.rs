//! On-disk format for [`VectorIndex`] and the loader used at startup.
//!
//! The artifact is a single JSON document:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "fingerprint": { "model": "sentence-transformers/all-MiniLM-L6-v2", "dimensions": 384 },
//!   "metric": "cosine",
//!   "entries": [ { "embedding": [...], "chunk": { "text": "...", "metadata": {...} } } ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::embedding::ModelFingerprint;
use crate::error::{RagError, Result};
use crate::index::{DistanceMetric, IndexEntry, VectorIndex};

/// The only artifact layout this crate reads and writes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ArtifactRef<'a> {
    format_version: u32,
    fingerprint: &'a ModelFingerprint,
    metric: DistanceMetric,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct ArtifactHeader {
    format_version: u32,
}

#[derive(Deserialize)]
struct Artifact {
    fingerprint: ModelFingerprint,
    metric: DistanceMetric,
    entries: Vec<IndexEntry>,
}

fn load_error(path: &Path, message: impl Into<String>) -> RagError {
    RagError::IndexLoad { path: path.display().to_string(), message: message.into() }
}

impl VectorIndex {
    /// Persist the index to `path`, replacing any existing artifact.
    ///
    /// The file is written next to its destination and renamed into place so a
    /// concurrent reader never observes a half-written index.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let artifact = ArtifactRef {
            format_version: FORMAT_VERSION,
            fingerprint: self.fingerprint(),
            metric: self.metric(),
            entries: self.entries(),
        };
        let bytes = serde_json::to_vec(&artifact).map_err(|e| {
            RagError::Configuration(format!("failed to serialize index: {e}"))
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RagError::Configuration(format!("failed to create '{}': {e}", parent.display()))
            })?;
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            RagError::Configuration(format!("failed to write '{}': {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            RagError::Configuration(format!("failed to move index into '{}': {e}", path.display()))
        })?;

        info!(path = %path.display(), entries = self.len(), "saved vector index");
        Ok(())
    }
}

/// Loads a persisted [`VectorIndex`].
///
/// # Example
///
/// ```rust,ignore
/// use medibot_rag::{IndexLoader, EmbeddingProvider};
///
/// let index = IndexLoader::new("vectorstore/index.json")
///     .expect_model(provider.fingerprint())
///     .load()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct IndexLoader {
    path: PathBuf,
    expected: Option<ModelFingerprint>,
}

impl IndexLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), expected: None }
    }

    /// Require the stored fingerprint to equal `fingerprint`.
    pub fn expect_model(mut self, fingerprint: ModelFingerprint) -> Self {
        self.expected = Some(fingerprint);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the artifact.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexLoad`] if the file is missing or unreadable,
    /// is not a valid artifact, has an unsupported `format_version`, holds an
    /// embedding of the wrong length, or was built by a different model than
    /// the one passed to [`expect_model`](Self::expect_model).
    pub async fn load(&self) -> Result<VectorIndex> {
        let path = self.path.as_path();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to read vector index");
            if e.kind() == std::io::ErrorKind::NotFound {
                load_error(path, "no index found at this location")
            } else {
                load_error(path, format!("failed to read index: {e}"))
            }
        })?;

        let header: ArtifactHeader = serde_json::from_slice(&bytes)
            .map_err(|e| load_error(path, format!("corrupt index: {e}")))?;
        if header.format_version != FORMAT_VERSION {
            error!(
                path = %path.display(),
                found = header.format_version,
                "unsupported index version"
            );
            return Err(load_error(
                path,
                format!(
                    "unsupported format_version {} (expected {FORMAT_VERSION})",
                    header.format_version
                ),
            ));
        }

        let artifact: Artifact = serde_json::from_slice(&bytes)
            .map_err(|e| load_error(path, format!("corrupt index: {e}")))?;

        if let Some(expected) = self.expected.as_ref().filter(|e| **e != artifact.fingerprint) {
            error!(
                path = %path.display(),
                stored = %artifact.fingerprint,
                expected = %expected,
                "embedding model mismatch"
            );
            return Err(load_error(
                path,
                format!(
                    "index was built with {} but the query model is {}",
                    artifact.fingerprint, expected
                ),
            ));
        }

        let index =
            VectorIndex::from_entries(artifact.fingerprint, artifact.metric, artifact.entries)
                .map_err(|e| load_error(path, format!("corrupt index: {e}")))?;

        info!(
            path = %path.display(),
            entries = index.len(),
            model = %index.fingerprint(),
            "loaded vector index"
        );
        Ok(index)
    }
}

/// Loads an index once and hands out the shared read-only handle afterwards.
///
/// A failed load is not cached; the next call tries again.
#[derive(Debug)]
pub struct CachedIndex {
    loader: IndexLoader,
    cell: OnceCell<Arc<VectorIndex>>,
}

impl CachedIndex {
    pub fn new(loader: IndexLoader) -> Self {
        Self { loader, cell: OnceCell::new() }
    }

    /// Return the shared index, loading it on first use.
    pub async fn get(&self) -> Result<Arc<VectorIndex>> {
        let index = self
            .cell
            .get_or_try_init(|| async {
                debug!(path = %self.loader.path().display(), "loading vector index into cache");
                self.loader.load().await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(index))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}
