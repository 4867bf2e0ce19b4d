//! Storage collaborators: manifests and fragments by key

use crate::error::{CubeError, Result};
use crate::manifest::Manifest;
use crate::task::TaskBase;
use crate::types::FragmentId;
use crate::utils::fragment_key;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::try_join_all;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Key-value access to blobs
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the blob at `key`
    async fn read(&self, key: &str) -> Result<Bytes>;

    /// Write a blob to `key`
    async fn write(&self, key: &str, data: &[u8]) -> Result<()>;
}

/// File system storage, keys are paths relative to a base directory
pub struct FileSystemStorage {
    base_path: PathBuf,
}

impl FileSystemStorage {
    /// Create a new file system storage
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Get the full path for a key
    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

#[async_trait]
impl Storage for FileSystemStorage {
    async fn read(&self, key: &str) -> Result<Bytes> {
        let data = fs::read(self.full_path(key)).await?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(data).await?;
        Ok(())
    }
}

/// Create the storage for a `file://` URL or a plain path.
///
/// Other schemes are a configuration error; remote stores plug in by
/// implementing [`Storage`].
pub fn create_storage(url: &str) -> Result<Arc<dyn Storage>> {
    let path = match url.split_once("://") {
        Some(("file", path)) => path,
        Some((scheme, _)) => {
            return Err(CubeError::Configuration(format!(
                "unsupported storage scheme: {}",
                scheme
            )))
        }
        None => url,
    };
    Ok(Arc::new(FileSystemStorage::new(path)))
}

fn is_not_found(err: &CubeError) -> bool {
    matches!(err, CubeError::Io(e) if e.kind() == ErrorKind::NotFound)
}

/// Manifests, keyed by survey id
#[derive(Clone)]
pub struct ManifestStore {
    storage: Arc<dyn Storage>,
}

impl ManifestStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn key(manifest_id: &str) -> String {
        format!("{}/manifest.json", manifest_id)
    }

    /// Fetch and parse a manifest. A missing manifest is `NotFound`.
    pub async fn fetch(&self, manifest_id: &str) -> Result<Manifest> {
        let bytes = match self.storage.read(&Self::key(manifest_id)).await {
            Ok(bytes) => bytes,
            Err(e) if is_not_found(&e) => {
                debug!(manifest = manifest_id, "manifest not found");
                return Err(CubeError::NotFound(format!("manifest {}", manifest_id)));
            }
            Err(e) => return Err(e),
        };
        Manifest::from_json(&bytes)
    }

    /// Store a manifest
    pub async fn put(&self, manifest_id: &str, manifest: &Manifest) -> Result<()> {
        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| CubeError::Serialization(e.to_string()))?;
        self.storage.write(&Self::key(manifest_id), &json).await
    }
}

/// Fragments of a survey
#[derive(Clone)]
pub struct FragmentStore {
    storage: Arc<dyn Storage>,
}

impl FragmentStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Fetch one fragment of the volume described by `task`.
    ///
    /// The manifest promised the fragment exists, so a missing one is a
    /// storage inconsistency rather than a bad request.
    pub async fn fetch(&self, task: &TaskBase, id: FragmentId) -> Result<Bytes> {
        let key = fragment_key(&task.prefix, &task.shape, &task.ext, id);
        match self.storage.read(&key).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if is_not_found(&e) => {
                warn!(pid = %task.pid, key = %key, "scheduled fragment is missing");
                Err(CubeError::StorageInconsistency(format!("fragment {} not found", key)))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch fragments concurrently, in the order of `ids`
    pub async fn fetch_all(&self, task: &TaskBase, ids: &[FragmentId]) -> Result<Vec<(FragmentId, Bytes)>> {
        let futures = ids.iter().map(|&id| async move {
            let bytes = self.fetch(task, id).await?;
            Ok::<_, CubeError>((id, bytes))
        });
        try_join_all(futures).await
    }
}
