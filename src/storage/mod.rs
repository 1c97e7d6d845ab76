//! Object storage for source documents and translated output
//! Uses Apache Arrow object_store crate

use bytes::Bytes;
use object_store::{ObjectStore, path::Path as StoragePath};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageConfig, StorageProvider};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unsupported URI: {0}")]
    UnsupportedUri(String),

    #[error("Local storage requires a root directory")]
    MissingRoot,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage client wrapping object_store
///
/// Objects are addressed by opaque URIs of the form `{scheme}://{bucket}/{key}`.
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    scheme: &'static str,
    pub bucket: String,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, scheme: &'static str, bucket: String) -> Self {
        Self {
            store,
            scheme,
            bucket,
        }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(object_store::memory::InMemory::new()),
            "mem",
            "linguabox-local".to_string(),
        )
    }

    /// Create storage rooted at a local directory
    pub fn local(root: &Path, bucket: String) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let store = object_store::local::LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(store), "file", bucket))
    }

    /// Build the client selected by configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.provider {
            StorageProvider::Memory => Ok(Self::new(
                Arc::new(object_store::memory::InMemory::new()),
                "mem",
                config.bucket.clone(),
            )),
            StorageProvider::Local => {
                let root = config.root.as_deref().ok_or(StorageError::MissingRoot)?;
                Self::local(root, config.bucket.clone())
            }
        }
    }

    /// Store bytes under `key` and return the object's URI
    pub async fn put(&self, key: &str, data: impl Into<Bytes>) -> Result<String> {
        let path = StoragePath::from(key);
        let data: Bytes = data.into();
        let size = data.len();

        self.store.put(&path, data.into()).await?;

        tracing::info!(key, size, "Uploaded to storage");

        Ok(self.uri_for(key))
    }

    /// Fetch the bytes behind a URI previously returned by [`put`](Self::put)
    pub async fn get(&self, uri: &str) -> Result<Vec<u8>> {
        let key = self.key_from_uri(uri)?;
        let path = StoragePath::from(key);

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(uri.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = result.bytes().await?;

        tracing::info!(key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes.to_vec())
    }

    /// Check if a URI points at an existing object
    pub async fn exists(&self, uri: &str) -> Result<bool> {
        let key = self.key_from_uri(uri)?;
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn uri_for(&self, key: &str) -> String {
        format!("{}://{}/{}", self.scheme, self.bucket, key)
    }

    fn key_from_uri<'a>(&self, uri: &'a str) -> Result<&'a str> {
        uri.strip_prefix(self.scheme)
            .and_then(|rest| rest.strip_prefix("://"))
            .and_then(|rest| rest.strip_prefix(self.bucket.as_str()))
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .ok_or_else(|| StorageError::UnsupportedUri(uri.to_string()))
    }
}
