//! Object-storage pricelist adapter.
//!
//! Objects live under `<username>/Hinnat/`. Whatever else the bucket holds,
//! readers only ever see [`PRICELIST_FILE`].

use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ClientOptions, ObjectStore, PutPayload};

use crate::constants::{PRICELIST_DIR, PRICELIST_FILE};
use crate::identity::Identity;
use crate::vfs::Entry;

use super::{PricelistStore, StorageError, StorageResult};

/// Empty object standing in for a directory. Object paths cannot end in a
/// delimiter, so the marker lives inside the directory it represents.
const DIR_MARKER: &str = ".keep";

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Custom endpoint for S3-compatible services.
    pub endpoint: Option<String>,
    pub allow_http: bool,
}

/// Pricelist adapter over any [`ObjectStore`].
pub struct ObjectPricelistStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectPricelistStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// In-memory store, lost on exit.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Store objects as files below `root`, creating it if needed.
    pub fn local(root: impl AsRef<FsPath>) -> StorageResult<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)
            .map_err(|e| StorageError::unavailable(format!("{}: {}", root.display(), e)))?;
        let fs = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(fs)))
    }

    /// Amazon S3 or a compatible service. Credentials not given explicitly
    /// are taken from the usual `AWS_*` environment variables.
    pub fn s3(settings: &S3Settings, timeout: Duration) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&settings.bucket)
            .with_allow_http(settings.allow_http)
            .with_client_options(ClientOptions::new().with_timeout(timeout));
        if let Some(region) = &settings.region {
            builder = builder.with_region(region);
        }
        if let Some(key) = &settings.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &settings.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        let s3 = builder.build()?;
        tracing::info!(bucket = %settings.bucket, "using S3 pricelist store");
        Ok(Self::new(Arc::new(s3)))
    }

    fn key(identity: &Identity, relative: &str) -> Path {
        let relative = relative.trim_matches('/');
        if relative.is_empty() {
            Path::from_iter([identity.username(), PRICELIST_DIR])
        } else {
            Path::from_iter(
                [identity.username(), PRICELIST_DIR]
                    .into_iter()
                    .chain(relative.split('/')),
            )
        }
    }

    fn is_exposed(relative: &str) -> bool {
        relative.trim_matches('/') == PRICELIST_FILE
    }

    async fn head(&self, identity: &Identity, relative: &str) -> StorageResult<Entry> {
        let key = Self::key(identity, relative);
        let meta = self.store.head(&key).await.map_err(|e| {
            let e = StorageError::from(e);
            if !e.is_not_found() {
                tracing::error!(user = %identity, key = %key, "object metadata lookup failed: {}", e);
            }
            e
        })?;
        Ok(Entry::file(
            PRICELIST_FILE,
            meta.size,
            SystemTime::from(meta.last_modified),
        ))
    }
}

#[async_trait]
impl PricelistStore for ObjectPricelistStore {
    fn name(&self) -> &'static str {
        "object_store"
    }

    fn is_mutable(&self) -> bool {
        true
    }

    async fn download(&self, identity: &Identity, path: &str) -> StorageResult<Bytes> {
        if !Self::is_exposed(path) {
            return Err(StorageError::not_found(path));
        }
        let key = Self::key(identity, path);
        let result = self.store.get(&key).await?;
        let data = result.bytes().await?;
        tracing::debug!(user = %identity, key = %key, bytes = data.len(), "object downloaded");
        Ok(data)
    }

    async fn upload(&self, identity: &Identity, path: &str, content: Vec<u8>) -> StorageResult<()> {
        if !Self::is_exposed(path) {
            return Err(StorageError::NotExposed(path.to_string()));
        }
        let key = Self::key(identity, path);
        let size = content.len();
        self.store
            .put(&key, PutPayload::from(content))
            .await
            .inspect_err(|e| tracing::error!(user = %identity, key = %key, "object upload failed: {}", e))?;
        tracing::debug!(user = %identity, key = %key, bytes = size, "object uploaded");
        Ok(())
    }

    async fn list(&self, identity: &Identity, path: &str) -> StorageResult<Vec<Entry>> {
        if !path.trim_matches('/').is_empty() {
            return Ok(Vec::new());
        }
        match self.head(identity, PRICELIST_FILE).await {
            Ok(entry) => Ok(vec![entry]),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn exists(&self, identity: &Identity, path: &str) -> StorageResult<bool> {
        if !Self::is_exposed(path) {
            return Ok(false);
        }
        match self.head(identity, path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn metadata(&self, identity: &Identity, path: &str) -> StorageResult<Entry> {
        if !Self::is_exposed(path) {
            return Err(StorageError::not_found(path));
        }
        self.head(identity, path).await
    }

    async fn mkdir(&self, identity: &Identity, path: &str) -> StorageResult<()> {
        let marker = Self::key(identity, path).child(DIR_MARKER);
        self.store.put(&marker, PutPayload::new()).await?;
        tracing::debug!(user = %identity, key = %marker, "directory marker created");
        Ok(())
    }
}
