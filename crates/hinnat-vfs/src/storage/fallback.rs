//! Opt-in degradation for demo and staging deployments.
//!
//! The decorators substitute placeholder results when the wrapped adapter
//! fails to reach its backend. Definitive answers (not found, unsupported,
//! not exposed) pass through untouched.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Local;

use crate::constants::PRICELIST_FILE;
use crate::identity::Identity;
use crate::vfs::Entry;

use super::{IncomingStore, PricelistStore, StorageResult};

/// Reported size of the placeholder pricelist in listings.
const PLACEHOLDER_SIZE: u64 = 2 * 1024 * 1024;

fn placeholder_pricelist() -> Bytes {
    let body = format!(
        "PK\nThis is a placeholder pricelist served while the pricelist backend is unavailable.\n\n\
         Product List:\n\
         1. Product A - 10.99 EUR\n\
         2. Product B - 25.50 EUR\n\
         3. Product C - 45.00 EUR\n\n\
         Updated: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    Bytes::from(body)
}

fn placeholder_entry() -> Entry {
    Entry::file(PRICELIST_FILE, PLACEHOLDER_SIZE, SystemTime::now())
}

/// Pricelist decorator serving placeholder content on backend failure.
pub struct FallbackPricelistStore {
    inner: Arc<dyn PricelistStore>,
}

impl FallbackPricelistStore {
    pub fn new(inner: Arc<dyn PricelistStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl PricelistStore for FallbackPricelistStore {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn is_mutable(&self) -> bool {
        self.inner.is_mutable()
    }

    async fn download(&self, identity: &Identity, path: &str) -> StorageResult<Bytes> {
        match self.inner.download(identity, path).await {
            Err(e) if e.is_backend_failure() => {
                tracing::warn!(user = %identity, path = %path, "pricelist backend failed, serving placeholder: {}", e);
                Ok(placeholder_pricelist())
            }
            other => other,
        }
    }

    async fn upload(&self, identity: &Identity, path: &str, content: Vec<u8>) -> StorageResult<()> {
        self.inner.upload(identity, path, content).await
    }

    async fn list(&self, identity: &Identity, path: &str) -> StorageResult<Vec<Entry>> {
        match self.inner.list(identity, path).await {
            Err(e) if e.is_backend_failure() => {
                tracing::warn!(user = %identity, path = %path, "pricelist backend failed, listing placeholder: {}", e);
                Ok(vec![placeholder_entry()])
            }
            other => other,
        }
    }

    async fn exists(&self, identity: &Identity, path: &str) -> StorageResult<bool> {
        match self.inner.exists(identity, path).await {
            Err(e) if e.is_backend_failure() => {
                tracing::warn!(user = %identity, path = %path, "pricelist backend failed: {}", e);
                Ok(path.trim_matches('/') == PRICELIST_FILE)
            }
            other => other,
        }
    }

    async fn metadata(&self, identity: &Identity, path: &str) -> StorageResult<Entry> {
        match self.inner.metadata(identity, path).await {
            Err(e) if e.is_backend_failure() => {
                tracing::warn!(user = %identity, path = %path, "pricelist backend failed, placeholder metadata: {}", e);
                Ok(placeholder_entry())
            }
            other => other,
        }
    }

    async fn mkdir(&self, identity: &Identity, path: &str) -> StorageResult<()> {
        self.inner.mkdir(identity, path).await
    }
}

/// Incoming decorator that logs and drops uploads on backend failure.
pub struct FallbackIncomingStore {
    inner: Arc<dyn IncomingStore>,
}

impl FallbackIncomingStore {
    pub fn new(inner: Arc<dyn IncomingStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl IncomingStore for FallbackIncomingStore {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn retains_files(&self) -> bool {
        self.inner.retains_files()
    }

    async fn store(&self, identity: &Identity, filename: &str, content: Vec<u8>) -> StorageResult<()> {
        let size = content.len();
        match self.inner.store(identity, filename, content).await {
            Err(e) if e.is_backend_failure() => {
                tracing::warn!(
                    user = %identity,
                    file = %filename,
                    bytes = size,
                    "incoming backend failed, upload dropped: {}",
                    e
                );
                Ok(())
            }
            other => other,
        }
    }

    async fn list(&self, identity: &Identity) -> StorageResult<Vec<Entry>> {
        match self.inner.list(identity).await {
            Err(e) if e.is_backend_failure() => {
                tracing::warn!(user = %identity, "incoming backend failed, listing empty: {}", e);
                Ok(Vec::new())
            }
            other => other,
        }
    }
}
