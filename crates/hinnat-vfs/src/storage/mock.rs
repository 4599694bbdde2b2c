//! Adapter doubles for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::identity::Identity;
use crate::vfs::{Entry, sort_entries};

use super::{IncomingStore, PricelistStore, StorageError, StorageResult};

/// One `store` call seen by [`RecordingIncomingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub username: String,
    pub filename: String,
    pub content: Vec<u8>,
}

/// Incoming store that records every call.
#[derive(Debug, Default)]
pub struct RecordingIncomingStore {
    calls: Arc<Mutex<Vec<RecordedUpload>>>,
    retain: bool,
}

impl RecordingIncomingStore {
    /// Forwarding double: records uploads, lists nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retaining double: uploads show up in listings.
    pub fn retaining() -> Self {
        Self {
            retain: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RecordedUpload> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl IncomingStore for RecordingIncomingStore {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn retains_files(&self) -> bool {
        self.retain
    }

    async fn store(&self, identity: &Identity, filename: &str, content: Vec<u8>) -> StorageResult<()> {
        self.calls.lock().push(RecordedUpload {
            username: identity.username().to_string(),
            filename: filename.to_string(),
            content,
        });
        Ok(())
    }

    async fn list(&self, identity: &Identity) -> StorageResult<Vec<Entry>> {
        if !self.retain {
            return Ok(Vec::new());
        }
        let mut entries: Vec<Entry> = Vec::new();
        for call in self.calls.lock().iter() {
            if call.username != identity.username() {
                continue;
            }
            entries.retain(|e| e.name != call.filename);
            entries.push(Entry::file(
                call.filename.clone(),
                call.content.len() as u64,
                SystemTime::now(),
            ));
        }
        sort_entries(&mut entries);
        Ok(entries)
    }
}

fn refused() -> StorageError {
    StorageError::unavailable("connection refused")
}

/// Pricelist store whose backend is never reachable. Counts calls.
#[derive(Debug, Default)]
pub struct UnreachablePricelistStore {
    calls: AtomicUsize,
    mutable: bool,
}

impl UnreachablePricelistStore {
    pub fn new(mutable: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            mutable,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> StorageResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(refused())
    }
}

#[async_trait]
impl PricelistStore for UnreachablePricelistStore {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    fn is_mutable(&self) -> bool {
        self.mutable
    }

    async fn download(&self, _identity: &Identity, _path: &str) -> StorageResult<Bytes> {
        self.fail()
    }

    async fn upload(&self, _identity: &Identity, _path: &str, _content: Vec<u8>) -> StorageResult<()> {
        self.fail()
    }

    async fn list(&self, _identity: &Identity, _path: &str) -> StorageResult<Vec<Entry>> {
        self.fail()
    }

    async fn exists(&self, _identity: &Identity, _path: &str) -> StorageResult<bool> {
        self.fail()
    }

    async fn metadata(&self, _identity: &Identity, _path: &str) -> StorageResult<Entry> {
        self.fail()
    }

    async fn mkdir(&self, _identity: &Identity, _path: &str) -> StorageResult<()> {
        self.fail()
    }
}

/// Incoming store whose backend is never reachable. Counts calls.
#[derive(Debug, Default)]
pub struct UnreachableIncomingStore {
    calls: AtomicUsize,
}

impl UnreachableIncomingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IncomingStore for UnreachableIncomingStore {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    fn retains_files(&self) -> bool {
        false
    }

    async fn store(&self, _identity: &Identity, _filename: &str, _content: Vec<u8>) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(refused())
    }

    async fn list(&self, _identity: &Identity) -> StorageResult<Vec<Entry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(refused())
    }
}
