//! Storage adapter contracts and implementations.
//!
//! - [`PricelistStore`] backs `/Hinnat`
//! - [`IncomingStore`] backs `/in`
//!
//! One implementation of each is selected at startup and shared read-only
//! across sessions. Every adapter must keep existence and metadata checks
//! free of side effects, make uploads all-or-nothing, and return listings
//! ordered by name.

mod error;
pub mod fallback;
pub mod incoming_db;
#[cfg(any(test, feature = "test-mock"))]
pub mod mock;
pub mod object;
pub mod remote;

use async_trait::async_trait;
use bytes::Bytes;

use crate::identity::Identity;
use crate::vfs::Entry;

pub use error::{StorageError, StorageResult};
pub use fallback::{FallbackIncomingStore, FallbackPricelistStore};
pub use incoming_db::SqliteIncomingStore;
pub use object::ObjectPricelistStore;
pub use remote::{RemoteApi, RemoteOrderStore, RemotePricelistStore};

/// Backing store for the pricelist directory.
///
/// Paths are relative to `/Hinnat` (`""` is the directory itself).
#[async_trait]
pub trait PricelistStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Whether uploads and directory creation are supported. Drives the
    /// directory policy.
    fn is_mutable(&self) -> bool;

    /// Fetch the full content of a file.
    async fn download(&self, identity: &Identity, path: &str) -> StorageResult<Bytes>;

    /// Replace a file with `content` in one call.
    async fn upload(&self, identity: &Identity, path: &str, content: Vec<u8>) -> StorageResult<()>;

    /// List a directory, sorted by name.
    async fn list(&self, identity: &Identity, path: &str) -> StorageResult<Vec<Entry>>;

    async fn exists(&self, identity: &Identity, path: &str) -> StorageResult<bool>;

    /// Metadata of a single file.
    async fn metadata(&self, identity: &Identity, path: &str) -> StorageResult<Entry>;

    async fn mkdir(&self, identity: &Identity, path: &str) -> StorageResult<()>;
}

/// Backing store for the incoming directory.
#[async_trait]
pub trait IncomingStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Whether stored files show up in [`IncomingStore::list`]. Listing `/in`
    /// skips the store entirely when this is false.
    fn retains_files(&self) -> bool;

    /// Insert or replace `(identity, filename)`.
    async fn store(&self, identity: &Identity, filename: &str, content: Vec<u8>) -> StorageResult<()>;

    /// Files retained for `identity`, sorted by name.
    async fn list(&self, identity: &Identity) -> StorageResult<Vec<Entry>>;
}
