//! # hinnat-vfs
//!
//! Virtual filesystem core for the Hinnat SFTP gateway.
//!
//! Authenticated users see a tiny fixed namespace:
//! - `/in` accepts uploads (orders) and never lets them be read back
//! - `/Hinnat` publishes the per-user price list
//!
//! Neither directory is a real directory. Each is backed by a storage
//! adapter chosen at startup (remote HTTP API, object storage or SQLite),
//! and the [`vfs::SessionFs`] dispatcher decides per request whether the
//! operation may reach that adapter at all.

pub mod constants;
pub mod identity;
pub mod storage;
pub mod vfs;

pub use bytes::Bytes;
pub use identity::Identity;
pub use storage::{IncomingStore, PricelistStore, StorageError, StorageResult};
pub use vfs::{Backends, Command, Entry, SessionFs, VfsError, VfsResult, WriteHandle};
