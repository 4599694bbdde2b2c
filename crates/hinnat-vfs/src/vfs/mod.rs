//! Virtual filesystem exposed to SFTP clients.
//!
//! Key components:
//!
//! - [`VirtualPath`] - Lexical normalization and area classification
//! - [`DirectoryPolicy`] - What each whitelisted directory allows
//! - [`SessionFs`] - Per-session dispatcher; the only place access is decided
//! - [`WriteHandle`] - Buffers one upload until close
//!
//! ## Design Decisions
//!
//! - **Fixed namespace**: Only `/`, `/in` and `/Hinnat` exist. Anything else
//!   is denied before an adapter is consulted.
//! - **Whole-file uploads**: Backends take complete content in one call, so
//!   writes are buffered in memory and flushed on close.
//! - **No destruction**: Delete, rename and rmdir are denied everywhere.

mod buffer;
mod dispatcher;
mod error;
mod handle;
mod path;
mod policy;
mod types;

pub use buffer::{LimitExceeded, WriteBuffer};
pub use dispatcher::{Backends, Command, SessionFs, UploadLimits};
pub use error::{Denial, VfsError, VfsResult};
pub use handle::WriteHandle;
pub use path::{Area, VirtualPath};
pub use policy::{DirectoryPolicy, Operation, Permissions};
pub use types::{Entry, sort_entries};
