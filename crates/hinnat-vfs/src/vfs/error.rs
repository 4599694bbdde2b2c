//! VFS error types.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::storage::StorageError;

/// Why the policy refused an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Path is not under `/`, `/in` or `/Hinnat`.
    OutsideNamespace,
    /// Reads are never permitted in the incoming directory.
    WriteOnly,
    /// The directory does not accept writes or new directories.
    ReadOnly,
    /// Incoming files are forwarded on upload and cannot be inspected.
    NotRetained,
    /// The incoming directory is flat.
    NoSubdirectories,
    /// The object store only exposes its well-known pricelist name.
    NotExposed,
    /// Delete, rename and remove-directory do not exist in this gateway.
    Forbidden(&'static str),
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::OutsideNamespace => f.write_str("path not allowed"),
            Denial::WriteOnly => f.write_str("/in/ directory is write-only"),
            Denial::ReadOnly => f.write_str("write not allowed to this path"),
            Denial::NotRetained => f.write_str("incoming files are not accessible"),
            Denial::NoSubdirectories => f.write_str("/in/ directory has no subdirectories"),
            Denial::NotExposed => f.write_str("only the published pricelist is available"),
            Denial::Forbidden(op) => write!(f, "{} operations not allowed", op),
        }
    }
}

/// VFS error type.
///
/// Denials are produced by the dispatcher before any backend is touched.
/// Everything else originates in a storage adapter.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Path or operation disallowed by policy.
    #[error("access denied: {reason}: {path}")]
    AccessDenied { path: String, reason: Denial },

    /// No such resource in the backend.
    #[error("not found: {0}")]
    NotFound(String),

    /// Incoming upload over the content ceiling.
    #[error("file size exceeds {limit} byte limit: {path}")]
    SizeLimitExceeded { path: String, limit: usize },

    /// Transport or query failure talking to a storage adapter.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[source] StorageError),

    /// Protocol method with no mapping in this gateway.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),
}

impl VfsError {
    /// Create an AccessDenied error.
    pub fn denied(path: impl Into<String>, reason: Denial) -> Self {
        Self::AccessDenied {
            path: path.into(),
            reason,
        }
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(method: impl Into<String>) -> Self {
        Self::Unsupported(method.into())
    }

    /// The policy reason, if this is a denial.
    pub fn denial(&self) -> Option<Denial> {
        match self {
            VfsError::AccessDenied { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, VfsError::AccessDenied { .. })
    }
}

impl From<StorageError> for VfsError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(path) => VfsError::NotFound(path),
            StorageError::NotExposed(path) => VfsError::denied(path, Denial::NotExposed),
            StorageError::Unsupported(op) => VfsError::Unsupported(op.to_string()),
            other => VfsError::BackendUnavailable(other),
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::AccessDenied { .. } => io::Error::new(io::ErrorKind::PermissionDenied, e.to_string()),
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::SizeLimitExceeded { .. } => {
                io::Error::new(io::ErrorKind::FileTooLarge, e.to_string())
            }
            VfsError::BackendUnavailable(inner) => io::Error::other(inner),
            VfsError::Unsupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
