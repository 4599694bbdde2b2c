//! Storage adapter error types.

use thiserror::Error;

/// Failure reported by a storage adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No such object or row.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The backend holds the object but does not publish it.
    #[error("not available: {0}")]
    NotExposed(String),

    /// The adapter has no such capability.
    #[error("{0} not supported by this backend")]
    Unsupported(&'static str),

    /// Transport failure or missing configuration.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Remote API answered with a non-2xx status.
    #[error("API request failed: HTTP {status} - {body}")]
    Rejected { status: u16, body: String },

    /// Relational table failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Object store failure other than a missing object.
    #[error("object store error: {0}")]
    ObjectStore(#[source] object_store::Error),

    /// HTTP transport failure (connect, timeout, body).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl StorageError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an Unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// True when the backend could not be reached or refused the request,
    /// as opposed to answering definitively.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            StorageError::Unavailable(_)
                | StorageError::Rejected { .. }
                | StorageError::Database(_)
                | StorageError::ObjectStore(_)
                | StorageError::Http(_)
        )
    }
}

impl From<object_store::Error> for StorageError {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            other => StorageError::ObjectStore(other),
        }
    }
}

/// Storage result type.
pub type StorageResult<T> = Result<T, StorageError>;
