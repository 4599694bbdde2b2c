//! Write handles bridging streamed protocol writes to one backend call.

use std::sync::Arc;

use crate::identity::Identity;
use crate::storage::{IncomingStore, PricelistStore};

use super::buffer::WriteBuffer;
use super::error::{VfsError, VfsResult};
use super::path::VirtualPath;

/// Where the buffered content goes on close.
enum Sink {
    Incoming {
        store: Arc<dyn IncomingStore>,
        filename: String,
    },
    Pricelist {
        store: Arc<dyn PricelistStore>,
        path: String,
    },
}

/// An open upload.
///
/// Owns its buffer exclusively. Content reaches the backend only through
/// [`WriteHandle::close`], in a single call; dropping the handle without
/// closing discards everything.
pub struct WriteHandle {
    identity: Identity,
    path: VirtualPath,
    sink: Sink,
    buffer: WriteBuffer,
    overflowed: bool,
}

impl std::fmt::Debug for WriteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteHandle")
            .field("user", &self.identity.username())
            .field("path", &self.path.as_str())
            .field("buffered", &self.buffer.len())
            .field("overflowed", &self.overflowed)
            .finish()
    }
}

impl WriteHandle {
    pub(crate) fn incoming(
        identity: Identity,
        path: VirtualPath,
        store: Arc<dyn IncomingStore>,
        filename: String,
        limit: usize,
    ) -> Self {
        Self {
            identity,
            path,
            sink: Sink::Incoming { store, filename },
            buffer: WriteBuffer::with_limit(limit),
            overflowed: false,
        }
    }

    pub(crate) fn pricelist(
        identity: Identity,
        path: VirtualPath,
        store: Arc<dyn PricelistStore>,
        relative: String,
        limit: usize,
    ) -> Self {
        Self {
            identity,
            path,
            sink: Sink::Pricelist {
                store,
                path: relative,
            },
            buffer: WriteBuffer::with_limit(limit),
            overflowed: false,
        }
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// Bytes buffered so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn size_limit_error(&self) -> VfsError {
        VfsError::SizeLimitExceeded {
            path: self.path.to_string(),
            limit: self.buffer.limit(),
        }
    }

    /// Buffer `data` at `offset`. Once the ceiling is crossed the handle is
    /// poisoned: every later write and the final close fail without
    /// contacting the backend.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> VfsResult<usize> {
        if self.overflowed {
            return Err(self.size_limit_error());
        }
        match self.buffer.write_at(offset, data) {
            Ok(n) => Ok(n),
            Err(e) => {
                tracing::warn!(
                    user = %self.identity,
                    path = %self.path,
                    end = e.end,
                    limit = e.limit,
                    "upload exceeds size limit"
                );
                self.overflowed = true;
                Err(self.size_limit_error())
            }
        }
    }

    /// Flush the buffered content to the backend in one call.
    ///
    /// Empty uploads are not forwarded. Returns the number of bytes sent.
    pub async fn close(mut self) -> VfsResult<usize> {
        if self.overflowed {
            return Err(self.size_limit_error());
        }

        let content = std::mem::take(&mut self.buffer).into_bytes();
        if content.is_empty() {
            tracing::debug!(user = %self.identity, path = %self.path, "empty upload, nothing to flush");
            return Ok(0);
        }
        let size = content.len();

        match &self.sink {
            Sink::Incoming { store, filename } => {
                store.store(&self.identity, filename, content).await?;
                tracing::info!(
                    user = %self.identity,
                    file = %filename,
                    bytes = size,
                    backend = store.name(),
                    "incoming file stored"
                );
            }
            Sink::Pricelist { store, path } => {
                store.upload(&self.identity, path, content).await?;
                tracing::info!(
                    user = %self.identity,
                    path = %self.path,
                    bytes = size,
                    backend = store.name(),
                    "pricelist file uploaded"
                );
            }
        }
        Ok(size)
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!(
                user = %self.identity,
                path = %self.path,
                bytes = self.buffer.len(),
                "discarding unflushed upload"
            );
        }
    }
}
