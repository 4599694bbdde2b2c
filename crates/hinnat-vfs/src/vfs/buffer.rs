//! Pending write buffer.
//!
//! SFTP clients may deliver writes out of offset order and with gaps. The
//! buffer grows to the highest offset touched, zero-filling gaps, and is
//! handed to the backend in one piece when the handle closes.

use thiserror::Error;

/// A write would grow the buffer past its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("write ending at byte {end} exceeds the {limit} byte limit")]
pub struct LimitExceeded {
    pub end: u64,
    pub limit: usize,
}

/// Growable byte accumulator owned by exactly one write handle.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    data: Vec<u8>,
    limit: usize,
}

impl WriteBuffer {
    /// Create an empty buffer that refuses to grow past `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
        }
    }

    /// Copy `bytes` into the buffer at `offset`, growing it as needed.
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<usize, LimitExceeded> {
        let end = offset
            .checked_add(bytes.len() as u64)
            .ok_or(LimitExceeded {
                end: u64::MAX,
                limit: self.limit,
            })?;
        if end > self.limit as u64 {
            return Err(LimitExceeded {
                end,
                limit: self.limit,
            });
        }

        // Both fit in usize: end <= limit.
        let start = offset as usize;
        let end = end as usize;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Release the accumulated content.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
