//! Virtual path normalization and classification.
//!
//! Client paths are normalized lexically: `""` and `"."` become `/`, a
//! missing leading slash is added, empty and `.` segments are dropped and
//! `..` pops a segment (never above `/`). Classification then looks only at
//! the first segment.

use std::fmt;

use crate::constants::{INCOMING_DIR, PRICELIST_DIR};

/// Top-level region of the exposed namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    /// `/` itself.
    Root,
    /// `/in`.
    Incoming,
    /// `/Hinnat`.
    Pricelist,
}

impl Area {
    /// The directory name as it appears in a root listing.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Area::Root => "/",
            Area::Incoming => INCOMING_DIR,
            Area::Pricelist => PRICELIST_DIR,
        }
    }
}

/// A normalized client-visible path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualPath {
    normalized: String,
}

impl VirtualPath {
    /// Normalize a raw client path.
    pub fn new(raw: &str) -> Self {
        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }

        let mut normalized = String::with_capacity(raw.len() + 1);
        for segment in &segments {
            normalized.push('/');
            normalized.push_str(segment);
        }
        if normalized.is_empty() {
            normalized.push('/');
        }
        Self { normalized }
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.normalized.split('/').filter(|s| !s.is_empty())
    }

    /// The area this path falls under, or `None` when it is outside the
    /// whitelisted namespace.
    pub fn area(&self) -> Option<Area> {
        match self.segments().next() {
            None => Some(Area::Root),
            Some(INCOMING_DIR) => Some(Area::Incoming),
            Some(PRICELIST_DIR) => Some(Area::Pricelist),
            Some(_) => None,
        }
    }

    /// True for `/`, `/in` and `/Hinnat` themselves.
    pub fn is_area_root(&self) -> bool {
        self.area().is_some() && self.segments().count() <= 1
    }

    /// Path below the area directory, without a leading slash.
    ///
    /// `/Hinnat/a/b` gives `a/b`; `/Hinnat` gives the empty string.
    pub fn within_area(&self) -> &str {
        let trimmed = self.normalized.trim_start_matches('/');
        match trimmed.split_once('/') {
            Some((_, rest)) => rest,
            None => "",
        }
    }

    /// Number of segments below the area directory.
    pub fn depth_in_area(&self) -> usize {
        self.segments().count().saturating_sub(1)
    }

    /// Final path segment, `None` for `/`.
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl From<&str> for VirtualPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
