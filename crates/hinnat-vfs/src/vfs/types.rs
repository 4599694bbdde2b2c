//! Core VFS types.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One entry of a directory listing or stat result.
///
/// Entries for `/`, `/in` and `/Hinnat` are synthesized by the dispatcher;
/// entries inside `/Hinnat` and `/in` come from the active adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Entry name (not full path).
    pub name: String,
    /// Size in bytes (zero for directories).
    pub size: u64,
    /// Last modification (or creation) time.
    pub modified: SystemTime,
    /// Whether this is a directory.
    pub is_dir: bool,
}

impl Entry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            size,
            modified,
            is_dir: false,
        }
    }

    /// Create a directory entry stamped with the current time.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::directory_at(name, SystemTime::now())
    }

    /// Create a directory entry with a fixed modification time.
    pub fn directory_at(name: impl Into<String>, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            size: 0,
            modified,
            is_dir: true,
        }
    }

    /// Unix permission bits including the file type, as SFTP clients expect.
    pub fn mode(&self) -> u32 {
        if self.is_dir {
            0o040755
        } else {
            0o100644
        }
    }

    /// Modification time in whole seconds since the epoch.
    pub fn mtime_secs(&self) -> u64 {
        self.modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Sort entries by name, the ordering every adapter promises.
pub fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(|a, b| a.name.cmp(&b.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_entry_constructors() {
        let when = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let file = Entry::file("salhydro_kaikki.zip", 2048, when);
        assert!(!file.is_dir);
        assert_eq!(file.size, 2048);
        assert_eq!(file.mode(), 0o100644);
        assert_eq!(file.mtime_secs(), 1_700_000_000);

        let dir = Entry::directory("Hinnat");
        assert!(dir.is_dir);
        assert_eq!(dir.size, 0);
        assert_eq!(dir.mode() & 0o170000, 0o040000);
    }

    #[test]
    fn test_sort_entries() {
        let mut entries = vec![
            Entry::directory("b"),
            Entry::file("a", 1, UNIX_EPOCH),
            Entry::file("C", 1, UNIX_EPOCH),
        ];
        sort_entries(&mut entries);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["C", "a", "b"]);
    }
}
