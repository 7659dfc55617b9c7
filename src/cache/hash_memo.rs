//! In-process memo of content hashes keyed by path, size and modification time.
//!
//! Only an accelerator: a hit skips reading the file, a miss falls back to hashing.
//! The memo never decides cache validity on its own.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};

use crate::core::FileRecord;
use crate::resource::Reclaimable;

const DEFAULT_CAPACITY: usize = 50_000;

#[derive(Debug, Clone)]
struct MemoEntry {
    modified: DateTime<Utc>,
    size: u64,
    hash: String,
}

#[derive(Debug)]
pub struct HashMemo {
    entries: DashMap<PathBuf, MemoEntry>,
    capacity: usize,
}

impl Default for HashMemo {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl HashMemo {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// The remembered hash, if size and mtime still match
    pub fn lookup(&self, record: &FileRecord) -> Option<String> {
        let modified = record.last_modified?;
        let entry = self.entries.get(&record.path)?;
        (entry.modified == modified && entry.size == record.size_bytes).then(|| entry.hash.clone())
    }

    pub fn remember(&self, record: &FileRecord, hash: &str) {
        let Some(modified) = record.last_modified else {
            return;
        };
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&record.path) {
            self.entries.clear();
        }
        self.entries.insert(
            record.path.clone(),
            MemoEntry {
                modified,
                size: record.size_bytes,
                hash: hash.to_string(),
            },
        );
    }

    pub fn forget(&self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Reclaimable for HashMemo {
    fn name(&self) -> &str {
        "hash memo"
    }

    fn estimated_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| (e.key().as_os_str().len() + e.value().hash.len() + 64) as u64)
            .sum()
    }

    fn reclaim(&self) -> u64 {
        let bytes = self.estimated_bytes();
        self.entries.clear();
        bytes
    }
}
