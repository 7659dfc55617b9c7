use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use super::dependency_index::DependencyIndex;
use super::persistence::{self, LoadOutcome};
use crate::config::CacheConfig;
use crate::core::{Artifact, ParseOutput, Relation};
use crate::errors::{PipelineError, Result};

/// Cached parse result for one file
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub content_hash: String,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cached_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// Resolved dependency keys
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Identifiers as the parser reported them, re-resolved on every run
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub raw_dependencies: BTreeSet<String>,
}

impl CacheEntry {
    pub fn new(
        content_hash: String,
        last_modified: Option<DateTime<Utc>>,
        output: ParseOutput,
        dependencies: BTreeSet<String>,
    ) -> Self {
        Self {
            content_hash,
            last_modified,
            cached_at: Some(Utc::now()),
            artifacts: output.artifacts,
            relations: output.relations,
            dependencies,
            raw_dependencies: BTreeSet::new(),
        }
    }

    pub fn with_raw_dependencies(mut self, raw: BTreeSet<String>) -> Self {
        self.raw_dependencies = raw;
        self
    }

    /// What to feed the resolver; entries written without raw identifiers
    /// fall back to their resolved keys.
    pub fn unresolved_dependencies(&self) -> &BTreeSet<String> {
        if self.raw_dependencies.is_empty() {
            &self.dependencies
        } else {
            &self.raw_dependencies
        }
    }

    /// Rebuild the parser output this entry was created from, with resolved dependencies
    pub fn to_output(&self) -> ParseOutput {
        ParseOutput {
            artifacts: self.artifacts.clone(),
            relations: self.relations.clone(),
            dependencies: self.dependencies.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct StoreStats {
    pub entries: usize,
    pub dependency_edges: usize,
    pub expired: usize,
    pub artifacts: usize,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} entries, {} dependency edges, {} expired, {} artifacts",
            self.entries, self.dependency_edges, self.expired, self.artifacts
        )
    }
}

/// Persistent map from relative file path to [`CacheEntry`].
///
/// The store owns its entries and the file they are persisted to. The reverse
/// dependency index is kept in step with every `set` and `remove`.
#[derive(Debug)]
pub struct CacheStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, CacheEntry>,
    index: DependencyIndex,
    expiration: Option<chrono::Duration>,
    compression: bool,
}

impl CacheStore {
    /// An empty store bound to `path`; nothing is read until [`load`](Self::load).
    pub fn new(path: PathBuf, config: &CacheConfig) -> Self {
        Self {
            path: Some(path),
            entries: BTreeMap::new(),
            index: DependencyIndex::new(),
            expiration: config.expiration(),
            compression: config.compression_enabled,
        }
    }

    /// A store that never touches disk
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self {
            path: None,
            ..Self::new(PathBuf::new(), config)
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load persisted entries, treating any problem as an empty cache.
    pub fn load(&mut self) -> usize {
        match self.load_strict() {
            Ok(count) => count,
            Err(e) => {
                log::warn!("{}; starting with an empty cache", e);
                self.replace_entries(BTreeMap::new());
                0
            }
        }
    }

    /// Load persisted entries; a corrupt or unreadable file is an error.
    ///
    /// A missing file and a format-version mismatch both give an empty cache.
    pub fn load_strict(&mut self) -> Result<usize> {
        let Some(path) = self.path.clone() else {
            return Ok(self.entries.len());
        };

        let entries = match persistence::read_cache_file(&path)? {
            LoadOutcome::Missing => BTreeMap::new(),
            LoadOutcome::VersionMismatch { found } => {
                log::info!(
                    "Cache format version {} does not match {}; ignoring {}",
                    found,
                    persistence::FORMAT_VERSION,
                    path.display()
                );
                BTreeMap::new()
            }
            LoadOutcome::Loaded { entries, dropped } => {
                if dropped > 0 {
                    log::warn!("Dropped {} undecodable cache entries", dropped);
                }
                entries
            }
        };

        self.replace_entries(entries);
        log::debug!("Loaded {} cache entries", self.entries.len());
        Ok(self.entries.len())
    }

    fn replace_entries(&mut self, entries: BTreeMap<String, CacheEntry>) {
        self.index.clear();
        for (key, entry) in &entries {
            self.index
                .update(key, &BTreeSet::new(), &entry.dependencies);
        }
        self.entries = entries;
    }

    pub fn has(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    pub fn is_expired(&self, entry: &CacheEntry) -> bool {
        let Some(max_age) = self.expiration else {
            return false;
        };
        match entry.cached_at {
            Some(cached_at) => Utc::now() - cached_at > max_age,
            None => true,
        }
    }

    /// True iff an entry exists, its hash equals `current_hash` and it has not expired.
    pub fn validate_hash(&self, path: &str, current_hash: &str) -> bool {
        self.entries
            .get(path)
            .is_some_and(|entry| entry.content_hash == current_hash && !self.is_expired(entry))
    }

    /// Insert or replace an entry. Never invalidates anything.
    pub fn set(&mut self, path: &str, entry: CacheEntry) {
        let old = self
            .entries
            .get(path)
            .map(|e| e.dependencies.clone())
            .unwrap_or_default();
        self.index.update(path, &old, &entry.dependencies);
        self.entries.insert(path.to_string(), entry);
    }

    /// Replace the resolved dependencies of an existing entry, keeping the index in step.
    ///
    /// Returns false when there is no entry for `path`.
    pub fn rebind_dependencies(&mut self, path: &str, dependencies: BTreeSet<String>) -> bool {
        let Some(entry) = self.entries.get_mut(path) else {
            return false;
        };
        self.index.update(path, &entry.dependencies, &dependencies);
        entry.dependencies = dependencies;
        true
    }

    pub fn remove(&mut self, path: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(path)?;
        self.index.remove_file(path, &entry.dependencies);
        Some(entry)
    }

    /// Transitive dependents of `path`, without modifying the store
    pub fn find_dependents(&self, path: &str) -> Vec<String> {
        self.index.transitive_dependents(path)
    }

    /// Remove the entries of every transitive dependent of `path`.
    ///
    /// The dependent set is computed before anything is removed. Returns the paths
    /// whose entries were actually dropped.
    pub fn invalidate_dependents(&mut self, path: &str) -> Vec<String> {
        let dependents = self.index.transitive_dependents(path);
        dependents
            .into_iter()
            .filter(|dependent| self.remove(dependent).is_some())
            .collect()
    }

    /// Drop entries for files that are no longer present, cascading to their dependents.
    pub fn prune_missing(&mut self, live_paths: &HashSet<&str>) -> Vec<String> {
        let missing: Vec<String> = self
            .entries
            .keys()
            .filter(|key| !live_paths.contains(key.as_str()))
            .cloned()
            .collect();

        let mut removed = Vec::new();
        for path in missing {
            if self.remove(&path).is_some() {
                removed.push(path.clone());
            }
            removed.extend(self.invalidate_dependents(&path));
        }
        if !removed.is_empty() {
            log::debug!("Pruned {} cache entries for deleted files", removed.len());
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entries: self.entries.len(),
            dependency_edges: self.index.edge_count(),
            expired: self.entries.values().filter(|e| self.is_expired(e)).count(),
            artifacts: self.entries.values().map(|e| e.artifacts.len()).sum(),
        }
    }

    /// Write the store to disk atomically.
    pub fn try_persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        persistence::write_cache_file(path, &self.entries, self.compression)?;
        log::debug!(
            "Persisted {} cache entries to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    /// Write the store to disk, logging instead of failing.
    pub fn persist(&self) -> bool {
        match self.try_persist() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to persist cache: {}", e);
                false
            }
        }
    }

    /// Delete the persisted file and empty the store
    pub fn purge(&mut self) -> Result<()> {
        self.clear();
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(PipelineError::CacheIo {
                        path: path.clone(),
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}
