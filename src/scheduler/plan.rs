//! Pre-dispatch planning: hash every file, classify it against the cache and run
//! all invalidation cascades before the first batch is dispatched.
//!
//! Doing every cascade up front means a dependent that sorts before its changed
//! dependency is still re-parsed, whatever batch it lands in. Cached dependencies
//! are re-resolved against the current file set first, so a file that appears
//! under a name some entry already imports cascades to that entry.

use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};

use super::resolve::DependencyResolver;
use crate::cache::{CacheStore, HashMemo};
use crate::core::{AnalysisMode, FileRecord};

#[derive(Debug, Default)]
pub struct RunPlan {
    /// Files served from the cache, by discovery index
    pub hits: Vec<usize>,
    /// Files to hand to the parser, by discovery index
    pub to_parse: Vec<usize>,
    /// Files whose contents could not be read
    pub unreadable: Vec<(usize, std::io::Error)>,
    /// Entries removed while planning
    pub invalidated: BTreeSet<String>,
    pub changed: usize,
    pub added: usize,
    /// Entries whose dependencies resolved differently this run
    pub rebound: usize,
}

/// Attach a content hash to every readable file, using the memo where it still matches.
pub fn hash_files(files: &[FileRecord], memo: &HashMemo) -> Vec<std::io::Result<()>> {
    files
        .par_iter()
        .map(|file| {
            if file.content_hash().is_some() {
                return Ok(());
            }
            if let Some(hash) = memo.lookup(file) {
                file.attach_hash(hash);
                return Ok(());
            }
            match file.ensure_hash() {
                Ok(hash) => {
                    memo.remember(file, hash);
                    Ok(())
                }
                Err(e) => {
                    memo.forget(&file.path);
                    Err(e)
                }
            }
        })
        .collect()
}

enum Class {
    Candidate,
    Changed,
    New,
    Unreadable(std::io::Error),
}

/// Classify hashed files and apply invalidation to `cache`.
pub fn build_plan(
    files: &[FileRecord],
    hashed: Vec<std::io::Result<()>>,
    cache: &mut CacheStore,
    resolver: &DependencyResolver,
    mode: AnalysisMode,
) -> RunPlan {
    let mut plan = RunPlan::default();

    let classes: Vec<Class> = files
        .iter()
        .zip(hashed)
        .map(|(file, hashed)| match (hashed, file.content_hash()) {
            (Err(e), _) => Class::Unreadable(e),
            (Ok(()), Some(hash)) if cache.validate_hash(&file.relative_path, hash) => {
                Class::Candidate
            }
            (Ok(()), _) if cache.has(&file.relative_path) => Class::Changed,
            (Ok(()), _) => Class::New,
        })
        .collect();

    let live: HashSet<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
    plan.invalidated.extend(cache.prune_missing(&live));
    plan.rebound = rebind_dependencies(cache, resolver);

    let mut candidates = Vec::new();
    for (index, class) in classes.into_iter().enumerate() {
        let key = files[index].relative_path.as_str();
        match class {
            Class::Candidate => {
                candidates.push(index);
                continue;
            }
            Class::Changed => plan.changed += 1,
            Class::New => plan.added += 1,
            Class::Unreadable(e) => {
                if cache.remove(key).is_some() {
                    plan.invalidated.insert(key.to_string());
                }
                plan.unreadable.push((index, e));
            }
        }
        plan.invalidated.extend(cache.invalidate_dependents(key));
    }

    // candidates whose entries survived every cascade are reused
    if mode == AnalysisMode::Incremental {
        plan.hits = candidates
            .into_iter()
            .filter(|&index| cache.has(&files[index].relative_path))
            .collect();
    }

    let unreadable: HashSet<usize> = plan.unreadable.iter().map(|(i, _)| *i).collect();
    let hits: HashSet<usize> = plan.hits.iter().copied().collect();
    plan.to_parse = (0..files.len())
        .filter(|i| !hits.contains(i) && !unreadable.contains(i))
        .collect();

    plan
}

/// Re-resolve every entry's dependencies against the current file set.
fn rebind_dependencies(cache: &mut CacheStore, resolver: &DependencyResolver) -> usize {
    let keys: Vec<String> = cache.keys().map(str::to_string).collect();
    let mut rebound = 0;
    for key in keys {
        let Some(entry) = cache.get(&key) else {
            continue;
        };
        let resolved = resolver.resolve_all(&key, entry.unresolved_dependencies());
        if resolved != entry.dependencies {
            cache.rebind_dependencies(&key, resolved);
            rebound += 1;
        }
    }
    rebound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::config::CacheConfig;
    use crate::core::ParseOutput;
    use std::path::PathBuf;

    fn record(key: &str, hash: &str) -> FileRecord {
        let record = FileRecord::new(PathBuf::from(format!("/p/{key}")), key.into(), 1, 1, None);
        record.attach_hash(hash.into());
        record
    }

    fn entry(hash: &str, deps: &[&str]) -> CacheEntry {
        CacheEntry::new(
            hash.into(),
            None,
            ParseOutput::default(),
            deps.iter().map(|d| d.to_string()).collect(),
        )
    }

    fn ok(n: usize) -> Vec<std::io::Result<()>> {
        (0..n).map(|_| Ok(())).collect()
    }

    fn resolver(files: &[FileRecord]) -> DependencyResolver {
        DependencyResolver::new(files.iter().map(|f| f.relative_path.as_str()))
    }

    #[test]
    fn test_changed_file_invalidates_dependents_in_earlier_positions() {
        let mut cache = CacheStore::in_memory(&CacheConfig::default());
        cache.set("a.py", entry("a1", &["z.py"]));
        cache.set("m.py", entry("m1", &[]));
        cache.set("z.py", entry("z1", &[]));

        let files = vec![record("a.py", "a1"), record("m.py", "m1"), record("z.py", "z2")];
        let known = resolver(&files);
        let plan = build_plan(&files, ok(3), &mut cache, &known, AnalysisMode::Incremental);

        assert_eq!(plan.hits, vec![1]);
        assert_eq!(plan.to_parse, vec![0, 2]);
        assert_eq!(plan.changed, 1);
        assert_eq!(plan.invalidated, BTreeSet::from(["a.py".to_string()]));
    }

    #[test]
    fn test_full_mode_parses_everything() {
        let mut cache = CacheStore::in_memory(&CacheConfig::default());
        cache.set("a.py", entry("a1", &[]));
        let files = vec![record("a.py", "a1"), record("b.py", "b1")];

        let known = resolver(&files);
        let plan = build_plan(&files, ok(2), &mut cache, &known, AnalysisMode::Full);
        assert!(plan.hits.is_empty());
        assert_eq!(plan.to_parse, vec![0, 1]);
        assert_eq!(plan.added, 1);
    }

    #[test]
    fn test_unreadable_file_drops_entry_and_cascades() {
        let mut cache = CacheStore::in_memory(&CacheConfig::default());
        cache.set("a.py", entry("a1", &[]));
        cache.set("b.py", entry("b1", &["a.py"]));
        let files = vec![record("a.py", "a1"), record("b.py", "b1")];
        let hashed = vec![
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied")),
            Ok(()),
        ];

        let known = resolver(&files);
        let plan = build_plan(&files, hashed, &mut cache, &known, AnalysisMode::Incremental);
        assert_eq!(plan.unreadable.len(), 1);
        assert_eq!(plan.to_parse, vec![1]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_deleted_file_prunes_entry_and_dependents() {
        let mut cache = CacheStore::in_memory(&CacheConfig::default());
        cache.set("gone.py", entry("g", &[]));
        cache.set("b.py", entry("b1", &["gone.py"]));
        let files = vec![record("b.py", "b1")];

        let known = resolver(&files);
        let plan = build_plan(&files, ok(1), &mut cache, &known, AnalysisMode::Incremental);
        assert_eq!(plan.to_parse, vec![0]);
        assert!(plan.invalidated.contains("gone.py"));
        assert!(plan.invalidated.contains("b.py"));
    }

    #[test]
    fn test_new_file_matching_an_unresolved_import_cascades() {
        let mut cache = CacheStore::in_memory(&CacheConfig::default());
        let raw = BTreeSet::from(["util".to_string()]);
        cache.set("a.py", entry("a1", &["util"]).with_raw_dependencies(raw));
        cache.set("b.py", entry("b1", &[]));

        let files = vec![record("a.py", "a1"), record("b.py", "b1"), record("util.py", "u1")];
        let known = resolver(&files);
        let plan = build_plan(&files, ok(3), &mut cache, &known, AnalysisMode::Incremental);

        assert_eq!(plan.rebound, 1);
        assert_eq!(plan.added, 1);
        assert_eq!(plan.hits, vec![1]);
        assert_eq!(plan.to_parse, vec![0, 2]);
        assert!(plan.invalidated.contains("a.py"));
    }

    #[test]
    fn test_hash_files_uses_memo() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("a.py");
        std::fs::write(&path, "import os\n").unwrap();
        let memo = HashMemo::default();

        let first = FileRecord::from_path(temp.path(), &path).unwrap();
        let results = hash_files(std::slice::from_ref(&first), &memo);
        assert!(results[0].is_ok());
        assert_eq!(memo.len(), 1);

        let second = FileRecord::from_path(temp.path(), &path).unwrap();
        hash_files(std::slice::from_ref(&second), &memo);
        assert_eq!(second.content_hash(), first.content_hash());

        let missing = FileRecord::new(temp.path().join("nope.py"), "nope.py".into(), 0, 0, None);
        assert!(hash_files(&[missing], &memo)[0].is_err());
    }
}
