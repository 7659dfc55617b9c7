use anyhow::Result;
use std::path::Path;

use super::{load_effective_config, CliOverrides};
use crate::cache::{CacheStore, StoreStats};
use crate::io::normalize_key;

fn open_store(project: &Path, config: Option<&Path>) -> Result<CacheStore> {
    let config = load_effective_config(project, config, &CliOverrides::default())?;
    let path = config.cache.resolve_path(project);
    let mut store = CacheStore::new(path, &config.cache);
    store.load_strict()?;
    Ok(store)
}

pub fn cache_stats(project: &Path, config: Option<&Path>) -> Result<StoreStats> {
    let store = open_store(project, config)?;
    let stats = store.stats();
    if let Some(path) = store.path() {
        println!("Cache file: {}", path.display());
    }
    println!("{stats}");
    Ok(stats)
}

pub fn clear_cache(project: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_effective_config(project, config, &CliOverrides::default())?;
    let path = config.cache.resolve_path(project);
    let mut store = CacheStore::new(path.clone(), &config.cache);
    store.purge()?;
    log::info!("Cache cleared");
    println!("Removed {}", path.display());
    Ok(())
}

/// Print the transitive dependents of `file` recorded in the cache.
pub fn list_dependents(project: &Path, file: &str, config: Option<&Path>) -> Result<Vec<String>> {
    let store = open_store(project, config)?;
    let key = normalize_key(file).unwrap_or_else(|| file.to_string());
    let dependents = store.find_dependents(&key);
    if dependents.is_empty() {
        println!("No cached file depends on {key}");
    }
    for dependent in &dependents {
        println!("{dependent}");
    }
    Ok(dependents)
}
