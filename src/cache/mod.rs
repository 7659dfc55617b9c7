//! Content-hash keyed analysis cache.

pub mod dependency_index;
pub mod hash_memo;
pub mod persistence;
pub mod store;

pub use dependency_index::DependencyIndex;
pub use hash_memo::HashMemo;
pub use store::{CacheEntry, CacheStore, StoreStats};

use parking_lot::RwLock;
use std::sync::Arc;

/// The cache as shared between the orchestrator and the scheduler
pub type SharedCache = Arc<RwLock<CacheStore>>;

pub fn shared(store: CacheStore) -> SharedCache {
    Arc::new(RwLock::new(store))
}
