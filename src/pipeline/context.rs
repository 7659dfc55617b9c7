//! Shared state handed to every pipeline component.
//!
//! There are no module-level singletons for pipeline state. The orchestrator owns
//! one [`PipelineContext`] and clones it into the scheduler; clones share the cache,
//! the governor, the hash memo and the progress reporter.

use std::sync::Arc;
use tracing::Span;

use crate::cache::{self, CacheStore, HashMemo, SharedCache};
use crate::config::PipelineConfig;
use crate::progress::{NoProgress, ProgressReporter, ProgressSink};
use crate::resource::{MemorySampler, ResourceGovernor};

#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub cache: SharedCache,
    pub governor: Arc<ResourceGovernor>,
    pub hash_memo: Arc<HashMemo>,
    pub progress: Arc<ProgressReporter>,
    /// Parent span for everything the pipeline logs
    pub span: Span,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("config", &self.config)
            .field("cache_entries", &self.cache.read().len())
            .field("governor", &self.governor)
            .field("hash_memo", &self.hash_memo.len())
            .finish()
    }
}

impl PipelineContext {
    /// Context with a system memory sampler, an unbound in-memory cache and no
    /// progress output.
    pub fn new(config: PipelineConfig) -> Self {
        let governor = Arc::new(ResourceGovernor::new(config.resource.clone()));
        Self::assemble(config, governor)
    }

    fn assemble(config: PipelineConfig, governor: Arc<ResourceGovernor>) -> Self {
        let hash_memo = Arc::new(HashMemo::default());
        governor.register(hash_memo.clone());

        let progress = ProgressReporter::new(
            Arc::new(NoProgress),
            config.scheduler.enable_progress,
            config.scheduler.progress_interval(),
        );

        Self {
            cache: cache::shared(CacheStore::in_memory(&config.cache)),
            config: Arc::new(config),
            governor,
            hash_memo,
            progress: Arc::new(progress),
            span: Span::none(),
        }
    }

    /// Replace the memory sampler, e.g. with a scripted one in tests.
    pub fn with_sampler(self, sampler: Arc<dyn MemorySampler>) -> Self {
        let governor = Arc::new(ResourceGovernor::with_sampler(
            self.config.resource.clone(),
            sampler,
        ));
        governor.register(self.hash_memo.clone());
        Self { governor, ..self }
    }

    pub fn with_progress(self, sink: Arc<dyn ProgressSink>) -> Self {
        let progress = ProgressReporter::new(
            sink,
            self.config.scheduler.enable_progress,
            self.config.scheduler.progress_interval(),
        );
        Self {
            progress: Arc::new(progress),
            ..self
        }
    }

    pub fn with_span(self, span: Span) -> Self {
        Self { span, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ScriptedSampler;

    #[test]
    fn test_clones_share_state() {
        let ctx = PipelineContext::new(PipelineConfig::default());
        let clone = ctx.clone();
        clone.cache.write().set(
            "a.rs",
            crate::cache::CacheEntry::new("h".into(), None, Default::default(), Default::default()),
        );
        assert_eq!(ctx.cache.read().len(), 1);
        assert!(Arc::ptr_eq(&ctx.hash_memo, &clone.hash_memo));
    }

    #[test]
    fn test_optimize_reclaims_hash_memo() {
        let ctx = PipelineContext::new(PipelineConfig::default())
            .with_sampler(Arc::new(ScriptedSampler::constant(1, 2, 1)));
        let record = crate::core::FileRecord::new(
            "/p/a.rs".into(),
            "a.rs".into(),
            1,
            1,
            Some(chrono::Utc::now()),
        );
        ctx.hash_memo.remember(&record, "abc");
        assert_eq!(ctx.hash_memo.len(), 1);

        ctx.governor.optimize();
        assert!(ctx.hash_memo.is_empty());
    }
}
