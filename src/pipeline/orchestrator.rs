//! Entry points for full and incremental project analysis.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::{aggregate, PipelineContext};
use crate::cache::CacheStore;
use crate::config::PipelineConfig;
use crate::core::{AnalysisMode, Parser, ProjectAnalysisResult};
use crate::errors::{PipelineError, Result};
use crate::io::FileDiscoverer;
use crate::observability::{set_phase, AnalysisPhase};
use crate::resource::MonitorHandle;
use crate::scheduler::ParseScheduler;

/// Runs discovery, scheduling, aggregation and cache persistence for a project.
///
/// One orchestrator can analyze several roots; the shared cache is rebound to the
/// cache file of whichever root is being analyzed.
pub struct Orchestrator {
    ctx: PipelineContext,
    parser: Arc<dyn Parser>,
}

impl Orchestrator {
    pub fn new(ctx: PipelineContext, parser: Arc<dyn Parser>) -> Self {
        Self { ctx, parser }
    }

    pub fn with_config(config: PipelineConfig, parser: Arc<dyn Parser>) -> Self {
        Self::new(PipelineContext::new(config), parser)
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Parse every discovered file.
    ///
    /// Fails with [`PipelineError::RunTimeout`] when the run exceeds
    /// `scheduler.run_timeout_ms`; all in-flight parse work is cancelled.
    pub async fn analyze_project(&self, root: &Path) -> Result<ProjectAnalysisResult> {
        let timeout = self.ctx.config.scheduler.run_timeout();
        match tokio::time::timeout(timeout, self.run(root, AnalysisMode::Full)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::RunTimeout {
                project: root.to_path_buf(),
                timeout,
            }),
        }
    }

    /// Reuse cached results for unchanged files.
    ///
    /// Any failure, including a corrupt cache or the run timeout, is logged and
    /// answered with a full run.
    pub async fn analyze_project_incremental(&self, root: &Path) -> Result<ProjectAnalysisResult> {
        let timeout = self.ctx.config.scheduler.run_timeout();
        let error = match tokio::time::timeout(timeout, self.run(root, AnalysisMode::Incremental))
            .await
        {
            Ok(Ok(result)) => return Ok(result),
            Ok(Err(e)) => e,
            Err(_) => PipelineError::RunTimeout {
                project: root.to_path_buf(),
                timeout,
            },
        };

        warn!(
            project = %root.display(),
            code = %error.code(),
            "Incremental analysis failed, falling back to full analysis: {error}"
        );
        self.analyze_project(root).await
    }

    async fn run(&self, root: &Path, mode: AnalysisMode) -> Result<ProjectAnalysisResult> {
        let run_token = CancellationToken::new();
        let _cancel_on_drop = run_token.clone().drop_guard();
        let span = info_span!(parent: &self.ctx.span, "analyze", project = %root.display(), %mode);

        async {
            let started = Instant::now();
            let files = self.discover(root).await?;
            info!(files = files.len(), "Discovery finished");

            self.prepare_cache(root, mode).await?;

            let _monitor = self.start_monitor();
            let scheduler = ParseScheduler::new(self.ctx.clone(), Arc::clone(&self.parser));
            let run = scheduler.run(files, mode, &run_token).await?;

            let result = {
                let _phase = set_phase(AnalysisPhase::Aggregation);
                aggregate::build_result(
                    root,
                    mode,
                    started.elapsed(),
                    run,
                    self.ctx.config.metrics.complexity_threshold,
                )
            };

            self.persist_cache().await;
            info!(
                duration_ms = result.duration_ms,
                artifacts = result.artifacts.len(),
                "{}",
                result.cache_stats
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }

    async fn discover(&self, root: &Path) -> Result<Vec<crate::core::FileRecord>> {
        let discoverer = FileDiscoverer::new(self.ctx.config.discovery.clone())?;
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let _phase = set_phase(AnalysisPhase::Discovery);
            discoverer.discover(&root)
        })
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::other(e)))?
    }

    /// Bind the shared cache to the root's cache file and load it.
    ///
    /// Incremental runs load strictly so a corrupt file surfaces as an error.
    /// With caching disabled the store is emptied and stays in memory.
    async fn prepare_cache(&self, root: &Path, mode: AnalysisMode) -> Result<()> {
        let cache = Arc::clone(&self.ctx.cache);
        let config = self.ctx.config.cache.clone();
        let path = config.resolve_path(root);

        tokio::task::spawn_blocking(move || {
            let _phase = set_phase(AnalysisPhase::CacheLoad);
            let mut store = cache.write();
            if !config.enabled {
                if store.path().is_some() {
                    *store = CacheStore::in_memory(&config);
                }
                store.clear();
                return Ok(());
            }

            if store.path() != Some(path.as_path()) {
                *store = CacheStore::new(path, &config);
            }
            let loaded = match mode {
                AnalysisMode::Incremental => store.load_strict()?,
                AnalysisMode::Full => store.load(),
            };
            info!(entries = loaded, "Cache loaded");
            Ok(())
        })
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::other(e)))?
    }

    fn start_monitor(&self) -> Option<MonitorHandle> {
        let resource = self.ctx.governor.config();
        resource
            .monitoring_enabled
            .then(|| self.ctx.governor.start_monitoring(resource.sample_interval()))
    }

    async fn persist_cache(&self) {
        if !self.ctx.config.cache.enabled {
            return;
        }
        let cache = Arc::clone(&self.ctx.cache);
        let persisted = tokio::task::spawn_blocking(move || {
            let _phase = set_phase(AnalysisPhase::Persisting);
            cache.read().try_persist()
        })
        .await;

        match persisted {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(code = %e.code(), "Failed to persist cache: {e}"),
            Err(e) => warn!("Cache persistence task failed: {e}"),
        }
    }
}
