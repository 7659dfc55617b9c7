//! Plans, batches and settles the parse work of one run.
//!
//! A run has three phases:
//!
//! 1. **Plan**: hash every file, classify it against the cache and run every
//!    invalidation cascade (see [`plan`]).
//! 2. **Dispatch**: batches of `max_concurrent_files` run on the blocking pool
//!    behind a semaphore. Every task of a batch is awaited before the next batch
//!    starts, and a failing task never affects its siblings.
//! 3. **Settle**: after each batch the single writer resolves dependencies and
//!    writes or drops cache entries.

pub mod plan;
pub mod resolve;
pub mod task;

pub use plan::RunPlan;
pub use resolve::DependencyResolver;
pub use task::ParseTask;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CacheEntry;
use crate::core::{AnalysisMode, CacheStats, FileOutcome, FileRecord, OutcomeSource, Parser};
use crate::errors::{PipelineError, Result};
use crate::observability::{add_processed, set_phase, set_progress, AnalysisPhase};
use crate::pipeline::PipelineContext;
use crate::progress::ProgressEvent;
use crate::resource::MemoryPressure;

/// Everything the scheduler hands back to the orchestrator
#[derive(Debug)]
pub struct SchedulerRun {
    /// Discovered files with their hashes attached
    pub files: Vec<FileRecord>,
    /// One outcome per file, in discovery order
    pub outcomes: Vec<FileOutcome>,
    pub cache_stats: CacheStats,
    /// Cache entries dropped during the run
    pub invalidated: Vec<String>,
    pub batches: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    completed: usize,
    cached: usize,
    failed: usize,
}

pub struct ParseScheduler {
    ctx: PipelineContext,
    parser: Arc<dyn Parser>,
}

impl ParseScheduler {
    pub fn new(ctx: PipelineContext, parser: Arc<dyn Parser>) -> Self {
        Self { ctx, parser }
    }

    /// Process `files` and settle every outcome into the cache.
    ///
    /// Per-file failures end up in the outcomes. The only errors returned are
    /// infrastructure failures of the blocking pool.
    pub async fn run(
        &self,
        files: Vec<FileRecord>,
        mode: AnalysisMode,
        run_token: &CancellationToken,
    ) -> Result<SchedulerRun> {
        let started = Instant::now();
        let files = Arc::new(files);
        let total = files.len();
        set_progress(0, total);

        let resolver = Arc::new(DependencyResolver::new(
            files.iter().map(|f| f.relative_path.as_str()),
        ));
        let plan = self.plan(Arc::clone(&files), Arc::clone(&resolver), mode).await?;
        info!(
            files = total,
            hits = plan.hits.len(),
            to_parse = plan.to_parse.len(),
            changed = plan.changed,
            new = plan.added,
            invalidated = plan.invalidated.len(),
            rebound = plan.rebound,
            "Planned analysis run"
        );

        let mut slots: Vec<Option<FileOutcome>> = (0..total).map(|_| None).collect();
        let mut invalidated: Vec<String> = plan.invalidated.into_iter().collect();
        let mut tally = Tally::default();

        {
            let cache = self.ctx.cache.read();
            for &index in &plan.hits {
                let file = &files[index];
                let result = cache
                    .get(&file.relative_path)
                    .map(CacheEntry::to_output)
                    .ok_or_else(|| {
                        PipelineError::parse(&file.path, "cache entry vanished after planning")
                    });
                tally.cached += usize::from(result.is_ok());
                slots[index] = Some(FileOutcome {
                    relative_path: file.relative_path.clone(),
                    source: OutcomeSource::Cache,
                    result,
                    elapsed: std::time::Duration::ZERO,
                });
            }
        }
        for (index, error) in plan.unreadable {
            slots[index] = Some(FileOutcome {
                relative_path: files[index].relative_path.clone(),
                source: OutcomeSource::Parsed,
                result: Err(PipelineError::Io(error)),
                elapsed: std::time::Duration::ZERO,
            });
            tally.failed += 1;
        }
        tally.completed = tally.cached + tally.failed;
        add_processed(tally.completed);

        let batch_size = self.ctx.config.scheduler.max_concurrent_files.max(1);
        let permits = Arc::new(Semaphore::new(batch_size));
        let batches: Vec<&[usize]> = plan.to_parse.chunks(batch_size).collect();
        let batch_count = batches.len();

        for (number, batch) in batches.into_iter().enumerate() {
            self.relieve_pressure().await;

            let mut settled = self.dispatch(&files, batch, &permits, run_token).await;
            let dropped = self.settle(&files, &resolver, &mut settled);
            invalidated.extend(dropped);

            for (index, outcome) in settled {
                tally.completed += 1;
                tally.failed += usize::from(outcome.result.is_err());
                slots[index] = Some(outcome);
            }
            add_processed(batch.len());

            self.ctx.progress.report(&ProgressEvent {
                completed: tally.completed,
                total,
                cached: tally.cached,
                failed: tally.failed,
                batch: number + 1,
                batches: batch_count,
                elapsed: started.elapsed(),
            });
        }

        self.ctx.progress.finish(&ProgressEvent {
            completed: tally.completed,
            total,
            cached: tally.cached,
            failed: tally.failed,
            batch: batch_count,
            batches: batch_count,
            elapsed: started.elapsed(),
        });

        let outcomes: Vec<FileOutcome> = slots
            .into_iter()
            .zip(files.iter())
            .map(|(slot, file)| {
                slot.unwrap_or_else(|| FileOutcome {
                    relative_path: file.relative_path.clone(),
                    source: OutcomeSource::Parsed,
                    result: Err(PipelineError::parse(&file.path, "file was never scheduled")),
                    elapsed: std::time::Duration::ZERO,
                })
            })
            .collect();

        invalidated.sort();
        invalidated.dedup();
        let entries = self.ctx.cache.read().len();
        let cache_stats = CacheStats::new(
            entries,
            plan.hits.len(),
            plan.to_parse.len(),
            invalidated.len(),
        );
        debug!(%cache_stats, batches = batch_count, "Scheduler finished");

        let files = Arc::try_unwrap(files).unwrap_or_else(|shared| (*shared).clone());
        Ok(SchedulerRun {
            files,
            outcomes,
            cache_stats,
            invalidated,
            batches: batch_count,
        })
    }

    async fn plan(
        &self,
        files: Arc<Vec<FileRecord>>,
        resolver: Arc<DependencyResolver>,
        mode: AnalysisMode,
    ) -> Result<RunPlan> {
        let cache = Arc::clone(&self.ctx.cache);
        let memo = Arc::clone(&self.ctx.hash_memo);
        tokio::task::spawn_blocking(move || {
            let _phase = set_phase(AnalysisPhase::Planning);
            let hashed = plan::hash_files(&files, &memo);
            let mut cache = cache.write();
            plan::build_plan(&files, hashed, &mut cache, &resolver, mode)
        })
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::other(e)))
    }

    /// Check memory before a batch; optimize when pressure is high.
    async fn relieve_pressure(&self) {
        let governor = Arc::clone(&self.ctx.governor);
        let checked = tokio::task::spawn_blocking(move || {
            let (snapshot, pressure) = governor.check_pressure();
            if pressure == MemoryPressure::High {
                let error = PipelineError::MemoryPressureCritical {
                    rss_mb: snapshot.rss_mb(),
                    limit_mb: governor.config().memory_limit_mb,
                };
                warn!(code = %error.code(), "{error}");
                governor.optimize();
            }
            pressure
        })
        .await;

        if let Ok(pressure) = checked {
            debug!(%pressure, "Memory pressure before batch");
        }
    }

    async fn dispatch(
        &self,
        files: &Arc<Vec<FileRecord>>,
        batch: &[usize],
        permits: &Arc<Semaphore>,
        run_token: &CancellationToken,
    ) -> Vec<(usize, FileOutcome)> {
        let timeout = self.ctx.config.scheduler.file_timeout();
        let mut set = JoinSet::new();
        let mut owners = HashMap::with_capacity(batch.len());

        for &index in batch {
            let task = ParseTask::new(index, timeout).execute(
                Arc::clone(files),
                Arc::clone(&self.parser),
                Arc::clone(permits),
                run_token.child_token(),
            );
            let handle = set.spawn(task);
            owners.insert(handle.id(), index);
        }

        let mut settled = Vec::with_capacity(batch.len());
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((_, (index, outcome))) => settled.push((index, outcome)),
                Err(e) => {
                    let Some(&index) = owners.get(&e.id()) else {
                        continue;
                    };
                    let file = &files[index];
                    let message = format!("task failed: {e}");
                    settled.push((
                        index,
                        FileOutcome {
                            relative_path: file.relative_path.clone(),
                            source: OutcomeSource::Parsed,
                            result: Err(PipelineError::parse(&file.path, message)),
                            elapsed: std::time::Duration::ZERO,
                        },
                    ));
                }
            }
        }
        settled.sort_by_key(|(index, _)| *index);
        settled
    }

    /// Write successful outputs to the cache and drop entries of failed files.
    ///
    /// Raw dependencies are replaced by their resolved form in the outcome. The
    /// entry keeps both, so later runs can resolve again. Returns the paths whose
    /// entries were dropped.
    fn settle(
        &self,
        files: &[FileRecord],
        resolver: &DependencyResolver,
        settled: &mut [(usize, FileOutcome)],
    ) -> Vec<String> {
        let _phase = set_phase(AnalysisPhase::Settling);
        let mut cache = self.ctx.cache.write();
        let mut dropped = Vec::new();

        for (index, outcome) in settled {
            let file = &files[*index];
            match &mut outcome.result {
                Ok(output) => {
                    let raw = std::mem::take(&mut output.dependencies);
                    output.dependencies = resolver.resolve_all(&file.relative_path, &raw);
                    let Some(hash) = file.content_hash() else {
                        continue;
                    };
                    let entry = CacheEntry::new(
                        hash.to_string(),
                        file.last_modified,
                        output.clone(),
                        output.dependencies.clone(),
                    )
                    .with_raw_dependencies(raw);
                    cache.set(&file.relative_path, entry);
                }
                Err(e) => {
                    debug!(file = %file.relative_path, code = %e.code(), "{e}");
                    if cache.remove(&file.relative_path).is_some() {
                        dropped.push(file.relative_path.clone());
                    }
                }
            }
        }
        dropped
    }
}
