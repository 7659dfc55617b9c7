//! Thread-local context tracking for crash reports.
//!
//! Per-thread context (phase, file, parser) lives in `thread_local!` storage, so a
//! parse running on a blocking-pool thread carries its own file. Overall progress is
//! kept in global atomics.

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static FILES_PROCESSED: AtomicUsize = AtomicUsize::new(0);
static FILES_TOTAL: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static CURRENT_CONTEXT: RefCell<AnalysisContext> =
        const { RefCell::new(AnalysisContext::new()) };
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub phase: Option<AnalysisPhase>,
    pub current_file: Option<PathBuf>,
    /// Parser handling `current_file`
    pub parser: Option<String>,
}

impl AnalysisContext {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: None,
            current_file: None,
            parser: None,
        }
    }
}

/// Stages of one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    Discovery,
    CacheLoad,
    /// Hashing, classification and invalidation before dispatch
    Planning,
    Parsing,
    Settling,
    Aggregation,
    Persisting,
}

impl std::fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discovery => write!(f, "discovery"),
            Self::CacheLoad => write!(f, "cache_load"),
            Self::Planning => write!(f, "planning"),
            Self::Parsing => write!(f, "parsing"),
            Self::Settling => write!(f, "settling"),
            Self::Aggregation => write!(f, "aggregation"),
            Self::Persisting => write!(f, "persisting"),
        }
    }
}

/// RAII guard restoring the previous context on drop
pub struct ContextGuard {
    previous: AnalysisContext,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT_CONTEXT.with(|ctx| {
            *ctx.borrow_mut() = self.previous.clone();
        });
    }
}

fn update(apply: impl FnOnce(&mut AnalysisContext)) -> ContextGuard {
    CURRENT_CONTEXT.with(|ctx| {
        let previous = ctx.borrow().clone();
        apply(&mut ctx.borrow_mut());
        ContextGuard { previous }
    })
}

/// Set the current analysis phase until the guard drops.
#[must_use]
pub fn set_phase(phase: AnalysisPhase) -> ContextGuard {
    update(|ctx| ctx.phase = Some(phase))
}

/// Mark this thread as parsing `path` with `parser` until the guard drops.
#[must_use]
pub fn enter_parse(path: impl Into<PathBuf>, parser: &str) -> ContextGuard {
    let path = path.into();
    update(|ctx| {
        ctx.phase = Some(AnalysisPhase::Parsing);
        ctx.current_file = Some(path);
        ctx.parser = Some(parser.to_string());
    })
}

pub fn set_progress(processed: usize, total: usize) {
    FILES_PROCESSED.store(processed, Ordering::Relaxed);
    FILES_TOTAL.store(total, Ordering::Relaxed);
}

pub fn add_processed(count: usize) {
    FILES_PROCESSED.fetch_add(count, Ordering::Relaxed);
}

#[must_use]
pub fn get_current_context() -> AnalysisContext {
    CURRENT_CONTEXT.with(|ctx| ctx.borrow().clone())
}

#[must_use]
pub fn get_progress() -> (usize, usize) {
    (
        FILES_PROCESSED.load(Ordering::Relaxed),
        FILES_TOTAL.load(Ordering::Relaxed),
    )
}
