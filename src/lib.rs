//! Incremental source tree analysis.
//!
//! A run discovers files, compares their content hashes against a persisted cache,
//! invalidates the cached results of every transitive dependent of a changed file
//! and hands the remaining files to a pluggable [`Parser`] under a concurrency
//! bound and per-file timeouts.
//!
//! ```ignore
//! use deltascan::{Orchestrator, PipelineConfig, parsers::ImportScanner};
//! use std::sync::Arc;
//!
//! let parser = Arc::new(ImportScanner::new()?);
//! let orchestrator = Orchestrator::with_config(PipelineConfig::default(), parser);
//! let result = orchestrator.analyze_project_incremental(root).await?;
//! println!("{}", result.cache_stats);
//! ```

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod errors;
pub mod io;
pub mod observability;
pub mod parsers;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod resource;
pub mod scheduler;

// Re-export commonly used types
pub use crate::cache::{CacheEntry, CacheStore, SharedCache};
pub use crate::config::PipelineConfig;
pub use crate::core::{
    AnalysisMode, Artifact, CacheStats, FileOutcome, FileRecord, FileReport, OutcomeStatus,
    ParseContext, ParseOutput, Parser, ProjectAnalysisResult, Relation,
};
pub use crate::errors::{ErrorCode, PipelineError, Result};
pub use crate::io::FileDiscoverer;
pub use crate::pipeline::{Orchestrator, PipelineContext};
pub use crate::resource::{MemoryPressure, ResourceGovernor};
pub use crate::scheduler::{ParseScheduler, SchedulerRun};
