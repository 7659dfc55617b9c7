//! Orchestration of one analysis run: discovery, cache load, scheduling,
//! aggregation and persistence.

pub mod aggregate;
pub mod context;
pub mod orchestrator;

pub use context::PipelineContext;
pub use orchestrator::Orchestrator;
