//! Crash reports and analysis context.
//!
//! ## Features
//!
//! - **Panic Hook**: structured crash report with phase, file and progress
//! - **Context Tracking**: thread-local phase and file, restored by RAII guards
//! - **Progress Tracking**: global atomic counters
//!
//! ```ignore
//! use deltascan::observability::{set_phase, AnalysisPhase};
//!
//! let _phase = set_phase(AnalysisPhase::Planning);
//! // a panic here reports the planning phase
//! ```

pub mod context;
pub mod panic_hook;

pub use context::{
    add_processed, enter_parse, get_current_context, get_progress, set_phase, set_progress,
    AnalysisContext, AnalysisPhase, ContextGuard,
};
pub use panic_hook::install_panic_hook;
