//! Error types for the analysis pipeline.
//!
//! Every failure the pipeline can hit is a [`PipelineError`] variant. Variants carry a
//! structured [`ErrorCode`] so logs and JSON output can be filtered programmatically.
//!
//! # Error Codes
//!
//! - E001-E009: discovery errors
//! - E010-E019: per-file parse errors
//! - E020-E029: run-level errors
//! - E030-E039: cache errors
//! - E040-E049: configuration errors
//! - E050-E059: resource errors
//!
//! # Propagation
//!
//! Per-file errors ([`PipelineError::is_per_file`]) are recovered locally by the
//! scheduler and end up in the file's outcome. Only [`PipelineError::is_fatal`] errors
//! abort a run.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Structured error code for documentation and programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ErrorCode(&'static str);

impl ErrorCode {
    /// Directory or entry could not be read during discovery
    pub const DISCOVERY_UNREADABLE: ErrorCode = ErrorCode("E001");
    /// Project root missing or not a directory
    pub const DISCOVERY_ROOT: ErrorCode = ErrorCode("E002");

    /// Parser reported a failure
    pub const PARSE_FAILED: ErrorCode = ErrorCode("E010");
    /// Parser exceeded the per-file timeout
    pub const PARSE_TIMEOUT: ErrorCode = ErrorCode("E011");

    /// Whole run exceeded its deadline
    pub const RUN_TIMEOUT: ErrorCode = ErrorCode("E020");

    /// Persisted cache could not be decoded
    pub const CACHE_CORRUPTION: ErrorCode = ErrorCode("E030");
    /// Persisted cache could not be read or written
    pub const CACHE_IO: ErrorCode = ErrorCode("E031");

    /// Configuration value rejected
    pub const CONFIG_INVALID: ErrorCode = ErrorCode("E040");

    /// Memory pressure reached the critical level
    pub const MEMORY_PRESSURE: ErrorCode = ErrorCode("E050");

    /// Generic I/O error
    pub const IO_GENERIC: ErrorCode = ErrorCode("E009");

    /// Get the error code string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A directory could not be read; its subtree is skipped
    #[error("cannot read {path}: {message}")]
    Discovery { path: PathBuf, message: String },

    /// The project root does not exist or is not a directory
    #[error("project root {0} is not a readable directory")]
    InvalidRoot(PathBuf),

    /// The parser failed on one file
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The parser did not finish one file in time
    #[error("parsing {path} exceeded {timeout:?}")]
    FileTimeout { path: PathBuf, timeout: Duration },

    /// The whole run did not finish in time
    #[error("analysis of {project} did not finish within {timeout:?}")]
    RunTimeout { project: PathBuf, timeout: Duration },

    /// The persisted cache exists but cannot be decoded
    #[error("cache at {path} is corrupted: {message}")]
    CacheCorruption { path: PathBuf, message: String },

    /// The persisted cache cannot be read or written
    #[error("cache I/O error at {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Memory pressure is critical; the run continues after optimizing
    #[error("memory pressure critical: {rss_mb} MB resident of {limit_mb} MB")]
    MemoryPressureCritical { rss_mb: u64, limit_mb: u64 },

    /// IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Pattern errors
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

impl PipelineError {
    /// Create a parse error for a file
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a cache corruption error
    pub fn corruption(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CacheCorruption {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Discovery { .. } => ErrorCode::DISCOVERY_UNREADABLE,
            Self::InvalidRoot(_) => ErrorCode::DISCOVERY_ROOT,
            Self::Parse { .. } => ErrorCode::PARSE_FAILED,
            Self::FileTimeout { .. } => ErrorCode::PARSE_TIMEOUT,
            Self::RunTimeout { .. } => ErrorCode::RUN_TIMEOUT,
            Self::CacheCorruption { .. } => ErrorCode::CACHE_CORRUPTION,
            Self::CacheIo { .. } => ErrorCode::CACHE_IO,
            Self::Configuration(_) | Self::Pattern(_) => ErrorCode::CONFIG_INVALID,
            Self::MemoryPressureCritical { .. } => ErrorCode::MEMORY_PRESSURE,
            Self::Io(_) | Self::Json(_) => ErrorCode::IO_GENERIC,
        }
    }

    /// Errors that end a run instead of being recorded against one file.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidRoot(_) | Self::RunTimeout { .. } | Self::Configuration(_)
        )
    }

    /// Errors that belong to a single file's outcome.
    #[must_use]
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::FileTimeout { .. } | Self::Io(_)
        )
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::FileTimeout { .. } | Self::RunTimeout { .. })
    }
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, PipelineError>;
