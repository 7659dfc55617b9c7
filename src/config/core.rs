use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure for deltascan
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PipelineConfig {
    /// File discovery rules
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Batching, concurrency and timeouts
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Persistent cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Memory governor settings
    #[serde(default)]
    pub resource: ResourceConfig,

    /// Aggregate metric settings
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

fn default_max_depth() -> usize {
    32
}

fn default_true() -> bool {
    true
}

fn default_excluded_dirs() -> Vec<String> {
    [
        "node_modules",
        "target",
        "vendor",
        ".git",
        "dist",
        "build",
        "__pycache__",
        ".venv",
        ".deltascan",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_source_extensions() -> Vec<String> {
    [
        "rs", "py", "js", "jsx", "mjs", "cjs", "ts", "tsx", "go", "java", "kt", "c", "h", "cc",
        "cpp", "hpp", "cs", "rb", "php", "swift", "scala", "lua", "sh", "vue", "svelte",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Rules deciding which files enter the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// Deepest entry visited; files directly under the root have depth 1
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Globs matched against root-relative paths; when non-empty a file must match one
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Globs matched against root-relative paths; always win over includes
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Directory names pruned without descending
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,

    /// Extensions accepted by the source-file predicate
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,

    #[serde(default = "default_true")]
    pub include_test_files: bool,

    #[serde(default)]
    pub include_doc_files: bool,

    /// Honor .gitignore files while walking
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            excluded_dirs: default_excluded_dirs(),
            source_extensions: default_source_extensions(),
            include_test_files: true,
            include_doc_files: false,
            respect_gitignore: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

fn default_max_concurrent_files() -> usize {
    10
}

fn default_file_timeout_ms() -> u64 {
    30_000
}

fn default_run_timeout_ms() -> u64 {
    300_000
}

fn default_progress_interval_ms() -> u64 {
    500
}

/// Configuration for batch dispatch.
///
/// Files are processed in batches of `max_concurrent_files`; batch N+1 starts only
/// after every file of batch N has settled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Batch size and upper bound on in-flight parse calls
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// Per-file parse timeout in milliseconds
    #[serde(default = "default_file_timeout_ms")]
    pub file_timeout_ms: u64,

    /// Whole-run timeout in milliseconds
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub enable_progress: bool,

    /// Minimum gap between two progress events
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: default_max_concurrent_files(),
            file_timeout_ms: default_file_timeout_ms(),
            run_timeout_ms: default_run_timeout_ms(),
            enable_progress: true,
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn file_timeout(&self) -> Duration {
        Duration::from_millis(self.file_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

fn default_expiration_hours() -> u64 {
    168
}

/// Persistent cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// When disabled nothing is loaded or persisted
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache file location; defaults to `<root>/.deltascan/cache.json`
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Entries older than this are invalid regardless of hash; 0 disables expiry
    #[serde(default = "default_expiration_hours")]
    pub expiration_hours: u64,

    /// Gzip the cache file on persist
    #[serde(default)]
    pub compression_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            expiration_hours: default_expiration_hours(),
            compression_enabled: false,
        }
    }
}

impl CacheConfig {
    pub const DEFAULT_DIR: &'static str = ".deltascan";
    pub const DEFAULT_FILE: &'static str = "cache.json";

    /// Resolve the cache file for a project root
    pub fn resolve_path(&self, root: &std::path::Path) -> PathBuf {
        match &self.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.join(Self::DEFAULT_DIR).join(Self::DEFAULT_FILE),
        }
    }

    pub fn expiration(&self) -> Option<chrono::Duration> {
        if self.expiration_hours == 0 {
            None
        } else {
            Some(chrono::Duration::hours(self.expiration_hours as i64))
        }
    }
}

// ---------------------------------------------------------------------------
// Resource governor
// ---------------------------------------------------------------------------

fn default_memory_limit_mb() -> u64 {
    2048
}

fn default_sample_interval_ms() -> u64 {
    1_000
}

fn default_used_ratio_medium() -> f64 {
    0.75
}

fn default_used_ratio_high() -> f64 {
    0.90
}

fn default_rss_ratio_medium() -> f64 {
    0.70
}

fn default_rss_ratio_high() -> f64 {
    0.85
}

fn default_leak_window() -> usize {
    10
}

fn default_leak_threshold_mb() -> u64 {
    64
}

fn default_history_capacity() -> usize {
    120
}

/// Memory governor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConfig {
    /// RSS ceiling used for the process pressure classification
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,

    /// Run the background monitor during analysis
    #[serde(default)]
    pub monitoring_enabled: bool,

    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// System used/total ratio at which pressure becomes medium
    #[serde(default = "default_used_ratio_medium")]
    pub used_ratio_medium: f64,

    #[serde(default = "default_used_ratio_high")]
    pub used_ratio_high: f64,

    /// RSS/ceiling ratio at which pressure becomes medium
    #[serde(default = "default_rss_ratio_medium")]
    pub rss_ratio_medium: f64,

    #[serde(default = "default_rss_ratio_high")]
    pub rss_ratio_high: f64,

    /// Number of most recent samples examined by leak detection
    #[serde(default = "default_leak_window")]
    pub leak_window: usize,

    /// Minimum monotonic growth across the window to flag a leak
    #[serde(default = "default_leak_threshold_mb")]
    pub leak_threshold_mb: u64,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: default_memory_limit_mb(),
            monitoring_enabled: false,
            sample_interval_ms: default_sample_interval_ms(),
            used_ratio_medium: default_used_ratio_medium(),
            used_ratio_high: default_used_ratio_high(),
            rss_ratio_medium: default_rss_ratio_medium(),
            rss_ratio_high: default_rss_ratio_high(),
            leak_window: default_leak_window(),
            leak_threshold_mb: default_leak_threshold_mb(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl ResourceConfig {
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb.saturating_mul(1024 * 1024)
    }

    pub fn leak_threshold_bytes(&self) -> u64 {
        self.leak_threshold_mb.saturating_mul(1024 * 1024)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

fn default_complexity_threshold() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsConfig {
    /// Artifacts above this complexity count as high complexity
    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: default_complexity_threshold(),
        }
    }
}
