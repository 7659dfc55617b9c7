pub mod metrics;
pub mod traits;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::PipelineError;

pub use metrics::{ComplexitySummary, QualityMetrics};
pub use traits::{ParseContext, Parser};

/// A source file found during discovery.
///
/// Everything except `content_hash` is fixed when the record is created. The hash is
/// computed on first comparison against the cache and attached once.
#[derive(Clone, Debug, Serialize)]
pub struct FileRecord {
    pub path: PathBuf,
    /// `/`-separated path under the project root; the cache key
    pub relative_path: String,
    pub name: String,
    pub extension: Option<String>,
    pub size_bytes: u64,
    pub line_count: usize,
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_hash")]
    content_hash: OnceCell<String>,
}

fn serialize_hash<S: Serializer>(
    cell: &OnceCell<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    cell.get().serialize(serializer)
}

impl PartialEq for FileRecord {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.relative_path == other.relative_path
            && self.size_bytes == other.size_bytes
            && self.line_count == other.line_count
            && self.last_modified == other.last_modified
            && self.content_hash.get() == other.content_hash.get()
    }
}

impl FileRecord {
    pub fn new(
        path: PathBuf,
        relative_path: String,
        size_bytes: u64,
        line_count: usize,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        Self {
            path,
            relative_path,
            name,
            extension,
            size_bytes,
            line_count,
            last_modified,
            content_hash: OnceCell::new(),
        }
    }

    /// Build a record by reading metadata from disk
    pub fn from_path(root: &Path, path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let relative = crate::io::relative_key(root, path);
        let line_count = crate::io::count_lines(path).unwrap_or(0);
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        Ok(Self::new(
            path.to_path_buf(),
            relative,
            metadata.len(),
            line_count,
            modified,
        ))
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.get().map(String::as_str)
    }

    /// Attach a hash computed elsewhere. A hash already attached is kept.
    pub fn attach_hash(&self, hash: String) -> &str {
        self.content_hash.get_or_init(|| hash)
    }

    /// Hash the file contents now unless a hash is already attached.
    pub fn ensure_hash(&self) -> std::io::Result<&str> {
        self.content_hash
            .get_or_try_init(|| crate::io::hash_file(&self.path))
            .map(String::as_str)
    }
}

/// A node of the artifact graph produced by a parser
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub kind: String,
    pub name: String,
    /// Relative path of the file the artifact was found in
    pub file: String,
    pub line: usize,
    #[serde(default)]
    pub complexity: u32,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Relation {
    pub from: String,
    pub to: String,
    pub kind: String,
}

/// Everything a parser reports for one file
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ParseOutput {
    pub artifacts: Vec<Artifact>,
    pub relations: Vec<Relation>,
    /// Raw dependency identifiers, resolved to project paths when settled
    pub dependencies: BTreeSet<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Full,
    Incremental,
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisMode::Full => write!(f, "full"),
            AnalysisMode::Incremental => write!(f, "incremental"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSource {
    Parsed,
    Cache,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Parsed,
    Cached,
    Failed,
    TimedOut,
}

impl OutcomeStatus {
    pub fn is_success(self) -> bool {
        matches!(self, OutcomeStatus::Parsed | OutcomeStatus::Cached)
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            OutcomeStatus::Parsed => "parsed",
            OutcomeStatus::Cached => "cached",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::TimedOut => "timed out",
        };
        f.write_str(label)
    }
}

/// Result of processing one file in one run
#[derive(Debug)]
pub struct FileOutcome {
    pub relative_path: String,
    pub source: OutcomeSource,
    pub result: Result<ParseOutput, PipelineError>,
    pub elapsed: Duration,
}

impl FileOutcome {
    pub fn status(&self) -> OutcomeStatus {
        match (&self.result, self.source) {
            (Ok(_), OutcomeSource::Cache) => OutcomeStatus::Cached,
            (Ok(_), OutcomeSource::Parsed) => OutcomeStatus::Parsed,
            (Err(PipelineError::FileTimeout { .. }), _) => OutcomeStatus::TimedOut,
            (Err(_), _) => OutcomeStatus::Failed,
        }
    }

    pub fn output(&self) -> Option<&ParseOutput> {
        self.result.as_ref().ok()
    }
}

/// Serializable per-file summary included in the project result
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FileReport {
    pub path: String,
    pub status: OutcomeStatus,
    pub elapsed_ms: u64,
    pub artifacts: usize,
    pub relations: usize,
    /// Dependencies as stored in the cache, resolved where possible
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl FileReport {
    pub fn from_outcome(outcome: &FileOutcome, dependencies: Vec<String>) -> Self {
        let (artifacts, relations) = outcome
            .output()
            .map(|o| (o.artifacts.len(), o.relations.len()))
            .unwrap_or((0, 0));
        let error = outcome.result.as_ref().err();
        Self {
            path: outcome.relative_path.clone(),
            status: outcome.status(),
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            artifacts,
            relations,
            dependencies,
            error: error.map(|e| e.to_string()),
            error_code: error.map(|e| e.code().as_str().to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f64,
    /// Entries dropped by dependency cascades, deletions and failed re-parses
    pub invalidated: usize,
}

impl CacheStats {
    pub fn new(entries: usize, hits: usize, misses: usize, invalidated: usize) -> Self {
        let hit_rate = if hits + misses > 0 {
            hits as f64 / (hits + misses) as f64
        } else {
            0.0
        };
        Self {
            entries,
            hits,
            misses,
            hit_rate,
            invalidated,
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache Stats: {} entries, {} hits, {} misses, {:.1}% hit rate, {} invalidated",
            self.entries,
            self.hits,
            self.misses,
            self.hit_rate * 100.0,
            self.invalidated
        )
    }
}

/// The outcome of one analysis run, owned entirely by the caller
#[derive(Clone, Debug, Serialize)]
pub struct ProjectAnalysisResult {
    pub project_path: PathBuf,
    pub mode: AnalysisMode,
    pub generated_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub files: Vec<FileRecord>,
    pub file_reports: Vec<FileReport>,
    pub artifacts: Vec<Artifact>,
    pub relations: Vec<Relation>,
    pub cache_stats: CacheStats,
    pub complexity: ComplexitySummary,
    pub quality: QualityMetrics,
}

impl ProjectAnalysisResult {
    /// Compare the analysis content of two runs, ignoring timing, mode and cache counters.
    ///
    /// Files are compared by path and content hash, reports by success and
    /// resolved dependencies.
    pub fn same_analysis(&self, other: &Self) -> bool {
        let files = |r: &Self| -> Vec<(String, Option<String>)> {
            r.files
                .iter()
                .map(|f| (f.relative_path.clone(), f.content_hash().map(str::to_string)))
                .collect()
        };
        let reports = |r: &Self| -> Vec<(String, bool, Vec<String>)> {
            r.file_reports
                .iter()
                .map(|f| (f.path.clone(), f.status.is_success(), f.dependencies.clone()))
                .collect()
        };
        files(self) == files(other)
            && reports(self) == reports(other)
            && self.artifacts == other.artifacts
            && self.relations == other.relations
            && self.complexity == other.complexity
            && self.quality.same_outcome(&other.quality)
    }

    pub fn report_for(&self, relative_path: &str) -> Option<&FileReport> {
        self.file_reports.iter().find(|r| r.path == relative_path)
    }

    pub fn count_status(&self, status: OutcomeStatus) -> usize {
        self.file_reports
            .iter()
            .filter(|r| r.status == status)
            .count()
    }
}
