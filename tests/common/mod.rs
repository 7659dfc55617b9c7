// Shared fixtures and instrumented parsers for deltascan integration tests
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deltascan::config::PipelineConfig;
use deltascan::core::{Artifact, FileRecord, ParseContext, ParseOutput, Parser};
use deltascan::io::hash_content;
use deltascan::pipeline::{Orchestrator, PipelineContext};
use parking_lot::Mutex;
use tempfile::TempDir;

/// A project tree in a temporary directory
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Create a project from `(relative path, contents)` pairs
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let project = Self::new();
        for (path, contents) in files {
            project.write(path, contents);
        }
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(path, contents).expect("Failed to write fixture");
    }

    /// Append a line so both contents and size change
    pub fn touch(&self, relative: &str) {
        let path = self.dir.path().join(relative);
        let mut contents = std::fs::read_to_string(&path).expect("Failed to read fixture");
        contents.push_str("# edited\n");
        std::fs::write(path, contents).expect("Failed to write fixture");
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.dir.path().join(relative)).expect("Failed to remove fixture");
    }

    pub fn cache_file(&self) -> PathBuf {
        self.dir.path().join(".deltascan").join("cache.json")
    }
}

/// Defaults with short timeouts and no progress output
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.scheduler.enable_progress = false;
    config.scheduler.file_timeout_ms = 5_000;
    config.scheduler.run_timeout_ms = 30_000;
    config
}

pub fn orchestrator(config: PipelineConfig, parser: Arc<ScriptedParser>) -> Orchestrator {
    Orchestrator::new(PipelineContext::new(config), parser)
}

/// Parser driven by directives in the file contents:
///
/// - `dep: <path>` adds a dependency
/// - `fail` returns an error
/// - `panic` panics
/// - `sleep: <ms>` sleeps, stopping early when cancelled
/// - `hang: <ms>` sleeps and ignores cancellation
#[derive(Default)]
pub struct ScriptedParser {
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    late_results: AtomicUsize,
}

impl ScriptedParser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Relative paths parsed since the last reset, sorted
    pub fn parsed(&self) -> Vec<String> {
        let mut calls = self.calls.lock().clone();
        calls.sort();
        calls
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    /// Highest number of simultaneous `parse_file` calls observed
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Parses that finished after their token was cancelled
    pub fn late_results(&self) -> usize {
        self.late_results.load(Ordering::SeqCst)
    }

    fn run_directives(&self, source: &str, ctx: &ParseContext) -> anyhow::Result<BTreeSet<String>> {
        let mut dependencies = BTreeSet::new();
        for line in source.lines().map(str::trim) {
            if let Some(dep) = line.strip_prefix("dep:") {
                dependencies.insert(dep.trim().to_string());
            } else if line == "fail" {
                anyhow::bail!("scripted failure");
            } else if line == "panic" {
                panic!("scripted panic");
            } else if let Some(ms) = line.strip_prefix("sleep:") {
                let until = Instant::now() + Duration::from_millis(ms.trim().parse()?);
                while Instant::now() < until {
                    if ctx.is_cancelled() {
                        anyhow::bail!("cancelled");
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
            } else if let Some(ms) = line.strip_prefix("hang:") {
                std::thread::sleep(Duration::from_millis(ms.trim().parse()?));
            }
        }
        Ok(dependencies)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Parser for ScriptedParser {
    fn parse_file(&self, file: &FileRecord, ctx: &ParseContext) -> anyhow::Result<ParseOutput> {
        self.calls.lock().push(file.relative_path.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let source = std::fs::read_to_string(&file.path)?;
        let dependencies = self.run_directives(&source, ctx)?;
        if ctx.is_cancelled() {
            self.late_results.fetch_add(1, Ordering::SeqCst);
        }

        Ok(ParseOutput {
            artifacts: vec![Artifact {
                id: format!("{}::module", file.relative_path),
                kind: "module".into(),
                name: file.name.clone(),
                file: file.relative_path.clone(),
                line: 1,
                complexity: source.lines().count() as u32,
                attributes: serde_json::json!({ "digest": hash_content(source.as_bytes()) }),
            }],
            relations: Vec::new(),
            dependencies,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
