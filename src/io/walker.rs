use crate::config::DiscoveryConfig;
use crate::core::FileRecord;
use crate::errors::{PipelineError, Result};
use ignore::{DirEntry, WalkBuilder};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "rst", "txt", "adoc"];

const TEST_DIRS: &[&str] = &["tests", "test", "__tests__", "spec"];

/// Walks a project tree and turns accepted files into [`FileRecord`]s.
pub struct FileDiscoverer {
    config: DiscoveryConfig,
    include: Vec<glob::Pattern>,
    exclude: Arc<Vec<glob::Pattern>>,
    source_extensions: HashSet<String>,
}

impl FileDiscoverer {
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        let include = compile_patterns(&config.include_patterns)?;
        let exclude = compile_patterns(&config.exclude_patterns)?;
        let source_extensions = config
            .source_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Ok(Self {
            config,
            include,
            exclude: Arc::new(exclude),
            source_extensions,
        })
    }

    pub fn discover(&self, root: &Path) -> Result<Vec<FileRecord>> {
        if !root.is_dir() {
            return Err(PipelineError::InvalidRoot(root.to_path_buf()));
        }

        let walk_root = root.to_path_buf();
        let prune_root = walk_root.clone();
        let excluded_dirs: Arc<HashSet<String>> =
            Arc::new(self.config.excluded_dirs.iter().cloned().collect());
        let exclude = Arc::clone(&self.exclude);

        let walker = WalkBuilder::new(&walk_root)
            .hidden(false)
            .git_ignore(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .git_global(false)
            .require_git(false)
            .parents(false)
            .max_depth(Some(self.config.max_depth))
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| keep_directory(entry, &prune_root, &excluded_dirs, &exclude))
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let relative = super::relative_key(root, entry.path());
            if !self.should_include(&relative) {
                continue;
            }

            match FileRecord::from_path(root, entry.path()) {
                Ok(record) => files.push(record),
                Err(e) => log::warn!("Skipping {}: {}", entry.path().display(), e),
            }
        }

        log::debug!("Discovered {} files under {}", files.len(), root.display());
        Ok(files)
    }

    /// Apply the file filters to a root-relative path.
    ///
    /// Order: exclude globs, include globs, test-file flag, doc-file flag, source predicate.
    pub fn should_include(&self, relative: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(relative)) {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(relative)) {
            return false;
        }
        if !self.config.include_test_files && is_test_file(relative) {
            return false;
        }
        let doc = is_doc_file(relative);
        if doc && !self.config.include_doc_files {
            return false;
        }
        doc || self.is_source_file(relative)
    }

    fn is_source_file(&self, relative: &str) -> bool {
        extension_of(relative).is_some_and(|ext| self.source_extensions.contains(&ext))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| glob::Pattern::new(p).map_err(PipelineError::from))
        .collect()
}

/// Directories named in `excluded_dirs` or matching an exclude glob are not descended.
fn keep_directory(
    entry: &DirEntry,
    root: &Path,
    excluded_dirs: &HashSet<String>,
    exclude: &[glob::Pattern],
) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_some_and(|t| t.is_dir()) {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if excluded_dirs.contains(name.as_ref()) {
        return false;
    }
    let relative = super::relative_key(root, entry.path());
    !exclude.iter().any(|p| p.matches(&relative))
}

fn extension_of(relative: &str) -> Option<String> {
    Path::new(relative)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

pub fn is_doc_file(relative: &str) -> bool {
    extension_of(relative).is_some_and(|ext| DOC_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_test_file(relative: &str) -> bool {
    let mut segments: Vec<&str> = relative.split('/').collect();
    let Some(name) = segments.pop() else {
        return false;
    };
    if segments.iter().any(|dir| TEST_DIRS.contains(dir)) {
        return true;
    }
    let stem = name.split('.').next().unwrap_or(name);
    stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with("_tests")
        || name.contains(".test.")
        || name.contains(".spec.")
}
