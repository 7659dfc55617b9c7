use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::core::PipelineConfig;
use super::validation::validate_config;
use crate::errors::{PipelineError, Result};

pub const CONFIG_FILE_NAME: &str = ".deltascan.toml";

const MAX_TRAVERSAL_DEPTH: usize = 10;

/// Read a config file into a string
pub(crate) fn read_config_file(path: &Path) -> std::result::Result<String, std::io::Error> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Parse and validate config from a TOML string
pub fn parse_and_validate_config(contents: &str) -> Result<PipelineConfig> {
    let config = toml::from_str::<PipelineConfig>(contents).map_err(|e| {
        PipelineError::Configuration(format!("Failed to parse {}: {}", CONFIG_FILE_NAME, e))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Try loading config from a specific path, logging instead of failing
pub(crate) fn try_load_config_from_path(config_path: &Path) -> Option<PipelineConfig> {
    let contents = match read_config_file(config_path) {
        Ok(contents) => contents,
        Err(e) => {
            handle_read_error(config_path, &e);
            return None;
        }
    };

    match parse_and_validate_config(&contents) {
        Ok(config) => {
            log::debug!("Loaded config from {}", config_path.display());
            Some(config)
        }
        Err(e) => {
            log::warn!("{}. Using defaults.", e);
            None
        }
    }
}

/// Only log actual errors, not "file not found"
pub(crate) fn handle_read_error(config_path: &Path, error: &std::io::Error) {
    if error.kind() != std::io::ErrorKind::NotFound {
        log::warn!(
            "Failed to read config file {}: {}",
            config_path.display(),
            error
        );
    }
}

/// Generate directory ancestors up to a depth limit
pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

/// Search for `.deltascan.toml` from `start` upwards; defaults when none is usable.
pub fn load_config(start: &Path) -> PipelineConfig {
    let start = start
        .canonicalize()
        .unwrap_or_else(|_| start.to_path_buf());

    directory_ancestors(start, MAX_TRAVERSAL_DEPTH)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find_map(|path| try_load_config_from_path(&path))
        .unwrap_or_else(|| {
            log::debug!(
                "No config found after checking {} directories. Using default config.",
                MAX_TRAVERSAL_DEPTH
            );
            PipelineConfig::default()
        })
}

/// Load an explicitly requested config file; any problem is an error.
pub fn load_config_from_path(path: &Path) -> Result<PipelineConfig> {
    let contents = read_config_file(path).map_err(|e| {
        PipelineError::Configuration(format!("Cannot read {}: {}", path.display(), e))
    })?;
    parse_and_validate_config(&contents)
}

/// Environment variable snapshot for configuration resolution
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSnapshot {
    pub vars: HashMap<String, String>,
}

impl EnvironmentSnapshot {
    /// Capture the `DELTASCAN_*` variables of the current process
    pub fn from_current_env() -> Self {
        let vars = std::env::vars()
            .filter(|(key, _)| key.starts_with("DELTASCAN_"))
            .collect();
        Self { vars }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    pub fn is_true(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(|v| v.to_ascii_lowercase()).as_deref(),
            Some("1") | Some("true") | Some("yes")
        )
    }

    pub fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key)?.parse().ok()
    }
}

/// Apply `DELTASCAN_*` overrides on top of a file-based config
pub fn apply_env_overrides(
    mut config: PipelineConfig,
    env: &EnvironmentSnapshot,
) -> PipelineConfig {
    if let Some(n) = env.parse::<usize>("DELTASCAN_MAX_CONCURRENT_FILES") {
        config.scheduler.max_concurrent_files = n;
    }
    if let Some(ms) = env.parse::<u64>("DELTASCAN_FILE_TIMEOUT_MS") {
        config.scheduler.file_timeout_ms = ms;
    }
    if let Some(ms) = env.parse::<u64>("DELTASCAN_RUN_TIMEOUT_MS") {
        config.scheduler.run_timeout_ms = ms;
    }
    if let Some(mb) = env.parse::<u64>("DELTASCAN_MEMORY_LIMIT_MB") {
        config.resource.memory_limit_mb = mb;
    }
    if let Some(dir) = env.get("DELTASCAN_CACHE_DIR") {
        config.cache.path = Some(PathBuf::from(dir).join(super::CacheConfig::DEFAULT_FILE));
    }
    if env.get("DELTASCAN_CACHE_COMPRESSION").is_some() {
        config.cache.compression_enabled = env.is_true("DELTASCAN_CACHE_COMPRESSION");
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use tempfile::TempDir;

    #[test]
    fn test_parse_partial_config_keeps_defaults() {
        let config = parse_and_validate_config(indoc! {r#"
            [scheduler]
            max_concurrent_files = 4

            [cache]
            compression_enabled = true
        "#})
        .unwrap();

        assert_eq!(config.scheduler.max_concurrent_files, 4);
        assert_eq!(config.scheduler.run_timeout_ms, 300_000);
        assert!(config.cache.compression_enabled);
        assert_eq!(config.discovery.max_depth, 32);
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = parse_and_validate_config("[scheduler\nmax = ").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_load_config_finds_file_in_ancestor() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "[discovery]\nmax_depth = 3\n",
        )
        .unwrap();
        let nested = temp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let config = load_config(&nested);
        assert_eq!(config.discovery.max_depth, 3);
    }

    #[test]
    fn test_broken_config_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), "not = [valid").unwrap();

        let config = load_config(temp.path());
        assert_eq!(config.scheduler.max_concurrent_files, 10);
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let temp = TempDir::new().unwrap();
        let result = load_config_from_path(&temp.path().join("nope.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env = EnvironmentSnapshot::from_pairs([
            ("DELTASCAN_MAX_CONCURRENT_FILES", "3"),
            ("DELTASCAN_CACHE_COMPRESSION", "true"),
            ("DELTASCAN_CACHE_DIR", "/tmp/scan-cache"),
            ("DELTASCAN_RUN_TIMEOUT_MS", "not-a-number"),
        ]);
        let config = apply_env_overrides(PipelineConfig::default(), &env);

        assert_eq!(config.scheduler.max_concurrent_files, 3);
        assert!(config.cache.compression_enabled);
        assert_eq!(
            config.cache.path,
            Some(PathBuf::from("/tmp/scan-cache/cache.json"))
        );
        assert_eq!(config.scheduler.run_timeout_ms, 300_000);
    }

    #[test]
    fn test_directory_ancestors_respects_limit() {
        let ancestors: Vec<_> = directory_ancestors(PathBuf::from("/a/b/c/d"), 2).collect();
        assert_eq!(
            ancestors,
            vec![PathBuf::from("/a/b/c/d"), PathBuf::from("/a/b/c")]
        );
    }
}
