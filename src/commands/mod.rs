//! Handlers behind the `deltascan` subcommands.

pub mod analyze;
pub mod cache;

use std::path::Path;

use crate::config::{resolve_config, EnvironmentSnapshot, PipelineConfig};

/// Settings given on the command line; these win over files and environment.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub jobs: Option<usize>,
    pub file_timeout_ms: Option<u64>,
    pub run_timeout_ms: Option<u64>,
    pub no_cache: bool,
    pub quiet: bool,
}

impl CliOverrides {
    pub fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(jobs) = self.jobs {
            config.scheduler.max_concurrent_files = jobs;
        }
        if let Some(ms) = self.file_timeout_ms {
            config.scheduler.file_timeout_ms = ms;
        }
        if let Some(ms) = self.run_timeout_ms {
            config.scheduler.run_timeout_ms = ms;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        if self.quiet {
            config.scheduler.enable_progress = false;
        }
        config
    }
}

/// File, then environment, then command line; validated after every layer.
pub fn load_effective_config(
    project_root: &Path,
    explicit: Option<&Path>,
    overrides: &CliOverrides,
) -> anyhow::Result<PipelineConfig> {
    let env = EnvironmentSnapshot::from_current_env();
    let config = overrides.apply(resolve_config(project_root, explicit, &env)?);
    crate::config::validate_config(&config)?;
    Ok(config)
}
