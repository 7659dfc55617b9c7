// Core configuration types
mod core;
mod loader;
pub mod validation;

pub use self::core::{
    CacheConfig, DiscoveryConfig, MetricsConfig, PipelineConfig, ResourceConfig, SchedulerConfig,
};
pub use loader::{
    apply_env_overrides, directory_ancestors, load_config, load_config_from_path,
    parse_and_validate_config, EnvironmentSnapshot, CONFIG_FILE_NAME,
};
pub use validation::validate_config;

use std::path::Path;

/// Resolve the effective configuration for a project.
///
/// An explicit file wins over the upward search; environment overrides are applied
/// last and the merged result is validated again.
pub fn resolve_config(
    project_root: &Path,
    explicit: Option<&Path>,
    env: &EnvironmentSnapshot,
) -> crate::errors::Result<PipelineConfig> {
    let base = match explicit {
        Some(path) => load_config_from_path(path)?,
        None => load_config(project_root),
    };
    let config = apply_env_overrides(base, env);
    validate_config(&config)?;
    Ok(config)
}
