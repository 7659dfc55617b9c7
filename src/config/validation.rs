//! Configuration validation.
//!
//! All problems are collected before reporting so a user fixing a config file sees
//! every rejected value at once.

use super::core::PipelineConfig;
use crate::errors::{PipelineError, Result};

fn check_ratio(errors: &mut Vec<String>, name: &str, value: f64) {
    if !(value > 0.0 && value <= 1.0) {
        errors.push(format!("{} must be in (0, 1], got {}", name, value));
    }
}

fn check_patterns(errors: &mut Vec<String>, name: &str, patterns: &[String]) {
    for pattern in patterns {
        if let Err(e) = glob::Pattern::new(pattern) {
            errors.push(format!("{} contains invalid glob '{}': {}", name, pattern, e));
        }
    }
}

/// Collect every validation problem in `config`.
pub fn collect_errors(config: &PipelineConfig) -> Vec<String> {
    let mut errors = Vec::new();

    let scheduler = &config.scheduler;
    if scheduler.max_concurrent_files == 0 {
        errors.push("scheduler.max_concurrent_files must be at least 1".to_string());
    }
    if scheduler.file_timeout_ms == 0 {
        errors.push("scheduler.file_timeout_ms must be greater than 0".to_string());
    }
    if scheduler.run_timeout_ms == 0 {
        errors.push("scheduler.run_timeout_ms must be greater than 0".to_string());
    }

    let resource = &config.resource;
    if resource.memory_limit_mb == 0 {
        errors.push("resource.memory_limit_mb must be greater than 0".to_string());
    }
    check_ratio(&mut errors, "resource.used_ratio_medium", resource.used_ratio_medium);
    check_ratio(&mut errors, "resource.used_ratio_high", resource.used_ratio_high);
    check_ratio(&mut errors, "resource.rss_ratio_medium", resource.rss_ratio_medium);
    check_ratio(&mut errors, "resource.rss_ratio_high", resource.rss_ratio_high);
    if resource.used_ratio_medium > resource.used_ratio_high {
        errors.push("resource.used_ratio_medium must not exceed used_ratio_high".to_string());
    }
    if resource.rss_ratio_medium > resource.rss_ratio_high {
        errors.push("resource.rss_ratio_medium must not exceed rss_ratio_high".to_string());
    }
    if resource.leak_window < 2 {
        errors.push("resource.leak_window must be at least 2".to_string());
    }

    check_patterns(
        &mut errors,
        "discovery.include_patterns",
        &config.discovery.include_patterns,
    );
    check_patterns(
        &mut errors,
        "discovery.exclude_patterns",
        &config.discovery.exclude_patterns,
    );

    errors
}

/// Validate `config`, reporting all problems in one error.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    let errors = collect_errors(config);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Configuration(errors.join("; ")))
    }
}
