//! Builds the caller-owned project result from a scheduler run.

use chrono::Utc;
use std::path::Path;
use std::time::Duration;

use crate::core::{
    AnalysisMode, ComplexitySummary, FileReport, ProjectAnalysisResult, QualityMetrics,
};
use crate::scheduler::SchedulerRun;

/// Concatenate per-file outputs in discovery order and compute summaries.
pub fn build_result(
    root: &Path,
    mode: AnalysisMode,
    duration: Duration,
    run: SchedulerRun,
    complexity_threshold: u32,
) -> ProjectAnalysisResult {
    let mut artifacts = Vec::new();
    let mut relations = Vec::new();
    let mut file_reports = Vec::with_capacity(run.outcomes.len());

    for outcome in &run.outcomes {
        let dependencies = outcome
            .output()
            .map(|o| o.dependencies.iter().cloned().collect())
            .unwrap_or_default();
        file_reports.push(FileReport::from_outcome(outcome, dependencies));

        if let Some(output) = outcome.output() {
            artifacts.extend(output.artifacts.iter().cloned());
            relations.extend(output.relations.iter().cloned());
        }
    }

    let complexity = ComplexitySummary::from_artifacts(&artifacts, complexity_threshold);
    let quality = QualityMetrics::from_reports(&file_reports, relations.len());

    ProjectAnalysisResult {
        project_path: root.to_path_buf(),
        mode,
        generated_at: Utc::now(),
        duration_ms: duration.as_millis() as u64,
        files: run.files,
        file_reports,
        artifacts,
        relations,
        cache_stats: run.cache_stats,
        complexity,
        quality,
    }
}
