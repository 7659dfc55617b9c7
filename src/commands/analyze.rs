use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use super::{load_effective_config, CliOverrides};
use crate::core::{OutcomeStatus, ProjectAnalysisResult};
use crate::parsers::ImportScanner;
use crate::pipeline::{Orchestrator, PipelineContext};
use crate::progress::{BarProgress, LogProgress, ProgressConfig, ProgressSink};
use crate::report::{create_writer, ColorMode, OutputFormat};

pub struct AnalyzeConfig {
    pub path: PathBuf,
    pub incremental: bool,
    pub config: Option<PathBuf>,
    pub overrides: CliOverrides,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub verbosity: u8,
}

/// Run an analysis and write the report. Returns the number of files that did not
/// produce a result.
pub fn handle_analyze(config: AnalyzeConfig) -> Result<usize> {
    let pipeline_config =
        load_effective_config(&config.path, config.config.as_deref(), &config.overrides)?;

    let progress = ProgressConfig::from_env(config.overrides.quiet, config.verbosity);
    let sink: Arc<dyn ProgressSink> = if !progress.should_show_progress() && config.verbosity > 0 {
        Arc::new(LogProgress)
    } else {
        Arc::new(BarProgress::new(&progress))
    };
    let ctx = PipelineContext::new(pipeline_config)
        .with_progress(sink)
        .with_span(tracing::info_span!("deltascan", version = env!("CARGO_PKG_VERSION")));
    let parser = Arc::new(ImportScanner::new()?);
    let orchestrator = Orchestrator::new(ctx, parser);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let results = runtime.block_on(async {
        if config.incremental {
            orchestrator.analyze_project_incremental(&config.path).await
        } else {
            orchestrator.analyze_project(&config.path).await
        }
    });
    // abandoned parse work must not hold up process exit
    runtime.shutdown_background();
    let results = results?;

    write_report(&results, config.format, config.output.as_ref())?;
    Ok(results.count_status(OutcomeStatus::Failed) + results.count_status(OutcomeStatus::TimedOut))
}

fn write_report(
    results: &ProjectAnalysisResult,
    format: OutputFormat,
    output: Option<&PathBuf>,
) -> Result<()> {
    let color = if output.is_some() {
        ColorMode::Never
    } else {
        ColorMode::from_env()
    };
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    let mut writer = create_writer(format, sink, color);
    writer.write_results(results)
}
