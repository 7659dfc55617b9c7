//! Rendering of [`ProjectAnalysisResult`] for the terminal and as JSON.

use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};
use std::env;
use std::io::{IsTerminal, Write};

use crate::core::{OutcomeStatus, ProjectAnalysisResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Terminal,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    /// `NO_COLOR`, `CLICOLOR=0` and `CLICOLOR_FORCE=1` as usual
    pub fn from_env() -> Self {
        if env::var_os("NO_COLOR").is_some() {
            return Self::Never;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v == "1") {
            return Self::Always;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return Self::Never;
        }
        Self::Auto
    }

    pub fn should_use_color(&self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => {
                env::var("TERM").map_or(true, |term| term != "dumb")
                    && std::io::stdout().is_terminal()
            }
        }
    }
}

pub trait OutputWriter {
    fn write_results(&mut self, results: &ProjectAnalysisResult) -> anyhow::Result<()>;
}

pub struct JsonWriter<W: Write> {
    writer: W,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> OutputWriter for JsonWriter<W> {
    fn write_results(&mut self, results: &ProjectAnalysisResult) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, results)?;
        writeln!(self.writer)?;
        Ok(())
    }
}

pub struct TerminalWriter<W: Write> {
    writer: W,
    color: bool,
}

impl<W: Write> TerminalWriter<W> {
    pub fn new(writer: W, color: ColorMode) -> Self {
        let color = color.should_use_color();
        colored::control::set_override(color);
        Self { writer, color }
    }

    fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if !self.color {
            table.force_no_tty();
        }
        table
    }

    fn status_label(&self, status: OutcomeStatus) -> String {
        let label = status.to_string();
        match status {
            OutcomeStatus::Parsed => label.green().to_string(),
            OutcomeStatus::Cached => label.cyan().to_string(),
            OutcomeStatus::Failed => label.red().to_string(),
            OutcomeStatus::TimedOut => label.yellow().to_string(),
        }
    }

    fn write_header(&mut self, results: &ProjectAnalysisResult) -> anyhow::Result<()> {
        writeln!(
            self.writer,
            "{} {} ({} analysis, {} ms)",
            "deltascan".blue().bold(),
            results.project_path.display(),
            results.mode,
            results.duration_ms
        )?;
        Ok(())
    }

    fn write_summary(&mut self, results: &ProjectAnalysisResult) -> anyhow::Result<()> {
        let quality = &results.quality;
        let stats = &results.cache_stats;
        let rows = [
            ("Files", quality.files_total.to_string()),
            ("Parsed", quality.files_parsed.to_string()),
            ("Cached", quality.files_cached.to_string()),
            ("Failed", quality.files_failed.to_string()),
            ("Timed out", quality.files_timed_out.to_string()),
            ("Artifacts", results.artifacts.len().to_string()),
            ("Relations", results.relations.len().to_string()),
            ("Cache hit rate", format!("{:.1}%", stats.hit_rate * 100.0)),
            ("Invalidated", stats.invalidated.to_string()),
            ("Cache entries", stats.entries.to_string()),
        ];

        let mut table = self.table();
        table.set_header(vec!["Metric", "Value"]);
        for (metric, value) in rows {
            table.add_row(vec![
                Cell::new(metric),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        writeln!(self.writer, "{table}")?;
        Ok(())
    }

    fn write_complexity(&mut self, results: &ProjectAnalysisResult) -> anyhow::Result<()> {
        let complexity = &results.complexity;
        let mut table = self.table();
        table.set_header(vec!["Complexity", "Value"]);
        table.add_row(vec!["Total".to_string(), complexity.total_complexity.to_string()]);
        table.add_row(vec![
            "Average".to_string(),
            format!("{:.2}", complexity.average_complexity),
        ]);
        table.add_row(vec!["Max".to_string(), complexity.max_complexity.to_string()]);
        table.add_row(vec![
            "Above threshold".to_string(),
            complexity.high_complexity_count.to_string(),
        ]);
        writeln!(self.writer, "{table}")?;
        Ok(())
    }

    fn write_problems(&mut self, results: &ProjectAnalysisResult) -> anyhow::Result<()> {
        let problems: Vec<_> = results
            .file_reports
            .iter()
            .filter(|r| !r.status.is_success())
            .collect();
        if problems.is_empty() {
            return Ok(());
        }

        let mut table = self.table();
        table.set_header(vec!["File", "Status", "Code", "Error"]);
        for report in problems {
            table.add_row(vec![
                report.path.clone(),
                self.status_label(report.status),
                report.error_code.clone().unwrap_or_default(),
                report.error.clone().unwrap_or_default(),
            ]);
        }
        writeln!(self.writer, "{}", "Problems".red().bold())?;
        writeln!(self.writer, "{table}")?;
        Ok(())
    }

    fn write_cycles(&mut self, results: &ProjectAnalysisResult) -> anyhow::Result<()> {
        let cycles = &results.quality.dependency_cycles;
        if cycles.is_empty() {
            return Ok(());
        }
        writeln!(self.writer, "{}", "Dependency cycles".yellow().bold())?;
        for cycle in cycles {
            writeln!(self.writer, "  {}", cycle.join(" -> "))?;
        }
        Ok(())
    }
}

impl<W: Write> OutputWriter for TerminalWriter<W> {
    fn write_results(&mut self, results: &ProjectAnalysisResult) -> anyhow::Result<()> {
        self.write_header(results)?;
        self.write_summary(results)?;
        self.write_complexity(results)?;
        self.write_problems(results)?;
        self.write_cycles(results)?;
        Ok(())
    }
}

pub fn create_writer<'w>(
    format: OutputFormat,
    writer: Box<dyn Write + 'w>,
    color: ColorMode,
) -> Box<dyn OutputWriter + 'w> {
    match format {
        OutputFormat::Json => Box::new(JsonWriter::new(writer)),
        OutputFormat::Terminal => Box::new(TerminalWriter::new(writer, color)),
    }
}
