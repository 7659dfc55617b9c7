//! Progress feedback for analysis runs.
//!
//! The scheduler emits [`ProgressEvent`]s through a [`ProgressReporter`], which
//! throttles them to `progress_interval_ms` and always lets the final event through.
//! Where the events go is decided by the [`ProgressSink`]:
//!
//! - [`BarProgress`]: an `indicatif` bar on stderr, hidden in quiet mode and when
//!   stderr is not a TTY (respects `DELTASCAN_QUIET` and `--quiet`)
//! - [`LogProgress`]: `tracing` events, for CI logs
//! - [`NoProgress`]: nothing

use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const TEMPLATE_FILE_ANALYSIS: &str =
    "📁 {msg} {pos}/{len} files ({percent}%) - {per_sec} - {eta}";

/// Configuration for progress display behavior
#[derive(Debug, Clone, Default)]
pub struct ProgressConfig {
    pub quiet_mode: bool,
    pub verbosity: u8,
}

impl ProgressConfig {
    /// Create progress configuration from environment and CLI arguments
    pub fn from_env(quiet: bool, verbosity: u8) -> Self {
        let env_quiet = std::env::var("DELTASCAN_QUIET").is_ok();
        Self {
            quiet_mode: quiet || env_quiet,
            verbosity,
        }
    }

    /// Determine if progress bars should be displayed
    pub fn should_show_progress(&self) -> bool {
        if self.quiet_mode {
            return false;
        }
        use std::io::IsTerminal;
        std::io::stderr().is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub cached: usize,
    pub failed: usize,
    pub batch: usize,
    pub batches: usize,
    pub elapsed: Duration,
}

impl ProgressEvent {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_final(&self) -> bool {
        self.completed >= self.total
    }
}

/// Receiver of progress events
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);

    fn on_finish(&self, event: &ProgressEvent) {
        self.on_progress(event);
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        tracing::info!(
            completed = event.completed,
            total = event.total,
            cached = event.cached,
            failed = event.failed,
            "Analysis progress {:.0}%",
            event.fraction() * 100.0
        );
    }
}

/// Terminal progress bar
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(config: &ProgressConfig) -> Self {
        if !config.should_show_progress() {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar().template(TEMPLATE_FILE_ANALYSIS) {
            bar.set_style(style.progress_chars("█▓▒░  "));
        }
        bar.set_message("Analyzing");
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        self.bar.set_length(event.total as u64);
        self.bar.set_position(event.completed as u64);
    }

    fn on_finish(&self, event: &ProgressEvent) {
        self.on_progress(event);
        self.bar.finish_with_message(format!(
            "Analyzed {} files ({} cached, {} failed)",
            event.total, event.cached, event.failed
        ));
    }
}

/// Throttles events to a minimum interval
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    enabled: bool,
    interval: Duration,
    last_emit: Mutex<Option<Instant>>,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, enabled: bool, interval: Duration) -> Self {
        Self {
            sink,
            enabled,
            interval,
            last_emit: Mutex::new(None),
        }
    }

    /// Forward the event if enough time has passed since the last one. Returns
    /// whether the event was emitted.
    pub fn report(&self, event: &ProgressEvent) -> bool {
        if !self.enabled {
            return false;
        }
        let mut last = self.last_emit.lock();
        let now = Instant::now();
        if last.is_some_and(|at| now.duration_since(at) < self.interval) {
            return false;
        }
        *last = Some(now);
        drop(last);
        self.sink.on_progress(event);
        true
    }

    /// Always forwarded when progress is enabled
    pub fn finish(&self, event: &ProgressEvent) {
        if self.enabled {
            self.sink.on_finish(event);
        }
    }
}
