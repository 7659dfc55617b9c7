//! One file's trip through the parser.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::core::{FileOutcome, FileRecord, OutcomeSource, ParseContext, Parser};
use crate::errors::PipelineError;
use crate::observability::enter_parse;

/// A file waiting for a permit. Lives only for one batch.
#[derive(Debug, Clone, Copy)]
pub struct ParseTask {
    pub index: usize,
    pub timeout: Duration,
}

impl ParseTask {
    pub fn new(index: usize, timeout: Duration) -> Self {
        Self { index, timeout }
    }

    /// Acquire a permit, then race the parser against the timeout.
    ///
    /// Waiting for the permit counts against the same deadline, so a slot held by
    /// abandoned work times this file out instead of stalling the batch. The permit
    /// moves into the blocking closure and is released only when the parser
    /// actually returns. `token` is cancelled on timeout; whatever the parser
    /// produces afterwards is dropped.
    pub async fn execute(
        self,
        files: Arc<Vec<FileRecord>>,
        parser: Arc<dyn Parser>,
        permits: Arc<Semaphore>,
        token: CancellationToken,
    ) -> (usize, FileOutcome) {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let file = &files[self.index];
        let relative_path = file.relative_path.clone();
        let path = file.path.clone();

        let acquired = tokio::time::timeout_at(deadline.into(), permits.acquire_owned()).await;
        let result = match acquired {
            Ok(Ok(permit)) => {
                let ctx = ParseContext::new(token.clone(), deadline);
                let index = self.index;
                let shared = Arc::clone(&files);
                let work = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    let file = &shared[index];
                    let _guard = enter_parse(&file.path, parser.name());
                    parser.parse_file(file, &ctx)
                });

                match tokio::time::timeout_at(deadline.into(), work).await {
                    Ok(Ok(Ok(output))) => Ok(output),
                    Ok(Ok(Err(e))) => Err(PipelineError::parse(&path, format!("{e:#}"))),
                    Ok(Err(join_error)) => {
                        let message = if join_error.is_panic() {
                            format!(
                                "parser panicked: {}",
                                panic_message(join_error.into_panic())
                            )
                        } else {
                            "parse task was cancelled".to_string()
                        };
                        Err(PipelineError::parse(&path, message))
                    }
                    Err(_) => {
                        Err(self.timed_out(&token, &relative_path, &path, "Parse timed out"))
                    }
                }
            }
            Ok(Err(_)) => Err(PipelineError::parse(&path, "scheduler shut down")),
            Err(_) => Err(self.timed_out(
                &token,
                &relative_path,
                &path,
                "No parse slot freed up before the file timeout",
            )),
        };

        let outcome = FileOutcome {
            relative_path,
            source: OutcomeSource::Parsed,
            result,
            elapsed: started.elapsed(),
        };
        (self.index, outcome)
    }

    fn timed_out(
        &self,
        token: &CancellationToken,
        relative_path: &str,
        path: &std::path::Path,
        message: &str,
    ) -> PipelineError {
        token.cancel();
        tracing::warn!(
            file = %relative_path,
            timeout_ms = self.timeout.as_millis() as u64,
            "{message}"
        );
        PipelineError::FileTimeout {
            path: path.to_path_buf(),
            timeout: self.timeout,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
