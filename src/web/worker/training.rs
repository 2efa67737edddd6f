//! Train-mode worker runs.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, Mutex as TokioMutex};

use super::invocation::{InvocationLimits, InvocationOutcome, WorkerInvocation, WorkerProgram};
use super::ipc_types::WorkerMode;
use crate::web::config::WorkerConfig;
use crate::web::error::{excerpt_bytes, BridgeError};
use crate::{sys_info, sys_warn};

/// Summary of a successful training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// stdout lines the worker printed.
    pub progress_lines: usize,
    /// Last non-empty progress line, usually the worker's own summary.
    pub summary: Option<String>,
    pub duration: Duration,
    pub completed_at: DateTime<Local>,
}

/// Runs train-mode workers, one at a time.
pub struct TrainingHandler {
    program: WorkerProgram,
    limits: InvocationLimits,
    running: TokioMutex<()>,
}

impl TrainingHandler {
    pub fn new(program: WorkerProgram, config: &WorkerConfig) -> Self {
        Self {
            program,
            limits: config.train_limits(),
            running: TokioMutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Run one training worker to completion.
    ///
    /// Progress lines go to the log as they arrive; success is decided by
    /// the exit status alone.
    pub async fn train(&self) -> Result<TrainingReport, BridgeError> {
        let _guard = self.running.try_lock().map_err(|_| BridgeError::Busy)?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let invocation = WorkerInvocation::new(&self.program, WorkerMode::Train, None, self.limits)
            .stream_stdout_lines(tx)
            .keep_stderr_tail();
        let id = invocation.id();
        sys_info!("[TRAIN {id}] starting training worker: {}", self.program);

        let started = Instant::now();
        let progress = async move {
            let mut count = 0usize;
            let mut last = None;
            while let Some(line) = rx.recv().await {
                sys_info!("[TRAIN {id}] {line}");
                count += 1;
                if !line.trim().is_empty() {
                    last = Some(line);
                }
            }
            (count, last)
        };
        let (outcome, (progress_lines, summary)) = tokio::join!(invocation.run(), progress);

        let result = match outcome {
            InvocationOutcome::Success { .. } => Ok(TrainingReport {
                progress_lines,
                summary,
                duration: started.elapsed(),
                completed_at: Local::now(),
            }),
            InvocationOutcome::ProcessFailure {
                exit_code, stderr, ..
            } => Err(BridgeError::TrainingFailure {
                exit_code,
                stderr: excerpt_bytes(&stderr),
            }),
            InvocationOutcome::Timeout { elapsed } => Err(BridgeError::Timeout { elapsed }),
            InvocationOutcome::LaunchFailure { reason } => {
                Err(BridgeError::LaunchFailure { reason })
            }
            // Not produced with streamed stdout and a kept stderr tail.
            InvocationOutcome::OutputOverflow { stream, limit } => {
                Err(BridgeError::TrainingFailure {
                    exit_code: None,
                    stderr: format!("{stream} exceeded {limit} bytes"),
                })
            }
        };

        match &result {
            Ok(report) => sys_info!(
                "[TRAIN {id}] completed in {}ms ({} progress lines)",
                report.duration.as_millis(),
                report.progress_lines
            ),
            Err(e) => sys_warn!("[TRAIN {id}] {e}"),
        }
        result
    }
}
