//! Failure taxonomy for classification and training requests.

use std::time::Duration;

use hyper::StatusCode;
use thiserror::Error;

/// Longest diagnostic excerpt ever sent to a client.
pub const MAX_DIAGNOSTIC_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Bad or incomplete input, rejected before any worker is launched.
    #[error("invalid transaction: {0}")]
    Validation(String),

    /// The worker executable is missing or not runnable.
    #[error("worker could not be launched: {reason}")]
    LaunchFailure { reason: String },

    /// The worker ran and exited unsuccessfully.
    #[error("worker {}", describe_exit(.exit_code))]
    ProcessFailure {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The worker exceeded its allotted time and was killed.
    #[error("worker did not finish within {}ms", .elapsed.as_millis())]
    Timeout { elapsed: Duration },

    /// The worker exited 0 but its stdout is not a usable result.
    #[error("worker produced unusable output: {reason}")]
    MalformedOutput { reason: String, output: String },

    /// A train-mode worker exited unsuccessfully.
    #[error("training worker {}", describe_exit(.exit_code))]
    TrainingFailure {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Every worker slot is busy and admission was refused.
    #[error("all {capacity} worker slots are busy")]
    Saturated { capacity: usize },

    /// A training run is already in progress.
    #[error("a training run is already in progress")]
    Busy,
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated without an exit code".to_string(),
    }
}

impl BridgeError {
    /// Stable machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Validation(_) => "validation_error",
            BridgeError::LaunchFailure { .. } => "launch_failure",
            BridgeError::ProcessFailure { .. } => "process_failure",
            BridgeError::Timeout { .. } => "timeout",
            BridgeError::MalformedOutput { .. } => "malformed_output",
            BridgeError::TrainingFailure { .. } => "training_failure",
            BridgeError::Saturated { .. } => "saturated",
            BridgeError::Busy => "busy",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::Validation(_) => StatusCode::BAD_REQUEST,
            BridgeError::Busy => StatusCode::CONFLICT,
            BridgeError::LaunchFailure { .. } | BridgeError::Saturated { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            BridgeError::ProcessFailure { .. } | BridgeError::MalformedOutput { .. } => {
                StatusCode::BAD_GATEWAY
            }
            BridgeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            BridgeError::TrainingFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when the caller's input was at fault; retrying the same request is pointless.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Short message for the `error` field of a failure response.
    pub fn public_message(&self) -> &'static str {
        match self {
            BridgeError::Validation(_) => "Invalid transaction data",
            BridgeError::LaunchFailure { .. } => "Scoring engine unavailable",
            BridgeError::ProcessFailure { .. } => "Scoring engine failed",
            BridgeError::Timeout { .. } => "Scoring engine timed out",
            BridgeError::MalformedOutput { .. } => "Error processing prediction",
            BridgeError::TrainingFailure { .. } => "Training failed.",
            BridgeError::Saturated { .. } => "Scoring engine is at capacity",
            BridgeError::Busy => "Training already in progress",
        }
    }

    /// Bounded diagnostic text for the `details` field.
    pub fn details(&self) -> Option<String> {
        let text = match self {
            BridgeError::ProcessFailure { stderr, .. }
            | BridgeError::TrainingFailure { stderr, .. }
                if !stderr.is_empty() =>
            {
                format!("{self}: {stderr}")
            }
            BridgeError::MalformedOutput { output, .. } if !output.is_empty() => {
                format!("{self}; output: {output}")
            }
            BridgeError::Busy => return None,
            _ => self.to_string(),
        };
        Some(excerpt(&text))
    }
}

/// Trim `text` to at most [`MAX_DIAGNOSTIC_CHARS`] characters, keeping the tail.
///
/// Worker diagnostics (tracebacks, panics) carry the cause at the end.
pub fn excerpt(text: &str) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= MAX_DIAGNOSTIC_CHARS {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - (MAX_DIAGNOSTIC_CHARS - 1)).collect();
    format!("…{tail}")
}

/// Lossy UTF-8 excerpt of a captured output buffer.
pub fn excerpt_bytes(bytes: &[u8]) -> String {
    excerpt(&String::from_utf8_lossy(bytes))
}
