use std::sync::Arc;
use std::time::Instant;

use fraud_bridge_types::InferenceResult;
use serde::Serialize;

use super::config::{BridgeConfig, ConfigError, EstimatorKind};
use super::estimator::{HeuristicEstimator, SharedEstimator};
use super::worker::training::{TrainingHandler, TrainingReport};
use super::worker::worker_bridge::{InferenceBridge, SharedInferenceBridge};

pub const SERVICE_NAME: &str = "fraud-bridge";

/// Everything a request handler needs, shared across connections.
pub struct AppState {
    pub config: BridgeConfig,
    /// Answers `/predict`; the bridge itself unless the heuristic is selected.
    pub estimator: SharedEstimator,
    pub bridge: SharedInferenceBridge,
    pub trainer: Arc<TrainingHandler>,
    pub started_at: Instant,
}

pub type SharedAppState = Arc<AppState>;

impl AppState {
    pub fn from_config(config: BridgeConfig) -> Result<Self, ConfigError> {
        let program = config.worker.resolve_program()?;
        let bridge = Arc::new(InferenceBridge::new(program.clone(), &config.worker));
        let trainer = Arc::new(TrainingHandler::new(program, &config.worker));
        let estimator: SharedEstimator = match config.estimator {
            EstimatorKind::Worker => bridge.clone(),
            EstimatorKind::Heuristic => Arc::new(HeuristicEstimator),
        };
        Ok(Self {
            config,
            estimator,
            bridge,
            trainer,
            started_at: Instant::now(),
        })
    }
}

/// Successful `/predict` body.
#[derive(Debug, Serialize)]
pub struct ClassificationResponse<'a> {
    #[serde(flatten)]
    pub result: &'a InferenceResult,
    pub source: &'static str,
}

/// Successful `/train` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingResponse {
    pub message: String,
    pub progress_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub duration_ms: u64,
    pub completed_at: String,
}

impl From<TrainingReport> for TrainingResponse {
    fn from(report: TrainingReport) -> Self {
        Self {
            message: "Training completed successfully!".to_string(),
            progress_lines: report.progress_lines,
            summary: report.summary,
            duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            completed_at: report.completed_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub model: String,
    pub estimator: EstimatorKind,
    pub worker_available: bool,
    pub active_workers: usize,
    pub invocations: u64,
    pub training_in_progress: bool,
    pub uptime_secs: u64,
}

/// Failure body shared by every route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
