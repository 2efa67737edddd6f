//! Estimator selection: the worker bridge or the in-process rubric.

use std::sync::Arc;

use fraud_bridge_types::{rubric, InferenceResult, TransactionFeatures};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::config::EstimatorKind;
use super::error::BridgeError;
use super::worker::worker_bridge::InferenceBridge;

pub type SharedEstimator = Arc<dyn Estimator>;

/// Something that turns a transaction into a verdict.
pub trait Estimator: Send + Sync {
    fn classify<'a>(
        &'a self,
        features: &'a TransactionFeatures,
    ) -> BoxFuture<'a, Result<InferenceResult, BridgeError>>;

    /// Provenance tag reported as `source` next to each verdict.
    fn source(&self) -> &'static str;

    fn kind(&self) -> EstimatorKind;
}

impl Estimator for InferenceBridge {
    fn classify<'a>(
        &'a self,
        features: &'a TransactionFeatures,
    ) -> BoxFuture<'a, Result<InferenceResult, BridgeError>> {
        InferenceBridge::classify(self, features).boxed()
    }

    fn source(&self) -> &'static str {
        "Live API (worker process)"
    }

    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Worker
    }
}

/// Scores in-process with the reference rubric. Deterministic, never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicEstimator;

impl Estimator for HeuristicEstimator {
    fn classify<'a>(
        &'a self,
        features: &'a TransactionFeatures,
    ) -> BoxFuture<'a, Result<InferenceResult, BridgeError>> {
        let result = rubric::score(features);
        async move { Ok(result) }.boxed()
    }

    fn source(&self) -> &'static str {
        "Simulation (heuristic rubric)"
    }

    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Heuristic
    }
}
