use serde::Serialize;

use crate::DataError;

/// A classification verdict.
///
/// `is_fraud` is whatever the scorer decided; only the probability range is
/// checked here, the threshold policy belongs to the scorer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceResult {
    is_fraud: bool,
    fraud_probability: f64,
    status: String,
}

impl InferenceResult {
    pub fn new(
        is_fraud: bool,
        fraud_probability: f64,
        status: impl Into<String>,
    ) -> Result<Self, DataError> {
        if !(0.0..=1.0).contains(&fraud_probability) {
            return Err(DataError::ProbabilityOutOfRange(fraud_probability));
        }
        Ok(Self {
            is_fraud,
            fraud_probability,
            status: status.into(),
        })
    }

    /// Rubric probabilities are in [0, 0.99] by construction.
    pub(crate) fn from_rubric(is_fraud: bool, fraud_probability: f64, status: &str) -> Self {
        Self {
            is_fraud,
            fraud_probability: fraud_probability.clamp(0.0, 1.0),
            status: status.to_string(),
        }
    }

    pub fn is_fraud(&self) -> bool {
        self.is_fraud
    }

    pub fn fraud_probability(&self) -> f64 {
        self.fraud_probability
    }

    pub fn status(&self) -> &str {
        &self.status
    }
}
