//! Worker protocol types for server ↔ worker communication.
//!
//! One request per process: the mode selector and (for predict) the
//! serialized features arrive as command-line arguments; a predict worker
//! answers with exactly one JSON object on stdout.

use std::fmt;

use fraud_bridge_types::InferenceResult;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Mode selector passed as the first argument after the program's own args.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WorkerMode {
    Predict,
    Train,
}

impl WorkerMode {
    pub fn as_arg(self) -> &'static str {
        match self {
            WorkerMode::Predict => "predict",
            WorkerMode::Train => "train",
        }
    }
}

/// Record a predict-mode worker writes to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPrediction {
    #[serde(deserialize_with = "deserialize_fraud_flag")]
    pub is_fraud: bool,
    pub fraud_probability: f64,
    pub status: String,
}

impl From<&InferenceResult> for WorkerPrediction {
    fn from(result: &InferenceResult) -> Self {
        Self {
            is_fraud: result.is_fraud(),
            fraud_probability: result.fraud_probability(),
            status: result.status().to_string(),
        }
    }
}

/// Accepts `true`/`false` as well as the integers `0`/`1` scikit-style
/// workers emit.
fn deserialize_fraud_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    struct FraudFlagVisitor;

    impl<'de> Visitor<'de> for FraudFlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a boolean or the integer 0 or 1")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(E::custom(format!("is_fraud must be 0 or 1, got {other}"))),
            }
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            match u64::try_from(v) {
                Ok(v) => self.visit_u64(v),
                Err(_) => Err(E::custom(format!("is_fraud must be 0 or 1, got {v}"))),
            }
        }
    }

    deserializer.deserialize_any(FraudFlagVisitor)
}

/// Parse a predict worker's complete stdout into a validated result.
///
/// The error is a human-readable reason; the caller decides how to
/// classify it.
pub fn parse_prediction(stdout: &[u8]) -> Result<InferenceResult, String> {
    let text = std::str::from_utf8(stdout)
        .map_err(|e| format!("stdout is not valid UTF-8: {e}"))?
        .trim();
    if text.is_empty() {
        return Err("worker wrote nothing to stdout".to_string());
    }

    // from_str also rejects trailing data after the record.
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("stdout is not a single JSON record: {e}"))?;
    if !value.is_object() {
        return Err("stdout record is not a JSON object".to_string());
    }
    if let Some(message) = value.get("error").filter(|v| !v.is_null()) {
        let message = message
            .as_str()
            .map_or_else(|| message.to_string(), str::to_string);
        return Err(format!("worker reported an error: {message}"));
    }

    let prediction: WorkerPrediction =
        serde_json::from_value(value).map_err(|e| format!("invalid prediction record: {e}"))?;
    InferenceResult::new(
        prediction.is_fraud,
        prediction.fraud_probability,
        prediction.status,
    )
    .map_err(|e| e.to_string())
}
