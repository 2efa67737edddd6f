//! Shared data types for the fraud inference bridge.
//!
//! Holds the request-scoped values that cross the process boundary:
//! the transaction features sent to a worker, the classification it
//! answers with, and the reference scoring rubric both sides agree on.

pub mod features;
pub mod result;
pub mod rubric;

pub use features::{Flag, TransactionFeatures, TransactionInput};
pub use result::InferenceResult;

use thiserror::Error;

/// Invariant violations on the shared data types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    /// A numeric feature was NaN or infinite.
    #[error("field `{field}` must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    /// A fraud probability fell outside [0, 1].
    #[error("fraud probability must be within [0, 1], got {0}")]
    ProbabilityOutOfRange(f64),
}
