// Fraud inference bridge: HTTP service plus worker supervision

pub mod config;
pub mod error;
pub mod estimator;
pub mod logger;
pub mod models;
pub mod request_parsing;
pub mod response_helpers;
pub mod routes;
pub mod worker;

pub use config::{BridgeConfig, ConfigError, EstimatorKind};
pub use error::BridgeError;
pub use models::{AppState, SharedAppState};
