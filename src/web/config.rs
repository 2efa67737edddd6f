//! Service configuration.
//!
//! Layered: built-in defaults, then an optional JSON file, then
//! `FRAUD_BRIDGE_*` environment variables. CLI flags are applied last by
//! the binary.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::worker::invocation::{InvocationLimits, WorkerProgram};

pub const CONFIG_PATH_ENV: &str = "FRAUD_BRIDGE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("cannot locate own executable for the reference worker: {0}")]
    CurrentExe(std::io::Error),
}

/// Which estimator answers `/predict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    /// Out-of-process worker through the inference bridge.
    #[default]
    Worker,
    /// In-process rubric, no worker involved.
    Heuristic,
}

impl EstimatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EstimatorKind::Worker => "worker",
            EstimatorKind::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EstimatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "worker" | "live" => Ok(EstimatorKind::Worker),
            "heuristic" | "simulation" => Ok(EstimatorKind::Heuristic),
            other => Err(format!("unknown estimator: {other}")),
        }
    }
}

/// What to do with a predict request when every worker slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionPolicy {
    /// Queue for a slot, up to `queue_timeout_ms`.
    #[default]
    Wait,
    /// Fail immediately.
    Reject,
}

impl FromStr for AdmissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wait" => Ok(AdmissionPolicy::Wait),
            "reject" => Ok(AdmissionPolicy::Reject),
            other => Err(format!("unknown admission policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker executable. Empty means this binary in `--worker` mode.
    pub program: String,
    /// Arguments placed before the mode selector (e.g. a script path).
    pub args: Vec<String>,
    pub predict_timeout_ms: u64,
    pub train_timeout_ms: u64,
    /// Cap for each of the captured stdout/stderr buffers.
    pub max_output_bytes: usize,
    pub max_concurrent_workers: usize,
    pub admission: AdmissionPolicy,
    pub queue_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            predict_timeout_ms: 10_000,
            train_timeout_ms: 600_000,
            max_output_bytes: 64 * 1024,
            max_concurrent_workers: 8,
            admission: AdmissionPolicy::Wait,
            queue_timeout_ms: 5_000,
        }
    }
}

impl WorkerConfig {
    pub fn predict_limits(&self) -> InvocationLimits {
        InvocationLimits {
            timeout: Duration::from_millis(self.predict_timeout_ms),
            max_output_bytes: self.max_output_bytes,
        }
    }

    pub fn train_limits(&self) -> InvocationLimits {
        InvocationLimits {
            timeout: Duration::from_millis(self.train_timeout_ms),
            max_output_bytes: self.max_output_bytes,
        }
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    /// Resolve the program to launch. An empty `program` selects the
    /// reference worker built into the running executable.
    pub fn resolve_program(&self) -> Result<WorkerProgram, ConfigError> {
        if self.program.trim().is_empty() {
            let exe = std::env::current_exe().map_err(ConfigError::CurrentExe)?;
            let mut args = vec!["--worker".to_string()];
            args.extend(self.args.iter().cloned());
            return Ok(WorkerProgram::new(exe, args));
        }
        Ok(WorkerProgram::new(&self.program, self.args.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `error`, `warn`, `info`, `debug` or `trace`.
    pub level: String,
    /// Log file path; `None` logs to stderr only.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("logs/fraud_bridge.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    /// Identifier reported by the liveness probe.
    pub model_id: String,
    pub estimator: EstimatorKind,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            model_id: "rubric-v1".to_string(),
            estimator: EstimatorKind::Worker,
            worker: WorkerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load defaults, the optional file, and environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `FRAUD_BRIDGE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key, value })
        }

        if let Some(v) = lookup("FRAUD_BRIDGE_HOST") {
            self.host = v;
        }
        if let Some(v) = lookup("FRAUD_BRIDGE_PORT") {
            self.port = parse("FRAUD_BRIDGE_PORT", v)?;
        }
        if let Some(v) = lookup("FRAUD_BRIDGE_MODEL_ID") {
            self.model_id = v;
        }
        if let Some(v) = lookup("FRAUD_BRIDGE_ESTIMATOR") {
            self.estimator = parse("FRAUD_BRIDGE_ESTIMATOR", v)?;
        }
        if let Some(v) = lookup("FRAUD_BRIDGE_WORKER_PROGRAM") {
            self.worker.program = v;
        }
        if let Some(v) = lookup("FRAUD_BRIDGE_WORKER_ARGS") {
            self.worker.args = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = lookup("FRAUD_BRIDGE_PREDICT_TIMEOUT_MS") {
            self.worker.predict_timeout_ms = parse("FRAUD_BRIDGE_PREDICT_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("FRAUD_BRIDGE_TRAIN_TIMEOUT_MS") {
            self.worker.train_timeout_ms = parse("FRAUD_BRIDGE_TRAIN_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("FRAUD_BRIDGE_MAX_OUTPUT_BYTES") {
            self.worker.max_output_bytes = parse("FRAUD_BRIDGE_MAX_OUTPUT_BYTES", v)?;
        }
        if let Some(v) = lookup("FRAUD_BRIDGE_MAX_WORKERS") {
            self.worker.max_concurrent_workers = parse("FRAUD_BRIDGE_MAX_WORKERS", v)?;
        }
        if let Some(v) = lookup("FRAUD_BRIDGE_ADMISSION") {
            self.worker.admission = parse("FRAUD_BRIDGE_ADMISSION", v)?;
        }
        if let Some(v) = lookup("FRAUD_BRIDGE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("FRAUD_BRIDGE_LOG_FILE") {
            self.logging.file = if v.trim().is_empty() { None } else { Some(v) };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let worker = &self.worker;
        if worker.predict_timeout_ms == 0 || worker.train_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "worker timeouts must be positive".to_string(),
            ));
        }
        if worker.max_concurrent_workers == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_workers must be positive".to_string(),
            ));
        }
        if worker.max_output_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_output_bytes must be positive".to_string(),
            ));
        }
        if self.model_id.trim().is_empty() {
            return Err(ConfigError::Invalid("model_id must not be empty".to_string()));
        }
        if log::LevelFilter::from_str(&self.logging.level).is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown log level: {}",
                self.logging.level
            )));
        }
        Ok(())
    }
}
