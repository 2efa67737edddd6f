//! Server-side abstraction for scoring through a worker process.
//!
//! Each `classify` call is admitted through a permit pool, launches exactly
//! one predict-mode invocation and translates its raw outcome into either an
//! `InferenceResult` or a typed `BridgeError`. Nothing is retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fraud_bridge_types::{InferenceResult, TransactionFeatures};
use tokio::sync::{Semaphore, SemaphorePermit};

use super::invocation::{
    InvocationLimits, InvocationOutcome, OutputStream, WorkerInvocation, WorkerProgram,
};
use super::ipc_types::{parse_prediction, WorkerMode};
use crate::web::config::{AdmissionPolicy, WorkerConfig};
use crate::web::error::{excerpt_bytes, BridgeError};
use crate::{sys_debug, sys_warn};

/// Shared reference to the InferenceBridge.
pub type SharedInferenceBridge = Arc<InferenceBridge>;

pub struct InferenceBridge {
    program: WorkerProgram,
    limits: InvocationLimits,
    /// One permit per concurrently running predict worker.
    permits: Semaphore,
    capacity: usize,
    policy: AdmissionPolicy,
    queue_timeout: Duration,
    /// Predict invocations launched since startup.
    invocations: AtomicU64,
}

impl InferenceBridge {
    pub fn new(program: WorkerProgram, config: &WorkerConfig) -> Self {
        Self {
            program,
            limits: config.predict_limits(),
            permits: Semaphore::new(config.max_concurrent_workers),
            capacity: config.max_concurrent_workers,
            policy: config.admission,
            queue_timeout: config.queue_timeout(),
            invocations: AtomicU64::new(0),
        }
    }

    pub fn program(&self) -> &WorkerProgram {
        &self.program
    }

    /// Predict workers currently holding a slot.
    pub fn active_workers(&self) -> usize {
        self.capacity.saturating_sub(self.permits.available_permits())
    }

    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Score one transaction with one worker process.
    ///
    /// Dropping the returned future kills the worker.
    pub async fn classify(
        &self,
        features: &TransactionFeatures,
    ) -> Result<InferenceResult, BridgeError> {
        let _permit = self.admit().await?;
        self.invocations.fetch_add(1, Ordering::Relaxed);

        let invocation = WorkerInvocation::new(
            &self.program,
            WorkerMode::Predict,
            Some(features.to_payload()),
            self.limits,
        );
        let id = invocation.id();
        let outcome = invocation.run().await;

        let verdict = interpret_prediction(outcome);
        match &verdict {
            Ok(result) => sys_debug!(
                "[BRIDGE {id}] is_fraud={} probability={:.3}",
                result.is_fraud(),
                result.fraud_probability()
            ),
            Err(e) => sys_warn!("[BRIDGE {id}] {} ({})", e, e.kind()),
        }
        verdict
    }

    async fn admit(&self) -> Result<SemaphorePermit<'_>, BridgeError> {
        let saturated = BridgeError::Saturated {
            capacity: self.capacity,
        };
        match self.policy {
            AdmissionPolicy::Reject => self.permits.try_acquire().map_err(|_| saturated),
            AdmissionPolicy::Wait => {
                match tokio::time::timeout(self.queue_timeout, self.permits.acquire()).await {
                    Ok(Ok(permit)) => Ok(permit),
                    // Elapsed, or the pool was closed.
                    _ => Err(saturated),
                }
            }
        }
    }
}

/// Map a predict invocation's raw outcome onto the failure taxonomy.
pub fn interpret_prediction(outcome: InvocationOutcome) -> Result<InferenceResult, BridgeError> {
    match outcome {
        InvocationOutcome::Success { stdout, .. } => {
            parse_prediction(&stdout).map_err(|reason| BridgeError::MalformedOutput {
                reason,
                output: excerpt_bytes(&stdout),
            })
        }
        InvocationOutcome::ProcessFailure {
            exit_code, stderr, ..
        } => Err(BridgeError::ProcessFailure {
            exit_code,
            stderr: excerpt_bytes(&stderr),
        }),
        InvocationOutcome::Timeout { elapsed } => Err(BridgeError::Timeout { elapsed }),
        InvocationOutcome::LaunchFailure { reason } => Err(BridgeError::LaunchFailure { reason }),
        InvocationOutcome::OutputOverflow {
            stream: OutputStream::Stdout,
            limit,
        } => Err(BridgeError::MalformedOutput {
            reason: format!("stdout exceeded {limit} bytes"),
            output: String::new(),
        }),
        InvocationOutcome::OutputOverflow {
            stream: OutputStream::Stderr,
            limit,
        } => Err(BridgeError::ProcessFailure {
            exit_code: None,
            stderr: format!("stderr exceeded {limit} bytes"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn features(distance_from_home: f64) -> TransactionFeatures {
        serde_json::from_value(json!({
            "distance_from_home": distance_from_home,
            "distance_from_last_transaction": 2,
            "ratio_to_median_purchase_price": 9.5,
            "repeat_retailer": 1,
            "used_chip": 0,
            "used_pin_number": 0,
            "online_order": 1
        }))
        .unwrap()
    }

    #[test]
    fn test_garbage_stdout_is_malformed_output() {
        let err = interpret_prediction(InvocationOutcome::Success {
            stdout: b"not json".to_vec(),
            stderr: Vec::new(),
        })
        .unwrap_err();
        match err {
            BridgeError::MalformedOutput { output, .. } => assert_eq!(output, "not json"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_stdout_overflow_is_malformed_output() {
        let err = interpret_prediction(InvocationOutcome::OutputOverflow {
            stream: OutputStream::Stdout,
            limit: 1024,
        })
        .unwrap_err();
        assert_eq!(err.kind(), "malformed_output");

        let err = interpret_prediction(InvocationOutcome::OutputOverflow {
            stream: OutputStream::Stderr,
            limit: 1024,
        })
        .unwrap_err();
        assert!(matches!(err, BridgeError::ProcessFailure { exit_code: None, .. }));
    }

    #[test]
    fn test_stderr_is_diagnostic_only() {
        let result = interpret_prediction(InvocationOutcome::Success {
            stdout: br#"{"is_fraud": 1, "fraud_probability": 0.8, "status": "FRAUD DETECTED"}"#
                .to_vec(),
            stderr: b"UserWarning: something noisy".to_vec(),
        })
        .unwrap();
        assert!(result.is_fraud());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::web::worker::test_support::{is_running, pid_file, sh_worker, wait_for_pid};

        fn bridge(script: &str, config: WorkerConfig) -> InferenceBridge {
            InferenceBridge::new(sh_worker(script), &config)
        }

        #[tokio::test]
        async fn test_scripted_worker_verdict_is_returned() {
            let bridge = bridge(
                r#"printf '{"is_fraud": 1, "fraud_probability": 0.91, "status": "FRAUD DETECTED"}'"#,
                WorkerConfig::default(),
            );
            let result = bridge.classify(&features(150.0)).await.unwrap();
            assert!(result.is_fraud());
            assert_eq!(result.fraud_probability(), 0.91);
            assert_eq!(bridge.invocation_count(), 1);
            assert_eq!(bridge.active_workers(), 0);
        }

        #[tokio::test]
        async fn test_failure_after_partial_stdout_is_process_failure() {
            let bridge = bridge(
                r#"printf '{"is_fraud": 1,'; echo 'model file corrupt' >&2; exit 3"#,
                WorkerConfig::default(),
            );
            let err = bridge.classify(&features(1.0)).await.unwrap_err();
            match err {
                BridgeError::ProcessFailure { exit_code, stderr } => {
                    assert_eq!(exit_code, Some(3));
                    assert!(stderr.contains("model file corrupt"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_hung_worker_times_out() {
            let config = WorkerConfig {
                predict_timeout_ms: 300,
                ..WorkerConfig::default()
            };
            let bridge = bridge("exec sleep 30", config);
            let err = bridge.classify(&features(1.0)).await.unwrap_err();
            assert!(matches!(err, BridgeError::Timeout { .. }), "{err:?}");
            assert_eq!(bridge.active_workers(), 0);
        }

        #[tokio::test]
        async fn test_concurrent_calls_get_their_own_results() {
            // Echo the distance back as the status; the 0.9 request is slow so
            // the two runs overlap and finish out of order.
            let script = r#"d=$(printf '%s' "$2" | sed 's/.*"distance_from_home":\([0-9.]*\).*/\1/')
if [ "$d" = "0.9" ]; then sleep 0.3; fi
printf '{"is_fraud": 0, "fraud_probability": 0.1, "status": "%s"}' "$d""#;
            let bridge = Arc::new(bridge(script, WorkerConfig::default()));

            let slow = features(0.9);
            let fast = features(42.5);
            let (a, b) = tokio::join!(bridge.classify(&slow), bridge.classify(&fast));
            assert_eq!(a.unwrap().status(), "0.9");
            assert_eq!(b.unwrap().status(), "42.5");
            assert_eq!(bridge.invocation_count(), 2);
        }

        #[tokio::test]
        async fn test_reject_policy_reports_saturation() {
            let config = WorkerConfig {
                max_concurrent_workers: 1,
                admission: AdmissionPolicy::Reject,
                ..WorkerConfig::default()
            };
            let bridge = Arc::new(bridge(
                r#"sleep 1; printf '{"is_fraud": 0, "fraud_probability": 0.1, "status": "Clean"}'"#,
                config,
            ));

            let busy = bridge.clone();
            let first = tokio::spawn(async move { busy.classify(&features(1.0)).await });
            while bridge.active_workers() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let err = bridge.classify(&features(2.0)).await.unwrap_err();
            assert!(matches!(err, BridgeError::Saturated { capacity: 1 }), "{err:?}");
            assert!(first.await.unwrap().is_ok());
            assert_eq!(bridge.invocation_count(), 1);
        }

        #[tokio::test]
        async fn test_wait_policy_times_out_in_queue() {
            let config = WorkerConfig {
                max_concurrent_workers: 1,
                queue_timeout_ms: 100,
                ..WorkerConfig::default()
            };
            let bridge = Arc::new(bridge("exec sleep 2", config));

            let busy = bridge.clone();
            let first = tokio::spawn(async move { busy.classify(&features(1.0)).await });
            while bridge.active_workers() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let err = bridge.classify(&features(2.0)).await.unwrap_err();
            assert_eq!(err.kind(), "saturated");
            first.abort();
        }

        #[tokio::test]
        async fn test_cancelled_classify_kills_worker() {
            let pids = pid_file();
            let script = format!("echo $$ > {}; exec sleep 30", pids.display());
            let bridge = Arc::new(bridge(&script, WorkerConfig::default()));

            let running = bridge.clone();
            let task = tokio::spawn(async move { running.classify(&features(1.0)).await });
            let pid = wait_for_pid(&pids).await;
            let _ = std::fs::remove_file(&pids);
            task.abort();
            let _ = task.await;

            for _ in 0..100 {
                if !is_running(pid) {
                    assert_eq!(bridge.active_workers(), 0);
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("worker {pid} survived cancellation");
        }
    }
}
