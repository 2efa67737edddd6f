//! Built-in reference worker.
//!
//! Runs when the binary is started with `--worker <mode> [payload]`, usually
//! as a child process spawned by the server. Predict mode scores the payload
//! with the reference rubric and writes one JSON record to stdout. Train mode
//! has no model to fit; it walks the rubric and reports it as progress.
//! All diagnostics go to stderr.

use std::io::{self, Write};

use fraud_bridge_types::rubric::{self, FRAUD_THRESHOLD, MAX_PROBABILITY, RULES};
use fraud_bridge_types::TransactionFeatures;

use super::ipc_types::{WorkerMode, WorkerPrediction};

/// Exit code for malformed features.
pub const EXIT_BAD_INPUT: i32 = 1;
/// Exit code for a wrong invocation (missing payload).
pub const EXIT_USAGE: i32 = 2;

/// Run the worker and return its process exit code.
pub fn run_worker(mode: WorkerMode, payload: Option<&str>) -> i32 {
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    let code = match mode {
        WorkerMode::Predict => predict(payload, &mut stdout),
        WorkerMode::Train => train(&mut stdout),
    };
    if let Err(e) = stdout.flush() {
        eprintln!("[WORKER] failed to flush stdout: {e}");
        return EXIT_BAD_INPUT;
    }
    code
}

fn predict(payload: Option<&str>, out: &mut impl Write) -> i32 {
    let Some(payload) = payload else {
        eprintln!("[WORKER] predict mode requires the transaction JSON as an argument");
        return EXIT_USAGE;
    };
    match render_prediction(payload) {
        Ok(record) => match writeln!(out, "{record}") {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("[WORKER] failed to write prediction: {e}");
                EXIT_BAD_INPUT
            }
        },
        Err(e) => {
            eprintln!("[WORKER] {e}");
            EXIT_BAD_INPUT
        }
    }
}

/// Score a serialized transaction and render the stdout record.
pub fn render_prediction(payload: &str) -> Result<String, String> {
    let features: TransactionFeatures =
        serde_json::from_str(payload).map_err(|e| format!("invalid transaction payload: {e}"))?;
    let result = rubric::score(&features);
    serde_json::to_string(&WorkerPrediction::from(&result))
        .map_err(|e| format!("failed to serialize prediction: {e}"))
}

fn train(out: &mut impl Write) -> i32 {
    eprintln!("[WORKER] reference rubric has no trainable parameters");
    let mut lines = vec!["Loading reference rubric...".to_string()];
    lines.extend(
        RULES
            .iter()
            .map(|rule| format!("rule: {} (+{} points)", rule.name, rule.points)),
    );
    lines.push(format!(
        "threshold: fraud above {FRAUD_THRESHOLD}, probability capped at {MAX_PROBABILITY}"
    ));
    lines.push("Model ready.".to_string());

    for line in lines {
        if let Err(e) = writeln!(out, "{line}") {
            eprintln!("[WORKER] failed to write progress: {e}");
            return EXIT_BAD_INPUT;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"{"distance_from_home": 150, "distance_from_last_transaction": 2, "ratio_to_median_purchase_price": 9.5, "repeat_retailer": 1, "used_chip": 0, "used_pin_number": 0, "online_order": 1}"#;

    #[test]
    fn test_example_transaction_is_fraud() {
        let record: WorkerPrediction =
            serde_json::from_str(&render_prediction(EXAMPLE).unwrap()).unwrap();
        assert!(record.is_fraud);
        assert_eq!(record.fraud_probability, 0.99);
        assert_eq!(record.status, "FRAUD DETECTED");
    }

    #[test]
    fn test_predict_writes_single_line() {
        let mut out = Vec::new();
        assert_eq!(predict(Some(EXAMPLE), &mut out), 0);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_incomplete_payload_fails() {
        let mut out = Vec::new();
        let code = predict(Some(r#"{"distance_from_home": 1}"#), &mut out);
        assert_eq!(code, EXIT_BAD_INPUT);
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_payload_is_usage_error() {
        let mut out = Vec::new();
        assert_eq!(predict(None, &mut out), EXIT_USAGE);
    }

    #[test]
    fn test_train_reports_rubric() {
        let mut out = Vec::new();
        assert_eq!(train(&mut out), 0);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), RULES.len() + 3);
        assert!(text.contains("chip not used (+25 points)"));
        assert!(text.ends_with("Model ready.\n"));
    }
}
