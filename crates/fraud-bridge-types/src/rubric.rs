//! The documented reference scoring rubric.
//!
//! Points are awarded per rule, the sum is read as a percentage and capped
//! at 0.99. A transaction is flagged when the probability exceeds
//! [`FRAUD_THRESHOLD`].

use crate::{InferenceResult, TransactionFeatures};

pub const FRAUD_THRESHOLD: f64 = 0.6;
pub const MAX_PROBABILITY: f64 = 0.99;

pub const FRAUD_STATUS: &str = "FRAUD DETECTED";
pub const CLEAN_STATUS: &str = "Clean";

/// One scoring rule of the rubric.
#[derive(Debug, Clone, Copy)]
pub struct RubricRule {
    pub name: &'static str,
    pub points: u32,
    applies: fn(&TransactionFeatures) -> bool,
}

impl RubricRule {
    pub fn applies(&self, features: &TransactionFeatures) -> bool {
        (self.applies)(features)
    }
}

pub const RULES: [RubricRule; 4] = [
    RubricRule {
        name: "ratio to median purchase price above 8",
        points: 40,
        applies: |f| f.ratio_to_median_purchase_price() > 8.0,
    },
    RubricRule {
        name: "distance from home above 100",
        points: 20,
        applies: |f| f.distance_from_home() > 100.0,
    },
    RubricRule {
        name: "online order",
        points: 15,
        applies: |f| f.online_order(),
    },
    RubricRule {
        name: "chip not used",
        points: 25,
        applies: |f| !f.used_chip(),
    },
];

/// Total rubric points for a transaction (0..=100).
pub fn points(features: &TransactionFeatures) -> u32 {
    RULES
        .iter()
        .filter(|rule| rule.applies(features))
        .map(|rule| rule.points)
        .sum()
}

/// Score a transaction with the rubric.
pub fn score(features: &TransactionFeatures) -> InferenceResult {
    let probability = (f64::from(points(features)) / 100.0).min(MAX_PROBABILITY);
    let is_fraud = probability > FRAUD_THRESHOLD;
    let status = if is_fraud { FRAUD_STATUS } else { CLEAN_STATUS };
    InferenceResult::from_rubric(is_fraud, probability, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn features(home: f64, ratio: f64, chip: u8, online: u8) -> TransactionFeatures {
        serde_json::from_value(json!({
            "distance_from_home": home,
            "distance_from_last_transaction": 2,
            "ratio_to_median_purchase_price": ratio,
            "repeat_retailer": 1,
            "used_chip": chip,
            "used_pin_number": 0,
            "online_order": online
        }))
        .unwrap()
    }

    #[test]
    fn test_high_risk_example_is_fraud() {
        let result = score(&features(150.0, 9.5, 0, 1));
        assert!(result.is_fraud());
        assert_eq!(result.fraud_probability(), MAX_PROBABILITY);
        assert_eq!(result.status(), FRAUD_STATUS);
    }

    #[test]
    fn test_low_risk_transaction_is_clean() {
        let result = score(&features(5.0, 1.2, 1, 0));
        assert!(!result.is_fraud());
        assert_eq!(result.fraud_probability(), 0.0);
        assert_eq!(result.status(), CLEAN_STATUS);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        // ratio (40) + distance (20) lands exactly on the threshold
        let result = score(&features(150.0, 9.5, 1, 0));
        assert_eq!(points(&features(150.0, 9.5, 1, 0)), 60);
        assert!(!result.is_fraud());
    }

    #[test]
    fn test_ratio_without_chip_crosses_threshold() {
        assert!(score(&features(10.0, 9.0, 0, 0)).is_fraud());
    }
}
