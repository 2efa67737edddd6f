//! Transaction features accepted by the classifier.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::DataError;

/// A yes/no feature carried on the wire as the integer `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flag(bool);

impl Flag {
    pub const NO: Flag = Flag(false);
    pub const YES: Flag = Flag(true);

    pub fn is_set(self) -> bool {
        self.0
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        Flag(value)
    }
}

impl Serialize for Flag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(self.0))
    }
}

struct FlagVisitor;

impl<'de> Visitor<'de> for FlagVisitor {
    type Value = Flag;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("the integer 0 or 1")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Flag, E> {
        match v {
            0 => Ok(Flag::NO),
            1 => Ok(Flag::YES),
            other => Err(E::custom(format!("expected 0 or 1, got {other}"))),
        }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Flag, E> {
        match u64::try_from(v) {
            Ok(v) => self.visit_u64(v),
            Err(_) => Err(E::custom(format!("expected 0 or 1, got {v}"))),
        }
    }

    // Form inputs sometimes arrive as 1.0 after a numeric round-trip.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Flag, E> {
        if v == 0.0 {
            Ok(Flag::NO)
        } else if v == 1.0 {
            Ok(Flag::YES)
        } else {
            Err(E::custom(format!("expected 0 or 1, got {v}")))
        }
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FlagVisitor)
    }
}

/// Raw field-by-field form of a transaction, exactly as it appears on the wire.
///
/// No invariants are enforced here; convert into [`TransactionFeatures`]
/// with `TryFrom` to get a validated value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub distance_from_home: f64,
    pub distance_from_last_transaction: f64,
    pub ratio_to_median_purchase_price: f64,
    pub repeat_retailer: Flag,
    pub used_chip: Flag,
    pub used_pin_number: Flag,
    pub online_order: Flag,
}

/// A validated transaction: every numeric field is finite and every flag is 0 or 1.
///
/// Immutable once built. Deserializing goes through the same validation as
/// `TryFrom<TransactionInput>`, so a value of this type is always complete
/// and well-formed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransactionInput", into = "TransactionInput")]
pub struct TransactionFeatures {
    input: TransactionInput,
}

impl TryFrom<TransactionInput> for TransactionFeatures {
    type Error = DataError;

    fn try_from(input: TransactionInput) -> Result<Self, Self::Error> {
        let numeric = [
            ("distance_from_home", input.distance_from_home),
            (
                "distance_from_last_transaction",
                input.distance_from_last_transaction,
            ),
            (
                "ratio_to_median_purchase_price",
                input.ratio_to_median_purchase_price,
            ),
        ];
        for (field, value) in numeric {
            if !value.is_finite() {
                return Err(DataError::NonFinite { field, value });
            }
        }
        Ok(Self { input })
    }
}

impl From<TransactionFeatures> for TransactionInput {
    fn from(features: TransactionFeatures) -> Self {
        features.input
    }
}

impl TransactionFeatures {
    pub fn distance_from_home(&self) -> f64 {
        self.input.distance_from_home
    }

    pub fn distance_from_last_transaction(&self) -> f64 {
        self.input.distance_from_last_transaction
    }

    pub fn ratio_to_median_purchase_price(&self) -> f64 {
        self.input.ratio_to_median_purchase_price
    }

    pub fn repeat_retailer(&self) -> bool {
        self.input.repeat_retailer.is_set()
    }

    pub fn used_chip(&self) -> bool {
        self.input.used_chip.is_set()
    }

    pub fn used_pin_number(&self) -> bool {
        self.input.used_pin_number.is_set()
    }

    pub fn online_order(&self) -> bool {
        self.input.online_order.is_set()
    }

    /// Serialized form handed to a worker as its single payload argument.
    pub fn to_payload(&self) -> String {
        // Only finite floats and small integers: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "distance_from_home": 150,
            "distance_from_last_transaction": 2,
            "ratio_to_median_purchase_price": 9.5,
            "repeat_retailer": 1,
            "used_chip": 0,
            "used_pin_number": 0,
            "online_order": 1
        })
    }

    #[test]
    fn test_deserialize_complete_transaction() {
        let features: TransactionFeatures = serde_json::from_value(sample()).unwrap();
        assert_eq!(features.distance_from_home(), 150.0);
        assert_eq!(features.ratio_to_median_purchase_price(), 9.5);
        assert!(features.repeat_retailer());
        assert!(!features.used_chip());
        assert!(features.online_order());
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("used_chip");
        let err = serde_json::from_value::<TransactionFeatures>(value).unwrap_err();
        assert!(err.to_string().contains("used_chip"), "{err}");
    }

    #[test]
    fn test_flag_outside_zero_one_is_rejected() {
        let mut value = sample();
        value["online_order"] = json!(2);
        let err = serde_json::from_value::<TransactionFeatures>(value).unwrap_err();
        assert!(err.to_string().contains("expected 0 or 1"), "{err}");
    }

    #[test]
    fn test_flag_rejects_booleans_and_strings() {
        let mut value = sample();
        value["used_pin_number"] = json!(true);
        assert!(serde_json::from_value::<TransactionFeatures>(value.clone()).is_err());
        value["used_pin_number"] = json!("1");
        assert!(serde_json::from_value::<TransactionFeatures>(value).is_err());
    }

    #[test]
    fn test_flag_accepts_integral_float() {
        let mut value = sample();
        value["used_chip"] = json!(1.0);
        let features: TransactionFeatures = serde_json::from_value(value).unwrap();
        assert!(features.used_chip());
    }

    #[test]
    fn test_numeric_field_must_be_a_number() {
        let mut value = sample();
        value["distance_from_home"] = json!("far");
        assert!(serde_json::from_value::<TransactionFeatures>(value).is_err());
    }

    #[test]
    fn test_non_finite_value_is_rejected() {
        let input = TransactionInput {
            distance_from_home: f64::NAN,
            distance_from_last_transaction: 1.0,
            ratio_to_median_purchase_price: 1.0,
            repeat_retailer: Flag::NO,
            used_chip: Flag::YES,
            used_pin_number: Flag::NO,
            online_order: Flag::NO,
        };
        let err = TransactionFeatures::try_from(input).unwrap_err();
        assert!(matches!(
            err,
            DataError::NonFinite {
                field: "distance_from_home",
                ..
            }
        ));
    }

    #[test]
    fn test_payload_uses_field_names_and_integer_flags() {
        let features: TransactionFeatures = serde_json::from_value(sample()).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&features.to_payload()).unwrap();
        assert_eq!(payload["repeat_retailer"], json!(1));
        assert_eq!(payload["used_chip"], json!(0));
        assert_eq!(payload["ratio_to_median_purchase_price"], json!(9.5));
    }
}
