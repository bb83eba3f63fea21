//! Scalar value carried by a sensor reading.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sensor reading value.
///
/// Queries compare numbers and test booleans; nothing else is measured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum SensorValue {
    Number(f64),
    Bool(bool),
}

// ============================================================================
// Type checking
// ============================================================================

impl SensorValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            SensorValue::Number(_) => "NUMBER",
            SensorValue::Bool(_) => "BOOLEAN",
        }
    }

    pub fn is_number(&self) -> bool { matches!(self, SensorValue::Number(_)) }
    pub fn is_bool(&self) -> bool { matches!(self, SensorValue::Bool(_)) }

    /// Attempt to extract as f64
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SensorValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempt to extract as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SensorValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for SensorValue { fn from(v: bool) -> Self { SensorValue::Bool(v) } }
impl From<f64> for SensorValue { fn from(v: f64) -> Self { SensorValue::Number(v) } }
impl From<f32> for SensorValue { fn from(v: f32) -> Self { SensorValue::Number(v as f64) } }
impl From<i32> for SensorValue { fn from(v: i32) -> Self { SensorValue::Number(v as f64) } }

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Number(v) => write!(f, "{v}"),
            SensorValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let n = SensorValue::from(42.5);
        assert_eq!(n.as_number(), Some(42.5));
        assert_eq!(n.as_bool(), None);
        assert_eq!(n.type_name(), "NUMBER");

        let b = SensorValue::from(true);
        assert_eq!(b.as_bool(), Some(true));
        assert_eq!(b.as_number(), None);
        assert_eq!(b.type_name(), "BOOLEAN");
    }

    #[test]
    fn test_exact_equality() {
        assert_eq!(SensorValue::from(0.1 + 0.2), SensorValue::Number(0.1 + 0.2));
        assert_ne!(SensorValue::from(0.1 + 0.2), SensorValue::Number(0.3));
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_string(&SensorValue::Number(10.0)).unwrap();
        assert_eq!(json, r#"{"type":"Number","value":10.0}"#);
    }
}
