//! Sensor readings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SensorValue;

/// A reading taken by one sensor of one node.
///
/// Two readings are equal when node, sensor and value match; the timestamp
/// is informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorData {
    pub node_id: String,
    pub sensor_id: String,
    pub value: SensorValue,
    pub timestamp: DateTime<Utc>,
}

impl SensorData {
    pub fn new(
        node_id: impl Into<String>,
        sensor_id: impl Into<String>,
        value: impl Into<SensorValue>,
    ) -> Self {
        Self::at(node_id, sensor_id, value, Utc::now())
    }

    pub fn at(
        node_id: impl Into<String>,
        sensor_id: impl Into<String>,
        value: impl Into<SensorValue>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            sensor_id: sensor_id.into(),
            value: value.into(),
            timestamp,
        }
    }
}

impl PartialEq for SensorData {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
            && self.sensor_id == other.sensor_id
            && self.value == other.value
    }
}

impl fmt::Display for SensorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.node_id, self.sensor_id, self.value)
    }
}
