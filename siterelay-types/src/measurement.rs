//! Measurement - a single sensor reading relayed from a warehouse site.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The class of sensor a reading came from.
///
/// Each listener on the edge unit is bound to exactly one sensor class, so
/// the type is assigned by the port a datagram arrived on rather than by the
/// payload. Names the wire format does not know decode to
/// [`SensorType::Unrecognized`] instead of failing; such readings are
/// rejected before evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SensorType {
    Temperature,
    Humidity,
    /// A type name this build does not know, kept verbatim for logging.
    Unrecognized(String),
}

impl SensorType {
    /// Wire name of the type (`TEMPERATURE`, `HUMIDITY`, or the raw name).
    pub fn as_str(&self) -> &str {
        match self {
            SensorType::Temperature => "TEMPERATURE",
            SensorType::Humidity => "HUMIDITY",
            SensorType::Unrecognized(raw) => raw,
        }
    }

    /// Lower-case label used in log lines and task names.
    pub fn label(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }

    /// Returns false for [`SensorType::Unrecognized`].
    pub fn is_recognized(&self) -> bool {
        !matches!(self, SensorType::Unrecognized(_))
    }
}

impl From<&str> for SensorType {
    fn from(name: &str) -> Self {
        match name {
            "TEMPERATURE" => SensorType::Temperature,
            "HUMIDITY" => SensorType::Humidity,
            other => SensorType::Unrecognized(other.to_string()),
        }
    }
}

impl From<String> for SensorType {
    fn from(name: String) -> Self {
        match SensorType::from(name.as_str()) {
            SensorType::Unrecognized(_) => SensorType::Unrecognized(name),
            known => known,
        }
    }
}

impl From<SensorType> for String {
    fn from(sensor_type: SensorType) -> Self {
        match sensor_type {
            SensorType::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sensor reading, tagged with its origin and ingestion time.
///
/// Measurements are immutable once built. The timestamp is stamped by the
/// edge unit when the payload is parsed, never taken from the sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    warehouse_id: Option<String>,
    sensor_id: String,
    #[serde(rename = "type")]
    sensor_type: SensorType,
    value: i32,
    #[serde(rename = "timestamp")]
    timestamp_ms: i64,
}

impl Measurement {
    pub fn new(
        warehouse_id: Option<String>,
        sensor_id: impl Into<String>,
        sensor_type: SensorType,
        value: i32,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            warehouse_id,
            sensor_id: sensor_id.into(),
            sensor_type,
            value,
            timestamp_ms,
        }
    }

    pub fn warehouse_id(&self) -> Option<&str> {
        self.warehouse_id.as_deref()
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn sensor_type(&self) -> &SensorType {
        &self.sensor_type
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    /// Ingestion time in milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Describes why this measurement may not be evaluated, if it may not.
    ///
    /// A measurement is evaluable when its sensor id is non-blank, its type
    /// is recognized and its timestamp is positive.
    pub fn violation(&self) -> Option<&'static str> {
        if self.sensor_id.trim().is_empty() {
            Some("blank sensorId")
        } else if !self.sensor_type.is_recognized() {
            Some("unrecognized type")
        } else if self.timestamp_ms <= 0 {
            Some("non-positive timestamp")
        } else {
            None
        }
    }

    /// Shorthand for `violation().is_none()`.
    pub fn is_valid(&self) -> bool {
        self.violation().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_type_names() {
        assert_eq!(SensorType::from("TEMPERATURE"), SensorType::Temperature);
        assert_eq!(SensorType::from("HUMIDITY"), SensorType::Humidity);
        assert_eq!(
            SensorType::from("PRESSURE"),
            SensorType::Unrecognized("PRESSURE".to_string())
        );
        assert_eq!(SensorType::Humidity.to_string(), "HUMIDITY");
        assert_eq!(SensorType::Temperature.label(), "temperature");
    }

    #[test]
    fn test_sensor_type_names_are_case_sensitive() {
        assert!(!SensorType::from("temperature").is_recognized());
    }

    #[test]
    fn valid_measurement_has_no_violation() {
        let m = Measurement::new(Some("WH-1".into()), "S-1", SensorType::Temperature, 36, 1);
        assert!(m.is_valid());
        assert_eq!(m.warehouse_id(), Some("WH-1"));
    }

    #[test]
    fn blank_sensor_id_is_invalid() {
        let m = Measurement::new(None, "  ", SensorType::Humidity, 1, 1_700_000_000_000);
        assert_eq!(m.violation(), Some("blank sensorId"));
    }

    #[test]
    fn unrecognized_type_is_invalid() {
        let m = Measurement::new(None, "p1", SensorType::from("PRESSURE"), 1, 1_700_000_000_000);
        assert_eq!(m.violation(), Some("unrecognized type"));
    }

    #[test]
    fn non_positive_timestamp_is_invalid() {
        let zero = Measurement::new(None, "t1", SensorType::Temperature, 1, 0);
        let negative = Measurement::new(None, "t1", SensorType::Temperature, 1, -5);
        assert!(!zero.is_valid());
        assert!(!negative.is_valid());
    }
}
