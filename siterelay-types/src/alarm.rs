//! Alarm - the decision artifact for a reading that breached its threshold.

use std::fmt;

use crate::{Measurement, SensorType};

/// A threshold breach raised by the central unit.
///
/// Alarms are derived from a [`Measurement`] and carry the threshold the
/// value was compared against, for audit. They are never persisted or
/// re-queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    warehouse_id: Option<String>,
    sensor_id: String,
    sensor_type: SensorType,
    value: i32,
    threshold_used: u32,
    timestamp_ms: i64,
}

impl Alarm {
    /// Build an alarm for `measurement` that exceeded `threshold_used`.
    pub fn from_measurement(measurement: &Measurement, threshold_used: u32) -> Self {
        Self {
            warehouse_id: measurement.warehouse_id().map(str::to_string),
            sensor_id: measurement.sensor_id().to_string(),
            sensor_type: measurement.sensor_type().clone(),
            value: measurement.value(),
            threshold_used,
            timestamp_ms: measurement.timestamp_ms(),
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

    pub fn threshold_used(&self) -> u32 {
        self.threshold_used
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Key identifying repeats of this alarm: `warehouseId|sensorId|type`.
    ///
    /// An absent warehouse id contributes an empty segment.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.warehouse_id.as_deref().unwrap_or_default(),
            self.sensor_id,
            self.sensor_type
        )
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "warehouse={} sensor={} type={} value={} threshold={} ts={}",
            self.warehouse_id.as_deref().unwrap_or_default(),
            self.sensor_id,
            self.sensor_type,
            self.value,
            self.threshold_used,
            self.timestamp_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_measurement_copies_fields() {
        let m = Measurement::new(
            Some("WH-2".into()),
            "S-9",
            SensorType::Humidity,
            51,
            1_700_000_000_100,
        );
        let alarm = Alarm::from_measurement(&m, 50);

        assert_eq!(alarm.warehouse_id(), Some("WH-2"));
        assert_eq!(alarm.sensor_id(), "S-9");
        assert_eq!(alarm.sensor_type(), &SensorType::Humidity);
        assert_eq!(alarm.value(), 51);
        assert_eq!(alarm.threshold_used(), 50);
        assert_eq!(alarm.timestamp_ms(), 1_700_000_000_100);
    }

    #[test]
    fn test_dedup_key() {
        let m = Measurement::new(Some("WH-1".into()), "t1", SensorType::Temperature, 40, 1);
        assert_eq!(Alarm::from_measurement(&m, 35).dedup_key(), "WH-1|t1|TEMPERATURE");

        let anonymous = Measurement::new(None, "t1", SensorType::Temperature, 40, 1);
        assert_eq!(Alarm::from_measurement(&anonymous, 35).dedup_key(), "|t1|TEMPERATURE");
    }

    #[test]
    fn test_display_lists_every_field() {
        let m = Measurement::new(Some("WH-1".into()), "t1", SensorType::Temperature, 40, 42);
        let line = Alarm::from_measurement(&m, 35).to_string();
        assert_eq!(
            line,
            "warehouse=WH-1 sensor=t1 type=TEMPERATURE value=40 threshold=35 ts=42"
        );
    }
}
