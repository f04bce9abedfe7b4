//! Alarm thresholds per sensor type.

use crate::SensorType;

/// Process-wide alarm thresholds, loaded once at startup.
///
/// A reading alarms when its value is strictly greater than the threshold
/// for its sensor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdConfig {
    pub temperature: u32,
    pub humidity: u32,
}

impl ThresholdConfig {
    pub const DEFAULT_TEMPERATURE: u32 = 35;
    pub const DEFAULT_HUMIDITY: u32 = 50;

    pub const fn new(temperature: u32, humidity: u32) -> Self {
        Self {
            temperature,
            humidity,
        }
    }

    /// Threshold to compare a reading of `sensor_type` against.
    ///
    /// Returns `None` for unrecognized types, which never alarm.
    pub fn threshold_for(&self, sensor_type: &SensorType) -> Option<u32> {
        match sensor_type {
            SensorType::Temperature => Some(self.temperature),
            SensorType::Humidity => Some(self.humidity),
            SensorType::Unrecognized(_) => None,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TEMPERATURE, Self::DEFAULT_HUMIDITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ThresholdConfig::default();
        assert_eq!(config.temperature, 35);
        assert_eq!(config.humidity, 50);
    }

    #[test]
    fn test_threshold_for() {
        let config = ThresholdConfig::new(20, 70);
        assert_eq!(config.threshold_for(&SensorType::Temperature), Some(20));
        assert_eq!(config.threshold_for(&SensorType::Humidity), Some(70));
        assert_eq!(config.threshold_for(&SensorType::from("CO2")), None);
    }
}
