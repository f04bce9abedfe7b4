//! Threshold evaluation with duplicate suppression.

use std::sync::Arc;

use siterelay_types::{Alarm, Measurement, ThresholdConfig};
use tracing::{debug, warn};

use crate::alarm_sink::AlarmSink;
use crate::dedup::DedupCache;

/// What [`AlarmService::on_measurement`] did with a reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmDecision {
    /// First alarm for its key within the window; delivered to the sink.
    Raised(Alarm),
    /// Same key seen within the window; not delivered.
    Suppressed(Alarm),
    /// Within limits.
    BelowThreshold,
    /// Failed the validity gate and was never evaluated.
    Rejected(&'static str),
}

/// Decides whether readings breach their thresholds and delivers the
/// resulting alarms, at most once per key per dedup window.
#[derive(Debug)]
pub struct AlarmService {
    thresholds: ThresholdConfig,
    dedup: DedupCache,
    sink: Arc<dyn AlarmSink>,
}

impl AlarmService {
    pub fn new(thresholds: ThresholdConfig, sink: Arc<dyn AlarmSink>) -> Self {
        Self::with_dedup(thresholds, DedupCache::default(), sink)
    }

    pub fn with_dedup(thresholds: ThresholdConfig, dedup: DedupCache, sink: Arc<dyn AlarmSink>) -> Self {
        Self {
            thresholds,
            dedup,
            sink,
        }
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        self.thresholds
    }

    /// The alarm `measurement` raises, if any.
    ///
    /// Pure: alarms iff the value is strictly greater than the threshold for
    /// its type. Unrecognized types never alarm.
    pub fn evaluate(&self, measurement: &Measurement) -> Option<Alarm> {
        let Some(threshold) = self.thresholds.threshold_for(measurement.sensor_type()) else {
            warn!(
                "Unexpected sensor type {} from sensor {}",
                measurement.sensor_type(),
                measurement.sensor_id()
            );
            return None;
        };

        (i64::from(measurement.value()) > i64::from(threshold))
            .then(|| Alarm::from_measurement(measurement, threshold))
    }

    /// Gate, evaluate, dedup and deliver one reading.
    pub fn on_measurement(&self, measurement: &Measurement) -> AlarmDecision {
        if let Some(reason) = measurement.violation() {
            warn!("Discarding invalid measurement ({}): {:?}", reason, measurement);
            return AlarmDecision::Rejected(reason);
        }

        let Some(alarm) = self.evaluate(measurement) else {
            debug!(
                "{} {}={} within threshold",
                measurement.sensor_type(),
                measurement.sensor_id(),
                measurement.value()
            );
            return AlarmDecision::BelowThreshold;
        };

        let key = alarm.dedup_key();
        if self.dedup.insert_if_absent(&key) {
            self.sink.deliver(&alarm);
            AlarmDecision::Raised(alarm)
        } else {
            warn!("Suppressed duplicate alarm key={}", key);
            AlarmDecision::Suppressed(alarm)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use siterelay_types::SensorType;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingSink {
        alarms: Mutex<Vec<Alarm>>,
    }

    impl AlarmSink for RecordingSink {
        fn deliver(&self, alarm: &Alarm) {
            self.alarms.lock().push(alarm.clone());
        }
    }

    fn reading(sensor_type: SensorType, sensor_id: &str, value: i32) -> Measurement {
        Measurement::new(Some("WH-1".to_string()), sensor_id, sensor_type, value, 1_700_000_000_000)
    }

    fn service() -> (AlarmService, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (AlarmService::new(ThresholdConfig::default(), sink.clone()), sink)
    }

    #[test]
    fn test_temperature_above_threshold_alarms() {
        let (service, _) = service();
        let alarm = service
            .evaluate(&reading(SensorType::Temperature, "t1", 40))
            .unwrap();
        assert_eq!(alarm.threshold_used(), 35);
        assert_eq!(alarm.value(), 40);
        assert_eq!(alarm.sensor_id(), "t1");
    }

    #[test]
    fn test_humidity_above_threshold_alarms() {
        let (service, _) = service();
        let alarm = service
            .evaluate(&reading(SensorType::Humidity, "h1", 51))
            .unwrap();
        assert_eq!(alarm.threshold_used(), 50);
        assert_eq!(alarm.value(), 51);
    }

    #[test]
    fn test_threshold_is_strict() {
        let (service, _) = service();
        for (threshold, sensor_type) in [(35, SensorType::Temperature), (50, SensorType::Humidity)] {
            for value in [threshold - 1, threshold, threshold + 1, i32::MIN, i32::MAX] {
                let raised = service.evaluate(&reading(sensor_type.clone(), "s", value)).is_some();
                assert_eq!(raised, value > threshold, "value {} vs {}", value, threshold);
            }
        }
    }

    #[test]
    fn test_zero_threshold_and_negative_values() {
        let sink = Arc::new(RecordingSink::default());
        let service = AlarmService::new(ThresholdConfig::new(0, 0), sink);
        assert!(service.evaluate(&reading(SensorType::Temperature, "t", 0)).is_none());
        assert!(service.evaluate(&reading(SensorType::Temperature, "t", -5)).is_none());
        assert!(service.evaluate(&reading(SensorType::Temperature, "t", 1)).is_some());
    }

    #[test]
    fn test_unrecognized_type_never_alarms() {
        let (service, _) = service();
        let m = reading(SensorType::from("PRESSURE"), "p1", 1_000);
        assert!(service.evaluate(&m).is_none());
    }

    #[test]
    fn test_on_measurement_delivers_then_suppresses() {
        let (service, sink) = service();
        let m = reading(SensorType::Temperature, "t1", 40);

        assert!(matches!(service.on_measurement(&m), AlarmDecision::Raised(_)));
        assert!(matches!(service.on_measurement(&m), AlarmDecision::Suppressed(_)));
        assert_eq!(sink.alarms.lock().len(), 1);

        // Different type, same sensor id: separate key.
        let h = reading(SensorType::Humidity, "t1", 60);
        assert!(matches!(service.on_measurement(&h), AlarmDecision::Raised(_)));
        assert_eq!(sink.alarms.lock().len(), 2);
    }

    #[test]
    fn test_on_measurement_redelivers_after_window() {
        let sink = Arc::new(RecordingSink::default());
        let service = AlarmService::with_dedup(
            ThresholdConfig::default(),
            DedupCache::new(16, Duration::from_millis(30)),
            sink.clone(),
        );
        let m = reading(SensorType::Temperature, "t1", 40);

        assert!(matches!(service.on_measurement(&m), AlarmDecision::Raised(_)));
        assert!(matches!(service.on_measurement(&m), AlarmDecision::Suppressed(_)));
        std::thread::sleep(Duration::from_millis(50));
        assert!(matches!(service.on_measurement(&m), AlarmDecision::Raised(_)));
        assert_eq!(sink.alarms.lock().len(), 2);
    }

    #[test]
    fn test_below_threshold_is_not_delivered() {
        let (service, sink) = service();
        let decision = service.on_measurement(&reading(SensorType::Temperature, "t1", 35));
        assert_eq!(decision, AlarmDecision::BelowThreshold);
        assert!(sink.alarms.lock().is_empty());
    }

    #[test]
    fn test_validity_gate() {
        let (service, sink) = service();

        let blank_id = Measurement::new(None, "  ", SensorType::Temperature, 99, 1);
        let unknown = Measurement::new(None, "p1", SensorType::from("PRESSURE"), 99, 1);
        let no_time = Measurement::new(None, "t1", SensorType::Temperature, 99, 0);

        assert_eq!(service.on_measurement(&blank_id), AlarmDecision::Rejected("blank sensorId"));
        assert_eq!(service.on_measurement(&unknown), AlarmDecision::Rejected("unrecognized type"));
        assert_eq!(
            service.on_measurement(&no_time),
            AlarmDecision::Rejected("non-positive timestamp")
        );
        assert!(sink.alarms.lock().is_empty());
    }

    #[test]
    fn test_absent_warehouse_shares_empty_key() {
        let (service, sink) = service();
        let m = Measurement::new(None, "t1", SensorType::Temperature, 40, 5);
        match service.on_measurement(&m) {
            AlarmDecision::Raised(alarm) => assert_eq!(alarm.dedup_key(), "|t1|TEMPERATURE"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(service.on_measurement(&m), AlarmDecision::Suppressed(_)));
        assert_eq!(sink.alarms.lock().len(), 1);
    }
}
