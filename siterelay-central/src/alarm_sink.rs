//! Alarm delivery.

use std::fmt::Debug;

use siterelay_types::Alarm;
use tracing::warn;

/// Receives alarms that survived deduplication.
pub trait AlarmSink: Send + Sync + Debug {
    fn deliver(&self, alarm: &Alarm);
}

/// Writes one `ALARM ...` warning line per alarm.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlarmSink;

impl AlarmSink for LogAlarmSink {
    fn deliver(&self, alarm: &Alarm) {
        warn!("ALARM {}", alarm);
    }
}
