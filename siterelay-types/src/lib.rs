//! # siterelay-types
//!
//! Shared data model for the siterelay sensor pipeline. Both deployable
//! units depend on this crate and on nothing else from each other: the edge
//! unit produces [`Measurement`]s and the central unit turns them into
//! [`Alarm`]s. The two only meet through the queue wire format in [`codec`].
//!
//! ```text
//!  edge unit                                   central unit
//! ┌──────────────────────────┐  JSON/queue  ┌──────────────────────────┐
//! │ UDP ─▶ parser ─▶ publish │─────────────▶│ consume ─▶ evaluate+dedup│
//! └──────────────────────────┘              └──────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use siterelay_types::{codec, Measurement, SensorType, ThresholdConfig};
//!
//! let reading = Measurement::new(Some("WH-1".into()), "t1", SensorType::Temperature, 40, 1_700_000_000_000);
//! let json = codec::to_json(&reading).unwrap();
//! assert_eq!(codec::from_json(&json).unwrap(), reading);
//!
//! let thresholds = ThresholdConfig::default();
//! assert_eq!(thresholds.threshold_for(&SensorType::Temperature), Some(35));
//! ```

mod alarm;
pub mod codec;
mod measurement;
pub mod settings;
mod thresholds;

pub use alarm::Alarm;
pub use codec::CodecError;
pub use measurement::{Measurement, SensorType};
pub use settings::Settings;
pub use thresholds::ThresholdConfig;

/// Current wall-clock time as milliseconds since the Unix epoch.
pub fn current_timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
