//! # siterelay-central
//!
//! The central unit of the siterelay pipeline. It drains measurements from
//! the durable queue, checks each against its threshold and raises an alarm
//! for breaches, suppressing repeats of the same alarm inside a short
//! window.
//!
//! ```text
//! queue ─▶ ResilientConsumer ─▶ AlarmService ─▶ DedupCache ─▶ AlarmSink
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use siterelay_central::{AlarmDecision, AlarmService, LogAlarmSink};
//! use siterelay_types::{Measurement, SensorType, ThresholdConfig};
//!
//! let service = AlarmService::new(ThresholdConfig::default(), Arc::new(LogAlarmSink));
//! let hot = Measurement::new(Some("WH-1".into()), "t1", SensorType::Temperature, 40, 1_700_000_000_000);
//!
//! assert!(matches!(service.on_measurement(&hot), AlarmDecision::Raised(_)));
//! assert!(matches!(service.on_measurement(&hot), AlarmDecision::Suppressed(_)));
//! ```
//!
//! Draining a queue in the background:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use siterelay_broker::MemoryBroker;
//! use siterelay_central::{AlarmService, ConsumerOptions, LogAlarmSink, ResilientConsumer};
//! use siterelay_types::ThresholdConfig;
//!
//! # tokio_test::block_on(async {
//! let broker = MemoryBroker::new();
//! broker.push_raw(r#"{"sensorId":"t1","type":"TEMPERATURE","value":40,"timestamp":1}"#, None);
//!
//! let service = Arc::new(AlarmService::new(ThresholdConfig::default(), Arc::new(LogAlarmSink)));
//! let consumer = ResilientConsumer::new(Arc::new(broker.clone()), service)
//!     .with_options(ConsumerOptions {
//!         poll_timeout: Duration::from_millis(10),
//!         reconnect_delay: Duration::from_millis(10),
//!     })
//!     .start();
//!
//! while consumer.stats().forwarded < 1 {
//!     tokio::time::sleep(Duration::from_millis(5)).await;
//! }
//! consumer.stop();
//! consumer.join().await;
//! assert_eq!(broker.acked(), 1);
//! # });
//! ```

pub mod alarm_sink;
pub mod config;
pub mod consumer;
pub mod dedup;
pub mod evaluator;

pub use alarm_sink::{AlarmSink, LogAlarmSink};
pub use config::CentralConfig;
pub use consumer::{ConsumerHandle, ConsumerOptions, ConsumerStats, MeasurementHandler, ResilientConsumer};
pub use dedup::DedupCache;
pub use evaluator::{AlarmDecision, AlarmService};
