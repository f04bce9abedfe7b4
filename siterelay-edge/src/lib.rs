//! # siterelay-edge
//!
//! The edge unit of the siterelay pipeline. It listens for plain-text sensor
//! datagrams on one UDP port per sensor type, parses them into
//! [`Measurement`](siterelay_types::Measurement)s and relays them to the
//! central unit through a durable queue.
//!
//! ```text
//! UDP :3344 ─▶ UdpListener(TEMPERATURE) ─┐
//!                                         ├─▶ ResilientPublisher ─▶ queue
//! UDP :3355 ─▶ UdpListener(HUMIDITY)    ─┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use siterelay_broker::MemoryBroker;
//! use siterelay_edge::{MeasurementParser, PublishOutcome, ResilientPublisher};
//! use siterelay_types::SensorType;
//!
//! # tokio_test::block_on(async {
//! let broker = MemoryBroker::new();
//! let publisher = ResilientPublisher::connect(Arc::new(broker.clone())).await;
//!
//! let parser = MeasurementParser::new(Some("WH-1".to_string()));
//! let reading = parser.parse("sensor_id=t1; value=40", Some(&SensorType::Temperature)).unwrap();
//!
//! assert_eq!(publisher.publish(&reading).await, PublishOutcome::Sent);
//! assert_eq!(broker.len(), 1);
//! # });
//! ```

pub mod config;
pub mod listener;
pub mod parser;
pub mod publisher;
pub mod sink;

pub use config::EdgeConfig;
pub use listener::{ListenerHandle, ListenerStats, UdpListener};
pub use parser::MeasurementParser;
pub use publisher::{ConnectionState, PublishOutcome, PublisherStats, ResilientPublisher};
pub use sink::RelaySink;
