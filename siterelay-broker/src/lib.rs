//! # siterelay-broker
//!
//! The queue transport seam between the edge and central units.
//!
//! The durable queue is treated as an opaque at-least-once delivery service.
//! Components never talk to a client library directly; they hold a
//! [`Connector`] and open short-lived [`QueueSender`] / [`QueueReceiver`]
//! handles from it, discarding a handle as soon as it reports a fault.
//!
//! ## Implementations
//!
//! - **AMQP** (`amqp` feature, default) - RabbitMQ or any AMQP 0-9-1 broker
//!   via `lapin`
//! - **Memory** - an in-process queue with fault injection, for tests and
//!   local wiring
//!
//! ## Example
//!
//! ```rust
//! use siterelay_broker::{Connector, MemoryBroker};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let broker = MemoryBroker::new();
//!
//! let mut sender = broker.open_sender().await.unwrap();
//! sender.send(br#"{"sensorId":"t1"}"#).await.unwrap();
//!
//! let mut receiver = broker.open_receiver().await.unwrap();
//! let message = receiver.receive(Duration::from_millis(10)).await.unwrap().unwrap();
//! assert_eq!(message.text(), Some(r#"{"sensorId":"t1"}"#));
//! # });
//! ```

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

pub mod error;
pub mod memory;

#[cfg(feature = "amqp")]
pub mod amqp;

pub use error::BrokerError;
pub use memory::MemoryBroker;

#[cfg(feature = "amqp")]
pub use amqp::AmqpConnector;

/// Content type attached to published measurements.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A message taken off the queue, not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub delivery_tag: u64,
}

impl InboundMessage {
    /// The body as text, if this is a text message.
    ///
    /// A message is text when it carries no content type, a `text/*` type
    /// or `application/json`, and its body is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        let textual = match self.content_type.as_deref() {
            None => true,
            Some(ct) => {
                let essence = ct.split(';').next().unwrap_or_default().trim();
                essence.eq_ignore_ascii_case(JSON_CONTENT_TYPE)
                    || essence.to_ascii_lowercase().starts_with("text/")
            }
        };

        if textual {
            std::str::from_utf8(&self.body).ok()
        } else {
            None
        }
    }
}

/// Factory for connections to one queue.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Human-readable endpoint, for log lines.
    fn endpoint(&self) -> &str;

    /// Open a connection and a sender bound to the queue.
    async fn open_sender(&self) -> Result<Box<dyn QueueSender>, BrokerError>;

    /// Open a connection and a subscription to the queue.
    async fn open_receiver(&self) -> Result<Box<dyn QueueReceiver>, BrokerError>;
}

/// Sending half of a queue connection.
///
/// Owns its connection exclusively. After any error the handle should be
/// closed and replaced.
#[async_trait]
pub trait QueueSender: Send + Debug {
    /// Whether the underlying connection still looks usable.
    fn is_connected(&self) -> bool;

    /// Enqueue one message body.
    async fn send(&mut self, body: &[u8]) -> Result<(), BrokerError>;

    /// Release the connection. Idempotent; errors are swallowed.
    async fn close(&mut self);
}

/// Receiving half of a queue connection.
#[async_trait]
pub trait QueueReceiver: Send + Debug {
    /// Wait up to `timeout` for the next message.
    ///
    /// `Ok(None)` means the timeout elapsed with no traffic.
    async fn receive(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, BrokerError>;

    /// Acknowledge a message returned by [`receive`](Self::receive).
    async fn ack(&mut self, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Release the subscription and connection. Idempotent; errors are
    /// swallowed.
    async fn close(&mut self);
}
