//! Resilient measurement publisher.
//!
//! Holds at most one live [`QueueSender`] and serializes every publish
//! through it. A failed send triggers exactly one reconnect and one retry;
//! if that also fails the reading is dropped and logged. The publisher
//! never errors to its caller and never blocks for longer than one connect
//! attempt plus two sends.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use siterelay_broker::{BrokerError, Connector, QueueSender};
use siterelay_types::{codec, Measurement};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::sink::RelaySink;

/// Upper bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state, as seen by the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What happened to one published reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Sent on the existing connection.
    Sent,
    /// Sent after one reconnect.
    SentAfterReconnect,
    /// Not delivered.
    Dropped,
}

/// Snapshot of publisher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub published: u64,
    pub dropped: u64,
    pub reconnects: u64,
}

type SenderSlot = Option<Box<dyn QueueSender>>;

/// Publishes measurements to the queue, reconnecting on demand.
#[derive(Debug)]
pub struct ResilientPublisher {
    connector: Arc<dyn Connector>,
    sender: Mutex<SenderSlot>,
    state: RwLock<ConnectionState>,
    connect_timeout: Duration,
    closed: AtomicBool,
    published: AtomicU64,
    dropped: AtomicU64,
    reconnects: AtomicU64,
}

impl ResilientPublisher {
    /// Create a publisher and make one eager connection attempt.
    ///
    /// A failed attempt is logged; the publisher starts disconnected and
    /// connects lazily on the first publish.
    pub async fn connect(connector: Arc<dyn Connector>) -> Self {
        Self::connect_with_timeout(connector, DEFAULT_CONNECT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(connector: Arc<dyn Connector>, connect_timeout: Duration) -> Self {
        let publisher = Self {
            connector,
            sender: Mutex::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            connect_timeout,
            closed: AtomicBool::new(false),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        };

        {
            let mut slot = publisher.sender.lock().await;
            publisher.open(&mut slot).await;
        }

        publisher
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }

    /// Serialize and send one reading.
    pub async fn publish(&self, measurement: &Measurement) -> PublishOutcome {
        if self.closed.load(Ordering::SeqCst) {
            debug!("Publisher closed, dropping measurement from {}", measurement.sensor_id());
            return self.drop_one();
        }

        let body = match codec::to_json(measurement) {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to serialize measurement, dropping: {}", e);
                return self.drop_one();
            }
        };

        let mut slot = self.sender.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return self.drop_one();
        }

        match Self::try_send(&mut slot, body.as_bytes()).await {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                return PublishOutcome::Sent;
            }
            Err(e) => warn!("Publish failed, reconnecting: {}", e),
        }

        self.discard(&mut slot).await;
        if self.open(&mut slot).await {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        }

        match Self::try_send(&mut slot, body.as_bytes()).await {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                PublishOutcome::SentAfterReconnect
            }
            Err(e) => {
                warn!(
                    "Publish failed after reconnect, dropping measurement from {}: {}",
                    measurement.sensor_id(),
                    e
                );
                self.discard(&mut slot).await;
                self.drop_one()
            }
        }
    }

    /// Release the connection. Later publishes are dropped. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut slot = self.sender.lock().await;
        self.discard(&mut slot).await;
        info!("Publisher closed");
    }

    async fn try_send(slot: &mut SenderSlot, body: &[u8]) -> Result<(), BrokerError> {
        match slot.as_mut() {
            Some(sender) if sender.is_connected() => sender.send(body).await,
            _ => Err(BrokerError::NotConnected),
        }
    }

    async fn open(&self, slot: &mut SenderSlot) -> bool {
        self.set_state(ConnectionState::Connecting);

        let opened = match tokio::time::timeout(self.connect_timeout, self.connector.open_sender()).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Connection(format!(
                "timed out after {:?}",
                self.connect_timeout
            ))),
        };

        match opened {
            Ok(sender) => {
                *slot = Some(sender);
                self.set_state(ConnectionState::Connected);
                info!("Publisher connected to {}", self.connector.endpoint());
                true
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                warn!(
                    "Publisher could not connect to {}, will retry on next publish: {}",
                    self.connector.endpoint(),
                    e
                );
                false
            }
        }
    }

    async fn discard(&self, slot: &mut SenderSlot) {
        if let Some(mut sender) = slot.take() {
            sender.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn drop_one(&self) -> PublishOutcome {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        PublishOutcome::Dropped
    }
}

#[async_trait]
impl RelaySink for ResilientPublisher {
    async fn relay(&self, measurement: Measurement) {
        self.publish(&measurement).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siterelay_broker::{MemoryBroker, QueueReceiver};
    use siterelay_types::SensorType;

    fn reading(sensor_id: &str, value: i32) -> Measurement {
        Measurement::new(
            Some("WH-1".to_string()),
            sensor_id,
            SensorType::Temperature,
            value,
            1_700_000_000_000,
        )
    }

    fn decode_queued(broker: &MemoryBroker) -> Vec<Measurement> {
        broker
            .queued()
            .iter()
            .map(|m| codec::from_json(m.text().unwrap()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_publishes_json_to_queue() {
        let broker = MemoryBroker::new();
        let publisher = ResilientPublisher::connect(Arc::new(broker.clone())).await;
        assert_eq!(publisher.state(), ConnectionState::Connected);

        let outcome = publisher.publish(&reading("t1", 40)).await;
        assert_eq!(outcome, PublishOutcome::Sent);

        let queued = decode_queued(&broker);
        assert_eq!(queued, vec![reading("t1", 40)]);
        assert_eq!(publisher.stats().published, 1);
    }

    #[tokio::test]
    async fn test_reconnects_once_after_severed_connection() {
        let broker = MemoryBroker::new();
        let publisher = ResilientPublisher::connect(Arc::new(broker.clone())).await;

        broker.sever_connections();
        let outcome = publisher.publish(&reading("t1", 41)).await;

        assert_eq!(outcome, PublishOutcome::SentAfterReconnect);
        assert_eq!(broker.len(), 1);
        assert_eq!(broker.connect_attempts(), 2);
        assert_eq!(publisher.state(), ConnectionState::Connected);
        assert_eq!(publisher.stats().reconnects, 1);
    }

    #[tokio::test]
    async fn test_drops_while_broker_down_then_recovers() {
        let broker = MemoryBroker::new();
        let publisher = ResilientPublisher::connect(Arc::new(broker.clone())).await;

        broker.set_available(false);
        assert_eq!(publisher.publish(&reading("t1", 40)).await, PublishOutcome::Dropped);
        assert_eq!(publisher.publish(&reading("t1", 41)).await, PublishOutcome::Dropped);
        assert_eq!(publisher.state(), ConnectionState::Disconnected);
        assert!(broker.is_empty());

        broker.set_available(true);
        assert_eq!(
            publisher.publish(&reading("t1", 42)).await,
            PublishOutcome::SentAfterReconnect
        );
        assert_eq!(publisher.publish(&reading("t1", 43)).await, PublishOutcome::Sent);

        let values: Vec<i32> = decode_queued(&broker).iter().map(Measurement::value).collect();
        assert_eq!(values, vec![42, 43]);

        let stats = publisher.stats();
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.published, 2);
    }

    #[tokio::test]
    async fn test_starts_disconnected_when_broker_unreachable() {
        let broker = MemoryBroker::new();
        broker.set_available(false);

        let publisher = ResilientPublisher::connect(Arc::new(broker.clone())).await;
        assert_eq!(publisher.state(), ConnectionState::Disconnected);

        broker.set_available(true);
        assert_eq!(
            publisher.publish(&reading("h1", 60)).await,
            PublishOutcome::SentAfterReconnect
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_drops_later_publishes() {
        let broker = MemoryBroker::new();
        let publisher = ResilientPublisher::connect(Arc::new(broker.clone())).await;

        publisher.close().await;
        publisher.close().await;
        assert_eq!(publisher.state(), ConnectionState::Disconnected);

        assert_eq!(publisher.publish(&reading("t1", 40)).await, PublishOutcome::Dropped);
        assert!(broker.is_empty());
        assert_eq!(broker.connect_attempts(), 1);
    }

    /// Delays every sender it opens.
    #[derive(Debug)]
    struct SlowConnector {
        broker: MemoryBroker,
        delay: Duration,
    }

    #[async_trait]
    impl Connector for SlowConnector {
        fn endpoint(&self) -> &str {
            "slow-memory://"
        }

        async fn open_sender(&self) -> Result<Box<dyn QueueSender>, BrokerError> {
            tokio::time::sleep(self.delay).await;
            self.broker.open_sender().await
        }

        async fn open_receiver(&self) -> Result<Box<dyn QueueReceiver>, BrokerError> {
            self.broker.open_receiver().await
        }
    }

    #[tokio::test]
    async fn test_close_during_inflight_reconnect() {
        let broker = MemoryBroker::new();
        let connector = Arc::new(SlowConnector {
            broker: broker.clone(),
            delay: Duration::from_millis(100),
        });
        let publisher = ResilientPublisher::connect(connector).await;
        broker.sever_connections();

        let first = reading("t1", 40);
        let publishing = publisher.publish(&first);
        let closing = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.close().await;
        };
        let (outcome, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(publishing, closing)
        })
        .await
        .unwrap();

        // The in-flight publish finishes its reconnect before close takes the lock.
        assert_eq!(outcome, PublishOutcome::SentAfterReconnect);
        assert_eq!(publisher.state(), ConnectionState::Disconnected);
        assert_eq!(broker.len(), 1);

        assert_eq!(publisher.publish(&reading("t1", 41)).await, PublishOutcome::Dropped);
        assert_eq!(broker.len(), 1);
        assert_eq!(broker.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_publishes_all_arrive() {
        let broker = MemoryBroker::new();
        let publisher = Arc::new(ResilientPublisher::connect(Arc::new(broker.clone())).await);

        let mut tasks = Vec::new();
        for i in 0..20 {
            let publisher = publisher.clone();
            tasks.push(tokio::spawn(async move {
                publisher.relay(reading(&format!("t{}", i), i)).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(broker.len(), 20);
        assert_eq!(publisher.stats().published, 20);
    }
}
