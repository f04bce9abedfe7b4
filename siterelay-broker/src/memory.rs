//! In-process queue with fault injection.
//!
//! `MemoryBroker` behaves like a tiny single-queue broker living inside the
//! process. Clones share the same queue. It exists so the publisher and
//! consumer state machines can be driven through outages deterministically:
//!
//! - [`set_available(false)`](MemoryBroker::set_available) refuses new
//!   connections and breaks every live handle
//! - [`sever_connections`](MemoryBroker::sever_connections) breaks every
//!   live handle once but keeps accepting new ones
//!
//! Acknowledgements are counted; unacknowledged messages are not redelivered.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{BrokerError, Connector, InboundMessage, QueueReceiver, QueueSender, JSON_CONTENT_TYPE};

#[derive(Debug)]
struct Shared {
    queue: Mutex<VecDeque<InboundMessage>>,
    notify: Notify,
    available: AtomicBool,
    generation: AtomicU64,
    next_tag: AtomicU64,
    connect_attempts: AtomicU64,
    acked: AtomicU64,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            available: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            next_tag: AtomicU64::new(1),
            connect_attempts: AtomicU64::new(0),
            acked: AtomicU64::new(0),
        }
    }
}

impl Shared {
    fn is_live(&self, generation: u64) -> bool {
        self.available.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    fn push(&self, body: Vec<u8>, content_type: Option<String>) {
        let delivery_tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        self.queue.lock().push_back(InboundMessage {
            body,
            content_type,
            delivery_tag,
        });
        self.notify.notify_one();
    }

    fn break_handles(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn connect(&self) -> Result<u64, BrokerError> {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        if !self.available.load(Ordering::SeqCst) {
            return Err(BrokerError::Connection("memory broker unavailable".to_string()));
        }
        Ok(self.generation.load(Ordering::SeqCst))
    }
}

/// A shared in-process queue implementing [`Connector`].
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the broker up or down. Going down breaks every live handle.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
        if !available {
            self.shared.break_handles();
        }
    }

    /// Break every live sender and receiver without going down.
    pub fn sever_connections(&self) {
        self.shared.break_handles();
    }

    /// Enqueue a raw message, bypassing any sender.
    pub fn push_raw(&self, body: impl Into<Vec<u8>>, content_type: Option<&str>) {
        self.shared.push(body.into(), content_type.map(str::to_string));
    }

    /// Copy of the messages currently queued, oldest first.
    pub fn queued(&self) -> Vec<InboundMessage> {
        self.shared.queue.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of connection attempts made, successful or not.
    pub fn connect_attempts(&self) -> u64 {
        self.shared.connect_attempts.load(Ordering::Relaxed)
    }

    /// Number of messages acknowledged by receivers.
    pub fn acked(&self) -> u64 {
        self.shared.acked.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    fn endpoint(&self) -> &str {
        "memory://"
    }

    async fn open_sender(&self) -> Result<Box<dyn QueueSender>, BrokerError> {
        let generation = self.shared.connect()?;
        Ok(Box::new(MemorySender {
            shared: self.shared.clone(),
            generation,
            closed: false,
        }))
    }

    async fn open_receiver(&self) -> Result<Box<dyn QueueReceiver>, BrokerError> {
        let generation = self.shared.connect()?;
        Ok(Box::new(MemoryReceiver {
            shared: self.shared.clone(),
            generation,
            closed: false,
        }))
    }
}

#[derive(Debug)]
struct MemorySender {
    shared: Arc<Shared>,
    generation: u64,
    closed: bool,
}

#[async_trait]
impl QueueSender for MemorySender {
    fn is_connected(&self) -> bool {
        !self.closed && self.shared.is_live(self.generation)
    }

    async fn send(&mut self, body: &[u8]) -> Result<(), BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        self.shared
            .push(body.to_vec(), Some(JSON_CONTENT_TYPE.to_string()));
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

#[derive(Debug)]
struct MemoryReceiver {
    shared: Arc<Shared>,
    generation: u64,
    closed: bool,
}

impl MemoryReceiver {
    fn is_connected(&self) -> bool {
        !self.closed && self.shared.is_live(self.generation)
    }
}

#[async_trait]
impl QueueReceiver for MemoryReceiver {
    async fn receive(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, BrokerError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if !self.is_connected() {
                return Err(BrokerError::Receive("connection severed".to_string()));
            }

            // Register interest before checking the queue so a concurrent
            // push cannot slip between the check and the wait.
            let notified = self.shared.notify.notified();
            let next = self.shared.queue.lock().pop_front();
            if let Some(message) = next {
                return Ok(Some(message));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&mut self, _delivery_tag: u64) -> Result<(), BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        self.shared.acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
