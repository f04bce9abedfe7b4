//! Resilient queue consumer.
//!
//! A single background task alternates between connecting and draining.
//! Any transport fault tears the receiver down, waits a fixed backoff and
//! connects again, forever, until the handle is stopped. Bad messages are
//! acknowledged and discarded one at a time; they never cost the
//! connection.

use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use siterelay_broker::{BrokerError, Connector, InboundMessage, QueueReceiver};
use siterelay_types::{codec, CodecError, Measurement};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::evaluator::AlarmService;

/// Largest message body, in bytes, that will be decoded.
pub const MAX_MESSAGE_BYTES: usize = 10 * 1024;

/// Takes measurements off the consumer.
pub trait MeasurementHandler: Send + Sync + Debug {
    fn handle(&self, measurement: Measurement);
}

impl MeasurementHandler for AlarmService {
    fn handle(&self, measurement: Measurement) {
        self.on_measurement(&measurement);
    }
}

/// Timing knobs for [`ResilientConsumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// How long one receive waits before the liveness flag is re-checked.
    pub poll_timeout: Duration,
    /// Pause between a failure and the next connection attempt.
    pub reconnect_delay: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Snapshot of consumer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub forwarded: u64,
    pub discarded: u64,
    pub reconnects: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    forwarded: AtomicU64,
    discarded: AtomicU64,
    reconnects: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Why a message was discarded.
#[derive(Debug, Error)]
enum Discard {
    #[error("not a text message")]
    NotText,

    #[error("blank message")]
    Blank,

    #[error("message too large ({0} bytes)")]
    Oversized(usize),

    #[error("undecodable measurement: {0}")]
    Malformed(#[from] CodecError),

    #[error("invalid measurement: {0}")]
    Invalid(&'static str),
}

fn decode(message: &InboundMessage) -> Result<Measurement, Discard> {
    let text = message.text().ok_or(Discard::NotText)?;
    if text.trim().is_empty() {
        return Err(Discard::Blank);
    }
    if text.len() > MAX_MESSAGE_BYTES {
        return Err(Discard::Oversized(text.len()));
    }

    let measurement = codec::from_json(text)?;
    match measurement.violation() {
        Some(reason) => Err(Discard::Invalid(reason)),
        None => Ok(measurement),
    }
}

/// Drains the queue into a [`MeasurementHandler`].
#[derive(Debug)]
pub struct ResilientConsumer {
    connector: Arc<dyn Connector>,
    handler: Arc<dyn MeasurementHandler>,
    options: ConsumerOptions,
}

impl ResilientConsumer {
    pub fn new(connector: Arc<dyn Connector>, handler: Arc<dyn MeasurementHandler>) -> Self {
        Self {
            connector,
            handler,
            options: ConsumerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConsumerOptions) -> Self {
        self.options = options;
        self
    }

    /// Spawn the consume loop on the current tokio runtime.
    pub fn start(self) -> ConsumerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(Counters::default());

        let task = tokio::spawn(self.run(running.clone(), counters.clone(), stop_rx));

        ConsumerHandle {
            running,
            stop_tx,
            counters,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(self, running: Arc<AtomicBool>, counters: Arc<Counters>, mut stop_rx: watch::Receiver<bool>) {
        let _cleared = ClearOnExit(running.clone());
        info!("Consumer starting on {}", self.connector.endpoint());

        while running.load(Ordering::SeqCst) {
            match self.connector.open_receiver().await {
                Ok(mut receiver) => {
                    info!("Consumer subscribed on {}", self.connector.endpoint());
                    let drained = self.drain(receiver.as_mut(), &running, &counters).await;
                    receiver.close().await;

                    if let Err(e) = drained {
                        warn!(
                            "Consumer lost connection, reconnecting in {:?}: {}",
                            self.options.reconnect_delay, e
                        );
                    }
                }
                Err(e) => warn!(
                    "Consumer could not connect to {}, retrying in {:?}: {}",
                    self.connector.endpoint(),
                    self.options.reconnect_delay,
                    e
                ),
            }

            if !running.load(Ordering::SeqCst) {
                break;
            }
            pause(self.options.reconnect_delay, &mut stop_rx).await;
            counters.reconnects.fetch_add(1, Ordering::Relaxed);
        }

        info!("Consumer stopped");
    }

    /// Receive until stopped or the connection fails.
    async fn drain(
        &self,
        receiver: &mut dyn QueueReceiver,
        running: &AtomicBool,
        counters: &Counters,
    ) -> Result<(), BrokerError> {
        while running.load(Ordering::SeqCst) {
            let Some(message) = receiver.receive(self.options.poll_timeout).await? else {
                continue;
            };
            counters.received.fetch_add(1, Ordering::Relaxed);

            match decode(&message) {
                Ok(measurement) => {
                    debug!(
                        "Consumed {} {}={}",
                        measurement.sensor_type(),
                        measurement.sensor_id(),
                        measurement.value()
                    );
                    let tag = message.delivery_tag;
                    let handled = panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle(measurement)));
                    if handled.is_ok() {
                        counters.forwarded.fetch_add(1, Ordering::Relaxed);
                    } else {
                        error!("Handler panicked on message {}, discarding it", tag);
                        counters.discarded.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(reason) => {
                    warn!("Discarding message {}: {}", message.delivery_tag, reason);
                    counters.discarded.fetch_add(1, Ordering::Relaxed);
                }
            }

            receiver.ack(message.delivery_tag).await?;
        }
        Ok(())
    }
}

/// Marks the consumer as not running when the loop exits, however it exits.
struct ClearOnExit(Arc<AtomicBool>);

impl Drop for ClearOnExit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sleep for `delay`, returning early once a stop is signalled.
async fn pause(delay: Duration, stop_rx: &mut watch::Receiver<bool>) {
    let stopped = async {
        let closed = stop_rx.wait_for(|stop| *stop).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    };
    let _ = tokio::time::timeout(delay, stopped).await;
}

/// Controls a started [`ResilientConsumer`].
#[derive(Debug)]
pub struct ConsumerHandle {
    running: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    counters: Arc<Counters>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConsumerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the loop to exit. It finishes its current poll first. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(true);
    }

    /// Wait for the loop to exit and its receiver to be closed.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Consumer task ended abnormally: {}", e);
            }
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        self.counters.snapshot()
    }
}
