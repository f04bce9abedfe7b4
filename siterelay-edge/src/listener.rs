//! UDP ingress, one listener per sensor type.
//!
//! Each listener owns a socket and a background task. Datagrams are decoded
//! as UTF-8 (lossily), trimmed, size-checked, parsed and handed to a
//! [`RelaySink`]. Nothing a single datagram does can stop the loop: handling
//! runs under `catch_unwind` and every failure is logged and skipped.

use std::net::{Ipv4Addr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use siterelay_types::SensorType;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::parser::MeasurementParser;
use crate::sink::RelaySink;

/// Largest trimmed payload that will be parsed.
pub const MAX_PAYLOAD_BYTES: usize = 512;

const RECV_BUFFER_BYTES: usize = 2048;

const RECV_ERROR_PAUSE: Duration = Duration::from_millis(50);
const MAX_RECV_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Pause before retrying after the `consecutive`-th receive error in a row.
/// Doubles from 50 ms up to 1 s.
fn recv_error_pause(consecutive: u32) -> Duration {
    let doublings = consecutive.saturating_sub(1).min(5);
    (RECV_ERROR_PAUSE * 2u32.pow(doublings)).min(MAX_RECV_ERROR_PAUSE)
}

/// Snapshot of listener counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub datagrams: u64,
    pub relayed: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    datagrams: AtomicU64,
    relayed: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            relayed: self.relayed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Receives datagrams for one sensor type on one port.
#[derive(Debug)]
pub struct UdpListener {
    bind_addr: SocketAddr,
    sensor_type: SensorType,
    parser: Arc<MeasurementParser>,
    sink: Arc<dyn RelaySink>,
}

impl UdpListener {
    /// Listener on `port` on all interfaces.
    pub fn new(
        port: u16,
        sensor_type: SensorType,
        parser: Arc<MeasurementParser>,
        sink: Arc<dyn RelaySink>,
    ) -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            sensor_type,
            parser,
            sink,
        }
    }

    /// Bind to a specific address instead, e.g. `127.0.0.1:0` in tests.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Bind the socket and spawn the receive loop.
    ///
    /// A bind failure is logged and yields a handle that is not running;
    /// it never takes the process down.
    pub async fn start(self) -> ListenerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let running = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let socket = match UdpSocket::bind(self.bind_addr).await {
            Ok(socket) => socket,
            Err(e) => {
                error!(
                    "Failed to bind UDP listener for {} sensor on {}: {}",
                    self.sensor_type.label(),
                    self.bind_addr,
                    e
                );
                return ListenerHandle {
                    sensor_type: self.sensor_type,
                    local_addr: None,
                    running,
                    stop_tx,
                    counters,
                    task: Mutex::new(None),
                };
            }
        };

        let local_addr = socket.local_addr().ok();
        info!(
            "Started UDP listener for {} sensor on {}",
            self.sensor_type.label(),
            local_addr.unwrap_or(self.bind_addr)
        );

        running.store(true, Ordering::SeqCst);
        let worker = DatagramWorker {
            sensor_type: self.sensor_type.clone(),
            parser: self.parser,
            sink: self.sink,
            counters: counters.clone(),
        };
        let task = tokio::spawn(run(socket, worker, running.clone(), stop_rx));

        ListenerHandle {
            sensor_type: self.sensor_type,
            local_addr,
            running,
            stop_tx,
            counters,
            task: Mutex::new(Some(task)),
        }
    }
}

/// Controls a started [`UdpListener`].
#[derive(Debug)]
pub struct ListenerHandle {
    sensor_type: SensorType,
    local_addr: Option<SocketAddr>,
    running: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    counters: Arc<Counters>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ListenerHandle {
    pub fn sensor_type(&self) -> &SensorType {
        &self.sensor_type
    }

    /// Bound address, or `None` if binding failed.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the receive loop to stop. Idempotent, callable from any task.
    pub fn close(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!("Stopping UDP listener for {} sensor", self.sensor_type.label());
        }
        let _ = self.stop_tx.send(true);
    }

    /// Wait for the receive loop to finish. Returns immediately if it was
    /// never started or has already been joined.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("UDP listener task for {} sensor ended abnormally: {}", self.sensor_type.label(), e);
            }
        }
    }

    pub fn stats(&self) -> ListenerStats {
        self.counters.snapshot()
    }
}

#[derive(Debug)]
struct DatagramWorker {
    sensor_type: SensorType,
    parser: Arc<MeasurementParser>,
    sink: Arc<dyn RelaySink>,
    counters: Arc<Counters>,
}

impl DatagramWorker {
    async fn handle(&self, bytes: &[u8], peer: SocketAddr) {
        self.counters.datagrams.fetch_add(1, Ordering::Relaxed);

        let decoded = String::from_utf8_lossy(bytes);
        let payload = decoded.trim();
        if payload.is_empty() {
            return;
        }

        if payload.len() > MAX_PAYLOAD_BYTES {
            warn!(
                "Ignoring oversized {} payload from {}: {} bytes (max {})",
                self.sensor_type.label(),
                peer,
                payload.len(),
                MAX_PAYLOAD_BYTES
            );
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match self.parser.parse(payload, Some(&self.sensor_type)) {
            Some(measurement) => {
                debug!(
                    "Received {} reading {}={} from {}",
                    self.sensor_type.label(),
                    measurement.sensor_id(),
                    measurement.value(),
                    peer
                );
                self.sink.relay(measurement).await;
                self.counters.relayed.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                warn!(
                    "Discarding malformed {} payload from {}: {:?}",
                    self.sensor_type.label(),
                    peer,
                    payload
                );
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

async fn run(
    socket: UdpSocket,
    worker: DatagramWorker,
    running: Arc<AtomicBool>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_BYTES];
    let mut consecutive_errors: u32 = 0;

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    consecutive_errors = 0;
                    let handled = AssertUnwindSafe(worker.handle(&buf[..len], peer))
                        .catch_unwind()
                        .await;
                    if handled.is_err() {
                        error!("Panic while handling {} datagram from {}", worker.sensor_type.label(), peer);
                    }
                }
                Err(e) => {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    let pause = recv_error_pause(consecutive_errors);
                    warn!(
                        "UDP receive failed for {} sensor, retrying in {:?}: {}",
                        worker.sensor_type.label(),
                        pause,
                        e
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = stop_rx.changed() => {}
                    }
                }
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    info!("Stopped UDP listener for {} sensor", worker.sensor_type.label());
}
