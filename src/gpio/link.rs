//! GPIO Link (C7, spec.md §4.7): single persistent connection to field I/O,
//! reconnection, heartbeat, pin-state cache. Reconnect-loop and
//! exponential-backoff idiom grounded on the teacher's
//! `scrapers/polymarket_ws.rs` WS client; framing swapped from WS to plain
//! newline-delimited JSON over TCP since the GPIO socket has no handshake.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::GpioLinkError;

use super::wire::{parse_line, GpioMessage};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A committed pin transition, carrying both sides so subscribers never
/// need their own shadow copy of pin state to detect edges.
#[derive(Debug, Clone, Copy)]
pub struct PinEvent {
    pub pin: u32,
    pub previous: u8,
    pub value: u8,
}

pub struct GpioLink {
    host: String,
    port: u16,
    heartbeat_timeout: Duration,
    watchdog_interval: Duration,
    pins: RwLock<HashMap<u32, u8>>,
    initialized: AtomicBool,
    events_tx: broadcast::Sender<PinEvent>,
    last_message_at: SyncMutex<Instant>,
    conn_cancel: SyncMutex<CancellationToken>,
    shutdown: CancellationToken,
}

impl GpioLink {
    /// Starts the link's connection-owning task and its heartbeat watchdog,
    /// returning a handle subscribers can use immediately (no messages are
    /// delivered until the first snapshot/seed message arrives).
    pub fn spawn(
        host: String,
        port: u16,
        heartbeat_timeout: Duration,
        watchdog_interval: Duration,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let link = Arc::new(Self {
            host,
            port,
            heartbeat_timeout,
            watchdog_interval,
            pins: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(false),
            events_tx,
            last_message_at: SyncMutex::new(Instant::now()),
            conn_cancel: SyncMutex::new(CancellationToken::new()),
            shutdown,
        });

        tokio::spawn(link.clone().run());
        tokio::spawn(link.clone().watchdog());
        link
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PinEvent> {
        self.events_tx.subscribe()
    }

    /// Atomic per-pin read of the shared cache (spec.md §5: "a read is
    /// atomic per pin").
    pub fn pin_state(&self, pin: u32) -> Option<u8> {
        self.pins.read().get(&pin).copied()
    }

    async fn run(self: Arc<Self>) {
        let mut backoff = Duration::from_millis(500);
        const MAX_BACKOFF: Duration = Duration::from_secs(30);

        loop {
            if self.shutdown.is_cancelled() {
                return;
            }

            let conn_token = CancellationToken::new();
            *self.conn_cancel.lock() = conn_token.clone();

            match self.clone().connect_and_stream(conn_token).await {
                Ok(()) => {
                    backoff = Duration::from_millis(500);
                }
                Err(e) => {
                    warn!(error = %e, host = %self.host, port = self.port, "gpio link disconnected; reconnecting");
                }
            }

            self.reset_state();

            if self.shutdown.is_cancelled() {
                return;
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn connect_and_stream(&self, conn_token: CancellationToken) -> Result<(), GpioLinkError> {
        info!(host = %self.host, port = self.port, "connecting to gpio link");
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| GpioLinkError::Connect(format!("{}:{}", self.host, self.port), e.to_string()))?;
        info!(host = %self.host, port = self.port, "gpio link connected");
        *self.last_message_at.lock() = Instant::now();

        let mut framed = Framed::new(stream, LinesCodec::new());

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = conn_token.cancelled() => return Err(GpioLinkError::HeartbeatTimeout(self.heartbeat_timeout)),
                line = framed.next() => {
                    let line = match line {
                        Some(Ok(l)) => l,
                        Some(Err(e)) => return Err(GpioLinkError::Decode(e.to_string())),
                        None => return Err(GpioLinkError::Closed),
                    };
                    *self.last_message_at.lock() = Instant::now();
                    self.handle_line(&line);
                }
            }
        }
    }

    fn handle_line(&self, line: &str) {
        let msg = match parse_line(line) {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "dropping unparseable gpio line");
                return;
            }
        };

        match msg {
            GpioMessage::Snapshot(states) => {
                let mut pins = self.pins.write();
                for s in &states {
                    pins.insert(s.pin, s.value);
                }
                drop(pins);
                self.initialized.store(true, Ordering::SeqCst);
                debug!(count = states.len(), "gpio initial snapshot received");
            }
            GpioMessage::Update(state) => {
                if !self.initialized.load(Ordering::SeqCst) {
                    // Reconnect path with no snapshot: first message seeds
                    // state without emitting a level change (spec.md §4.7).
                    self.pins.write().insert(state.pin, state.value);
                    self.initialized.store(true, Ordering::SeqCst);
                    debug!(pin = state.pin, value = state.value, "gpio state seeded");
                    return;
                }

                let previous = {
                    let mut pins = self.pins.write();
                    let previous = pins.insert(state.pin, state.value);
                    previous
                };
                if let Some(previous) = previous {
                    if previous != state.value {
                        let event = PinEvent {
                            pin: state.pin,
                            previous,
                            value: state.value,
                        };
                        if self.events_tx.send(event).is_err() {
                            debug!(pin = state.pin, "pin event published with no subscribers");
                        }
                    }
                } else {
                    // First time this particular pin is seen after a
                    // snapshot of other pins; seed without emitting.
                    debug!(pin = state.pin, value = state.value, "gpio pin seeded post-snapshot");
                }
            }
        }
    }

    fn reset_state(&self) {
        self.pins.write().clear();
        self.initialized.store(false, Ordering::SeqCst);
    }

    async fn watchdog(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.watchdog_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let elapsed = self.last_message_at.lock().elapsed();
            if elapsed > self.heartbeat_timeout {
                warn!(elapsed_secs = elapsed.as_secs(), "gpio link heartbeat stale, forcing reconnect");
                self.conn_cancel.lock().cancel();
            }
        }
    }
}

#[cfg(test)]
impl GpioLink {
    /// Test-only: a link with no socket behind it, usable wherever a test
    /// needs to drive the pin cache and subscriber events directly.
    pub(crate) fn new_for_test() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            host: "test".into(),
            port: 0,
            heartbeat_timeout: Duration::from_secs(60),
            watchdog_interval: Duration::from_secs(15),
            pins: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(true),
            events_tx,
            last_message_at: SyncMutex::new(Instant::now()),
            conn_cancel: SyncMutex::new(CancellationToken::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Test-only: sets a pin's cached value directly, without a socket.
    pub(crate) fn set_pin_for_test(&self, pin: u32, value: u8) {
        self.pins.write().insert(pin, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_without_emitting_on_first_sight() {
        let (tx, mut rx) = broadcast::channel(16);
        let link = GpioLink {
            host: "localhost".into(),
            port: 0,
            heartbeat_timeout: Duration::from_secs(60),
            watchdog_interval: Duration::from_secs(15),
            pins: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(false),
            events_tx: tx,
            last_message_at: SyncMutex::new(Instant::now()),
            conn_cancel: SyncMutex::new(CancellationToken::new()),
            shutdown: CancellationToken::new(),
        };

        link.handle_line(r#"{"pin": 5, "value": 1}"#);
        assert_eq!(link.pin_state(5), Some(1));
        assert!(rx.try_recv().is_err());

        link.handle_line(r#"{"pin": 5, "value": 0}"#);
        assert_eq!(link.pin_state(5), Some(0));
        let event = rx.try_recv().expect("edge should publish");
        assert_eq!(event.pin, 5);
        assert_eq!(event.previous, 1);
        assert_eq!(event.value, 0);
    }

    #[test]
    fn snapshot_seeds_every_pin_without_emitting() {
        let (tx, mut rx) = broadcast::channel(16);
        let link = GpioLink {
            host: "localhost".into(),
            port: 0,
            heartbeat_timeout: Duration::from_secs(60),
            watchdog_interval: Duration::from_secs(15),
            pins: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(false),
            events_tx: tx,
            last_message_at: SyncMutex::new(Instant::now()),
            conn_cancel: SyncMutex::new(CancellationToken::new()),
            shutdown: CancellationToken::new(),
        };

        link.handle_line(r#"[{"pin": 1, "value": 1}, {"pin": 2, "value": 0}]"#);
        assert_eq!(link.pin_state(1), Some(1));
        assert_eq!(link.pin_state(2), Some(0));
        assert!(rx.try_recv().is_err());
    }
}
