//! Resilient TLS WebSocket session.
//!
//! Each [`WsSession`] owns exactly one connection to a venue endpoint, driven
//! by a background tokio task that performs all socket I/O:
//!
//! 1. Resolve, TCP-connect, TLS-handshake (SNI from the host), WS-handshake.
//! 2. Fire the reconnect callback — strictly before any inbound delivery.
//! 3. Read messages into a bounded inbound queue the application polls.
//! 4. Serialize outbound writes posted from other tasks.
//! 5. On any failure, reconnect with exponential backoff until the attempt
//!    budget is exhausted, then stay disconnected until `connect` is called
//!    again.
//!
//! Public methods never surface I/O errors; they drive the retry state
//! machine instead.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU8, AtomicU64, Ordering},
};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::RetryConfig;

/// Inbound queue capacity. Messages beyond this are dropped and counted.
const INBOUND_QUEUE_CAP: usize = 10_000;

/// Log one warning per this many dropped inbound messages.
const DROP_LOG_EVERY: u64 = 1_000;

/// Callback invoked after every completed WebSocket handshake, before any
/// inbound message from that connection is delivered to the consumer.
pub type ReconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    WaitingRetry = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::WaitingRetry,
            _ => Self::Disconnected,
        }
    }
}

/// Work posted to the driver task.
enum DriverCmd {
    /// Write a text frame.
    Send(String),
    /// Tear down the active stream as if the peer reset the TCP socket.
    /// The driver takes the identical retry path as a real read error.
    Kill,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Shared {
    label: String,
    state: AtomicU8,
    retry: RetryConfig,
    inbound_tx: crossbeam_channel::Sender<String>,
    inbound_rx: crossbeam_channel::Receiver<String>,
    inbound_dropped: AtomicU64,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<DriverCmd>>>,
    on_reconnect: Mutex<Option<ReconnectCallback>>,
}

impl Shared {
    fn set_state(&self, s: SessionState) {
        self.state.store(s as u8, Ordering::Release);
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn push_inbound(&self, msg: String) {
        match self.inbound_tx.try_send(msg) {
            Ok(()) => {}
            Err(crossbeam_channel::TrySendError::Full(_)) => {
                let dropped = self.inbound_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % DROP_LOG_EVERY == 0 {
                    warn!("[{}] inbound queue full, dropped {dropped} messages", self.label);
                }
            }
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// WsSession
// ---------------------------------------------------------------------------

/// A WebSocket session with auto-reconnect, managed by a background driver
/// task. Safe to share behind `Arc`; all methods take `&self` except
/// `connect`/`close`, which replace or stop the driver.
pub struct WsSession {
    shared: Arc<Shared>,
    shutdown_tx: Option<watch::Sender<bool>>,
    driver: Option<tokio::task::JoinHandle<()>>,
}

impl WsSession {
    /// Create a session. No connection is attempted until [`connect`].
    ///
    /// [`connect`]: WsSession::connect
    pub fn new(label: impl Into<String>, retry: RetryConfig) -> Self {
        let (inbound_tx, inbound_rx) = crossbeam_channel::bounded(INBOUND_QUEUE_CAP);
        Self {
            shared: Arc::new(Shared {
                label: label.into(),
                state: AtomicU8::new(SessionState::Disconnected as u8),
                retry,
                inbound_tx,
                inbound_rx,
                inbound_dropped: AtomicU64::new(0),
                cmd_tx: Mutex::new(None),
                on_reconnect: Mutex::new(None),
            }),
            shutdown_tx: None,
            driver: None,
        }
    }

    /// Register the callback fired after every completed handshake (initial
    /// connect included), before any inbound message from that connection is
    /// delivered.
    pub fn set_on_reconnect(&self, cb: ReconnectCallback) {
        *self.shared.on_reconnect.lock().unwrap() = Some(cb);
    }

    /// Start connecting to `wss://{host}:{port}{path}`.
    ///
    /// Non-blocking: spawns the driver task and returns immediately. Calling
    /// again after the session gave up (attempt budget exhausted) starts a
    /// fresh retry cycle.
    pub fn connect(&mut self, host: &str, port: u16, path: &str) {
        self.spawn_driver(format!("wss://{host}:{port}{path}"));
    }

    /// Plaintext variant (`ws://`) for local test servers.
    pub fn connect_plain(&mut self, host: &str, port: u16, path: &str) {
        self.spawn_driver(format!("ws://{host}:{port}{path}"));
    }

    fn spawn_driver(&mut self, url: String) {
        // Stop a previous driver, if any; its state writes race no one since
        // the new driver overwrites state immediately.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        *self.shared.cmd_tx.lock().unwrap() = Some(cmd_tx);
        self.shared.set_state(SessionState::Connecting);

        let shared = self.shared.clone();
        self.driver = Some(tokio::spawn(async move {
            driver_loop(shared, url, cmd_rx, shutdown_rx).await;
        }));
        self.shutdown_tx = Some(shutdown_tx);
    }

    /// Post a text frame to the driver. Errors are not surfaced; a write
    /// failure triggers the reconnect path inside the driver.
    pub fn send(&self, text: impl Into<String>) {
        if let Some(tx) = self.shared.cmd_tx.lock().unwrap().as_ref() {
            let _ = tx.send(DriverCmd::Send(text.into()));
        }
    }

    /// A detached send handle, usable from the reconnect callback. Holds the
    /// session weakly so the callback stored inside the session cannot keep
    /// it alive.
    pub fn sender(&self) -> WsSender {
        WsSender { shared: Arc::downgrade(&self.shared) }
    }

    /// Pop the next inbound message, if any. Never blocks.
    pub fn get_next_inbound(&self) -> Option<String> {
        self.shared.inbound_rx.try_recv().ok()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state() == SessionState::Connected
    }

    /// Number of inbound messages dropped to the queue cap.
    pub fn inbound_dropped(&self) -> u64 {
        self.shared.inbound_dropped.load(Ordering::Relaxed)
    }

    /// Tear down the live stream as if the network failed. The driver
    /// observes the loss and enters the retry path identically to a real
    /// failure. Test seam.
    pub fn simulate_network_failure(&self) {
        if let Some(tx) = self.shared.cmd_tx.lock().unwrap().as_ref() {
            let _ = tx.send(DriverCmd::Kill);
        }
    }

    /// Stop the driver task and wait for it to finish. Subsequent calls are
    /// no-ops.
    pub async fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
        *self.shared.cmd_tx.lock().unwrap() = None;
        self.shared.set_state(SessionState::Disconnected);
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }
}

/// Weak send handle produced by [`WsSession::sender`]. Posts to whichever
/// driver is current; a no-op once the session is gone.
#[derive(Clone)]
pub struct WsSender {
    shared: std::sync::Weak<Shared>,
}

impl WsSender {
    pub fn send(&self, text: impl Into<String>) {
        if let Some(shared) = self.shared.upgrade()
            && let Some(tx) = shared.cmd_tx.lock().unwrap().as_ref()
        {
            let _ = tx.send(DriverCmd::Send(text.into()));
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

async fn driver_loop(
    shared: Arc<Shared>,
    url: String,
    mut cmd_rx: mpsc::UnboundedReceiver<DriverCmd>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let label = shared.label.clone();
    let mut attempt: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            shared.set_state(SessionState::Disconnected);
            return;
        }

        shared.set_state(SessionState::Connecting);
        debug!("[{label}] connecting to {url} (attempt {attempt})");

        // SNI is taken from the URL host by the TLS connector.
        let connected = tokio::select! {
            r = tokio_tungstenite::connect_async(url.as_str()) => r,
            _ = shutdown_rx.changed() => {
                shared.set_state(SessionState::Disconnected);
                return;
            }
        };

        match connected {
            Ok((stream, _response)) => {
                attempt = 0;
                shared.set_state(SessionState::Connected);
                info!("[{label}] connected");

                // Handshake done: restore subscriptions before any inbound
                // message becomes visible to the consumer.
                let cb = shared.on_reconnect.lock().unwrap().clone();
                if let Some(cb) = cb {
                    cb();
                }

                let (mut write, mut read) = stream.split();
                let shutdown = loop {
                    tokio::select! {
                        // Drain pending outbound work (resubscribes in
                        // particular) before reading the socket.
                        biased;

                        _ = shutdown_rx.changed() => {
                            let _ = write.close().await;
                            break true;
                        }

                        cmd = cmd_rx.recv() => match cmd {
                            Some(DriverCmd::Send(text)) => {
                                if let Err(e) = write.send(Message::Text(text.into())).await {
                                    error!("[{label}] send error: {e}");
                                    break false;
                                }
                            }
                            Some(DriverCmd::Kill) => {
                                warn!("[{label}] simulated network failure, dropping stream");
                                break false;
                            }
                            // Session dropped; nothing left to drive.
                            None => break true,
                        },

                        msg = read.next() => match msg {
                            Some(Ok(Message::Text(text))) => shared.push_inbound(text.to_string()),
                            Some(Ok(Message::Binary(data))) => {
                                if let Ok(text) = String::from_utf8(data.to_vec()) {
                                    shared.push_inbound(text);
                                }
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                if write.send(Message::Pong(payload)).await.is_err() {
                                    break false;
                                }
                            }
                            Some(Ok(Message::Close(_))) => {
                                warn!("[{label}] received close frame");
                                break false;
                            }
                            Some(Err(e)) => {
                                warn!("[{label}] read error: {e}");
                                break false;
                            }
                            None => {
                                warn!("[{label}] stream ended");
                                break false;
                            }
                            _ => {} // Pong, Frame
                        },
                    }
                };

                if shutdown {
                    shared.set_state(SessionState::Disconnected);
                    return;
                }
            }
            Err(e) => {
                error!("[{label}] connect failed: {e}");
            }
        }

        // Retry path — shared by failed attempts and lost connections.
        if !shared.retry.enabled {
            shared.set_state(SessionState::Disconnected);
            return;
        }
        attempt += 1;
        if attempt > shared.retry.max_attempts {
            error!("[{label}] max retry attempts ({}) reached, giving up", shared.retry.max_attempts);
            shared.set_state(SessionState::Disconnected);
            return;
        }
        let delay = shared.retry.delay_for_attempt(attempt);
        shared.set_state(SessionState::WaitingRetry);
        info!("[{label}] reconnect attempt {attempt} in {delay:?}");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => {
                shared.set_state(SessionState::Disconnected);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_attempts,
            initial_delay_ms: 10,
            max_delay_ms: 40,
            backoff_multiplier: 2.0,
        }
    }

    async fn wait_for_state(session: &WsSession, want: SessionState, timeout_ms: u64) -> bool {
        for _ in 0..timeout_ms / 5 {
            if session.state() == want {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        session.state() == want
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let mut session = WsSession::new("test", fast_retry(3));
        // Port 1 on loopback refuses immediately, so each attempt fails fast.
        session.connect_plain("127.0.0.1", 1, "/");
        assert!(wait_for_state(&session, SessionState::Disconnected, 2_000).await);
        session.close().await;
    }

    #[tokio::test]
    async fn retries_disabled_goes_straight_to_disconnected() {
        let retry = RetryConfig { enabled: false, ..fast_retry(10) };
        let mut session = WsSession::new("test", retry);
        session.connect_plain("127.0.0.1", 1, "/");
        assert!(wait_for_state(&session, SessionState::Disconnected, 2_000).await);
        session.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut session = WsSession::new("test", fast_retry(3));
        session.connect_plain("127.0.0.1", 1, "/");
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn inbound_overflow_drops_newest_and_counts() {
        let (inbound_tx, inbound_rx) = crossbeam_channel::bounded(4);
        let shared = Shared {
            label: "test".into(),
            state: AtomicU8::new(0),
            retry: RetryConfig::default(),
            inbound_tx,
            inbound_rx,
            inbound_dropped: AtomicU64::new(0),
            cmd_tx: Mutex::new(None),
            on_reconnect: Mutex::new(None),
        };

        for i in 0..10 {
            shared.push_inbound(format!("msg {i}"));
        }
        assert_eq!(shared.inbound_dropped.load(Ordering::Relaxed), 6);
        // The queued messages are the oldest four.
        assert_eq!(shared.inbound_rx.try_recv().unwrap(), "msg 0");
        assert_eq!(shared.inbound_rx.len(), 3);
    }

    #[test]
    fn send_without_driver_is_a_noop() {
        let session = WsSession::new("test", RetryConfig::default());
        session.send("ping");
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
