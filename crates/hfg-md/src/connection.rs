//! One venue connection: adapter + session + active subscriptions.
//!
//! The connection owns its adapter and session exclusively. Subscriptions
//! are recorded before they are sent, so the active set is the authoritative
//! replay source; the session's reconnect callback is bound at construction
//! and replays every record after each completed handshake — which is also
//! how subscriptions registered before the first connect reach the wire.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use hfg_core::{
    log_price, log_system,
    types::{ParsedOrderBook, Venue},
    udp::UdpPublisher,
    ws::{SessionState, WsSender, WsSession},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::VenueAdapter;

/// Lifecycle of one subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Pending,
    Confirmed,
    Failed,
}

/// One `(instrument, channel)` subscription and its state.
#[derive(Debug, Clone)]
pub struct SubscriptionRecord {
    pub instrument: String,
    pub channel: String,
    pub state: SubscriptionState,
}

type SubscriptionSet = Arc<Mutex<Vec<SubscriptionRecord>>>;

/// A venue connection: one session, one adapter, the active subscription
/// set, and an optional shared UDP publisher.
pub struct VenueConnection {
    venue: Venue,
    adapter: Arc<dyn VenueAdapter>,
    session: WsSession,
    subs: SubscriptionSet,
    udp: Option<Arc<UdpPublisher>>,
    debug_log: bool,
}

impl VenueConnection {
    pub fn new(
        adapter: Arc<dyn VenueAdapter>,
        retry: hfg_core::config::RetryConfig,
        udp: Option<Arc<UdpPublisher>>,
    ) -> Self {
        let venue = adapter.venue();
        let session = WsSession::new(venue.to_string(), retry);
        let subs: SubscriptionSet = Arc::new(Mutex::new(Vec::new()));

        let cb_adapter = adapter.clone();
        let cb_subs = subs.clone();
        let cb_sender = session.sender();
        session.set_on_reconnect(Arc::new(move || {
            replay_subscriptions(venue, &cb_adapter, &cb_subs, &cb_sender);
        }));

        Self { venue, adapter, session, subs, udp, debug_log: false }
    }

    pub fn set_debug_log(&mut self, enabled: bool) {
        self.debug_log = enabled;
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Start connecting to the adapter's endpoint. Non-blocking; the session
    /// retries with backoff on failure.
    pub fn connect(&mut self) -> Result<()> {
        let url = Url::parse(self.adapter.endpoint_url())
            .with_context(|| format!("bad endpoint for {}", self.venue))?;
        let host = url
            .host_str()
            .with_context(|| format!("endpoint for {} has no host", self.venue))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(443);
        info!("[{}] connecting to {host}:{port}{}", self.venue, url.path());
        log_system!("{} connecting to {host}:{port}{}", self.venue, url.path());
        self.session.connect(&host, port, url.path());
        Ok(())
    }

    /// Connect to a plaintext endpoint. Local-test wiring.
    pub fn connect_plain(&mut self, host: &str, port: u16, path: &str) {
        self.session.connect_plain(host, port, path);
    }

    /// Register `(instrument, channel)` pairs and subscribe.
    ///
    /// Records are appended first so a reconnect (or the initial connect)
    /// replays them; if the session is already connected, the subscribe
    /// messages also go out immediately.
    pub fn subscribe(&self, instruments: &[String], channel: &str) {
        {
            let mut subs = self.subs.lock().unwrap();
            for instrument in instruments {
                let exists = subs
                    .iter()
                    .any(|r| r.instrument == *instrument && r.channel == channel);
                if !exists {
                    subs.push(SubscriptionRecord {
                        instrument: instrument.clone(),
                        channel: channel.to_string(),
                        state: SubscriptionState::Pending,
                    });
                }
            }
        }
        info!(
            "[{}] registered {} subscription(s) on channel {channel}",
            self.venue,
            instruments.len()
        );

        if self.session.is_connected() {
            for instrument in instruments {
                self.session.send(self.adapter.subscribe_msg(instrument, channel));
            }
        } else {
            debug!("[{}] not connected yet, will subscribe on connect", self.venue);
        }
    }

    /// Unsubscribe and forget the record.
    pub fn unsubscribe(&self, instrument: &str, channel: &str) {
        self.subs
            .lock()
            .unwrap()
            .retain(|r| !(r.instrument == instrument && r.channel == channel));
        if self.session.is_connected() {
            self.session.send(self.adapter.unsubscribe_msg(instrument, channel));
        }
    }

    /// Re-send every active subscription.
    pub fn resubscribe(&self) {
        replay_subscriptions(self.venue, &self.adapter, &self.subs, &self.session.sender());
    }

    /// Drain the inbound queue, dispatching each message: ping → pong, ack →
    /// log + state update, order book → UDP publish + `on_book`. Returns the
    /// number of messages processed.
    pub fn poll<F>(&self, mut on_book: F) -> usize
    where
        F: FnMut(&ParsedOrderBook),
    {
        let mut processed = 0;
        while let Some(msg) = self.session.get_next_inbound() {
            processed += 1;
            if self.debug_log {
                debug!("[{}] inbound: {msg}", self.venue);
            }

            if self.adapter.is_ping(&msg) {
                self.session.send(self.adapter.pong_msg(&msg));
                continue;
            }

            if self.adapter.is_subscription_ack(&msg) {
                let failed = self.adapter.is_error_ack(&msg);
                log_system!("{} subscription ack: {msg}", self.venue);
                if failed {
                    warn!("[{}] subscription rejected: {msg}", self.venue);
                }
                // Venue acks do not identify the instrument, so resolution
                // is coarse: every pending record takes the ack's outcome.
                let state = if failed {
                    SubscriptionState::Failed
                } else {
                    SubscriptionState::Confirmed
                };
                for record in self.subs.lock().unwrap().iter_mut() {
                    if record.state == SubscriptionState::Pending {
                        record.state = state;
                    }
                }
                continue;
            }

            match self.adapter.parse_order_book(&msg) {
                Some(book) => {
                    log_price!(
                        "{} {} {} bids={} asks={} ts={}",
                        self.venue,
                        book.instrument,
                        if book.is_snapshot { "snapshot" } else { "delta" },
                        book.bids.len(),
                        book.asks.len(),
                        book.timestamp_ms
                    );
                    if let Some(udp) = &self.udp {
                        udp.publish(&book, self.venue);
                    }
                    on_book(&book);
                }
                None => {
                    debug!("[{}] ignoring unrecognized message: {msg}", self.venue);
                }
            }
        }
        processed
    }

    /// Send the venue-specific client ping. Cadence is caller-driven.
    pub fn send_heartbeat(&self) {
        if self.session.is_connected() {
            self.session.send(self.adapter.client_ping_msg());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Snapshot of the active subscription set.
    pub fn subscriptions(&self) -> Vec<SubscriptionRecord> {
        self.subs.lock().unwrap().clone()
    }

    /// Tear down the live stream as if the network failed. Test seam.
    pub fn simulate_network_failure(&self) {
        self.session.simulate_network_failure();
    }

    /// Close the session and stop its driver.
    pub async fn close(&mut self) {
        self.session.close().await;
        log_system!("{} connection closed", self.venue);
    }
}

fn replay_subscriptions(
    venue: Venue,
    adapter: &Arc<dyn VenueAdapter>,
    subs: &SubscriptionSet,
    sender: &WsSender,
) {
    let msgs: Vec<String> = {
        let mut subs = subs.lock().unwrap();
        subs.iter_mut()
            .map(|record| {
                record.state = SubscriptionState::Pending;
                adapter.subscribe_msg(&record.instrument, &record.channel)
            })
            .collect()
    };
    if msgs.is_empty() {
        return;
    }
    info!("[{venue}] restoring {} subscription(s)", msgs.len());
    log_system!("{venue} resubscribing {} instrument(s)", msgs.len());
    for msg in msgs {
        sender.send(msg);
    }
}
