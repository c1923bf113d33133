//! # hfg-md
//!
//! Market data: venue adapters, venue connections, and the order-book
//! engine.
//!
//! Each venue implements [`VenueAdapter`] — the full wire contract for one
//! exchange (endpoint, subscribe/unsubscribe shapes, ping/pong quirks, ack
//! detection, order-book parsing). A [`connection::VenueConnection`] binds
//! one adapter to one WebSocket session, tracks the active subscription set,
//! and dispatches inbound messages.

pub mod books;
pub mod bybit;
pub mod connection;
pub mod json_util;
pub mod okx;

use hfg_core::types::{ParsedOrderBook, Venue};

/// The wire contract of one trading venue.
///
/// Implementations are stateless; the orchestrator wires one adapter per
/// venue statically.
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> Venue;

    /// Public market-data WebSocket endpoint.
    fn endpoint_url(&self) -> &str;

    /// Subscribe message for one `(instrument, channel)` pair.
    fn subscribe_msg(&self, instrument: &str, channel: &str) -> String;

    /// Unsubscribe message for one `(instrument, channel)` pair.
    fn unsubscribe_msg(&self, instrument: &str, channel: &str) -> String;

    /// Reply to a server ping. `ping_payload` is the raw ping message for
    /// venues that echo payloads.
    fn pong_msg(&self, ping_payload: &str) -> String;

    /// Client-initiated keep-alive ping.
    fn client_ping_msg(&self) -> String;

    /// True when `raw` is a server-sent ping.
    fn is_ping(&self, raw: &str) -> bool;

    /// True when `raw` acknowledges a subscribe/unsubscribe request.
    fn is_subscription_ack(&self, raw: &str) -> bool;

    /// True when an ack reports failure. Only meaningful for messages where
    /// [`is_subscription_ack`] returned true.
    ///
    /// [`is_subscription_ack`]: VenueAdapter::is_subscription_ack
    fn is_error_ack(&self, raw: &str) -> bool;

    /// Parse an order-book message. `None` means "not an order book" —
    /// parse failures are non-fatal.
    fn parse_order_book(&self, raw: &str) -> Option<ParsedOrderBook>;
}
