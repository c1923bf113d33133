//! Bybit wire contract.
//!
//! Quirks relative to OKX:
//!
//! - Subscriptions concatenate channel and instrument with a dot
//!   (`"orderbook.50.BTCUSDT"`).
//! - Pings and pongs are JSON ops. A server ping is `op == "ping"` with no
//!   `success` field; the `success` variant is the server confirming one of
//!   our own pings.
//! - Order-book topics are `orderbook.<depth>.<instrument>`; the instrument
//!   is whatever follows the final dot. `type == "snapshot"` marks a full
//!   book, everything else is a delta.
//! - The timestamp is integer milliseconds at `data.ts`.

use hfg_core::types::{ParsedOrderBook, Venue};

use crate::VenueAdapter;
use crate::json_util::{parse_levels, parse_str_u64};

/// USDT-margined futures endpoint. The spot variant swaps `linear` for
/// `spot`; the orchestrator picks per instrument class.
const BYBIT_LINEAR_WS_URL: &str = "wss://stream.bybit.com/v5/public/linear";

/// Bybit adapter (linear futures).
#[derive(Debug, Default)]
pub struct BybitAdapter;

impl VenueAdapter for BybitAdapter {
    fn venue(&self) -> Venue {
        Venue::Bybit
    }

    fn endpoint_url(&self) -> &str {
        BYBIT_LINEAR_WS_URL
    }

    fn subscribe_msg(&self, instrument: &str, channel: &str) -> String {
        format!(r#"{{"op":"subscribe","args":["{channel}.{instrument}"]}}"#)
    }

    fn unsubscribe_msg(&self, instrument: &str, channel: &str) -> String {
        format!(r#"{{"op":"unsubscribe","args":["{channel}.{instrument}"]}}"#)
    }

    fn pong_msg(&self, _ping_payload: &str) -> String {
        r#"{"op":"pong"}"#.into()
    }

    fn client_ping_msg(&self) -> String {
        r#"{"op":"ping"}"#.into()
    }

    fn is_ping(&self, raw: &str) -> bool {
        let Ok(v) = serde_json::from_str::<serde_json::Value>(raw) else {
            return false;
        };
        // A `success` field marks the server confirming our outbound ping,
        // not pinging us.
        v.get("op").and_then(|o| o.as_str()) == Some("ping") && v.get("success").is_none()
    }

    fn is_subscription_ack(&self, raw: &str) -> bool {
        let Ok(v) = serde_json::from_str::<serde_json::Value>(raw) else {
            return false;
        };
        let has_success = v.get("success").and_then(|s| s.as_bool()).is_some();
        let op_matches = matches!(
            v.get("op").and_then(|o| o.as_str()),
            Some("subscribe") | Some("unsubscribe")
        );
        has_success && op_matches
    }

    fn is_error_ack(&self, raw: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .and_then(|v| v.get("success").and_then(|s| s.as_bool()))
            .is_some_and(|success| !success)
    }

    fn parse_order_book(&self, raw: &str) -> Option<ParsedOrderBook> {
        let v: serde_json::Value = serde_json::from_str(raw).ok()?;

        let topic = v.get("topic")?.as_str()?;
        if !topic.starts_with("orderbook") {
            return None;
        }
        // "orderbook.50.BTCUSDT" -> "BTCUSDT"
        let instrument = topic.rsplit('.').next()?;
        if instrument.is_empty() || instrument == topic {
            return None;
        }

        let is_snapshot = v.get("type").and_then(|t| t.as_str()) == Some("snapshot");

        let data = v.get("data")?;
        let bids = parse_levels(data.get("b"));
        let asks = parse_levels(data.get("a"));
        let timestamp_ms = parse_str_u64(data.get("ts")).unwrap_or(0);

        Some(ParsedOrderBook {
            instrument: instrument.to_string(),
            bids,
            asks,
            is_snapshot,
            timestamp_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use hfg_core::types::PriceLevel;

    use super::*;

    fn adapter() -> BybitAdapter {
        BybitAdapter
    }

    #[test]
    fn subscribe_concatenates_with_dot() {
        assert_eq!(
            adapter().subscribe_msg("BTCUSDT", "orderbook.50"),
            r#"{"op":"subscribe","args":["orderbook.50.BTCUSDT"]}"#
        );
    }

    #[test]
    fn server_ping_vs_confirmed_ping() {
        let a = adapter();
        assert!(a.is_ping(r#"{"op":"ping"}"#));
        // Server confirming our outbound ping is not a server ping.
        assert!(!a.is_ping(r#"{"success":true,"op":"ping","ret_msg":"pong"}"#));
        assert!(!a.is_ping("ping"));
        assert_eq!(a.pong_msg(r#"{"op":"ping"}"#), r#"{"op":"pong"}"#);
    }

    #[test]
    fn ack_detection() {
        let a = adapter();
        assert!(a.is_subscription_ack(r#"{"success":true,"op":"subscribe","conn_id":"x"}"#));
        assert!(a.is_subscription_ack(r#"{"success":false,"op":"unsubscribe"}"#));
        assert!(a.is_error_ack(r#"{"success":false,"op":"subscribe"}"#));
        assert!(!a.is_error_ack(r#"{"success":true,"op":"subscribe"}"#));
        // op without success is not an ack (could be a server ping).
        assert!(!a.is_subscription_ack(r#"{"op":"subscribe"}"#));
    }

    #[test]
    fn snapshot_parse() {
        let raw = r#"{
            "topic": "orderbook.50.BTCUSDT",
            "type": "snapshot",
            "ts": 1702500000005,
            "data": {
                "s": "BTCUSDT",
                "b": [["60000.5","1.5"],["60000.0","2.0"]],
                "a": [["60001.0","0.5"]],
                "u": 123,
                "ts": 1702500000000
            }
        }"#;
        let book = adapter().parse_order_book(raw).unwrap();
        assert_eq!(book.instrument, "BTCUSDT");
        assert!(book.is_snapshot);
        assert_eq!(book.timestamp_ms, 1_702_500_000_000);
        assert_eq!(
            book.bids,
            vec![
                PriceLevel::new(6_000_050_000_000, 1.5),
                PriceLevel::new(6_000_000_000_000, 2.0)
            ]
        );
        assert_eq!(book.asks, vec![PriceLevel::new(6_000_100_000_000, 0.5)]);
    }

    #[test]
    fn delta_parse() {
        let raw = r#"{
            "topic": "orderbook.50.ETHUSDT",
            "type": "delta",
            "data": {"b": [["3000.0","0"]], "a": [["3000.5","4.0"]], "ts": 1702500000001}
        }"#;
        let book = adapter().parse_order_book(raw).unwrap();
        assert!(!book.is_snapshot);
        assert!(book.bids[0].is_delete());
        assert_eq!(book.asks[0].size, 4.0);
    }

    #[test]
    fn instrument_comes_after_final_dot() {
        let raw = r#"{"topic": "orderbook.1.SOLUSDT", "type": "delta", "data": {"b": [], "a": [], "ts": 1}}"#;
        assert_eq!(adapter().parse_order_book(raw).unwrap().instrument, "SOLUSDT");
    }

    #[test]
    fn non_book_messages_rejected() {
        let a = adapter();
        assert!(a.parse_order_book(r#"{"topic":"publicTrade.BTCUSDT","data":[]}"#).is_none());
        assert!(a.parse_order_book(r#"{"success":true,"op":"subscribe"}"#).is_none());
        assert!(a.parse_order_book("not json").is_none());
    }
}
