//! OKX wire contract.
//!
//! Quirks relative to the other venues:
//!
//! - Server pings and client pongs are the bare text literals `ping`/`pong`,
//!   not JSON.
//! - Order-book channels are `books-l2-tbt`, `books5`, and `books`, routed by
//!   `arg.channel`. The snapshot/delta flag is the top-level `action`; when
//!   absent, `books5` is a snapshot (it always carries the full top 5) and
//!   the tick-by-tick channels are deltas.
//! - Timestamps arrive as string milliseconds at `data[0].ts`.

use hfg_core::types::{ParsedOrderBook, Venue};

use crate::VenueAdapter;
use crate::json_util::{parse_levels, parse_str_u64};

const OKX_WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";

const BOOK_CHANNELS: [&str; 3] = ["books-l2-tbt", "books5", "books"];

/// OKX adapter.
#[derive(Debug, Default)]
pub struct OkxAdapter;

impl VenueAdapter for OkxAdapter {
    fn venue(&self) -> Venue {
        Venue::Okx
    }

    fn endpoint_url(&self) -> &str {
        OKX_WS_URL
    }

    fn subscribe_msg(&self, instrument: &str, channel: &str) -> String {
        format!(r#"{{"op":"subscribe","args":[{{"channel":"{channel}","instId":"{instrument}"}}]}}"#)
    }

    fn unsubscribe_msg(&self, instrument: &str, channel: &str) -> String {
        format!(r#"{{"op":"unsubscribe","args":[{{"channel":"{channel}","instId":"{instrument}"}}]}}"#)
    }

    fn pong_msg(&self, _ping_payload: &str) -> String {
        "pong".into()
    }

    fn client_ping_msg(&self) -> String {
        "ping".into()
    }

    fn is_ping(&self, raw: &str) -> bool {
        raw == "ping"
    }

    fn is_subscription_ack(&self, raw: &str) -> bool {
        let Ok(v) = serde_json::from_str::<serde_json::Value>(raw) else {
            return false;
        };
        if let Some(event) = v.get("event").and_then(|e| e.as_str()) {
            return matches!(event, "subscribe" | "unsubscribe" | "error");
        }
        v.get("op").and_then(|o| o.as_str()) == Some("subscribe")
    }

    fn is_error_ack(&self, raw: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .and_then(|v| v.get("event").and_then(|e| e.as_str()).map(|e| e == "error"))
            .unwrap_or(false)
    }

    fn parse_order_book(&self, raw: &str) -> Option<ParsedOrderBook> {
        let v: serde_json::Value = serde_json::from_str(raw).ok()?;

        let arg = v.get("arg")?;
        let channel = arg.get("channel")?.as_str()?;
        if !BOOK_CHANNELS.contains(&channel) {
            return None;
        }
        let instrument = arg.get("instId")?.as_str()?;

        let is_snapshot = match v.get("action").and_then(|a| a.as_str()) {
            Some(action) => action == "snapshot",
            // books5 carries the full top 5 every tick.
            None => channel == "books5",
        };

        let data = v.get("data")?.as_array()?.first()?;
        let bids = parse_levels(data.get("bids"));
        let asks = parse_levels(data.get("asks"));
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

    fn adapter() -> OkxAdapter {
        OkxAdapter
    }

    #[test]
    fn subscribe_message_shape() {
        assert_eq!(
            adapter().subscribe_msg("BTC-USDT-SWAP", "books5"),
            r#"{"op":"subscribe","args":[{"channel":"books5","instId":"BTC-USDT-SWAP"}]}"#
        );
    }

    #[test]
    fn ping_is_the_bare_literal() {
        let a = adapter();
        assert!(a.is_ping("ping"));
        assert!(!a.is_ping(r#"{"op":"ping"}"#));
        assert_eq!(a.pong_msg("ping"), "pong");
    }

    #[test]
    fn ack_detection() {
        let a = adapter();
        assert!(a.is_subscription_ack(
            r#"{"event":"subscribe","arg":{"channel":"books5","instId":"BTC-USDT"}}"#
        ));
        assert!(a.is_subscription_ack(r#"{"event":"error","code":"60012","msg":"bad"}"#));
        assert!(a.is_error_ack(r#"{"event":"error","code":"60012","msg":"bad"}"#));
        assert!(!a.is_error_ack(r#"{"event":"subscribe"}"#));
        assert!(!a.is_subscription_ack(r#"{"arg":{"channel":"books5"},"data":[]}"#));
    }

    #[test]
    fn snapshot_parse() {
        let raw = r#"{
            "arg": {"channel": "books-l2-tbt", "instId": "BTC-USDT"},
            "action": "snapshot",
            "data": [{
                "bids": [["60000.5","1.5","0","1"],["60000.0","2.0","0","1"]],
                "asks": [["60001.0","0.5","0","1"],["60001.5","1.0","0","1"]],
                "ts": "1702500000000"
            }]
        }"#;
        let book = adapter().parse_order_book(raw).unwrap();
        assert_eq!(book.instrument, "BTC-USDT");
        assert!(book.is_snapshot);
        assert_eq!(book.timestamp_ms, 1_702_500_000_000);
        assert_eq!(
            book.bids,
            vec![
                PriceLevel::new(6_000_050_000_000, 1.5),
                PriceLevel::new(6_000_000_000_000, 2.0)
            ]
        );
        assert_eq!(
            book.asks,
            vec![
                PriceLevel::new(6_000_100_000_000, 0.5),
                PriceLevel::new(6_000_150_000_000, 1.0)
            ]
        );
    }

    #[test]
    fn update_action_is_delta() {
        let raw = r#"{
            "arg": {"channel": "books-l2-tbt", "instId": "BTC-USDT"},
            "action": "update",
            "data": [{"bids": [["60000.0","0"]], "asks": [], "ts": "1702500000001"}]
        }"#;
        let book = adapter().parse_order_book(raw).unwrap();
        assert!(!book.is_snapshot);
        assert!(book.bids[0].is_delete());
    }

    #[test]
    fn books5_defaults_to_snapshot_without_action() {
        let raw = r#"{
            "arg": {"channel": "books5", "instId": "ETH-USDT-SWAP"},
            "data": [{"bids": [["3000.0","1"]], "asks": [["3000.5","1"]], "ts": "1702500000000"}]
        }"#;
        assert!(adapter().parse_order_book(raw).unwrap().is_snapshot);

        let raw = raw.replace("books5", "books");
        assert!(!adapter().parse_order_book(&raw).unwrap().is_snapshot);
    }

    #[test]
    fn non_book_messages_rejected() {
        let a = adapter();
        assert!(a.parse_order_book("pong").is_none());
        assert!(a.parse_order_book(r#"{"arg":{"channel":"trades","instId":"X"},"data":[]}"#).is_none());
        assert!(a.parse_order_book(r#"{"event":"subscribe"}"#).is_none());
    }
}
