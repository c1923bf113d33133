//! Per-(venue, instrument) order books.
//!
//! Bids and asks are `BTreeMap`s keyed by the scaled integer price, so each
//! side is price-ordered by construction and a price is a unique key per
//! side. Books accept whatever the venue delivers — transiently crossed
//! markets included — and forward it as-is.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, RwLock},
};

use ahash::AHashMap;
use hfg_core::types::{ParsedOrderBook, PriceLevel, Venue};

/// Top of book on both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestBidOffer {
    pub bid_price: u64,
    pub bid_size: f64,
    pub ask_price: u64,
    pub ask_size: f64,
}

#[derive(Default)]
struct Sides {
    bids: BTreeMap<u64, f64>,
    asks: BTreeMap<u64, f64>,
}

fn merge(side: &mut BTreeMap<u64, f64>, level: &PriceLevel) {
    if level.is_delete() {
        side.remove(&level.price_int);
    } else {
        side.insert(level.price_int, level.size);
    }
}

/// One instrument's book, safe for concurrent readers and a writer.
#[derive(Default)]
pub struct OrderBook {
    sides: RwLock<Sides>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole book: clear both sides, then apply every level.
    pub fn apply_snapshot(&self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        let mut sides = self.sides.write().unwrap();
        sides.bids.clear();
        sides.asks.clear();
        for level in bids {
            merge(&mut sides.bids, level);
        }
        for level in asks {
            merge(&mut sides.asks, level);
        }
    }

    /// Merge incremental updates: `size <= 0` erases the level, anything
    /// else inserts or overwrites it.
    pub fn apply_delta(&self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        let mut sides = self.sides.write().unwrap();
        for level in bids {
            merge(&mut sides.bids, level);
        }
        for level in asks {
            merge(&mut sides.asks, level);
        }
    }

    /// Best bid and offer, or `None` while either side is empty.
    pub fn bbo(&self) -> Option<BestBidOffer> {
        let sides = self.sides.read().unwrap();
        let (&bid_price, &bid_size) = sides.bids.last_key_value()?;
        let (&ask_price, &ask_size) = sides.asks.first_key_value()?;
        Some(BestBidOffer { bid_price, bid_size, ask_price, ask_size })
    }

    pub fn clear(&self) {
        let mut sides = self.sides.write().unwrap();
        sides.bids.clear();
        sides.asks.clear();
    }

    /// Level counts per side.
    pub fn depth(&self) -> (usize, usize) {
        let sides = self.sides.read().unwrap();
        (sides.bids.len(), sides.asks.len())
    }

    /// Bids best-first (descending price).
    pub fn bids_desc(&self) -> Vec<PriceLevel> {
        let sides = self.sides.read().unwrap();
        sides.bids.iter().rev().map(|(&p, &s)| PriceLevel::new(p, s)).collect()
    }

    /// Asks best-first (ascending price).
    pub fn asks_asc(&self) -> Vec<PriceLevel> {
        let sides = self.sides.read().unwrap();
        sides.asks.iter().map(|(&p, &s)| PriceLevel::new(p, s)).collect()
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// All books, keyed by `(venue, instrument)`. Books are created on first
/// touch; creation is safe under concurrent access, and per-book updates are
/// serialized by each book's own lock.
#[derive(Default)]
pub struct OrderBookManager {
    books: Mutex<AHashMap<(Venue, String), Arc<OrderBook>>>,
}

impl OrderBookManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The book for `(venue, instrument)`, created on first touch.
    pub fn book(&self, venue: Venue, instrument: &str) -> Arc<OrderBook> {
        let mut books = self.books.lock().unwrap();
        if let Some(book) = books.get(&(venue, instrument.to_string())) {
            return book.clone();
        }
        let book = Arc::new(OrderBook::new());
        books.insert((venue, instrument.to_string()), book.clone());
        book
    }

    /// Route a parsed message into the matching book.
    pub fn apply(&self, venue: Venue, parsed: &ParsedOrderBook) -> Arc<OrderBook> {
        let book = self.book(venue, &parsed.instrument);
        if parsed.is_snapshot {
            book.apply_snapshot(&parsed.bids, &parsed.asks);
        } else {
            book.apply_delta(&parsed.bids, &parsed.asks);
        }
        book
    }

    /// BBO lookup without creating a missing book.
    pub fn best_prices(&self, venue: Venue, instrument: &str) -> Option<BestBidOffer> {
        let book = {
            let books = self.books.lock().unwrap();
            books.get(&(venue, instrument.to_string()))?.clone()
        };
        book.bbo()
    }

    pub fn instrument_count(&self) -> usize {
        self.books.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price_int: u64, size: f64) -> PriceLevel {
        PriceLevel::new(price_int, size)
    }

    #[test]
    fn snapshot_replaces_everything() {
        let book = OrderBook::new();
        book.apply_snapshot(&[level(100, 1.0)], &[level(200, 1.0)]);
        book.apply_snapshot(&[level(110, 2.0)], &[level(190, 3.0)]);

        assert_eq!(book.bids_desc(), vec![level(110, 2.0)]);
        assert_eq!(book.asks_asc(), vec![level(190, 3.0)]);
    }

    #[test]
    fn reference_snapshot_and_bbo() {
        let book = OrderBook::new();
        book.apply_snapshot(
            &[level(6_000_050_000_000, 1.5), level(6_000_000_000_000, 2.0)],
            &[level(6_000_100_000_000, 0.5), level(6_000_150_000_000, 1.0)],
        );

        assert_eq!(
            book.bids_desc(),
            vec![level(6_000_050_000_000, 1.5), level(6_000_000_000_000, 2.0)]
        );
        assert_eq!(
            book.asks_asc(),
            vec![level(6_000_100_000_000, 0.5), level(6_000_150_000_000, 1.0)]
        );
        assert_eq!(
            book.bbo(),
            Some(BestBidOffer {
                bid_price: 6_000_050_000_000,
                bid_size: 1.5,
                ask_price: 6_000_100_000_000,
                ask_size: 0.5,
            })
        );
    }

    #[test]
    fn delta_deletes_level() {
        let book = OrderBook::new();
        book.apply_snapshot(
            &[level(6_000_050_000_000, 1.5), level(6_000_000_000_000, 2.0)],
            &[level(6_000_100_000_000, 0.5)],
        );
        book.apply_delta(&[level(6_000_000_000_000, 0.0)], &[]);

        assert_eq!(book.bids_desc(), vec![level(6_000_050_000_000, 1.5)]);
    }

    #[test]
    fn delta_overwrites_and_inserts() {
        let book = OrderBook::new();
        book.apply_snapshot(&[level(100, 1.0)], &[level(200, 1.0)]);
        book.apply_delta(&[level(100, 5.0), level(150, 2.0)], &[]);

        assert_eq!(book.bids_desc(), vec![level(150, 2.0), level(100, 5.0)]);
    }

    #[test]
    fn deleting_missing_level_is_a_noop() {
        let book = OrderBook::new();
        book.apply_snapshot(&[level(100, 1.0)], &[]);
        book.apply_delta(&[level(999, 0.0)], &[]);
        assert_eq!(book.depth(), (1, 0));
    }

    #[test]
    fn bbo_requires_both_sides() {
        let book = OrderBook::new();
        assert!(book.bbo().is_none());
        book.apply_delta(&[level(100, 1.0)], &[]);
        assert!(book.bbo().is_none());
        book.apply_delta(&[], &[level(200, 1.0)]);
        assert!(book.bbo().is_some());
    }

    #[test]
    fn crossed_books_are_accepted() {
        let book = OrderBook::new();
        book.apply_snapshot(&[level(210, 1.0)], &[level(200, 1.0)]);
        let bbo = book.bbo().unwrap();
        assert!(bbo.bid_price > bbo.ask_price);
    }

    #[test]
    fn snapshot_with_zero_size_levels_drops_them() {
        let book = OrderBook::new();
        book.apply_snapshot(&[level(100, 1.0), level(90, 0.0)], &[]);
        assert_eq!(book.depth(), (1, 0));
    }

    #[test]
    fn manager_creates_on_first_touch_and_keys_by_venue() {
        let mgr = OrderBookManager::new();
        let parsed = ParsedOrderBook {
            instrument: "BTC-USDT".into(),
            bids: vec![level(100, 1.0)],
            asks: vec![level(200, 1.0)],
            is_snapshot: true,
            timestamp_ms: 0,
        };
        mgr.apply(Venue::Okx, &parsed);
        mgr.apply(Venue::Bybit, &parsed);

        assert_eq!(mgr.instrument_count(), 2);
        assert!(mgr.best_prices(Venue::Okx, "BTC-USDT").is_some());
        assert!(mgr.best_prices(Venue::Okx, "ETH-USDT").is_none());

        // Same (venue, instrument) resolves to the same book.
        assert!(Arc::ptr_eq(
            &mgr.book(Venue::Okx, "BTC-USDT"),
            &mgr.book(Venue::Okx, "BTC-USDT")
        ));
    }

    #[test]
    fn concurrent_first_touch_is_safe() {
        let mgr = Arc::new(OrderBookManager::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let mgr = mgr.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let book = mgr.book(Venue::Okx, &format!("INST-{}", i % 10));
                        book.apply_delta(&[PriceLevel::new(100 + i, 1.0)], &[]);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(mgr.instrument_count(), 10);
    }
}
