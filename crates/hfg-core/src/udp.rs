//! Binary UDP market-data feed.
//!
//! Parsed order books are fanned out to local consumers as single datagrams
//! with a fixed big-endian header followed by price levels:
//!
//! ```text
//! magic        u32 BE  0x48465444 ("HFTD")
//! version      u16 BE  1
//! msg_type     u8      1 = snapshot, 2 = delta
//! venue_id     u8
//! timestamp_ns u64 BE  monotonic clock at publish
//! symbol_len   u32 BE
//! bid_count    u16 BE
//! ask_count    u16 BE
//! symbol       symbol_len bytes, UTF-8, no terminator
//! bids         bid_count x { price_int u64 BE, quantity f64 bits BE }
//! asks         ask_count x { price_int u64 BE, quantity f64 bits BE }
//! ```
//!
//! The publisher is hot-path: one non-blocking `send_to` per book, a reused
//! thread-local scratch buffer, and no internal queueing. `EAGAIN` is dropped
//! silently (the consumer paces itself); other errors are counted.

use std::{
    cell::RefCell,
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    sync::atomic::{AtomicU64, Ordering},
};

use tracing::info;

use crate::{
    error::GatewayError,
    time_util,
    types::{ParsedOrderBook, PriceLevel, Venue},
};

/// Frame magic, "HFTD".
pub const FEED_MAGIC: u32 = 0x4846_5444;

/// Frame version.
pub const FEED_VERSION: u16 = 1;

/// Header length in bytes.
pub const HEADER_LEN: usize = 4 + 2 + 1 + 1 + 8 + 4 + 2 + 2;

/// Bytes per serialized price level.
pub const LEVEL_LEN: usize = 8 + 8;

const MSG_TYPE_SNAPSHOT: u8 = 1;
const MSG_TYPE_DELTA: u8 = 2;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn put_level(buf: &mut Vec<u8>, level: &PriceLevel) {
    buf.extend_from_slice(&level.price_int.to_be_bytes());
    buf.extend_from_slice(&level.size.to_bits().to_be_bytes());
}

/// Serialize one feed frame into `buf` (cleared first).
pub fn encode_frame(buf: &mut Vec<u8>, book: &ParsedOrderBook, venue: Venue, timestamp_ns: u64) {
    buf.clear();
    buf.reserve(HEADER_LEN + book.instrument.len() + (book.bids.len() + book.asks.len()) * LEVEL_LEN);

    buf.extend_from_slice(&FEED_MAGIC.to_be_bytes());
    buf.extend_from_slice(&FEED_VERSION.to_be_bytes());
    buf.push(if book.is_snapshot { MSG_TYPE_SNAPSHOT } else { MSG_TYPE_DELTA });
    buf.push(venue.wire_id());
    buf.extend_from_slice(&timestamp_ns.to_be_bytes());
    buf.extend_from_slice(&(book.instrument.len() as u32).to_be_bytes());
    buf.extend_from_slice(&(book.bids.len() as u16).to_be_bytes());
    buf.extend_from_slice(&(book.asks.len() as u16).to_be_bytes());
    buf.extend_from_slice(book.instrument.as_bytes());
    for level in &book.bids {
        put_level(buf, level);
    }
    for level in &book.asks {
        put_level(buf, level);
    }
}

// ---------------------------------------------------------------------------
// Decoding (consumer side)
// ---------------------------------------------------------------------------

/// A decoded feed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedFrame {
    pub venue: Venue,
    pub is_snapshot: bool,
    pub timestamp_ns: u64,
    pub symbol: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    fn take_slice(&mut self, n: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(bytes)
    }
}

/// Decode a feed frame. Returns `None` for truncated or foreign datagrams.
pub fn decode_frame(data: &[u8]) -> Option<FeedFrame> {
    let mut cur = Cursor { data, pos: 0 };

    if u32::from_be_bytes(cur.take()?) != FEED_MAGIC {
        return None;
    }
    if u16::from_be_bytes(cur.take()?) != FEED_VERSION {
        return None;
    }
    let msg_type = cur.take::<1>()?[0];
    let venue = Venue::from_wire_id(cur.take::<1>()?[0]);
    let timestamp_ns = u64::from_be_bytes(cur.take()?);
    let symbol_len = u32::from_be_bytes(cur.take()?) as usize;
    let bid_count = u16::from_be_bytes(cur.take()?) as usize;
    let ask_count = u16::from_be_bytes(cur.take()?) as usize;

    let symbol = String::from_utf8(cur.take_slice(symbol_len)?.to_vec()).ok()?;

    let mut read_levels = |count: usize| -> Option<Vec<PriceLevel>> {
        let mut levels = Vec::with_capacity(count);
        for _ in 0..count {
            let price_int = u64::from_be_bytes(cur.take()?);
            let size = f64::from_bits(u64::from_be_bytes(cur.take()?));
            levels.push(PriceLevel { price_int, size });
        }
        Some(levels)
    };
    let bids = read_levels(bid_count)?;
    let asks = read_levels(ask_count)?;

    Some(FeedFrame {
        venue,
        is_snapshot: msg_type == MSG_TYPE_SNAPSHOT,
        timestamp_ns,
        symbol,
        bids,
        asks,
    })
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

thread_local! {
    static SCRATCH: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

/// Non-blocking UDP publisher for the market-data feed.
///
/// Immutable after [`UdpPublisher::open`]; shared by read-only reference
/// across venue connections.
pub struct UdpPublisher {
    socket: UdpSocket,
    dest: SocketAddr,
    send_errors: AtomicU64,
}

impl UdpPublisher {
    /// Create the socket and record the destination.
    pub fn open(address: &str, port: u16) -> Result<Self, GatewayError> {
        let dest: SocketAddr = format!("{address}:{port}")
            .parse()
            .map_err(|e| GatewayError::Udp(format!("bad feed address {address}:{port}: {e}")))?;
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| GatewayError::Udp(format!("socket bind failed: {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| GatewayError::Udp(format!("set_nonblocking failed: {e}")))?;
        info!("UDP feed publisher broadcasting to {dest}");
        Ok(Self { socket, dest, send_errors: AtomicU64::new(0) })
    }

    /// Serialize `book` and send exactly one datagram.
    pub fn publish(&self, book: &ParsedOrderBook, venue: Venue) {
        SCRATCH.with_borrow_mut(|buf| {
            encode_frame(buf, book, venue, time_util::cycles());
            match self.socket.send_to(buf, self.dest) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(_) => {
                    self.send_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    }

    /// Count of send errors other than `EAGAIN`.
    pub fn send_errors(&self) -> u64 {
        self.send_errors.load(Ordering::Relaxed)
    }
}
