//! Shared data types flowing between the dataplane, venue connections, the
//! order-book engine, and the UDP feed.
//!
//! Prices are fixed-point: a `u64` scaled by [`PRICE_SCALE`] (8 decimal
//! places). Example: $95000.12345678 -> 9500012345678.

use serde::{Deserialize, Serialize};

/// Fixed-point price scaling factor (10^8).
pub const PRICE_SCALE: f64 = 100_000_000.0;

/// Convert a decimal price to its scaled integer representation.
#[inline]
pub fn price_to_int(price: f64) -> u64 {
    (price * PRICE_SCALE).round() as u64
}

/// Convert a scaled integer price back to a decimal price.
#[inline]
pub fn price_from_int(price_int: u64) -> f64 {
    price_int as f64 / PRICE_SCALE
}

// ---------------------------------------------------------------------------
// Venue identity
// ---------------------------------------------------------------------------

/// Supported trading venues.
///
/// The discriminants are the stable `u8` encoding used in the UDP feed
/// header; do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Venue {
    Okx = 0,
    Bybit = 1,
    Binance = 2,
    Gate = 3,
    Bitget = 4,
    Mexc = 5,
    Unknown = 255,
}

impl Venue {
    /// Wire encoding for the UDP feed header.
    #[inline]
    pub fn wire_id(self) -> u8 {
        self as u8
    }

    /// Decode a wire id back into a venue. Unrecognised ids map to `Unknown`.
    pub fn from_wire_id(id: u8) -> Self {
        match id {
            0 => Self::Okx,
            1 => Self::Bybit,
            2 => Self::Binance,
            3 => Self::Gate,
            4 => Self::Bitget,
            5 => Self::Mexc,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Okx => write!(f, "okx"),
            Self::Bybit => write!(f, "bybit"),
            Self::Binance => write!(f, "binance"),
            Self::Gate => write!(f, "gate"),
            Self::Bitget => write!(f, "bitget"),
            Self::Mexc => write!(f, "mexc"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Order-book levels
// ---------------------------------------------------------------------------

/// A single price level.
///
/// `size <= 0.0` denotes deletion of the level at that price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    /// Price scaled by [`PRICE_SCALE`].
    pub price_int: u64,
    /// Quantity at this level.
    pub size: f64,
}

impl PriceLevel {
    pub fn new(price_int: u64, size: f64) -> Self {
        Self { price_int, size }
    }

    /// True when this level deletes the price rather than setting it.
    #[inline]
    pub fn is_delete(&self) -> bool {
        self.size <= 0.0
    }
}

/// A venue-agnostic parsed order-book message.
///
/// Produced by the venue adapters, consumed by the order-book engine and the
/// UDP publisher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOrderBook {
    pub instrument: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    /// Full replacement vs. incremental change set.
    pub is_snapshot: bool,
    /// Venue timestamp in milliseconds.
    pub timestamp_ms: u64,
}
