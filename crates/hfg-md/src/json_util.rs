//! Shared JSON parsing helpers used by the venue adapters.

use hfg_core::types::{PriceLevel, price_to_int};

/// Parse a JSON value (string or number) as `f64`.
///
/// Handles the common exchange pattern where numeric values may be encoded
/// as either JSON strings (`"30000.5"`) or native numbers (`30000.5`).
#[inline]
pub fn parse_str_f64(v: Option<&serde_json::Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        fast_float2::parse(s).ok()
    } else {
        v.as_f64()
    }
}

/// Parse a JSON value (string or number) as `u64`.
#[inline]
pub fn parse_str_u64(v: Option<&serde_json::Value>) -> Option<u64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        s.parse().ok()
    } else {
        v.as_u64()
    }
}

/// Parse an array of `["price", "size", ...]` levels into scaled
/// [`PriceLevel`]s. Malformed entries are skipped.
pub fn parse_levels(v: Option<&serde_json::Value>) -> Vec<PriceLevel> {
    let Some(arr) = v.and_then(|a| a.as_array()) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|level| {
            let a = level.as_array()?;
            let price = parse_str_f64(a.first())?;
            let size = parse_str_f64(a.get(1))?;
            Some(PriceLevel::new(price_to_int(price), size))
        })
        .collect()
}
