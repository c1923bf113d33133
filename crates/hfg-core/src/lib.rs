//! # hfg-core
//!
//! Core crate for the HFT gateway, providing:
//!
//! - **Types** (`types`) — venue identity, price levels, parsed books
//! - **Configuration** (`config`) — environment-driven settings
//! - **Error types** (`error`) — domain-specific `GatewayError` via thiserror
//! - **Logging** (`logging`) — tracing init + price/system/trade stream sinks
//! - **WebSocket** (`ws`) — resilient session with backoff reconnect
//! - **UDP feed** (`udp`) — binary feed codec and non-blocking publisher
//! - **Time utilities** (`time_util`) — high-precision timestamps and cycles

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod udp;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
