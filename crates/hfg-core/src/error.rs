//! Typed error definitions for the gateway.
//!
//! Provides [`GatewayError`] for domain-specific errors that are more
//! informative than plain `anyhow::Error` strings. All variants implement
//! `std::error::Error` via `thiserror`, so they integrate seamlessly with
//! `anyhow::Result`.

use thiserror::Error;

/// Domain-specific errors for the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Packet pool creation or exhaustion error.
    #[error("pool error: {0}")]
    Pool(String),

    /// Port discovery, configuration, or queue error.
    #[error("port error: {0}")]
    Port(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Market data parsing error.
    #[error("parse error: {0}")]
    Parse(String),

    /// UDP feed socket or serialization error.
    #[error("udp error: {0}")]
    Udp(String),
}
