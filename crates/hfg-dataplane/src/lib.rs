//! # hfg-dataplane
//!
//! The packet-forwarding dataplane: a busy-polling single-core loop that
//! bridges a physical port and a user/kernel virtual port, classifying
//! venue traffic into a fast-path SPSC ring along the way.
//!
//! - [`pool`] — pre-sized refcounted packet buffer pool
//! - [`port`] — burst RX/TX queue contract + channel-backed implementation
//! - [`classifier`] — fast/slow verdict over L2/L3/L4 headers
//! - [`ring`] — lock-free SPSC handoff to the downstream consumer
//! - [`forward`] — the forwarding engine itself

pub mod classifier;
pub mod forward;
pub mod pool;
pub mod port;
pub mod ring;

pub use classifier::{FAST_TCP_PORTS, Verdict, classify};
pub use forward::{BURST_SIZE, ForwardCounters, ForwardStats, ForwardingEngine, HftRingProducer};
pub use pool::{PacketHandle, PacketPool};
pub use port::{ChannelPort, PortPeer, PortQueue, QUEUE_DEPTH};
pub use ring::{HFT_RING_CAPACITY, RingConsumer, RingProducer, ring};
