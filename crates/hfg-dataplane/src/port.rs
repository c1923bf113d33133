//! Port abstraction: burst receive/transmit of packet handles.
//!
//! The deployment layer provides the actual NIC binding (a physical port and
//! a user/kernel virtual port); the dataplane only sees this queue contract.
//! [`ChannelPort`] is the in-process implementation backing tests and the
//! default runner wiring: bounded channels stand in for the descriptor rings,
//! and the [`PortPeer`] handle is the "wire side" used to inject ingress
//! frames and observe egress.

use crossbeam_channel::{Receiver, Sender};

use crate::pool::PacketHandle;

/// Descriptor ring depth used when configuring port queues.
pub const QUEUE_DEPTH: usize = 1024;

/// Queue 0 of one port: burst RX and TX of packet handles.
pub trait PortQueue: Send + Sync {
    /// Receive up to `max` handles, appending them to `out`. Returns the
    /// number received. Never blocks.
    fn rx_burst(&self, out: &mut Vec<PacketHandle>, max: usize) -> usize;

    /// Transmit handles in order. Accepted handles are drained from the
    /// front of `pkts`; the refused remainder stays in the vec and the
    /// caller is responsible for freeing it. Returns the accepted count.
    /// Never blocks.
    fn tx_burst(&self, pkts: &mut Vec<PacketHandle>) -> usize;
}

/// Channel-backed port: the in-process stand-in for a NIC queue pair.
pub struct ChannelPort {
    name: String,
    rx: Receiver<PacketHandle>,
    tx: Sender<PacketHandle>,
}

/// The wire side of a [`ChannelPort`]: inject frames the port will receive,
/// drain frames the port transmitted.
pub struct PortPeer {
    pub inject: Sender<PacketHandle>,
    pub drain: Receiver<PacketHandle>,
}

impl ChannelPort {
    /// Create a port with the default descriptor depth.
    pub fn new(name: impl Into<String>) -> (Self, PortPeer) {
        Self::with_depth(name, QUEUE_DEPTH)
    }

    pub fn with_depth(name: impl Into<String>, depth: usize) -> (Self, PortPeer) {
        let (inject, rx) = crossbeam_channel::bounded(depth);
        let (tx, drain) = crossbeam_channel::bounded(depth);
        (Self { name: name.into(), rx, tx }, PortPeer { inject, drain })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PortQueue for ChannelPort {
    fn rx_burst(&self, out: &mut Vec<PacketHandle>, max: usize) -> usize {
        let mut n = 0;
        while n < max {
            match self.rx.try_recv() {
                Ok(pkt) => {
                    out.push(pkt);
                    n += 1;
                }
                Err(_) => break,
            }
        }
        n
    }

    fn tx_burst(&self, pkts: &mut Vec<PacketHandle>) -> usize {
        let mut accepted = 0;
        while !pkts.is_empty() {
            let pkt = pkts.remove(0);
            match self.tx.try_send(pkt) {
                Ok(()) => accepted += 1,
                Err(crossbeam_channel::TrySendError::Full(pkt)) => {
                    pkts.insert(0, pkt);
                    break;
                }
                Err(crossbeam_channel::TrySendError::Disconnected(pkt)) => {
                    pkts.insert(0, pkt);
                    break;
                }
            }
        }
        accepted
    }
}
