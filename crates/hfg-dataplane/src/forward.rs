//! Busy-poll forwarding engine.
//!
//! One worker, pinned to a dedicated core, bridges the physical port and the
//! user/kernel virtual port. Per iteration:
//!
//! 1. Burst-receive from the physical port, stamp arrival cycles, classify.
//!    Fast-path packets are duplicated (refcount, not bytes) into the HFT
//!    ring; every packet goes to the kernel batch regardless so the host TCP
//!    stack sees the full stream and generates acks.
//! 2. Transmit the kernel batch to the virtual port; free refusals.
//! 3. Burst-receive outbound kernel traffic from the virtual port.
//! 4. Transmit it to the physical port; free refusals.
//!
//! Counters are emitted at five-second intervals, measured in cycles. The
//! loop never sleeps and never blocks; it exits when the stop flag is set.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use hfg_core::{log_system, time_util};
use tracing::{info, warn};

use crate::{
    classifier::{Verdict, classify},
    pool::{PacketHandle, PacketPool},
    port::PortQueue,
    ring::{HFT_RING_CAPACITY, RingProducer},
};

/// Maximum handles moved per burst.
pub const BURST_SIZE: usize = 32;

const STATS_INTERVAL_CYCLES: u64 = 5 * time_util::CYCLES_PER_SEC;

/// Producer half of the fast-path ring, as wired into the engine.
pub type HftRingProducer = RingProducer<PacketHandle, HFT_RING_CAPACITY>;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Shared forwarding counters, written by the worker and read by observers.
#[derive(Debug, Default)]
pub struct ForwardCounters {
    pub rx_phy: AtomicU64,
    pub tx_virt: AtomicU64,
    pub rx_virt: AtomicU64,
    pub tx_phy: AtomicU64,
    /// Fast-path duplicates discarded because the HFT ring was full.
    pub ring_full: AtomicU64,
    /// Buffer allocations refused because the packet pool was empty.
    pub pool_exhausted: AtomicU64,
    /// Packets freed because a port refused them on transmit.
    pub tx_refused: AtomicU64,
    /// Packets discarded by an explicit drop verdict.
    pub filtered: AtomicU64,
}

impl ForwardCounters {
    #[inline]
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ForwardStats {
        ForwardStats {
            rx_phy: self.rx_phy.load(Ordering::Relaxed),
            tx_virt: self.tx_virt.load(Ordering::Relaxed),
            rx_virt: self.rx_virt.load(Ordering::Relaxed),
            tx_phy: self.tx_phy.load(Ordering::Relaxed),
            ring_full: self.ring_full.load(Ordering::Relaxed),
            pool_exhausted: self.pool_exhausted.load(Ordering::Relaxed),
            tx_refused: self.tx_refused.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the forwarding counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub rx_phy: u64,
    pub tx_virt: u64,
    pub rx_virt: u64,
    pub tx_phy: u64,
    pub ring_full: u64,
    pub pool_exhausted: u64,
    pub tx_refused: u64,
    pub filtered: u64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The forwarding worker state.
pub struct ForwardingEngine {
    phy: Arc<dyn PortQueue>,
    virt: Arc<dyn PortQueue>,
    ring: HftRingProducer,
    pool: PacketPool,
    stop: Arc<AtomicBool>,
    counters: Arc<ForwardCounters>,
    worker_core: Option<i32>,
    rx_buf: Vec<PacketHandle>,
    kernel_tx: Vec<PacketHandle>,
}

impl ForwardingEngine {
    pub fn new(
        phy: Arc<dyn PortQueue>,
        virt: Arc<dyn PortQueue>,
        ring: HftRingProducer,
        pool: PacketPool,
        stop: Arc<AtomicBool>,
        worker_core: Option<i32>,
    ) -> Self {
        Self {
            phy,
            virt,
            ring,
            pool,
            stop,
            counters: Arc::new(ForwardCounters::default()),
            worker_core,
            rx_buf: Vec::with_capacity(BURST_SIZE),
            kernel_tx: Vec::with_capacity(BURST_SIZE),
        }
    }

    /// Shared counter handle for observers.
    pub fn counters(&self) -> Arc<ForwardCounters> {
        self.counters.clone()
    }

    /// One iteration of the forwarding loop. Exposed so the iteration is
    /// drivable without a dedicated thread.
    pub fn poll_once(&mut self) {
        // 1. Ingress: physical -> classifier -> {ring, kernel}
        self.rx_buf.clear();
        let nb_rx = self.phy.rx_burst(&mut self.rx_buf, BURST_SIZE);
        if nb_rx > 0 {
            ForwardCounters::add(&self.counters.rx_phy, nb_rx as u64);
            // One stamp per burst: arrivals within a burst are close enough
            // for system-latency measurement.
            let rx_stamp = time_util::cycles();

            for pkt in self.rx_buf.drain(..) {
                pkt.set_meta(rx_stamp);
                match classify(pkt.bytes()) {
                    Verdict::Fast => {
                        // Duplicate the reference so the kernel still sees
                        // the packet and keeps the TCP state machine fed.
                        let dup = pkt.clone();
                        if let Err(dup) = self.ring.try_push(dup) {
                            ForwardCounters::add(&self.counters.ring_full, 1);
                            drop(dup);
                        }
                        self.kernel_tx.push(pkt);
                    }
                    Verdict::Slow => self.kernel_tx.push(pkt),
                    Verdict::Drop => {
                        ForwardCounters::add(&self.counters.filtered, 1);
                        drop(pkt);
                    }
                }
            }

            // 2. Egress to kernel (virtual port)
            if !self.kernel_tx.is_empty() {
                let accepted = self.virt.tx_burst(&mut self.kernel_tx);
                ForwardCounters::add(&self.counters.tx_virt, accepted as u64);
                if !self.kernel_tx.is_empty() {
                    ForwardCounters::add(&self.counters.tx_refused, self.kernel_tx.len() as u64);
                    self.kernel_tx.clear();
                }
            }
        }

        // 3. Ingress: virtual (kernel egress)
        self.rx_buf.clear();
        let nb_rx = self.virt.rx_burst(&mut self.rx_buf, BURST_SIZE);
        if nb_rx > 0 {
            ForwardCounters::add(&self.counters.rx_virt, nb_rx as u64);

            // 4. Egress to physical
            let accepted = self.phy.tx_burst(&mut self.rx_buf);
            ForwardCounters::add(&self.counters.tx_phy, accepted as u64);
            if !self.rx_buf.is_empty() {
                ForwardCounters::add(&self.counters.tx_refused, self.rx_buf.len() as u64);
                self.rx_buf.clear();
            }
        }

        // pool_exhausted mirrors the pool's allocation-failure count.
        self.counters
            .pool_exhausted
            .store(self.pool.exhausted(), Ordering::Relaxed);
    }

    /// Run the busy-poll loop until the stop flag is set. Pins the calling
    /// thread to the configured worker core first.
    pub fn run(mut self) {
        if let Some(core) = self.worker_core {
            pin_worker_core(core);
        }
        info!("forwarding engine running");
        log_system!("forwarding engine started");

        let mut last_stats = time_util::cycles();
        while !self.stop.load(Ordering::Relaxed) {
            self.poll_once();

            let now = time_util::cycles();
            if now.wrapping_sub(last_stats) > STATS_INTERVAL_CYCLES {
                let s = self.counters.snapshot();
                info!(
                    "forwarding stats rx_phy={} tx_virt={} rx_virt={} tx_phy={} ring_full={} pool_exhausted={} tx_refused={}",
                    s.rx_phy, s.tx_virt, s.rx_virt, s.tx_phy, s.ring_full, s.pool_exhausted, s.tx_refused
                );
                log_system!(
                    "forwarding stats rx_phy={} tx_virt={} rx_virt={} tx_phy={} ring_full={} pool_exhausted={}",
                    s.rx_phy,
                    s.tx_virt,
                    s.rx_virt,
                    s.tx_phy,
                    s.ring_full,
                    s.pool_exhausted
                );
                last_stats = now;
            }
            std::hint::spin_loop();
        }

        let s = self.counters.snapshot();
        info!(
            "forwarding engine stopped rx_phy={} tx_virt={} rx_virt={} tx_phy={}",
            s.rx_phy, s.tx_virt, s.rx_virt, s.tx_phy
        );
        log_system!("forwarding engine stopped");
    }
}

/// Pin the forwarding worker to its dedicated core. The busy-poll loop is
/// meant to own a core outright; a failed pin leaves it at the scheduler's
/// mercy, so every failure mode is logged and the loop runs anyway.
fn pin_worker_core(core: i32) {
    if core < 0 {
        return;
    }
    let Some(cores) = core_affinity::get_core_ids() else {
        warn!("cannot enumerate CPU cores, forwarding worker left floating");
        return;
    };
    let total = cores.len();
    match cores.into_iter().find(|c| c.id == core as usize) {
        Some(id) => {
            if core_affinity::set_for_current(id) {
                info!("forwarding worker pinned to core {core}");
            } else {
                warn!("OS rejected pinning the forwarding worker to core {core}");
            }
        }
        None => {
            warn!("core {core} not present ({total} cores), forwarding worker left floating");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::test_frames::ipv4_frame;
    use crate::pool::PacketPool;
    use crate::port::ChannelPort;
    use crate::ring::{RingConsumer, ring};

    struct Rig {
        pool: PacketPool,
        engine: ForwardingEngine,
        phy_peer: crate::port::PortPeer,
        virt_peer: crate::port::PortPeer,
        ring_rx: RingConsumer<PacketHandle, HFT_RING_CAPACITY>,
    }

    fn rig() -> Rig {
        rig_with_virt_depth(crate::port::QUEUE_DEPTH)
    }

    fn rig_with_virt_depth(virt_depth: usize) -> Rig {
        let pool = PacketPool::new(64, 256).unwrap();
        let (phy, phy_peer) = ChannelPort::new("phy");
        let (virt, virt_peer) = ChannelPort::with_depth("virt", virt_depth);
        let (ring_tx, ring_rx) = ring();
        let stop = Arc::new(AtomicBool::new(false));
        let engine = ForwardingEngine::new(
            Arc::new(phy),
            Arc::new(virt),
            ring_tx,
            pool.clone(),
            stop,
            None,
        );
        Rig { pool, engine, phy_peer, virt_peer, ring_rx }
    }

    #[test]
    fn fast_packet_reaches_kernel_and_ring() {
        let mut rig = rig();
        let frame = ipv4_frame(6, 5, 55000, 8443, 100);
        let pkt = rig.pool.alloc(&frame).unwrap();
        rig.phy_peer.inject.send(pkt).unwrap();

        rig.engine.poll_once();

        // Kernel path: exactly once.
        let to_kernel = rig.virt_peer.drain.try_recv().unwrap();
        assert_eq!(to_kernel.bytes(), &frame[..]);
        assert!(rig.virt_peer.drain.try_recv().is_err());

        // Ring: exactly once, refcount held by the duplicate.
        let from_ring = rig.ring_rx.try_pop().unwrap();
        assert_eq!(from_ring.bytes(), &frame[..]);
        assert!(rig.ring_rx.try_pop().is_none());
        assert_eq!(from_ring.refcount(), 2);
        assert!(from_ring.meta() > 0, "arrival stamp missing");

        // Consumer and kernel both release; the buffer returns to the pool.
        drop(from_ring);
        drop(to_kernel);
        assert_eq!(rig.pool.in_use(), 0);

        let s = rig.engine.counters().snapshot();
        assert_eq!((s.rx_phy, s.tx_virt), (1, 1));
    }

    #[test]
    fn slow_packet_reaches_kernel_only() {
        let mut rig = rig();
        let frame = ipv4_frame(1, 5, 0, 0, 64); // ICMP
        rig.phy_peer.inject.send(rig.pool.alloc(&frame).unwrap()).unwrap();

        rig.engine.poll_once();

        let to_kernel = rig.virt_peer.drain.try_recv().unwrap();
        assert_eq!(to_kernel.refcount(), 1);
        assert!(rig.ring_rx.try_pop().is_none());

        drop(to_kernel);
        assert_eq!(rig.pool.in_use(), 0);
    }

    #[test]
    fn ring_full_still_takes_kernel_path() {
        let mut rig = rig();
        let frame = ipv4_frame(6, 5, 443, 55000, 10);

        // Saturate the ring.
        let filler = rig.pool.alloc(&frame).unwrap();
        while rig.engine.ring.try_push(filler.clone()).is_ok() {}
        drop(filler);

        rig.phy_peer.inject.send(rig.pool.alloc(&frame).unwrap()).unwrap();
        rig.engine.poll_once();

        let to_kernel = rig.virt_peer.drain.try_recv().unwrap();
        assert_eq!(to_kernel.refcount(), 1, "failed duplicate must be freed");
        assert_eq!(rig.engine.counters().snapshot().ring_full, 1);
        drop(to_kernel);
    }

    #[test]
    fn fast_packets_keep_burst_order_on_ring() {
        let mut rig = rig();
        for i in 0..8u8 {
            let frame = ipv4_frame(6, 5, 8443, 55000, i as usize);
            rig.phy_peer.inject.send(rig.pool.alloc(&frame).unwrap()).unwrap();
        }
        rig.engine.poll_once();

        let mut lens = Vec::new();
        while let Some(pkt) = rig.ring_rx.try_pop() {
            lens.push(pkt.len());
        }
        let expect: Vec<usize> =
            (0..8).map(|i| ipv4_frame(6, 5, 8443, 55000, i).len()).collect();
        assert_eq!(lens, expect);
    }

    #[test]
    fn kernel_egress_is_bridged_to_physical() {
        let mut rig = rig();
        let frame = ipv4_frame(6, 5, 55000, 8443, 20); // outbound to the venue
        rig.virt_peer.inject.send(rig.pool.alloc(&frame).unwrap()).unwrap();

        rig.engine.poll_once();

        let on_wire = rig.phy_peer.drain.try_recv().unwrap();
        assert_eq!(on_wire.bytes(), &frame[..]);
        // Outbound traffic is never duplicated into the ring.
        assert!(rig.ring_rx.try_pop().is_none());

        let s = rig.engine.counters().snapshot();
        assert_eq!((s.rx_virt, s.tx_phy), (1, 1));
    }

    #[test]
    fn refused_kernel_tx_is_freed() {
        let mut rig = rig_with_virt_depth(1);
        for _ in 0..3 {
            let frame = ipv4_frame(1, 5, 0, 0, 0);
            rig.phy_peer.inject.send(rig.pool.alloc(&frame).unwrap()).unwrap();
        }

        rig.engine.poll_once();

        let s = rig.engine.counters().snapshot();
        assert_eq!(s.tx_virt, 1);
        assert_eq!(s.tx_refused, 2);
        // Only the accepted packet still holds a buffer.
        assert_eq!(rig.pool.in_use(), 1);
    }

    #[test]
    fn pool_exhaustion_rides_along_with_stats() {
        let mut rig = rig();
        let held: Vec<_> = (0..rig.pool.capacity())
            .map(|_| rig.pool.alloc(&[0]).unwrap())
            .collect();
        assert!(rig.pool.alloc(&[0]).is_none());

        rig.engine.poll_once();
        assert_eq!(rig.engine.counters().snapshot().pool_exhausted, 1);
        drop(held);
    }

    #[test]
    fn run_exits_on_stop_flag() {
        let rig = rig();
        let stop = rig.engine.stop.clone();
        let handle = std::thread::spawn(move || rig.engine.run());
        std::thread::sleep(std::time::Duration::from_millis(20));
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
