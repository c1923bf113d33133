//! Pre-sized packet buffer pool with refcounted handles.
//!
//! Buffers are allocated once at startup; the forwarding hot path never
//! touches the heap. A [`PacketHandle`] is a refcounted reference into the
//! pool: cloning increments the per-slot atomic refcount (the fast-path
//! duplicate — bytes are never copied), dropping decrements it, and the slot
//! returns to the free list when the count reaches zero. A freed slot is
//! never observable from any queue.
//!
//! Each slot carries a 64-bit metadata word used by the dataplane for the
//! arrival cycle stamp.

use std::{
    cell::UnsafeCell,
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering, fence},
    },
};

use crossbeam_channel::{Receiver, Sender};
use hfg_core::error::GatewayError;

/// Default per-buffer capacity, enough for a full MTU frame plus headroom.
pub const DEFAULT_BUF_SIZE: usize = 2048;

struct Slot {
    data: UnsafeCell<Box<[u8]>>,
    len: AtomicUsize,
    refcnt: AtomicU32,
    meta: AtomicU64,
}

// SAFETY: the refcount protocol guarantees exclusive access to `data` while a
// slot is on the free list (refcnt == 0): only `alloc` writes it, before the
// sole handle is handed out. Once refcnt >= 1 the bytes are only read.
unsafe impl Sync for Slot {}
unsafe impl Send for Slot {}

struct PoolInner {
    slots: Box<[Slot]>,
    free_tx: Sender<u32>,
    free_rx: Receiver<u32>,
    exhausted: AtomicU64,
}

/// Fixed-capacity packet buffer pool.
#[derive(Clone)]
pub struct PacketPool {
    inner: Arc<PoolInner>,
}

impl PacketPool {
    /// Allocate a pool of `capacity` buffers of `buf_size` bytes each.
    pub fn new(capacity: usize, buf_size: usize) -> Result<Self, GatewayError> {
        if capacity == 0 || buf_size == 0 {
            return Err(GatewayError::Pool("pool capacity and buffer size must be non-zero".into()));
        }
        let slots: Box<[Slot]> = (0..capacity)
            .map(|_| Slot {
                data: UnsafeCell::new(vec![0u8; buf_size].into_boxed_slice()),
                len: AtomicUsize::new(0),
                refcnt: AtomicU32::new(0),
                meta: AtomicU64::new(0),
            })
            .collect();

        let (free_tx, free_rx) = crossbeam_channel::bounded(capacity);
        for idx in 0..capacity as u32 {
            let _ = free_tx.send(idx);
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                slots,
                free_tx,
                free_rx,
                exhausted: AtomicU64::new(0),
            }),
        })
    }

    /// Take a buffer from the free list and copy `frame` into it.
    ///
    /// Returns `None` when the pool is exhausted or the frame does not fit;
    /// the caller drops the packet and continues. Exhaustion is counted.
    pub fn alloc(&self, frame: &[u8]) -> Option<PacketHandle> {
        let Ok(idx) = self.inner.free_rx.try_recv() else {
            self.inner.exhausted.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let slot = &self.inner.slots[idx as usize];

        // SAFETY: `idx` came off the free list, so refcnt == 0 and no handle
        // references this slot; we have exclusive access until the handle
        // below is published.
        let buf = unsafe { &mut *slot.data.get() };
        if frame.len() > buf.len() {
            let _ = self.inner.free_tx.send(idx);
            return None;
        }
        buf[..frame.len()].copy_from_slice(frame);
        slot.len.store(frame.len(), Ordering::Relaxed);
        slot.meta.store(0, Ordering::Relaxed);
        slot.refcnt.store(1, Ordering::Release);

        Some(PacketHandle { pool: self.inner.clone(), idx })
    }

    /// Number of buffers currently on the free list.
    pub fn available(&self) -> usize {
        self.inner.free_rx.len()
    }

    /// Number of buffers currently held by handles.
    pub fn in_use(&self) -> usize {
        self.inner.slots.len() - self.available()
    }

    pub fn capacity(&self) -> usize {
        self.inner.slots.len()
    }

    /// Allocation attempts that failed because no buffer was free.
    pub fn exhausted(&self) -> u64 {
        self.inner.exhausted.load(Ordering::Relaxed)
    }
}

/// A refcounted reference to one pool buffer.
pub struct PacketHandle {
    pool: Arc<PoolInner>,
    idx: u32,
}

impl PacketHandle {
    fn slot(&self) -> &Slot {
        &self.pool.slots[self.idx as usize]
    }

    /// The L2 frame bytes.
    pub fn bytes(&self) -> &[u8] {
        let len = self.slot().len.load(Ordering::Relaxed);
        // SAFETY: refcnt >= 1 while `self` exists, so no writer can touch the
        // buffer; shared reads are fine.
        let buf = unsafe { &*self.slot().data.get() };
        &buf[..len]
    }

    pub fn len(&self) -> usize {
        self.slot().len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store the 64-bit metadata word (arrival cycle stamp).
    pub fn set_meta(&self, value: u64) {
        self.slot().meta.store(value, Ordering::Relaxed);
    }

    pub fn meta(&self) -> u64 {
        self.slot().meta.load(Ordering::Relaxed)
    }

    /// Current reference count. Diagnostic only; racy by nature.
    pub fn refcount(&self) -> u32 {
        self.slot().refcnt.load(Ordering::Relaxed)
    }
}

impl Clone for PacketHandle {
    /// Duplicate the reference, not the bytes.
    fn clone(&self) -> Self {
        self.slot().refcnt.fetch_add(1, Ordering::Relaxed);
        Self { pool: self.pool.clone(), idx: self.idx }
    }
}

impl Drop for PacketHandle {
    fn drop(&mut self) {
        // Release pairs with the Acquire fence so the last holder observes
        // all prior accesses before the slot is recycled.
        if self.slot().refcnt.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            let _ = self.pool.free_tx.send(self.idx);
        }
    }
}

impl std::fmt::Debug for PacketHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHandle")
            .field("idx", &self.idx)
            .field("len", &self.len())
            .field("refcount", &self.refcount())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_copies_frame() {
        let pool = PacketPool::new(4, 64).unwrap();
        let h = pool.alloc(&[1, 2, 3, 4]).unwrap();
        assert_eq!(h.bytes(), &[1, 2, 3, 4]);
        assert_eq!(h.refcount(), 1);
        assert_eq!(pool.in_use(), 1);
    }

    #[test]
    fn clone_increments_drop_recycles() {
        let pool = PacketPool::new(2, 64).unwrap();
        let h = pool.alloc(&[9]).unwrap();
        let dup = h.clone();
        assert_eq!(h.refcount(), 2);
        assert_eq!(pool.in_use(), 1);

        drop(dup);
        assert_eq!(h.refcount(), 1);
        drop(h);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn exhaustion_returns_none_and_counts() {
        let pool = PacketPool::new(2, 64).unwrap();
        let _a = pool.alloc(&[0]).unwrap();
        let _b = pool.alloc(&[0]).unwrap();
        assert!(pool.alloc(&[0]).is_none());
        assert_eq!(pool.exhausted(), 1);
        drop(_a);
        assert!(pool.alloc(&[0]).is_some());
        assert_eq!(pool.exhausted(), 1);
    }

    #[test]
    fn oversized_frame_rejected_without_leak() {
        let pool = PacketPool::new(1, 8).unwrap();
        assert!(pool.alloc(&[0u8; 16]).is_none());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn metadata_slot_round_trip() {
        let pool = PacketPool::new(1, 64).unwrap();
        let h = pool.alloc(&[0]).unwrap();
        h.set_meta(0xDEAD_BEEF_0000_0001);
        assert_eq!(h.meta(), 0xDEAD_BEEF_0000_0001);
    }

    #[test]
    fn recycled_slot_serves_new_frame() {
        let pool = PacketPool::new(1, 64).unwrap();
        let h = pool.alloc(&[1, 1, 1]).unwrap();
        drop(h);
        let h2 = pool.alloc(&[2]).unwrap();
        assert_eq!(h2.bytes(), &[2]);
    }
}
