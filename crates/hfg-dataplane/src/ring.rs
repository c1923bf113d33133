//! Single-producer single-consumer lock-free ring with power-of-two capacity.
//!
//! The fast-path handoff between the forwarding worker (producer) and the
//! downstream consumer. Non-blocking on both ends: `try_push` fails when
//! full, `try_pop` returns `None` when empty. The producer publishes with
//! Release ordering and the consumer loads with Acquire, so a popped item is
//! fully visible. Items are held only in transit — the consumer releases a
//! packet's refcount by dropping the handle after processing.

use std::{
    mem::MaybeUninit,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Capacity of the fast-path ring between the dataplane and its consumer.
pub const HFT_RING_CAPACITY: usize = 2048;

// Padding to keep the producer and consumer counters on separate cache lines.
#[repr(align(128))]
struct Pad<T>(T);

struct Inner<T, const N: usize> {
    buf: Box<[MaybeUninit<T>]>,
    head: Pad<AtomicUsize>, // next write sequence
    tail: Pad<AtomicUsize>, // next read sequence
}

// SAFETY: the SPSC protocol gives each slot a single owner at any time —
// producer until the head store, consumer after the matching acquire load.
// Sharing Inner across threads is sound when T: Send.
unsafe impl<T: Send, const N: usize> Sync for Inner<T, N> {}
unsafe impl<T: Send, const N: usize> Send for Inner<T, N> {}

impl<T, const N: usize> Inner<T, N> {
    fn new() -> Self {
        assert!(N.is_power_of_two(), "ring capacity must be a power of two");
        let buf: Box<[MaybeUninit<T>]> = (0..N).map(|_| MaybeUninit::uninit()).collect();
        Self { buf, head: Pad(AtomicUsize::new(0)), tail: Pad(AtomicUsize::new(0)) }
    }
}

/// Producer half. Exactly one per ring.
pub struct RingProducer<T, const N: usize> {
    inner: Arc<Inner<T, N>>,
}

/// Consumer half. Exactly one per ring.
pub struct RingConsumer<T, const N: usize> {
    inner: Arc<Inner<T, N>>,
}

/// Create a ring and split it into its producer and consumer halves.
pub fn ring<T: Send, const N: usize>() -> (RingProducer<T, N>, RingConsumer<T, N>) {
    let inner = Arc::new(Inner::<T, N>::new());
    (RingProducer { inner: inner.clone() }, RingConsumer { inner })
}

impl<T, const N: usize> RingProducer<T, N> {
    /// Enqueue without blocking. Returns the item back when the ring is full.
    #[inline]
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let head = self.inner.head.0.load(Ordering::Relaxed);
        let tail = self.inner.tail.0.load(Ordering::Acquire);
        if head.wrapping_sub(tail) == N {
            return Err(item);
        }
        // SAFETY: head < tail + N, so this slot was consumed (or never
        // produced) and is exclusively ours until the head store below.
        unsafe {
            let slot = self.inner.buf.as_ptr().add(head & (N - 1)) as *mut MaybeUninit<T>;
            (*slot).write(item);
        }
        self.inner.head.0.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Number of items currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.inner.head.0.load(Ordering::Acquire);
        let tail = self.inner.tail.0.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, const N: usize> RingConsumer<T, N> {
    /// Dequeue without blocking. Returns `None` when the ring is empty.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let tail = self.inner.tail.0.load(Ordering::Relaxed);
        let head = self.inner.head.0.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        // SAFETY: tail < head, so the producer published this slot and will
        // not touch it again until the tail store below.
        let item = unsafe {
            let slot = self.inner.buf.as_ptr().add(tail & (N - 1));
            (*slot).assume_init_read()
        };
        self.inner.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        Some(item)
    }

    #[inline]
    pub fn len(&self) -> usize {
        let head = self.inner.head.0.load(Ordering::Acquire);
        let tail = self.inner.tail.0.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, const N: usize> Drop for RingConsumer<T, N> {
    fn drop(&mut self) {
        // Drain remaining items so their destructors run.
        while self.try_pop().is_some() {}
    }
}
