//! High-precision time sources.
//!
//! Wall-clock timestamps come from `CLOCK_REALTIME`; the dataplane's cycle
//! counter is `CLOCK_MONOTONIC_RAW`, which never jumps with NTP slew.
//! Non-Linux hosts (development builds only) fall back to the standard
//! library clocks.

/// Cycle-counter ticks per second.
pub const CYCLES_PER_SEC: u64 = 1_000_000_000;

#[cfg(target_os = "linux")]
fn clock_ns(clock: libc::clockid_t) -> u64 {
    let mut ts = std::mem::MaybeUninit::<libc::timespec>::uninit();
    // SAFETY: clock_gettime fills `ts` on success, and both clock ids used
    // below exist on every supported kernel. The failure path reports the
    // epoch rather than reading uninitialised memory.
    unsafe {
        if libc::clock_gettime(clock, ts.as_mut_ptr()) != 0 {
            return 0;
        }
        let ts = ts.assume_init();
        ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
    }
}

/// Current time as **nanoseconds** since Unix epoch.
#[cfg(target_os = "linux")]
#[inline]
pub fn now_ns() -> u64 {
    clock_ns(libc::CLOCK_REALTIME)
}

/// Monotonic clock in **nanoseconds** — arrival stamps and elapsed-time
/// measurements without wall-clock jumps. This is the dataplane's cycle
/// counter.
#[cfg(target_os = "linux")]
#[inline]
pub fn cycles() -> u64 {
    clock_ns(libc::CLOCK_MONOTONIC_RAW)
}

#[cfg(not(target_os = "linux"))]
#[inline]
pub fn now_ns() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}

#[cfg(not(target_os = "linux"))]
#[inline]
pub fn cycles() -> u64 {
    use std::{sync::OnceLock, time::Instant};
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    now_ns() / 1_000_000
}
