//! Cycle counters and timer frequency.
//!
//! See: /usr/local/include/rte_cycles.h
//!
//! The TSC is free-running per CPU; the "timer" functions go through the
//! EAL timer source, which may use a different clock than the TSC. Both
//! frequencies are calibrated by `rte_eal_init()`, so [`timer_hz`] and
//! [`tsc_hz`] return 0 before EAL is up.

use std::time::Duration;

use dpdk_inline_sys::ffi;

/// Current TSC value (`rte_get_tsc_cycles`).
#[inline]
pub fn tsc_cycles() -> u64 {
    unsafe { ffi::rust_get_tsc_cycles() }
}

/// TSC read behind a full barrier (`rte_rdtsc_precise`).
#[inline]
pub fn rdtsc_precise() -> u64 {
    unsafe { ffi::rust_rdtsc_precise() }
}

/// Current cycle count of the EAL timer source (`rte_get_timer_cycles`).
#[inline]
pub fn timer_cycles() -> u64 {
    unsafe { ffi::rust_get_timer_cycles() }
}

/// Calibrated frequency of the EAL timer source in Hz (`rte_get_timer_hz`).
#[inline]
pub fn timer_hz() -> u64 {
    unsafe { ffi::rust_get_timer_hz() }
}

/// Calibrated TSC frequency in Hz (`rte_get_tsc_hz`).
#[inline]
pub fn tsc_hz() -> u64 {
    unsafe { ffi::rte_get_tsc_hz() }
}

/// Busy-wait for `us` microseconds (`rte_delay_us_block`).
#[inline]
pub fn delay_us(us: u32) {
    unsafe { ffi::rte_delay_us_block(us) }
}

/// Convert a duration to timer cycles at frequency `hz`, saturating.
pub fn duration_to_cycles(d: Duration, hz: u64) -> u64 {
    d.as_nanos()
        .checked_mul(hz as u128)
        .map_or(u64::MAX, |c| u64::try_from(c / 1_000_000_000).unwrap_or(u64::MAX))
}

/// A point in time on the EAL timer clock.
///
/// Used to bound polling loops over non-blocking calls such as
/// `SpinLock::try_lock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: u64,
}

impl Deadline {
    /// Deadline `timeout` from now.
    ///
    /// Before EAL initialisation the timer frequency is unknown (0), which
    /// makes every deadline already expired.
    pub fn after(timeout: Duration) -> Self {
        Self::from_cycles(timer_cycles(), timer_hz(), timeout)
    }

    fn from_cycles(now: u64, hz: u64, timeout: Duration) -> Self {
        Self {
            at: now.saturating_add(duration_to_cycles(timeout, hz)),
        }
    }

    /// Whether the timer clock has reached the deadline.
    #[inline]
    pub fn expired(&self) -> bool {
        self.expired_at(timer_cycles())
    }

    #[inline]
    fn expired_at(&self, now: u64) -> bool {
        now >= self.at
    }

    /// Poll `f` until it returns `Some` or the deadline passes.
    pub fn poll<T>(&self, mut f: impl FnMut() -> Option<T>) -> Option<T> {
        loop {
            if let Some(v) = f() {
                return Some(v);
            }
            if self.expired() {
                return None;
            }
            std::hint::spin_loop();
        }
    }
}
