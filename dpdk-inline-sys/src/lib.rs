//! Raw bindings for DPDK's inline-only primitives.
//!
//! DPDK ships the hot path (burst I/O, mbuf alloc/free, cycle counters,
//! spinlocks) as `static inline` functions and macros. `src/wrapper.c`
//! turns each of them into a real `rust_*` symbol; [`ffi`] declares those
//! symbols together with the handful of exported DPDK functions the safe
//! layer needs.

pub mod ffi;
