//! Safe bindings over DPDK primitives that only exist as inline functions
//! or macros in C.
//!
//! The raw forwarders live in `dpdk-inline-sys`; [`api::rte`] wraps them
//! with owned handles (`Mbuf`, `MemPool`), RAII lock guards and a
//! `CpuSet` type.

pub mod api;

/// A boxed error type for dpdk-inline operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A Result type using BoxError.
pub type Result<T> = std::result::Result<T, BoxError>;
