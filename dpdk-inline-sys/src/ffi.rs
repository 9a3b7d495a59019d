//! Generated bindings for the `rust_*` forwarders in `src/wrapper.c` and
//! the exported DPDK functions allowlisted in `build.rs`.
#![allow(
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case,
    dead_code,
    improper_ctypes,
    clippy::all
)]

mod bindings {
    include!(concat!(env!("OUT_DIR"), "/dpdk_bindings.rs"));
}

pub use bindings::*;

// ── Hand-written declarations ───────────────────────────────
// `lcore_function_t` is a function type (not a pointer typedef),
// so declare the launcher with the pointer spelled out.
#[cfg(feature = "lcore")]
unsafe extern "C" {
    /// Launch a function on another lcore.
    ///
    /// Caller must ensure `arg` points to valid data for the duration
    /// of the remote call.
    pub fn rte_eal_remote_launch(
        f: Option<unsafe extern "C" fn(arg: *mut core::ffi::c_void) -> core::ffi::c_int>,
        arg: *mut core::ffi::c_void,
        worker_id: core::ffi::c_uint,
    ) -> core::ffi::c_int;
}

// ── Build-config constants ──────────────────────────────────
// LCORE_ID_ANY is spelled UINT32_MAX in rte_lcore.h.
pub const LCORE_ID_ANY: u32 = u32::MAX;
