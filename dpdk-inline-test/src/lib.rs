//! Test harness for EAL-dependent tests.
//!
//! - [`test_eal`] - EAL options suitable for CI machines (no hugepages, no
//!   PCI, a per-process file prefix)
//! - [`LoopbackConfig`] - mempool plus a started `net_ring` port whose TX
//!   queue feeds its own RX queue

pub mod loopback;

pub use loopback::{LoopbackConfig, LoopbackPort};

use dpdk_inline::api::rte::cpuset::CpuSet;
use dpdk_inline::api::rte::eal::{EalBuilder, LogLevel};
use nix::sched::sched_getaffinity;
use nix::unistd::Pid;

/// The ring vdev used for loopback tests.
pub const RING_VDEV: &str = "net_ring0";

/// EAL options shared by all test binaries.
///
/// Every test binary is its own process and brings up its own EAL, so the
/// runtime directory is made unique per process.
pub fn test_eal() -> EalBuilder {
    init_tracing();
    EalBuilder::new()
        .no_huge()
        .no_pci()
        .file_prefix(format!("dpdk-inline-{}", std::process::id()))
        .log_level(LogLevel::Warning)
}

/// Up to `max` CPUs this process may run on, as an EAL core list.
///
/// Containers often restrict the CPU set, so lcores are picked from what
/// `sched_getaffinity` allows rather than assumed to start at 0.
pub fn allowed_core_list(max: usize) -> String {
    let allowed = sched_getaffinity(Pid::from_raw(0))
        .map(|set| CpuSet::from(&set))
        .unwrap_or_default();
    let picked: CpuSet = allowed.iter().take(max).collect();
    if picked.is_empty() {
        "0".to_string()
    } else {
        picked.to_list_string()
    }
}

/// Install a `RUST_LOG` driven subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
