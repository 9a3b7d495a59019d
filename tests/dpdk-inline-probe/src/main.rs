//! dpdk-inline probe
//!
//! Brings up EAL with a `net_ring` loopback port and reports what the
//! inline primitives see on this machine:
//! - TSC and EAL timer frequencies
//! - hardware transactional memory support
//! - lcore to CPU affinity masks
//! - cycles per lock/unlock for each spinlock path
//! - packets per second through a TX -> RX ring loopback
//!
//! # Usage
//!
//! ```bash
//! # defaults: no hugepages, net_ring0, 2 seconds of loopback bursts
//! dpdk-inline-probe
//!
//! # more lcores, longer run, verbose logs
//! RUST_LOG=debug dpdk-inline-probe --cores 0-3 --seconds 10
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arrayvec::ArrayVec;
use clap::Parser;
use dpdk_inline::BoxError;
use dpdk_inline::api::rte::cycles::{Deadline, rdtsc_precise, timer_hz, tsc_hz};
use dpdk_inline::api::rte::eal::{EalBuilder, LogLevel};
use dpdk_inline::api::rte::lcore::Lcore;
use dpdk_inline::api::rte::mbuf::Mbuf;
use dpdk_inline::api::rte::queue::MAX_BURST_SIZE;
use dpdk_inline::api::rte::spinlock::{RecursiveSpinLock, SpinLock, tm_supported};
use dpdk_inline_test::{LoopbackConfig, LoopbackPort, allowed_core_list};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dpdk-inline-probe")]
#[command(about = "Probe DPDK inline primitives: timers, TM, affinity, locks and bursts")]
struct Args {
    /// EAL core list; defaults to up to 4 CPUs this process may use
    #[arg(short, long)]
    cores: Option<String>,

    /// Ring vdev used as the loopback port
    #[arg(long, default_value = "net_ring0")]
    vdev: String,

    /// Seconds of loopback bursts (0 skips the burst run)
    #[arg(short, long, default_value = "2")]
    seconds: u64,

    /// Packets per TX burst (at most 64)
    #[arg(short, long, default_value = "32")]
    burst: usize,

    /// Payload bytes per packet
    #[arg(long, default_value = "64")]
    payload: usize,

    /// Lock/unlock pairs per lock path
    #[arg(long, default_value = "1000000")]
    lock_iters: u64,

    /// Use hugepages instead of --no-huge
    #[arg(long)]
    huge: bool,
}

fn report_clocks() {
    info!(tsc_hz = tsc_hz(), timer_hz = timer_hz(), "clocks");
    info!(tm_supported = tm_supported(), "transactional memory");
}

fn report_lcores() {
    info!(count = Lcore::count(), main = Lcore::main().id(), "lcores");
    for lcore in Lcore::all() {
        info!(
            lcore = lcore.id(),
            cpu = ?lcore.cpu_id(),
            socket = lcore.socket_id(),
            role = ?lcore.role(),
            cpuset = %lcore.cpuset(),
            "lcore"
        );
    }
}

/// Average cycles per lock/unlock pair.
fn per_iter(iters: u64, f: impl Fn()) -> u64 {
    let start = rdtsc_precise();
    for _ in 0..iters {
        f();
    }
    (rdtsc_precise() - start) / iters.max(1)
}

fn report_locks(iters: u64) {
    let lock = SpinLock::new();
    let rlock = RecursiveSpinLock::new();

    let plain = per_iter(iters, || drop(lock.lock()));
    let tm = per_iter(iters, || drop(lock.lock_tm()));
    let recursive = per_iter(iters, || drop(rlock.lock()));
    let nested = per_iter(iters, || {
        let _outer = rlock.lock();
        let _inner = rlock.lock();
    });
    let recursive_tm = per_iter(iters, || drop(rlock.lock_tm()));

    info!(plain, tm, recursive, nested, recursive_tm, "cycles per lock/unlock");
}

struct BurstStats {
    sent: u64,
    received: u64,
    tx_full: u64,
}

/// Top `batch` up to `burst` packets of `payload` bytes.
fn fill(port: &LoopbackPort, batch: &mut ArrayVec<Mbuf, MAX_BURST_SIZE>, burst: usize, payload: usize) {
    while batch.len() < burst {
        let Some(mut m) = port.mempool().try_alloc() else {
            break;
        };
        if let Some(buf) = m.append(payload) {
            buf.fill(0x5a);
        }
        batch.push(m);
    }
}

fn run_loopback(
    port: &LoopbackPort,
    seconds: u64,
    burst: usize,
    payload: usize,
    run: &AtomicBool,
) -> BurstStats {
    let rxq = port.rx_queue();
    let txq = port.tx_queue();
    let mut stats = BurstStats {
        sent: 0,
        received: 0,
        tx_full: 0,
    };

    let mut tx_batch: ArrayVec<Mbuf, MAX_BURST_SIZE> = ArrayVec::new();
    let mut rx_batch: ArrayVec<Mbuf, MAX_BURST_SIZE> = ArrayVec::new();
    let deadline = Deadline::after(Duration::from_secs(seconds));

    while run.load(Ordering::Relaxed) && !deadline.expired() {
        fill(port, &mut tx_batch, burst, payload);
        let sent = txq.tx(&mut tx_batch);
        if sent == 0 && !tx_batch.is_empty() {
            stats.tx_full += 1;
        }
        stats.sent += sent as u64;

        stats.received += rxq.rx(&mut rx_batch) as u64;
        rx_batch.clear();
    }

    // Whatever is still in the ring goes back to the pool.
    loop {
        let n = rxq.rx(&mut rx_batch);
        stats.received += n as u64;
        rx_batch.clear();
        if n == 0 {
            break;
        }
    }
    stats
}

fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    if args.burst == 0 || args.burst > MAX_BURST_SIZE {
        return Err(format!("--burst must be in 1..={MAX_BURST_SIZE}").into());
    }

    let mut eal = EalBuilder::new()
        .program_name("dpdk-inline-probe")
        .no_pci()
        .vdev(args.vdev.as_str())
        .core_list(args.cores.clone().unwrap_or_else(|| allowed_core_list(4)))
        .log_level(LogLevel::Warning);
    if !args.huge {
        eal = eal.no_huge();
    }
    let _eal = eal.init()?;

    report_clocks();
    report_lcores();
    report_locks(args.lock_iters);

    if args.seconds == 0 {
        return Ok(());
    }

    let port = LoopbackConfig::new()
        .mempool_name("probe_pool")
        .num_mbufs(8191)
        .cache_size(256)
        .build()?;
    match port.dev().mac_addr() {
        Ok(mac) => info!(port = port.dev().port_id(), mac = %mac, "loopback port up"),
        Err(e) => warn!(%e, "no MAC address for loopback port"),
    }

    let run = Arc::new(AtomicBool::new(true));
    let run_clone = run.clone();
    ctrlc::set_handler(move || {
        warn!("Received Ctrl+C, stopping");
        run_clone.store(false, Ordering::Release);
    })?;

    let start = rdtsc_precise();
    let stats = run_loopback(&port, args.seconds, args.burst, args.payload, &run);
    let elapsed = (rdtsc_precise() - start) as f64 / tsc_hz().max(1) as f64;

    info!(
        sent = stats.sent,
        received = stats.received,
        tx_full = stats.tx_full,
        pps = (stats.received as f64 / elapsed) as u64,
        in_use = port.mempool().in_use_count(),
        "loopback bursts"
    );
    if let Ok(dev_stats) = port.dev().stats() {
        info!(
            opackets = dev_stats.opackets,
            ipackets = dev_stats.ipackets,
            "port counters"
        );
    }
    Ok(())
}
