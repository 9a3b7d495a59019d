//! Cycle counter and timer tests.
//!
//! Frequencies are calibrated by EAL init, so these live here rather than
//! in the library's unit tests.

use dpdk_inline::api::rte::cycles::{
    Deadline, delay_us, rdtsc_precise, timer_cycles, timer_hz, tsc_cycles, tsc_hz,
};
use dpdk_inline::api::rte::eal::Eal;
use dpdk_inline::api::rte::spinlock::SpinLock;
use dpdk_inline_test::test_eal;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static GLOBAL_EAL: OnceLock<Eal> = OnceLock::new();

fn init_eal() -> &'static Eal {
    GLOBAL_EAL.get_or_init(|| test_eal().init().expect("Failed to initialize EAL"))
}

#[test]
#[serial_test::serial]
fn test_frequencies_are_positive_and_stable() {
    let _eal = init_eal();
    let hz = timer_hz();
    assert!(hz > 0);
    for _ in 0..10 {
        assert_eq!(timer_hz(), hz);
    }
    assert!(tsc_hz() > 0);
}

#[test]
#[serial_test::serial]
fn test_counters_advance() {
    let _eal = init_eal();
    let t0 = timer_cycles();
    let c0 = tsc_cycles();
    delay_us(2_000);
    let t1 = timer_cycles();
    let c1 = rdtsc_precise();

    assert!(t1 > t0);
    assert!(c1 > c0);
    // 2ms of busy wait is at least 1ms on the timer clock.
    assert!(t1 - t0 >= timer_hz() / 1_000);
}

#[test]
#[serial_test::serial]
fn test_deadline_expires() {
    let _eal = init_eal();
    let started = Instant::now();
    let deadline = Deadline::after(Duration::from_millis(20));
    assert!(!deadline.expired());

    let got: Option<()> = deadline.poll(|| None);
    assert_eq!(got, None);
    assert!(deadline.expired());
    assert!(started.elapsed() >= Duration::from_millis(10));
}

#[test]
#[serial_test::serial]
fn test_try_lock_for_times_out_while_held() {
    let _eal = init_eal();
    let lock = SpinLock::new();
    let guard = lock.lock();

    std::thread::scope(|s| {
        let waited = s
            .spawn(|| {
                let started = Instant::now();
                let got = lock.try_lock_for(Duration::from_millis(20));
                assert!(got.is_none());
                started.elapsed()
            })
            .join()
            .unwrap();
        assert!(waited >= Duration::from_millis(10));
    });

    drop(guard);
    assert!(lock.try_lock_for(Duration::from_millis(20)).is_some());
}
