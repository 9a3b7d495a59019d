//! Mempool and mbuf tests.
//!
//! Allocation, accessors (data pointer, IOVA, lengths) and release of
//! pktmbufs against a real mempool. EAL is initialized once per binary.

use arrayvec::ArrayVec;
use dpdk_inline::api::rte::eal::Eal;
use dpdk_inline::api::rte::mbuf::Mbuf;
use dpdk_inline::api::rte::pktmbuf::{MemPool, MemPoolConfig};
use dpdk_inline_test::test_eal;
use std::sync::OnceLock;

static GLOBAL_EAL: OnceLock<Eal> = OnceLock::new();

fn init_eal() -> &'static Eal {
    GLOBAL_EAL.get_or_init(|| test_eal().init().expect("Failed to initialize EAL"))
}

/// Pool without per-lcore cache so the counters are exact.
fn small_pool(name: &str, n: u32) -> MemPool {
    let config = MemPoolConfig::new().num_mbufs(n).cache_size(0);
    MemPool::create(name, &config).expect("Failed to create mempool")
}

#[test]
#[serial_test::serial]
fn test_alloc_free_restores_pool() {
    let _eal = init_eal();
    let pool = small_pool("mbuf_alloc_free", 255);
    assert_eq!(pool.avail_count(), 255);
    assert_eq!(pool.in_use_count(), 0);

    let m = Mbuf::alloc(&pool).expect("pool is not empty");
    assert_eq!(pool.avail_count(), 254);
    assert_eq!(pool.in_use_count(), 1);

    // A fresh mbuf is empty with the default headroom reserved.
    assert_eq!(m.data_len(), 0);
    assert_eq!(m.pkt_len(), 0);
    assert!(m.headroom() > 0);

    m.free();
    assert_eq!(pool.avail_count(), 255);
    assert_eq!(pool.in_use_count(), 0);
}

#[test]
#[serial_test::serial]
fn test_pattern_through_data_ptr() {
    let _eal = init_eal();
    let pool = small_pool("mbuf_pattern", 63);

    let mut m = pool.try_alloc().expect("alloc");
    let len = 200usize;
    assert!(m.append(len).is_some());
    assert_eq!(m.data_len(), len);
    assert_eq!(m.pkt_len(), len);

    let base = m.data_ptr();
    unsafe {
        for i in 0..len {
            base.add(i).write((i % 251) as u8);
        }
    }
    for (i, b) in m.data().iter().enumerate() {
        assert_eq!(*b, (i % 251) as u8);
    }

    // Offset accessors agree with plain pointer arithmetic.
    assert_eq!(m.data_ptr_offset(0), base);
    assert_eq!(m.data_ptr_offset(17), unsafe { base.add(17) });
    assert_eq!(unsafe { *m.data_ptr_offset(17) }, 17);
    assert_eq!(m.iova_offset(0), m.iova());
    assert_eq!(m.iova_offset(40), m.iova() + 40);

    // Shifting the data start moves both the pointer and the IOVA.
    let iova = m.iova();
    assert!(m.adj(8));
    assert_eq!(m.data_ptr(), unsafe { base.add(8) });
    assert_eq!(m.iova(), iova + 8);
    assert_eq!(m.data_len(), len - 8);
}

#[test]
#[serial_test::serial]
fn test_repeated_alloc_write_free() {
    let _eal = init_eal();
    let n = 511u32;
    let pool = small_pool("mbuf_repeat", n);

    // More iterations than the pool holds: every buffer must come back.
    for round in 0..(n as usize * 4) {
        let mut m = pool.try_alloc().expect("pool exhausted while recycling");
        let payload = [(round & 0xff) as u8; 64];
        assert!(m.copy_from_slice(&payload));
        assert_eq!(m.data_len(), payload.len());
        assert_eq!(unsafe { *m.data_ptr() }, payload[0]);
        m.free();
    }
    assert_eq!(pool.avail_count(), n);
}

#[test]
#[serial_test::serial]
fn test_exhaustion_and_recovery() {
    let _eal = init_eal();
    let pool = small_pool("mbuf_exhaust", 63);

    let mut batch: ArrayVec<Mbuf, 128> = ArrayVec::new();
    let got = pool.fill_batch(&mut batch);
    assert_eq!(got, 63);
    assert_eq!(pool.avail_count(), 0);
    assert!(pool.try_alloc().is_none());

    // Raw pointers handed out and taken back keep the count intact.
    let raw = batch.pop().expect("non-empty").into_raw();
    assert_eq!(pool.in_use_count(), 63);
    drop(unsafe { Mbuf::from_raw(raw) });
    assert_eq!(pool.in_use_count(), 62);

    drop(batch);
    assert_eq!(pool.avail_count(), 63);
    assert!(pool.try_alloc().is_some());
}

#[test]
#[serial_test::serial]
fn test_lookup_and_data_room() {
    let _eal = init_eal();
    let config = MemPoolConfig::new().num_mbufs(127).cache_size(0);
    let pool = MemPool::create("mbuf_lookup", &config).expect("create");

    let found = MemPool::lookup("mbuf_lookup").expect("lookup");
    assert_eq!(found.as_ptr(), pool.as_ptr());
    assert_eq!(found.data_room_size(), config.data_room_size);

    let m = found.try_alloc().expect("alloc via handle");
    assert_eq!(m.capacity(), config.mbuf_capacity());
    drop(m);

    assert!(MemPool::lookup("no_such_pool").is_err());
}

#[test]
#[serial_test::serial]
fn test_head_and_tail_edits() {
    let _eal = init_eal();
    let pool = small_pool("mbuf_edit", 63);
    let mut m = pool.try_alloc().expect("alloc");
    let head = m.headroom();
    let tail = m.tailroom();
    assert_eq!(m.capacity(), tail);

    m.append(100).expect("tailroom").fill(0xaa);
    assert_eq!(m.tailroom(), tail - 100);
    let base = m.data_ptr();

    // prepend moves the start back and leaves the tail alone
    m.prepend(14).expect("headroom").fill(0x11);
    assert_eq!(m.headroom(), head - 14);
    assert_eq!(m.tailroom(), tail - 100);
    assert_eq!((m.data_len(), m.pkt_len()), (114, 114));
    assert_eq!(m.data_ptr(), unsafe { base.sub(14) });
    assert_eq!(&m.data()[..14], &[0x11; 14]);
    assert_eq!(m.data()[14], 0xaa);
    assert!(m.prepend(head).is_none());
    assert_eq!(m.data_len(), 114);

    // trim gives bytes back to the tailroom
    assert!(m.trim(4));
    assert_eq!((m.data_len(), m.pkt_len()), (110, 110));
    assert_eq!(m.tailroom(), tail - 96);
    assert!(!m.trim(111));
    assert!(!m.adj(usize::from(u16::MAX) + 1));
    assert_eq!(m.data_len(), 110);

    unsafe { m.extend(6) };
    assert_eq!((m.data_len(), m.pkt_len()), (116, 116));
    assert_eq!(m.tailroom(), tail - 102);
    unsafe { m.shrink(16) };
    assert_eq!((m.data_len(), m.pkt_len()), (100, 100));
    assert_eq!(m.tailroom(), tail - 86);

    m.as_mut()[0] = 0x7f;
    assert_eq!(m.as_ref()[0], 0x7f);
    assert_eq!(m.as_ref().len(), 100);

    m.reset();
    assert_eq!(m.data_len(), 0);
    assert_eq!(m.headroom(), head);
    assert_eq!(m.tailroom(), tail);
}

#[test]
#[serial_test::serial]
fn test_copy_from_slice_too_large() {
    let _eal = init_eal();
    let pool = small_pool("mbuf_oversize", 63);
    let mut m = pool.try_alloc().expect("alloc");
    assert!(m.copy_from_slice(&[1, 2, 3]));

    let big = vec![0u8; m.capacity() + 1];
    assert!(!m.copy_from_slice(&big));
    assert_eq!(m.data_len(), 0);
    assert!(m.data().is_empty());
}
