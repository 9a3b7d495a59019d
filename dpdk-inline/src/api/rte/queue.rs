// RX/TX burst API
// See: /usr/local/include/rte_ethdev.h

use arrayvec::ArrayVec;
use dpdk_inline_sys::ffi;

use super::eth::{PortId, QueueId};
use super::mbuf::Mbuf;

/// Maximum burst size for RX/TX operations
pub const MAX_BURST_SIZE: usize = 64;

/// Receive up to `pkts.len()` packets into `pkts` (`rte_eth_rx_burst`).
///
/// Returns the number of slots filled, never more than the slice length
/// (capped at `u16::MAX`). Zero means the queue was empty.
///
/// # Safety
/// `port_id`/`queue_id` must name a started RX queue that only the calling
/// thread polls. The caller takes ownership of every returned mbuf.
#[inline]
pub unsafe fn rx_burst(port_id: PortId, queue_id: QueueId, pkts: &mut [*mut ffi::rte_mbuf]) -> u16 {
    let nb_pkts = pkts.len().min(u16::MAX as usize) as u16;
    if nb_pkts == 0 {
        return 0;
    }
    unsafe { ffi::rust_eth_rx_burst(port_id, queue_id, pkts.as_mut_ptr(), nb_pkts) }
}

/// Hand up to `pkts.len()` packets to the NIC (`rte_eth_tx_burst`).
///
/// Returns how many leading entries were accepted; ownership of those
/// passes to the driver, the rest stay with the caller. Zero means the
/// queue was full.
///
/// # Safety
/// Every entry must be an owned, valid mbuf and the queue must be started
/// and only used by the calling thread.
#[inline]
pub unsafe fn tx_burst(port_id: PortId, queue_id: QueueId, pkts: &mut [*mut ffi::rte_mbuf]) -> u16 {
    let nb_pkts = pkts.len().min(u16::MAX as usize) as u16;
    if nb_pkts == 0 {
        return 0;
    }
    unsafe { ffi::rust_eth_tx_burst(port_id, queue_id, pkts.as_mut_ptr(), nb_pkts) }
}

/// RX Queue handle for receiving packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxQueue {
    port_id: PortId,
    queue_id: QueueId,
}

impl RxQueue {
    /// Create a new RX queue handle.
    ///
    /// Note: The queue must already be set up via `EthDev::rx_queue_setup()`.
    #[inline]
    pub fn new(port_id: PortId, queue_id: QueueId) -> Self {
        Self { port_id, queue_id }
    }

    /// Get the port ID
    #[inline]
    pub fn port_id(&self) -> PortId {
        self.port_id
    }

    /// Get the queue ID
    #[inline]
    pub fn queue_id(&self) -> QueueId {
        self.queue_id
    }

    /// Receive a burst of packets into the provided buffer.
    ///
    /// Returns the number of packets received.
    /// Packets are appended to the `mbufs` vector (up to its remaining
    /// capacity, at most [`MAX_BURST_SIZE`] per call).
    #[inline]
    pub fn rx<const N: usize>(&self, mbufs: &mut ArrayVec<Mbuf, N>) -> usize {
        let want = mbufs.remaining_capacity().min(MAX_BURST_SIZE);
        if want == 0 {
            return 0;
        }

        let mut raw_mbufs: [*mut ffi::rte_mbuf; MAX_BURST_SIZE] =
            [std::ptr::null_mut(); MAX_BURST_SIZE];

        let received =
            unsafe { rx_burst(self.port_id, self.queue_id, &mut raw_mbufs[..want]) } as usize;

        for raw_mbuf in raw_mbufs.iter().take(received) {
            if let Some(mbuf) = unsafe { Mbuf::from_raw(*raw_mbuf) } {
                // capacity was reserved above
                mbufs.push(mbuf);
            }
        }

        received
    }

    /// Receive a burst of packets, returning them as a new ArrayVec.
    #[inline]
    pub fn rx_burst<const N: usize>(&self) -> ArrayVec<Mbuf, N> {
        let mut mbufs = ArrayVec::new();
        self.rx(&mut mbufs);
        mbufs
    }
}

/// TX Queue handle for transmitting packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxQueue {
    port_id: PortId,
    queue_id: QueueId,
}

impl TxQueue {
    /// Create a new TX queue handle.
    ///
    /// Note: The queue must already be set up via `EthDev::tx_queue_setup()`.
    #[inline]
    pub fn new(port_id: PortId, queue_id: QueueId) -> Self {
        Self { port_id, queue_id }
    }

    /// Get the port ID
    #[inline]
    pub fn port_id(&self) -> PortId {
        self.port_id
    }

    /// Get the queue ID
    #[inline]
    pub fn queue_id(&self) -> QueueId {
        self.queue_id
    }

    /// Transmit a burst of packets from the provided buffer.
    ///
    /// Successfully transmitted packets are removed from the front of `mbufs`.
    /// Returns the number of packets transmitted.
    ///
    /// Packets that are successfully transmitted are freed by DPDK once the
    /// NIC is done with them. Packets that fail to transmit remain in the
    /// buffer.
    #[inline]
    pub fn tx<const N: usize>(&self, mbufs: &mut ArrayVec<Mbuf, N>) -> usize {
        let nb_pkts = mbufs.len().min(MAX_BURST_SIZE);
        if nb_pkts == 0 {
            return 0;
        }

        let mut raw_mbufs: [*mut ffi::rte_mbuf; MAX_BURST_SIZE] =
            [std::ptr::null_mut(); MAX_BURST_SIZE];
        for (slot, mbuf) in raw_mbufs.iter_mut().zip(mbufs.iter()) {
            *slot = mbuf.as_ptr();
        }

        let sent =
            unsafe { tx_burst(self.port_id, self.queue_id, &mut raw_mbufs[..nb_pkts]) } as usize;

        // The driver owns the sent mbufs now.
        for mbuf in mbufs.drain(..sent) {
            let _ = mbuf.into_raw();
        }

        sent
    }

    /// Transmit a single packet.
    ///
    /// On success the mbuf is consumed by DPDK and `None` is returned.
    /// On failure the mbuf is handed back.
    #[inline]
    pub fn tx_one(&self, mbuf: Mbuf) -> Option<Mbuf> {
        let mut raw_mbuf = [mbuf.as_ptr()];

        let sent = unsafe { tx_burst(self.port_id, self.queue_id, &mut raw_mbuf) };

        if sent == 1 {
            let _ = mbuf.into_raw();
            None
        } else {
            Some(mbuf)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_creation() {
        let rxq = RxQueue::new(0, 1);
        assert_eq!(rxq.port_id(), 0);
        assert_eq!(rxq.queue_id(), 1);

        let txq = TxQueue::new(2, 3);
        assert_eq!(txq.port_id(), 2);
        assert_eq!(txq.queue_id(), 3);
    }

    #[test]
    fn test_empty_bursts_skip_the_driver() {
        // Port 999 is never configured; an empty request must not reach it.
        let mut none: [*mut ffi::rte_mbuf; 0] = [];
        assert_eq!(unsafe { rx_burst(999, 0, &mut none) }, 0);
        assert_eq!(unsafe { tx_burst(999, 0, &mut none) }, 0);

        let mut full: ArrayVec<Mbuf, 0> = ArrayVec::new();
        assert_eq!(RxQueue::new(999, 0).rx(&mut full), 0);
        assert_eq!(TxQueue::new(999, 0).tx(&mut full), 0);
    }
}
