// Ethernet Device API
// See /usr/local/include/rte_ethdev.h
//
// Only what it takes to bring a port up for burst RX/TX: configure, queue
// setup, start/stop/close and a few queries.

use std::fmt;
use std::mem::MaybeUninit;

use dpdk_inline_sys::ffi;

use super::pktmbuf::MemPool;
use super::queue::{RxQueue, TxQueue};
use crate::api::{Result, check_rte_success};

/// Ethernet device port ID
pub type PortId = u16;

/// Queue ID for RX/TX queues
pub type QueueId = u16;

pub use ffi::rte_eth_dev_info;
pub use ffi::rte_eth_stats;

/// Port-level configuration; everything not set here stays zeroed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthConf {
    pub mtu: u32,
    /// RTE_ETH_RX_OFFLOAD_* flags
    pub rx_offloads: u64,
    /// RTE_ETH_TX_OFFLOAD_* flags
    pub tx_offloads: u64,
    /// Driver loopback mode, 0 disables it
    pub loopback_mode: u32,
}

impl Default for EthConf {
    fn default() -> Self {
        Self {
            mtu: 1500,
            rx_offloads: 0,
            tx_offloads: 0,
            loopback_mode: 0,
        }
    }
}

impl EthConf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn rx_offloads(mut self, offloads: u64) -> Self {
        self.rx_offloads = offloads;
        self
    }

    pub fn tx_offloads(mut self, offloads: u64) -> Self {
        self.tx_offloads = offloads;
        self
    }

    pub fn loopback(mut self) -> Self {
        self.loopback_mode = 1;
        self
    }

    fn to_raw(&self) -> ffi::rte_eth_conf {
        let mut conf = ffi::rte_eth_conf::default();
        conf.rxmode.mtu = self.mtu;
        conf.rxmode.offloads = self.rx_offloads;
        conf.txmode.offloads = self.tx_offloads;
        conf.lpbk_mode = self.loopback_mode;
        conf
    }
}

/// RX queue configuration
#[derive(Debug, Clone)]
pub struct RxQueueConf {
    /// Number of descriptors
    pub nb_desc: u16,
    /// Negative means "the port's socket"
    pub socket_id: i32,
    /// Driver defaults when `None`
    pub conf: Option<ffi::rte_eth_rxconf>,
}

impl Default for RxQueueConf {
    fn default() -> Self {
        Self {
            nb_desc: 1024,
            socket_id: ffi::SOCKET_ID_ANY,
            conf: None,
        }
    }
}

impl RxQueueConf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nb_desc(mut self, n: u16) -> Self {
        self.nb_desc = n;
        self
    }

    pub fn socket_id(mut self, id: i32) -> Self {
        self.socket_id = id;
        self
    }

    pub fn conf(mut self, conf: ffi::rte_eth_rxconf) -> Self {
        self.conf = Some(conf);
        self
    }
}

/// TX queue configuration
#[derive(Debug, Clone)]
pub struct TxQueueConf {
    pub nb_desc: u16,
    pub socket_id: i32,
    pub conf: Option<ffi::rte_eth_txconf>,
}

impl Default for TxQueueConf {
    fn default() -> Self {
        Self {
            nb_desc: 1024,
            socket_id: ffi::SOCKET_ID_ANY,
            conf: None,
        }
    }
}

impl TxQueueConf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nb_desc(mut self, n: u16) -> Self {
        self.nb_desc = n;
        self
    }

    pub fn socket_id(mut self, id: i32) -> Self {
        self.socket_id = id;
        self
    }

    pub fn conf(mut self, conf: ffi::rte_eth_txconf) -> Self {
        self.conf = Some(conf);
        self
    }
}

/// Ethernet address of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Handle to an ethdev port. Does not stop or close the port on drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthDev {
    port_id: PortId,
}

impl EthDev {
    /// Handle for an existing port; does not touch the device.
    pub fn new(port_id: PortId) -> Self {
        Self { port_id }
    }

    #[inline]
    pub fn port_id(&self) -> PortId {
        self.port_id
    }

    /// Number of ports probed by EAL.
    pub fn count_avail() -> u16 {
        unsafe { ffi::rte_eth_dev_count_avail() }
    }

    pub fn info(&self) -> Result<ffi::rte_eth_dev_info> {
        let mut info = MaybeUninit::<ffi::rte_eth_dev_info>::uninit();
        let ret = unsafe { ffi::rte_eth_dev_info_get(self.port_id, info.as_mut_ptr()) };
        check_rte_success(ret)?;
        Ok(unsafe { info.assume_init() })
    }

    /// NUMA socket of the device, negative if unknown.
    pub fn socket_id(&self) -> i32 {
        unsafe { ffi::rte_eth_dev_socket_id(self.port_id) }
    }

    pub fn mac_addr(&self) -> Result<MacAddr> {
        let mut addr = ffi::rte_ether_addr::default();
        let ret = unsafe { ffi::rte_eth_macaddr_get(self.port_id, &mut addr) };
        check_rte_success(ret)?;
        Ok(MacAddr(addr.addr_bytes))
    }

    pub fn stats(&self) -> Result<ffi::rte_eth_stats> {
        let mut stats = ffi::rte_eth_stats::default();
        let ret = unsafe { ffi::rte_eth_stats_get(self.port_id, &mut stats) };
        check_rte_success(ret)?;
        Ok(stats)
    }

    pub fn configure(&self, nb_rx_queues: u16, nb_tx_queues: u16, conf: &EthConf) -> Result<()> {
        let raw_conf = conf.to_raw();
        let ret = unsafe {
            ffi::rte_eth_dev_configure(self.port_id, nb_rx_queues, nb_tx_queues, &raw_conf)
        };
        check_rte_success(ret)
    }

    fn queue_socket(&self, requested: i32) -> u32 {
        if requested < 0 {
            self.socket_id() as u32
        } else {
            requested as u32
        }
    }

    pub fn rx_queue_setup(
        &self,
        queue_id: QueueId,
        mempool: &MemPool,
        conf: &RxQueueConf,
    ) -> Result<()> {
        let conf_ptr = conf.conf.as_ref().map_or(std::ptr::null(), |c| c as *const _);
        let ret = unsafe {
            ffi::rte_eth_rx_queue_setup(
                self.port_id,
                queue_id,
                conf.nb_desc,
                self.queue_socket(conf.socket_id),
                conf_ptr,
                mempool.as_ptr(),
            )
        };
        check_rte_success(ret)
    }

    pub fn tx_queue_setup(&self, queue_id: QueueId, conf: &TxQueueConf) -> Result<()> {
        let conf_ptr = conf.conf.as_ref().map_or(std::ptr::null(), |c| c as *const _);
        let ret = unsafe {
            ffi::rte_eth_tx_queue_setup(
                self.port_id,
                queue_id,
                conf.nb_desc,
                self.queue_socket(conf.socket_id),
                conf_ptr,
            )
        };
        check_rte_success(ret)
    }

    pub fn start(&self) -> Result<()> {
        let ret = unsafe { ffi::rte_eth_dev_start(self.port_id) };
        check_rte_success(ret)
    }

    pub fn stop(&self) -> Result<()> {
        let ret = unsafe { ffi::rte_eth_dev_stop(self.port_id) };
        check_rte_success(ret)
    }

    pub fn close(&self) -> Result<()> {
        let ret = unsafe { ffi::rte_eth_dev_close(self.port_id) };
        check_rte_success(ret)
    }

    /// RX handle for one of this port's queues.
    pub fn rx_queue(&self, queue_id: QueueId) -> RxQueue {
        RxQueue::new(self.port_id, queue_id)
    }

    /// TX handle for one of this port's queues.
    pub fn tx_queue(&self, queue_id: QueueId) -> TxQueue {
        TxQueue::new(self.port_id, queue_id)
    }
}

/// Configures, sets up queues on and starts a port.
///
/// ```no_run
/// use dpdk_inline::api::rte::eth::EthDevBuilder;
/// use dpdk_inline::api::rte::pktmbuf::{MemPool, MemPoolConfig};
///
/// # fn main() -> Result<(), nix::errno::Errno> {
/// let pool = MemPool::create("rx_pool", &MemPoolConfig::new())?;
/// let dev = EthDevBuilder::new(0).build(&pool)?;
/// let rxq = dev.rx_queue(0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EthDevBuilder {
    port_id: PortId,
    eth_conf: EthConf,
    nb_rx_queues: u16,
    nb_tx_queues: u16,
    rx_queue_conf: RxQueueConf,
    tx_queue_conf: TxQueueConf,
}

impl EthDevBuilder {
    /// One RX and one TX queue with driver defaults.
    pub fn new(port_id: PortId) -> Self {
        Self {
            port_id,
            eth_conf: EthConf::default(),
            nb_rx_queues: 1,
            nb_tx_queues: 1,
            rx_queue_conf: RxQueueConf::default(),
            tx_queue_conf: TxQueueConf::default(),
        }
    }

    pub fn eth_conf(mut self, conf: EthConf) -> Self {
        self.eth_conf = conf;
        self
    }

    pub fn nb_rx_queues(mut self, n: u16) -> Self {
        self.nb_rx_queues = n;
        self
    }

    pub fn nb_tx_queues(mut self, n: u16) -> Self {
        self.nb_tx_queues = n;
        self
    }

    /// Applied to every RX queue.
    pub fn rx_queue_conf(mut self, conf: RxQueueConf) -> Self {
        self.rx_queue_conf = conf;
        self
    }

    /// Applied to every TX queue.
    pub fn tx_queue_conf(mut self, conf: TxQueueConf) -> Self {
        self.tx_queue_conf = conf;
        self
    }

    /// Configure, set up every queue, then start the port.
    ///
    /// If anything fails after `configure` succeeded, the port is closed
    /// before returning, so it holds no descriptors from `mempool`. A failed
    /// `configure` leaves the port untouched.
    pub fn build(self, mempool: &MemPool) -> Result<EthDev> {
        let dev = EthDev::new(self.port_id);
        dev.configure(self.nb_rx_queues, self.nb_tx_queues, &self.eth_conf)?;

        if let Err(err) = self.setup_and_start(&dev, mempool) {
            tracing::warn!(port = self.port_id, %err, "port bring-up failed, closing");
            if let Err(e) = dev.close() {
                tracing::warn!(port = self.port_id, %e, "failed to close port");
            }
            return Err(err);
        }

        tracing::info!(
            port = self.port_id,
            rx_queues = self.nb_rx_queues,
            tx_queues = self.nb_tx_queues,
            "port started"
        );
        Ok(dev)
    }

    fn setup_and_start(&self, dev: &EthDev, mempool: &MemPool) -> Result<()> {
        for q in 0..self.nb_rx_queues {
            dev.rx_queue_setup(q, mempool, &self.rx_queue_conf)?;
        }
        for q in 0..self.nb_tx_queues {
            dev.tx_queue_setup(q, &self.tx_queue_conf)?;
        }
        dev.start()
    }
}

/// Port ids `0..count_avail()`.
pub fn iter_ports() -> impl Iterator<Item = PortId> {
    0..EthDev::count_avail()
}
