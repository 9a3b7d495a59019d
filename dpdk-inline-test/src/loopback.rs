//! Loopback port for burst tests.
//!
//! The `net_ring` PMD created from a bare `--vdev=net_ringN` shares one
//! ring between RX and TX queue `i`, so whatever is transmitted comes back
//! on the matching RX queue.

use dpdk_inline::api::Errno;
use dpdk_inline::api::rte::eth::{EthDev, EthDevBuilder, PortId, RxQueueConf, TxQueueConf};
use dpdk_inline::api::rte::pktmbuf::{MemPool, MemPoolConfig};
use dpdk_inline::api::rte::queue::{RxQueue, TxQueue};

/// Mempool and port settings for a loopback port.
///
/// # Example
/// ```no_run
/// use dpdk_inline_test::{LoopbackConfig, test_eal, RING_VDEV};
///
/// let _eal = test_eal().vdev(RING_VDEV).init().unwrap();
/// let port = LoopbackConfig::new().mempool_name("lo_pool").build().unwrap();
/// let (rxq, txq) = (port.rx_queue(), port.tx_queue());
/// ```
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    pub mempool_name: String,
    pub num_mbufs: u32,
    pub cache_size: u32,
    pub nb_desc: u16,
    pub port_id: PortId,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            mempool_name: "loopback_pool".to_string(),
            num_mbufs: 2047,
            cache_size: 0,
            nb_desc: 512,
            port_id: 0,
        }
    }
}

impl LoopbackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mempool_name(mut self, name: impl Into<String>) -> Self {
        self.mempool_name = name.into();
        self
    }

    pub fn num_mbufs(mut self, n: u32) -> Self {
        self.num_mbufs = n;
        self
    }

    pub fn cache_size(mut self, size: u32) -> Self {
        self.cache_size = size;
        self
    }

    pub fn nb_desc(mut self, n: u16) -> Self {
        self.nb_desc = n;
        self
    }

    pub fn port_id(mut self, id: PortId) -> Self {
        self.port_id = id;
        self
    }

    /// Create the mempool and start the port with one queue pair.
    ///
    /// On error the port is already closed (see [`EthDevBuilder::build`])
    /// by the time the pool is freed.
    pub fn build(self) -> Result<LoopbackPort, Errno> {
        let pool_conf = MemPoolConfig::new()
            .num_mbufs(self.num_mbufs)
            .cache_size(self.cache_size);
        let mempool = MemPool::create(self.mempool_name.as_str(), &pool_conf)?;

        let dev = EthDevBuilder::new(self.port_id)
            .rx_queue_conf(RxQueueConf::new().nb_desc(self.nb_desc))
            .tx_queue_conf(TxQueueConf::new().nb_desc(self.nb_desc))
            .build(&mempool)?;

        Ok(LoopbackPort { dev, mempool })
    }
}

/// A started loopback port and the pool backing its RX queue.
///
/// The port is stopped and closed on drop, before the pool is freed.
pub struct LoopbackPort {
    dev: EthDev,
    mempool: MemPool,
}

impl LoopbackPort {
    pub fn dev(&self) -> &EthDev {
        &self.dev
    }

    pub fn mempool(&self) -> &MemPool {
        &self.mempool
    }

    pub fn rx_queue(&self) -> RxQueue {
        self.dev.rx_queue(0)
    }

    pub fn tx_queue(&self) -> TxQueue {
        self.dev.tx_queue(0)
    }
}

impl Drop for LoopbackPort {
    fn drop(&mut self) {
        if let Err(e) = self.dev.stop() {
            tracing::warn!(port = self.dev.port_id(), %e, "failed to stop port");
        }
        if let Err(e) = self.dev.close() {
            tracing::warn!(port = self.dev.port_id(), %e, "failed to close port");
        }
    }
}
