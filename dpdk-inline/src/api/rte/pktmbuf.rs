// pktmbuf pool API
// See: /usr/local/include/rte_mbuf.h
// and /usr/local/include/rte_mempool.h

use std::ffi::CString;
use std::ptr::NonNull;

use arrayvec::ArrayVec;
use dpdk_inline_sys::ffi;

use super::mbuf::Mbuf;

/// Wrapper for DPDK rte_mempool for packet mbufs (owning)
pub struct MemPool {
    inner: NonNull<ffi::rte_mempool>,
}

// DPDK mempools are thread-safe
unsafe impl Send for MemPool {}
unsafe impl Sync for MemPool {}

/// Non-owning reference to a DPDK mempool.
///
/// Returned by [`MemPool::lookup`] and [`MemPool::handle`]; does NOT free
/// the pool when dropped.
#[derive(Clone, Copy)]
pub struct MemPoolRef {
    inner: NonNull<ffi::rte_mempool>,
}

unsafe impl Send for MemPoolRef {}
unsafe impl Sync for MemPoolRef {}

impl MemPoolRef {
    /// Get the raw pointer to the underlying rte_mempool
    #[inline]
    pub fn as_ptr(&self) -> *mut ffi::rte_mempool {
        self.inner.as_ptr()
    }

    /// Try to allocate an mbuf from this pool.
    ///
    /// Returns `None` if the pool is exhausted.
    #[inline]
    pub fn try_alloc(&self) -> Option<Mbuf> {
        let ptr = unsafe { ffi::rust_pktmbuf_alloc(self.inner.as_ptr()) };
        unsafe { Mbuf::from_raw(ptr) }
    }

    /// Fill a batch of mbufs up to the remaining capacity of the ArrayVec.
    ///
    /// Stops early when the pool runs dry. Returns the number of mbufs
    /// allocated.
    #[inline]
    pub fn fill_batch<const N: usize>(&self, batch: &mut ArrayVec<Mbuf, N>) -> usize {
        let mut count = 0;
        while !batch.is_full() {
            match self.try_alloc() {
                Some(mbuf) => {
                    batch.push(mbuf);
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Number of free objects in the pool (cache included).
    #[inline]
    pub fn avail_count(&self) -> u32 {
        unsafe { ffi::rte_mempool_avail_count(self.inner.as_ptr()) }
    }

    /// Number of objects currently handed out.
    #[inline]
    pub fn in_use_count(&self) -> u32 {
        unsafe { ffi::rte_mempool_in_use_count(self.inner.as_ptr()) }
    }

    /// Data room size (headroom included) of mbufs in this pool.
    #[inline]
    pub fn data_room_size(&self) -> u16 {
        unsafe { ffi::rust_pktmbuf_data_room_size(self.inner.as_ptr()) }
    }
}

/// Configuration for creating a MemPool
#[derive(Debug, Clone)]
pub struct MemPoolConfig {
    /// Number of mbufs in the pool (optimum: 2^q - 1)
    pub num_mbufs: u32,
    /// Per-core cache size (0 to disable caching)
    pub cache_size: u32,
    /// Private area size between rte_mbuf struct and data buffer
    pub priv_size: u16,
    /// Data room size including RTE_PKTMBUF_HEADROOM
    pub data_room_size: u16,
    /// NUMA socket ID (-1 for SOCKET_ID_ANY)
    pub socket_id: i32,
}

impl Default for MemPoolConfig {
    fn default() -> Self {
        Self {
            num_mbufs: 8191, // 2^13 - 1
            cache_size: 256,
            priv_size: 0,
            data_room_size: (ffi::RTE_MBUF_DEFAULT_DATAROOM + ffi::RTE_PKTMBUF_HEADROOM) as u16,
            socket_id: ffi::SOCKET_ID_ANY,
        }
    }
}

impl MemPoolConfig {
    /// Create a new MemPoolConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of mbufs in the pool.
    ///
    /// Optimum value is 2^q - 1 (e.g., 8191, 16383, 32767).
    pub fn num_mbufs(mut self, n: u32) -> Self {
        self.num_mbufs = n;
        self
    }

    /// Set the per-core cache size.
    ///
    /// Set to 0 to disable caching. Should be less than num_mbufs / 1.5.
    pub fn cache_size(mut self, size: u32) -> Self {
        self.cache_size = size;
        self
    }

    /// Set the private area size between rte_mbuf struct and data buffer.
    pub fn priv_size(mut self, size: u16) -> Self {
        self.priv_size = size;
        self
    }

    /// Set the data room size (including RTE_PKTMBUF_HEADROOM).
    pub fn data_room_size(mut self, size: u16) -> Self {
        self.data_room_size = size;
        self
    }

    /// Set the NUMA socket ID.
    pub fn socket_id(mut self, id: i32) -> Self {
        self.socket_id = id;
        self
    }

    /// Usable bytes per mbuf once the default headroom is reserved.
    pub fn mbuf_capacity(&self) -> usize {
        (self.data_room_size as usize).saturating_sub(ffi::RTE_PKTMBUF_HEADROOM as usize)
    }
}

impl MemPool {
    /// Create a new pktmbuf mempool
    pub fn create<S>(name: S, config: &MemPoolConfig) -> crate::api::Result<Self>
    where
        S: Into<Vec<u8>>,
    {
        let c_name = CString::new(name).map_err(|_| nix::errno::Errno::EINVAL)?;
        let ptr = unsafe {
            ffi::rte_pktmbuf_pool_create(
                c_name.as_ptr(),
                config.num_mbufs,
                config.cache_size,
                config.priv_size,
                config.data_room_size,
                config.socket_id,
            )
        };
        match NonNull::new(ptr) {
            Some(inner) => {
                tracing::debug!(name = ?c_name, ?config, "created pktmbuf pool");
                Ok(MemPool { inner })
            }
            None => {
                let err = crate::api::rte_errno();
                tracing::warn!(name = ?c_name, %err, "pktmbuf pool creation failed");
                Err(err)
            }
        }
    }

    /// Lookup an existing mempool by name.
    ///
    /// The returned reference does not keep the pool alive; the owning
    /// `MemPool` must outlive it.
    pub fn lookup<S>(name: S) -> crate::api::Result<MemPoolRef>
    where
        S: Into<Vec<u8>>,
    {
        let c_name = CString::new(name).map_err(|_| nix::errno::Errno::EINVAL)?;
        let ptr = unsafe { ffi::rte_mempool_lookup(c_name.as_ptr()) };
        NonNull::new(ptr)
            .map(|inner| MemPoolRef { inner })
            .ok_or_else(crate::api::rte_errno)
    }

    /// Non-owning handle to this pool.
    #[inline]
    pub fn handle(&self) -> MemPoolRef {
        MemPoolRef { inner: self.inner }
    }

    /// Get the raw pointer to the underlying rte_mempool
    #[inline]
    pub fn as_ptr(&self) -> *mut ffi::rte_mempool {
        self.inner.as_ptr()
    }

    /// Get the number of available (free) objects in the pool
    #[inline]
    pub fn avail_count(&self) -> u32 {
        self.handle().avail_count()
    }

    /// Number of objects currently handed out.
    #[inline]
    pub fn in_use_count(&self) -> u32 {
        self.handle().in_use_count()
    }

    /// Try to allocate an mbuf from this pool.
    ///
    /// Returns `None` if the pool is exhausted.
    #[inline]
    pub fn try_alloc(&self) -> Option<Mbuf> {
        Mbuf::alloc(self)
    }

    /// Fill a batch of mbufs up to the remaining capacity of the ArrayVec.
    ///
    /// Allocates as many mbufs as possible until either:
    /// - The ArrayVec is full
    /// - The pool is exhausted
    ///
    /// Returns the number of mbufs allocated.
    #[inline]
    pub fn fill_batch<const N: usize>(&self, batch: &mut ArrayVec<Mbuf, N>) -> usize {
        self.handle().fill_batch(batch)
    }

    /// Get the data room size for mbufs in this pool.
    #[inline]
    pub fn data_room_size(&self) -> u16 {
        self.handle().data_room_size()
    }
}

impl Drop for MemPool {
    fn drop(&mut self) {
        unsafe {
            ffi::rte_mempool_free(self.inner.as_ptr());
        }
    }
}

impl std::fmt::Debug for MemPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemPool")
            .field("avail", &self.avail_count())
            .field("in_use", &self.in_use_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = MemPoolConfig::new()
            .num_mbufs(1023)
            .cache_size(0)
            .data_room_size(1024 + ffi::RTE_PKTMBUF_HEADROOM as u16)
            .socket_id(0);
        assert_eq!(config.num_mbufs, 1023);
        assert_eq!(config.cache_size, 0);
        assert_eq!(config.socket_id, 0);
        assert_eq!(config.mbuf_capacity(), 1024);
    }

    #[test]
    fn test_default_config_capacity() {
        let config = MemPoolConfig::default();
        assert_eq!(config.mbuf_capacity(), ffi::RTE_MBUF_DEFAULT_DATAROOM as usize);
        assert_eq!(config.socket_id, -1);
    }
}
