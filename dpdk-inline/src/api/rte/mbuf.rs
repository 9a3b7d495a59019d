//! Owned packet buffers.
//!
//! Forwards the inline `rte_pktmbuf_*` accessors (see `rte_mbuf.h` and
//! `rte_mbuf_core.h`). Only single-segment use is covered: lengths and
//! offsets refer to the first segment, and `pkt_len` is kept in step with
//! `data_len` by the editing helpers.

use std::ffi::c_char;
use std::ptr::NonNull;
use std::slice;

use dpdk_inline_sys::ffi;

use super::pktmbuf::MemPool;

/// IO (bus) address of mbuf data, as seen by the NIC.
pub type Iova = u64;

/// An owned DPDK packet buffer.
///
/// `Mbuf` is move-only: allocation hands ownership to the caller, and
/// dropping (or [`Mbuf::free`]) returns the buffer to its pool exactly once.
/// Handing the buffer to the NIC goes through [`Mbuf::into_raw`] or the TX
/// queue helpers, which forget the handle instead of freeing it.
pub struct Mbuf {
    inner: NonNull<ffi::rte_mbuf>,
}

// One owner at a time; the owner may live on any lcore.
unsafe impl Send for Mbuf {}

/// Lengths the 16-bit segment fields can carry.
#[inline]
fn seg_len(len: usize) -> Option<u16> {
    u16::try_from(len).ok()
}

impl Mbuf {
    /// Take ownership of `ptr`. `None` for null.
    ///
    /// # Safety
    /// `ptr` must be an mbuf nobody else frees: typically one produced by
    /// [`Mbuf::into_raw`] or filled in by `rte_eth_rx_burst`.
    #[inline]
    pub unsafe fn from_raw(ptr: *mut ffi::rte_mbuf) -> Option<Self> {
        NonNull::new(ptr).map(|inner| Mbuf { inner })
    }

    /// One buffer from `mempool`, empty with the pool's headroom reserved.
    /// `None` once the pool is exhausted.
    #[inline]
    pub fn alloc(mempool: &MemPool) -> Option<Self> {
        unsafe { Self::from_raw(ffi::rust_pktmbuf_alloc(mempool.as_ptr())) }
    }

    /// Return the buffer to its pool.
    ///
    /// Same as dropping it; spelled out for call sites that want the
    /// release to be visible.
    #[inline]
    pub fn free(self) {
        drop(self)
    }

    /// The underlying `rte_mbuf`. Ownership stays with `self`.
    #[inline]
    pub fn as_ptr(&self) -> *mut ffi::rte_mbuf {
        self.inner.as_ptr()
    }

    /// Give up ownership without freeing; pair with [`Mbuf::from_raw`] or
    /// hand the pointer to a driver that frees it.
    #[inline]
    pub fn into_raw(self) -> *mut ffi::rte_mbuf {
        let ptr = self.inner.as_ptr();
        std::mem::forget(self);
        ptr
    }

    /// Address of the first payload byte (`rte_pktmbuf_mtod`).
    #[inline]
    pub fn data_ptr(&self) -> *mut u8 {
        unsafe { ffi::rust_pktmbuf_mtod(self.as_ptr()) as *mut u8 }
    }

    /// Payload address advanced by `offset` bytes (`rte_pktmbuf_mtod_offset`).
    ///
    /// No bounds check; compare against [`Mbuf::data_len`] before
    /// dereferencing.
    #[inline]
    pub fn data_ptr_offset(&self, offset: u32) -> *mut u8 {
        unsafe { ffi::rust_pktmbuf_mtod_offset(self.as_ptr(), offset) as *mut u8 }
    }

    /// IO address of the first payload byte (`rte_pktmbuf_iova`).
    ///
    /// Only meaningful for DMA when the pool memory is IOVA-contiguous.
    #[inline]
    pub fn iova(&self) -> Iova {
        unsafe { ffi::rust_pktmbuf_iova(self.as_ptr()) }
    }

    /// IO address advanced by `offset` bytes (`rte_pktmbuf_iova_offset`).
    #[inline]
    pub fn iova_offset(&self, offset: u32) -> Iova {
        unsafe { ffi::rust_pktmbuf_iova_offset(self.as_ptr(), offset) }
    }

    /// Payload bytes in this segment.
    #[inline]
    pub fn data_len(&self) -> usize {
        unsafe { ffi::rust_pktmbuf_data_len(self.as_ptr()) as usize }
    }

    /// Payload bytes across the whole chain.
    #[inline]
    pub fn pkt_len(&self) -> usize {
        unsafe { ffi::rust_pktmbuf_pkt_len(self.as_ptr()) as usize }
    }

    /// Free bytes in front of the payload.
    #[inline]
    pub fn headroom(&self) -> usize {
        unsafe { ffi::rust_pktmbuf_headroom(self.as_ptr()) as usize }
    }

    /// Free bytes behind the payload.
    #[inline]
    pub fn tailroom(&self) -> usize {
        unsafe { ffi::rust_pktmbuf_tailroom(self.as_ptr()) as usize }
    }

    /// Largest payload the segment can hold without moving its start.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data_len() + self.tailroom()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        let (ptr, len) = (self.data_ptr(), self.data_len());
        if ptr.is_null() || len == 0 {
            return &[];
        }
        unsafe { slice::from_raw_parts(ptr, len) }
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        let (ptr, len) = (self.data_ptr(), self.data_len());
        if ptr.is_null() || len == 0 {
            return &mut [];
        }
        unsafe { slice::from_raw_parts_mut(ptr, len) }
    }

    /// Region of `len` bytes returned by append/prepend, `None` on null.
    #[inline]
    fn region(&mut self, ptr: *mut c_char, len: u16) -> Option<&mut [u8]> {
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { slice::from_raw_parts_mut(ptr as *mut u8, len as usize) })
        }
    }

    /// Grow the payload at the tail by `len` bytes and return the new bytes
    /// (uninitialised contents). `None` if the tailroom is too small.
    #[inline]
    pub fn append(&mut self, len: usize) -> Option<&mut [u8]> {
        let len = seg_len(len)?;
        let ptr = unsafe { ffi::rust_pktmbuf_append(self.as_ptr(), len) };
        self.region(ptr, len)
    }

    /// Grow the payload at the head by `len` bytes and return the new bytes.
    /// `None` if the headroom is too small.
    #[inline]
    pub fn prepend(&mut self, len: usize) -> Option<&mut [u8]> {
        let len = seg_len(len)?;
        let ptr = unsafe { ffi::rust_pktmbuf_prepend(self.as_ptr(), len) };
        self.region(ptr, len)
    }

    /// Drop `len` bytes from the head; the data pointer and IOVA move
    /// forward. `false` (and no change) if `len > data_len`.
    #[inline]
    pub fn adj(&mut self, len: usize) -> bool {
        let Some(len) = seg_len(len) else {
            return false;
        };
        !unsafe { ffi::rust_pktmbuf_adj(self.as_ptr(), len) }.is_null()
    }

    /// Drop `len` bytes from the tail. `false` (and no change) if
    /// `len > data_len`.
    #[inline]
    pub fn trim(&mut self, len: usize) -> bool {
        let Some(len) = seg_len(len) else {
            return false;
        };
        unsafe { ffi::rust_pktmbuf_trim(self.as_ptr(), len) == 0 }
    }

    /// Back to the freshly allocated layout: no payload, default headroom.
    #[inline]
    pub fn reset(&mut self) {
        unsafe { ffi::rust_pktmbuf_reset(self.as_ptr()) }
    }

    #[inline]
    unsafe fn set_lens(&mut self, data_len: usize, pkt_len: usize) {
        unsafe {
            ffi::rust_pktmbuf_set_data_len(self.as_ptr(), data_len as u16);
            ffi::rust_pktmbuf_set_pkt_len(self.as_ptr(), pkt_len as u32);
        }
    }

    /// Claim `len` bytes of tailroom as payload without initialising them,
    /// e.g. after writing through [`Mbuf::data_ptr_offset`].
    ///
    /// # Safety
    /// `len` must not exceed [`Mbuf::tailroom`].
    #[inline]
    pub unsafe fn extend(&mut self, len: usize) {
        let (data_len, pkt_len) = (self.data_len() + len, self.pkt_len() + len);
        unsafe { self.set_lens(data_len, pkt_len) }
    }

    /// Give `len` payload bytes back to the tailroom.
    ///
    /// # Safety
    /// `len` must not exceed [`Mbuf::data_len`].
    #[inline]
    pub unsafe fn shrink(&mut self, len: usize) {
        let data_len = self.data_len().saturating_sub(len);
        let pkt_len = self.pkt_len().saturating_sub(len);
        unsafe { self.set_lens(data_len, pkt_len) }
    }

    /// Replace the payload with `data`. `false` if it does not fit, in which
    /// case the buffer is left empty.
    pub fn copy_from_slice(&mut self, data: &[u8]) -> bool {
        self.reset();
        match self.append(data.len()) {
            Some(buf) => {
                buf.copy_from_slice(data);
                true
            }
            None => false,
        }
    }
}

impl Drop for Mbuf {
    fn drop(&mut self) {
        unsafe { ffi::rust_pktmbuf_free(self.as_ptr()) }
    }
}

impl AsRef<[u8]> for Mbuf {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl AsMut<[u8]> for Mbuf {
    fn as_mut(&mut self) -> &mut [u8] {
        self.data_mut()
    }
}

impl std::fmt::Debug for Mbuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mbuf")
            .field("data_len", &self.data_len())
            .field("pkt_len", &self.pkt_len())
            .field("headroom", &self.headroom())
            .field("tailroom", &self.tailroom())
            .field("iova", &format_args!("{:#x}", self.iova()))
            .finish()
    }
}
