//! DPDK spinlocks.
//!
//! See: /usr/local/include/rte_spinlock.h
//!
//! Two lock families are exposed: [`SpinLock`] (`rte_spinlock_t`) and
//! [`RecursiveSpinLock`] (`rte_spinlock_recursive_t`). Locking returns a
//! guard; dropping the guard unlocks through the same path that locked.
//!
//! # Transactional paths
//!
//! `lock_tm` / `try_lock_tm` first try to run the critical section as a
//! hardware memory transaction with the lock elided, and fall back to the
//! plain spinlock when the transaction cannot start or aborts (including
//! on CPUs without TM, see [`tm_supported`]). Code between a TM lock and
//! its guard drop may therefore run transactionally: `is_locked()` can read
//! `false` from inside it, and system calls abort the transaction (which
//! restarts the section on the spinlock path). The plain `lock`/`try_lock`
//! always take the spinlock.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use dpdk_inline_sys::ffi;

use super::cycles::Deadline;

/// Whether the CPU supports hardware transactional memory
/// (`rte_tm_supported`).
#[inline]
pub fn tm_supported() -> bool {
    unsafe { ffi::rust_tm_supported() != 0 }
}

/// Which unlock a guard has to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Path {
    Plain,
    Tm,
}

/// Guards are tied to the locking thread.
type NotSend = PhantomData<*const ()>;

/// `rte_spinlock_t`.
///
/// ```no_run
/// use dpdk_inline::api::rte::spinlock::SpinLock;
///
/// let lock = SpinLock::new();
/// {
///     let _guard = lock.lock();
///     assert!(lock.is_locked());
/// }
/// assert!(!lock.is_locked());
/// ```
pub struct SpinLock {
    raw: UnsafeCell<ffi::rte_spinlock_t>,
}

// The lock word is only touched through DPDK's atomic primitives.
unsafe impl Send for SpinLock {}
unsafe impl Sync for SpinLock {}

impl SpinLock {
    /// A new, unlocked spinlock (`rte_spinlock_init`).
    pub fn new() -> Self {
        let lock = Self {
            raw: UnsafeCell::new(ffi::rte_spinlock_t::default()),
        };
        unsafe { ffi::rust_spinlock_init(lock.raw.get()) };
        lock
    }

    /// Raw pointer for handing the lock to C code.
    #[inline]
    pub fn as_ptr(&self) -> *mut ffi::rte_spinlock_t {
        self.raw.get()
    }

    /// Spin until the lock is taken (`rte_spinlock_lock`).
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_> {
        unsafe { ffi::rust_spinlock_lock(self.as_ptr()) };
        SpinLockGuard::new(self, Path::Plain)
    }

    /// Take the lock if it is free (`rte_spinlock_trylock`).
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_>> {
        if unsafe { ffi::rust_spinlock_trylock(self.as_ptr()) } != 0 {
            Some(SpinLockGuard::new(self, Path::Plain))
        } else {
            None
        }
    }

    /// Retry [`SpinLock::try_lock`] until it succeeds or `timeout` elapses
    /// on the EAL timer clock.
    ///
    /// Needs EAL to be initialised for the timer frequency; before that
    /// the lock is tried exactly once.
    pub fn try_lock_for(&self, timeout: Duration) -> Option<SpinLockGuard<'_>> {
        Deadline::after(timeout).poll(|| self.try_lock())
    }

    /// Lock, eliding it in a memory transaction when possible
    /// (`rte_spinlock_lock_tm`).
    #[inline]
    pub fn lock_tm(&self) -> SpinLockGuard<'_> {
        unsafe { ffi::rust_spinlock_lock_tm(self.as_ptr()) };
        SpinLockGuard::new(self, Path::Tm)
    }

    /// Non-blocking variant of [`SpinLock::lock_tm`]
    /// (`rte_spinlock_trylock_tm`).
    #[inline]
    pub fn try_lock_tm(&self) -> Option<SpinLockGuard<'_>> {
        if unsafe { ffi::rust_spinlock_trylock_tm(self.as_ptr()) } != 0 {
            Some(SpinLockGuard::new(self, Path::Tm))
        } else {
            None
        }
    }

    /// Whether the lock word is set (`rte_spinlock_is_locked`).
    #[inline]
    pub fn is_locked(&self) -> bool {
        unsafe { ffi::rust_spinlock_is_locked(self.as_ptr()) != 0 }
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpinLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Held [`SpinLock`]; unlocks on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SpinLockGuard<'a> {
    lock: &'a SpinLock,
    path: Path,
    _not_send: NotSend,
}

impl<'a> SpinLockGuard<'a> {
    fn new(lock: &'a SpinLock, path: Path) -> Self {
        Self {
            lock,
            path,
            _not_send: PhantomData,
        }
    }

    /// Release the lock now.
    #[inline]
    pub fn unlock(self) {
        drop(self)
    }
}

impl Drop for SpinLockGuard<'_> {
    fn drop(&mut self) {
        match self.path {
            Path::Plain => unsafe { ffi::rust_spinlock_unlock(self.lock.as_ptr()) },
            Path::Tm => unsafe { ffi::rust_spinlock_unlock_tm(self.lock.as_ptr()) },
        }
    }
}

/// `rte_spinlock_recursive_t`: a spinlock the owning thread may take
/// again.
///
/// The state is (owner thread id, depth). Each successful lock by the
/// owner adds one to the depth and each guard drop removes one; the lock
/// is released when the depth returns to zero.
pub struct RecursiveSpinLock {
    raw: UnsafeCell<ffi::rte_spinlock_recursive_t>,
}

unsafe impl Send for RecursiveSpinLock {}
unsafe impl Sync for RecursiveSpinLock {}

impl RecursiveSpinLock {
    /// A new, unowned lock (`rte_spinlock_recursive_init`).
    pub fn new() -> Self {
        let lock = Self {
            raw: UnsafeCell::new(ffi::rte_spinlock_recursive_t::default()),
        };
        unsafe { ffi::rust_spinlock_recursive_init(lock.raw.get()) };
        lock
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut ffi::rte_spinlock_recursive_t {
        self.raw.get()
    }

    /// Take the lock, or deepen it if this thread already owns it
    /// (`rte_spinlock_recursive_lock`).
    #[inline]
    pub fn lock(&self) -> RecursiveSpinLockGuard<'_> {
        unsafe { ffi::rust_spinlock_recursive_lock(self.as_ptr()) };
        RecursiveSpinLockGuard::new(self, Path::Plain)
    }

    /// `rte_spinlock_recursive_trylock`. Always succeeds for the owner.
    #[inline]
    pub fn try_lock(&self) -> Option<RecursiveSpinLockGuard<'_>> {
        if unsafe { ffi::rust_spinlock_recursive_trylock(self.as_ptr()) } != 0 {
            Some(RecursiveSpinLockGuard::new(self, Path::Plain))
        } else {
            None
        }
    }

    /// `rte_spinlock_recursive_lock_tm`; see the module docs.
    #[inline]
    pub fn lock_tm(&self) -> RecursiveSpinLockGuard<'_> {
        unsafe { ffi::rust_spinlock_recursive_lock_tm(self.as_ptr()) };
        RecursiveSpinLockGuard::new(self, Path::Tm)
    }

    /// `rte_spinlock_recursive_trylock_tm`.
    #[inline]
    pub fn try_lock_tm(&self) -> Option<RecursiveSpinLockGuard<'_>> {
        if unsafe { ffi::rust_spinlock_recursive_trylock_tm(self.as_ptr()) } != 0 {
            Some(RecursiveSpinLockGuard::new(self, Path::Tm))
        } else {
            None
        }
    }

    /// Thread id (`rte_gettid`) of the owner, if any.
    #[inline]
    pub fn owner(&self) -> Option<i32> {
        let user = unsafe { ffi::rust_spinlock_recursive_owner(self.as_ptr()) };
        (user != -1).then_some(user)
    }

    /// Current recursion depth; 0 when unowned.
    #[inline]
    pub fn depth(&self) -> u32 {
        unsafe { ffi::rust_spinlock_recursive_depth(self.as_ptr()) as u32 }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.depth() > 0
    }

    /// Whether the calling thread is the owner.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner() == Some(current_tid())
    }
}

impl Default for RecursiveSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecursiveSpinLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveSpinLock")
            .field("owner", &self.owner())
            .field("depth", &self.depth())
            .finish()
    }
}

/// One level of a held [`RecursiveSpinLock`].
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct RecursiveSpinLockGuard<'a> {
    lock: &'a RecursiveSpinLock,
    path: Path,
    _not_send: NotSend,
}

impl<'a> RecursiveSpinLockGuard<'a> {
    fn new(lock: &'a RecursiveSpinLock, path: Path) -> Self {
        Self {
            lock,
            path,
            _not_send: PhantomData,
        }
    }

    /// Drop one level of the lock now.
    #[inline]
    pub fn unlock(self) {
        drop(self)
    }
}

impl Drop for RecursiveSpinLockGuard<'_> {
    fn drop(&mut self) {
        match self.path {
            Path::Plain => unsafe { ffi::rust_spinlock_recursive_unlock(self.lock.as_ptr()) },
            Path::Tm => unsafe { ffi::rust_spinlock_recursive_unlock_tm(self.lock.as_ptr()) },
        }
    }
}

/// Thread id as DPDK records it in recursive locks (`rte_gettid`).
#[inline]
pub fn current_tid() -> i32 {
    unsafe { ffi::rust_gettid() }
}

/// Data protected by a [`SpinLock`].
pub struct SpinMutex<T> {
    lock: SpinLock,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinMutex<T> {}
unsafe impl<T: Send> Sync for SpinMutex<T> {}

impl<T> SpinMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            lock: SpinLock::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        let guard = self.lock.lock();
        SpinMutexGuard {
            _guard: guard,
            data: unsafe { &mut *self.data.get() },
        }
    }

    pub fn try_lock(&self) -> Option<SpinMutexGuard<'_, T>> {
        let guard = self.lock.try_lock()?;
        Some(SpinMutexGuard {
            _guard: guard,
            data: unsafe { &mut *self.data.get() },
        })
    }

    /// Lock through the transactional path.
    pub fn lock_tm(&self) -> SpinMutexGuard<'_, T> {
        let guard = self.lock.lock_tm();
        SpinMutexGuard {
            _guard: guard,
            data: unsafe { &mut *self.data.get() },
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for SpinMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct SpinMutexGuard<'a, T> {
    _guard: SpinLockGuard<'a>,
    data: &'a mut T,
}

impl<T> Deref for SpinMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.data
    }
}

impl<T> DerefMut for SpinMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.data
    }
}
