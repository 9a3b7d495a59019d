//! Lcore (logical core) APIs.
//!
//! DPDK lcores are EAL-managed threads pinned to CPU cores. Besides the
//! usual queries (id, socket, role, state) each lcore exposes its affinity
//! mask as a [`CpuSet`], and closures can be launched on worker lcores.
//!
//! # Example
//!
//! ```no_run
//! use dpdk_inline::api::rte::lcore::Lcore;
//!
//! let main = Lcore::main();
//! println!("main lcore {} runs on {}", main.id(), main.cpuset());
//!
//! for worker in Lcore::workers() {
//!     worker.launch(|| 0).unwrap();
//! }
//! Lcore::wait_all_workers();
//! ```

use dpdk_inline_sys::ffi;
use std::ffi::c_void;
use std::sync::Arc;

use super::cpuset::CpuSet;
use crate::Result;

pub use ffi::LCORE_ID_ANY;

/// Role of an lcore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Role {
    Rte = 0,
    Off = 1,
    Service = 2,
    /// Registered non-EAL thread.
    NonEal = 3,
}

impl TryFrom<u32> for Role {
    type Error = ();

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Rte),
            1 => Ok(Self::Off),
            2 => Ok(Self::Service),
            3 => Ok(Self::NonEal),
            _ => Err(()),
        }
    }
}

/// State of an lcore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum State {
    /// Waiting for a new command
    Wait = 0,
    Running = 1,
    /// Done, result not yet collected
    Finished = 2,
}

impl From<i32> for State {
    fn from(value: i32) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Finished,
            _ => Self::Wait,
        }
    }
}

/// Handle to an enabled lcore. Just an id; `Copy`, `Send` and `Sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lcore {
    id: u32,
}

impl Lcore {
    /// `None` if the id is out of range or the lcore is not enabled.
    pub fn from_id(id: u32) -> Option<Self> {
        if id < ffi::RTE_MAX_LCORE && unsafe { ffi::rte_lcore_is_enabled(id) != 0 } {
            Some(Self { id })
        } else {
            None
        }
    }

    /// The calling thread's lcore, `None` on unregistered non-EAL threads.
    pub fn current() -> Option<Self> {
        let id = unsafe { ffi::rust_rte_lcore_id() };
        if id == LCORE_ID_ANY {
            None
        } else {
            Some(Self { id })
        }
    }

    /// The lcore that called `rte_eal_init()`.
    pub fn main() -> Self {
        Self {
            id: unsafe { ffi::rust_rte_get_main_lcore() },
        }
    }

    /// All enabled lcores, main included.
    pub fn all() -> LcoreIter {
        LcoreIter {
            current: u32::MAX,
            skip_main: false,
        }
    }

    /// Enabled lcores except main.
    pub fn workers() -> LcoreIter {
        LcoreIter {
            current: u32::MAX,
            skip_main: true,
        }
    }

    pub fn count() -> u32 {
        unsafe { ffi::rte_lcore_count() }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.id == unsafe { ffi::rust_rte_get_main_lcore() }
    }

    #[inline]
    pub fn role(&self) -> Role {
        let role = unsafe { ffi::rte_eal_lcore_role(self.id) };
        Role::try_from(role as u32).unwrap_or(Role::Off)
    }

    #[inline]
    pub fn socket_id(&self) -> u32 {
        unsafe { ffi::rte_lcore_to_socket_id(self.id) }
    }

    /// First physical CPU of the lcore, if known.
    #[inline]
    pub fn cpu_id(&self) -> Option<i32> {
        let cpu = unsafe { ffi::rte_lcore_to_cpu_id(self.id as i32) };
        if cpu < 0 { None } else { Some(cpu) }
    }

    /// CPUs this lcore is allowed to run on (`rte_lcore_cpuset`).
    pub fn cpuset(&self) -> CpuSet {
        CpuSet::from_raw(unsafe { ffi::rte_lcore_cpuset(self.id) })
    }

    #[inline]
    pub fn state(&self) -> State {
        let state = unsafe { ffi::rte_eal_get_lcore_state(self.id) };
        State::from(state as i32)
    }

    /// Run `f` on this lcore's thread. The lcore must be in [`State::Wait`].
    pub fn launch<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        unsafe extern "C" fn trampoline<F>(arg: *mut c_void) -> i32
        where
            F: FnOnce() -> i32 + Send,
        {
            let func = unsafe { Box::from_raw(arg as *mut F) };
            func()
        }

        let arg = Box::into_raw(Box::new(f)) as *mut c_void;
        let ret = unsafe { ffi::rte_eal_remote_launch(Some(trampoline::<F>), arg, self.id) };
        if ret == 0 {
            Ok(())
        } else {
            // Not launched, so the closure is still ours.
            unsafe { drop(Box::from_raw(arg as *mut F)) };
            tracing::warn!(lcore = self.id, ret, "rte_eal_remote_launch failed");
            Err(format!("failed to launch on lcore {}: error {}", self.id, ret).into())
        }
    }

    /// Block until the lcore is idle again; returns the launched
    /// function's return value.
    pub fn wait(&self) -> i32 {
        unsafe { ffi::rte_eal_wait_lcore(self.id) }
    }

    /// [`launch`](Self::launch) followed by [`wait`](Self::wait).
    pub fn run<F>(&self, f: F) -> Result<i32>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        self.launch(f)?;
        Ok(self.wait())
    }

    /// Wait for every worker lcore (`rte_eal_mp_wait_lcore`).
    pub fn wait_all_workers() {
        unsafe { ffi::rte_eal_mp_wait_lcore() };
    }

    /// Launch `f` on every worker lcore, passing it the lcore it runs on.
    pub fn launch_on_workers<F>(f: F) -> Result<()>
    where
        F: Fn(Lcore) -> i32 + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        for worker in Self::workers() {
            let f = f.clone();
            worker.launch(move || f(worker))?;
        }
        Ok(())
    }
}

/// Iterator over enabled lcores, in id order.
pub struct LcoreIter {
    current: u32,
    skip_main: bool,
}

impl Iterator for LcoreIter {
    type Item = Lcore;

    fn next(&mut self) -> Option<Self::Item> {
        let next = unsafe { ffi::rte_get_next_lcore(self.current, self.skip_main as i32, 0) };
        if next >= ffi::RTE_MAX_LCORE {
            None
        } else {
            self.current = next;
            Some(Lcore { id: next })
        }
    }
}
