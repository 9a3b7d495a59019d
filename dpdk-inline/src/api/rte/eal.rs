// rte EAL (Environment Abstraction Layer) API
// See: /usr/local/include/rte_eal.h
//
// The inline primitives in this crate need very little from EAL, but the
// timer frequency, lcore threads, mempools and ports all exist only after
// `rte_eal_init()`.

use std::ffi::{CString, c_char};
use std::sync::atomic::{AtomicBool, Ordering};

use dpdk_inline_sys::ffi;
use nix::errno::Errno;

/// Set while an [`Eal`] guard is alive.
static EAL_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// EAL command-line options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EalOption {
    /// --no-huge
    NoHuge,
    /// --no-pci
    NoPci,
    /// --in-memory
    InMemory,
    /// --vdev=<device>
    Vdev(String),
    /// -l <list>, e.g. "0-3" or "0,2,4"
    CoreList(String),
    /// -c <hex mask>
    CoreMask(String),
    /// -m <MB>
    Memory(u32),
    /// --file-prefix=<prefix>
    FilePrefix(String),
    /// --log-level=<level>
    LogLevel(LogLevel),
    /// Passed through unchanged.
    Custom(String),
}

impl EalOption {
    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            EalOption::NoHuge => args.push("--no-huge".into()),
            EalOption::NoPci => args.push("--no-pci".into()),
            EalOption::InMemory => args.push("--in-memory".into()),
            EalOption::Vdev(dev) => args.push(format!("--vdev={dev}")),
            EalOption::CoreList(list) => args.extend(["-l".into(), list.clone()]),
            EalOption::CoreMask(mask) => args.extend(["-c".into(), mask.clone()]),
            EalOption::Memory(mb) => args.extend(["-m".into(), mb.to_string()]),
            EalOption::FilePrefix(prefix) => args.push(format!("--file-prefix={prefix}")),
            EalOption::LogLevel(level) => args.push(format!("--log-level={}", level.as_u8())),
            EalOption::Custom(arg) => args.push(arg.clone()),
        }
    }
}

/// DPDK log levels (syslog numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    fn as_u8(self) -> u8 {
        match self {
            LogLevel::Emergency => 1,
            LogLevel::Alert => 2,
            LogLevel::Critical => 3,
            LogLevel::Error => 4,
            LogLevel::Warning => 5,
            LogLevel::Notice => 6,
            LogLevel::Info => 7,
            LogLevel::Debug => 8,
        }
    }
}

/// Builder for EAL initialization options.
///
/// # Example
/// ```no_run
/// use dpdk_inline::api::rte::eal::{EalBuilder, LogLevel};
///
/// fn main() -> Result<(), nix::errno::Errno> {
///     let _eal = EalBuilder::new()
///         .no_huge()
///         .no_pci()
///         .vdev("net_ring0")
///         .log_level(LogLevel::Warning)
///         .init()?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct EalBuilder {
    program_name: Option<String>,
    options: Vec<EalOption>,
}

impl EalBuilder {
    /// Program name is taken from `std::env::args()` unless set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = Some(name.into());
        self
    }

    pub fn no_huge(self) -> Self {
        self.option(EalOption::NoHuge)
    }

    pub fn no_pci(self) -> Self {
        self.option(EalOption::NoPci)
    }

    pub fn in_memory(self) -> Self {
        self.option(EalOption::InMemory)
    }

    pub fn vdev(self, device: impl Into<String>) -> Self {
        self.option(EalOption::Vdev(device.into()))
    }

    pub fn core_list(self, list: impl Into<String>) -> Self {
        self.option(EalOption::CoreList(list.into()))
    }

    pub fn core_mask(self, mask: impl Into<String>) -> Self {
        self.option(EalOption::CoreMask(mask.into()))
    }

    /// Memory to preallocate, in MB (-m).
    pub fn memory_mb(self, mb: u32) -> Self {
        self.option(EalOption::Memory(mb))
    }

    /// Needed to run several primary processes side by side.
    pub fn file_prefix(self, prefix: impl Into<String>) -> Self {
        self.option(EalOption::FilePrefix(prefix.into()))
    }

    pub fn log_level(self, level: LogLevel) -> Self {
        self.option(EalOption::LogLevel(level))
    }

    pub fn option(mut self, opt: EalOption) -> Self {
        self.options.push(opt);
        self
    }

    /// Raw argument, passed through unchanged.
    pub fn arg(self, arg: impl Into<String>) -> Self {
        self.option(EalOption::Custom(arg.into()))
    }

    fn build_args(&self) -> Vec<String> {
        let program_name = self.program_name.clone().unwrap_or_else(|| {
            std::env::args()
                .next()
                .unwrap_or_else(|| "dpdk-inline".to_string())
        });
        let mut args = vec![program_name];
        for opt in &self.options {
            opt.push_args(&mut args);
        }
        args
    }

    /// Initialize EAL with the configured options.
    pub fn init(self) -> crate::api::Result<Eal> {
        Eal::init(self.build_args())
    }
}

/// RAII guard for the EAL environment; `rte_eal_cleanup()` runs on drop.
///
/// EAL cannot be initialised again in the same process after cleanup, so
/// tests keep one guard alive for the whole binary.
#[derive(Debug)]
pub struct Eal {
    _private: (),
}

impl Eal {
    /// Initialize EAL from a full argument vector (program name first).
    ///
    /// # Errors
    /// `EALREADY` if a guard is already alive, `EINVAL` if an argument
    /// contains a NUL byte, otherwise `rte_errno` from `rte_eal_init`.
    pub fn init<I, S>(args: I) -> crate::api::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args = args
            .into_iter()
            .map(|s| CString::new(s.as_ref()).map_err(|_| Errno::EINVAL))
            .collect::<Result<Vec<_>, _>>()?;

        if EAL_INITIALIZED.swap(true, Ordering::SeqCst) {
            return Err(Errno::EALREADY);
        }

        tracing::info!(args = ?args, "initializing EAL");

        let argc = args.len() as i32;
        let mut argv: Vec<*mut c_char> = args.iter().map(|s| s.as_ptr() as *mut c_char).collect();
        argv.push(std::ptr::null_mut());

        let ret = unsafe { ffi::rte_eal_init(argc, argv.as_mut_ptr()) };
        if ret < 0 {
            EAL_INITIALIZED.store(false, Ordering::SeqCst);
            let err = crate::api::rte_errno();
            tracing::warn!(%err, "EAL initialization failed");
            return Err(err);
        }

        Ok(Eal { _private: () })
    }

    pub fn is_initialized() -> bool {
        EAL_INITIALIZED.load(Ordering::SeqCst)
    }
}

impl Drop for Eal {
    fn drop(&mut self) {
        let ret = unsafe { ffi::rte_eal_cleanup() };
        if ret != 0 {
            tracing::warn!(ret, "rte_eal_cleanup failed");
        }
        EAL_INITIALIZED.store(false, Ordering::SeqCst);
    }
}
