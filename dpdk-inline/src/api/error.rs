pub type Errno = nix::errno::Errno;

/// Result type alias using nix's Errno for DPDK operations
pub type Result<T> = std::result::Result<T, Errno>;

/// Read the calling thread's `rte_errno`.
pub fn rte_errno() -> Errno {
    let num = unsafe { dpdk_inline_sys::ffi::rust_get_rte_errno() };
    Errno::from_raw(num)
}

pub fn check_rte_success(ret: i32) -> Result<()> {
    if ret < 0 { Err(rte_errno()) } else { Ok(()) }
}

/// DPDK's description of an error number.
///
/// Covers the DPDK specific codes in rte_errno.h (E_RTE_SECONDARY,
/// E_RTE_NO_CONFIG) as well as plain errno values.
pub fn rte_strerror(errnum: i32) -> String {
    unsafe {
        let c_str = dpdk_inline_sys::ffi::rte_strerror(errnum);
        if c_str.is_null() {
            return "Unknown error".to_string();
        }
        std::ffi::CStr::from_ptr(c_str)
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_rte_success() {
        assert!(check_rte_success(0).is_ok());
        assert!(check_rte_success(7).is_ok());
        assert!(check_rte_success(-1).is_err());
    }

    #[test]
    fn test_rte_strerror() {
        assert_eq!(rte_strerror(Errno::EINVAL as i32), Errno::EINVAL.desc());
        // E_RTE_SECONDARY, the first code past RTE_MIN_ERRNO
        let msg = rte_strerror(1001);
        assert!(msg.contains("secondary process"), "{msg}");
    }
}
