//! CPU affinity masks.
//!
//! [`CpuSet`] wraps `rte_cpuset_t` (glibc `cpu_set_t`); every bit operation
//! forwards to the matching `CPU_*` macro through the C shim. Indices are
//! not range-checked here: outside `0..CpuSet::CAPACITY` the macros ignore
//! writes and report the bit as unset.

use std::ffi::c_int;
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign};
use std::str::FromStr;

use dpdk_inline_sys::ffi;

use crate::api::{Errno, Result, check_rte_success};

/// Fixed-width set of logical CPU indices.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct CpuSet {
    raw: ffi::rte_cpuset_t,
}

impl CpuSet {
    /// Number of CPU indices the mask can hold (`CPU_SETSIZE`).
    pub const CAPACITY: usize = std::mem::size_of::<ffi::rte_cpuset_t>() * 8;

    /// An empty mask.
    pub fn new() -> Self {
        let mut set = Self {
            raw: ffi::rte_cpuset_t::default(),
        };
        set.zero();
        set
    }

    /// Wrap a raw mask.
    #[inline]
    pub fn from_raw(raw: ffi::rte_cpuset_t) -> Self {
        Self { raw }
    }

    #[inline]
    pub fn as_raw(&self) -> &ffi::rte_cpuset_t {
        &self.raw
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut ffi::rte_cpuset_t {
        &mut self.raw
    }

    /// Indices past `c_int::MAX` stay out of range rather than wrapping.
    #[inline]
    fn index(cpu: usize) -> c_int {
        c_int::try_from(cpu).unwrap_or(c_int::MAX)
    }

    /// Clear every bit (`CPU_ZERO`).
    #[inline]
    pub fn zero(&mut self) {
        unsafe { ffi::rust_cpu_zero(&mut self.raw) }
    }

    /// Add `cpu` to the mask (`CPU_SET`).
    #[inline]
    pub fn set(&mut self, cpu: usize) {
        unsafe { ffi::rust_cpu_set(Self::index(cpu), &mut self.raw) }
    }

    /// Remove `cpu` from the mask (`CPU_CLR`).
    #[inline]
    pub fn clear(&mut self, cpu: usize) {
        unsafe { ffi::rust_cpu_clr(Self::index(cpu), &mut self.raw) }
    }

    /// Whether `cpu` is in the mask (`CPU_ISSET`).
    #[inline]
    pub fn is_set(&self, cpu: usize) -> bool {
        unsafe { ffi::rust_cpu_isset(Self::index(cpu), &self.raw) != 0 }
    }

    /// Number of CPUs in the mask (`CPU_COUNT`).
    #[inline]
    pub fn count(&self) -> usize {
        unsafe { ffi::rust_cpu_count(&self.raw) as usize }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Intersection (`CPU_AND`).
    pub fn and(&self, other: &CpuSet) -> CpuSet {
        let mut dst = CpuSet::new();
        unsafe { ffi::rust_cpu_and(&mut dst.raw, &self.raw, &other.raw) };
        dst
    }

    /// Union (`CPU_OR`).
    pub fn or(&self, other: &CpuSet) -> CpuSet {
        let mut dst = CpuSet::new();
        unsafe { ffi::rust_cpu_or(&mut dst.raw, &self.raw, &other.raw) };
        dst
    }

    /// Symmetric difference (`CPU_XOR`).
    pub fn xor(&self, other: &CpuSet) -> CpuSet {
        let mut dst = CpuSet::new();
        unsafe { ffi::rust_cpu_xor(&mut dst.raw, &self.raw, &other.raw) };
        dst
    }

    /// Iterate over the CPU indices in the mask, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::CAPACITY).filter(move |&cpu| self.is_set(cpu))
    }

    /// Affinity of the calling thread as tracked by EAL
    /// (`rte_thread_get_affinity`).
    pub fn current_thread() -> Self {
        let mut set = CpuSet::new();
        unsafe { ffi::rte_thread_get_affinity(&mut set.raw) };
        set
    }

    /// Pin the calling thread to this mask (`rte_thread_set_affinity`).
    ///
    /// Also updates the EAL per-thread cpuset and socket id.
    pub fn bind_current_thread(&self) -> Result<()> {
        let mut raw = self.raw;
        let ret = unsafe { ffi::rte_thread_set_affinity(&mut raw) };
        check_rte_success(ret).inspect_err(|err| {
            tracing::warn!(cpus = %self, %err, "failed to set thread affinity");
        })
    }

    /// Render as a DPDK/Linux core list, e.g. `0-3,6`.
    ///
    /// Suitable for `EalBuilder::core_list`.
    pub fn to_list_string(&self) -> String {
        let mut out = String::new();
        let mut iter = self.iter().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }
            if !out.is_empty() {
                out.push(',');
            }
            if start == end {
                out.push_str(&start.to_string());
            } else {
                out.push_str(&format!("{start}-{end}"));
            }
        }
        out
    }
}

impl Default for CpuSet {
    fn default() -> Self {
        Self::new()
    }
}

/// `CPU_EQUAL`
impl PartialEq for CpuSet {
    fn eq(&self, other: &Self) -> bool {
        unsafe { ffi::rust_cpu_equal(&self.raw, &other.raw) != 0 }
    }
}

impl Eq for CpuSet {}

impl BitAnd for CpuSet {
    type Output = CpuSet;
    fn bitand(self, rhs: CpuSet) -> CpuSet {
        self.and(&rhs)
    }
}

impl BitOr for CpuSet {
    type Output = CpuSet;
    fn bitor(self, rhs: CpuSet) -> CpuSet {
        self.or(&rhs)
    }
}

impl BitXor for CpuSet {
    type Output = CpuSet;
    fn bitxor(self, rhs: CpuSet) -> CpuSet {
        self.xor(&rhs)
    }
}

impl BitAndAssign for CpuSet {
    fn bitand_assign(&mut self, rhs: CpuSet) {
        *self = self.and(&rhs);
    }
}

impl BitOrAssign for CpuSet {
    fn bitor_assign(&mut self, rhs: CpuSet) {
        *self = self.or(&rhs);
    }
}

impl BitXorAssign for CpuSet {
    fn bitxor_assign(&mut self, rhs: CpuSet) {
        *self = self.xor(&rhs);
    }
}

impl FromIterator<usize> for CpuSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = CpuSet::new();
        for cpu in iter {
            set.set(cpu);
        }
        set
    }
}

impl Extend<usize> for CpuSet {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        for cpu in iter {
            self.set(cpu);
        }
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_list_string())
    }
}

impl fmt::Debug for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Parse a core list such as `0-3,6,8-9`.
impl FromStr for CpuSet {
    type Err = Errno;

    fn from_str(s: &str) -> Result<Self> {
        let mut set = CpuSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (start, end) = match part.split_once('-') {
                Some((a, b)) => (parse_cpu(a)?, parse_cpu(b)?),
                None => {
                    let cpu = parse_cpu(part)?;
                    (cpu, cpu)
                }
            };
            if start > end {
                return Err(Errno::EINVAL);
            }
            set.extend(start..=end);
        }
        Ok(set)
    }
}

fn parse_cpu(s: &str) -> Result<usize> {
    let cpu: usize = s.trim().parse().map_err(|_| Errno::EINVAL)?;
    if cpu >= CpuSet::CAPACITY {
        return Err(Errno::ERANGE);
    }
    Ok(cpu)
}

impl From<&nix::sched::CpuSet> for CpuSet {
    fn from(set: &nix::sched::CpuSet) -> Self {
        let width = nix::sched::CpuSet::count().min(CpuSet::CAPACITY);
        (0..width)
            .filter(|&cpu| set.is_set(cpu).unwrap_or(false))
            .collect()
    }
}

impl From<&CpuSet> for nix::sched::CpuSet {
    fn from(set: &CpuSet) -> Self {
        let mut out = nix::sched::CpuSet::new();
        for cpu in set.iter() {
            // nix rejects indices past its own width; those bits are dropped.
            let _ = out.set(cpu);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_then_count() {
        let mut set: CpuSet = [1, 2, 3].into_iter().collect();
        assert_eq!(set.count(), 3);
        set.zero();
        assert_eq!(set.count(), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_set_and_clear() {
        let mut set = CpuSet::new();
        for cpu in [0, 1, 63, 64, CpuSet::CAPACITY - 1] {
            set.set(cpu);
            assert!(set.is_set(cpu), "cpu {cpu} should be set");
            set.clear(cpu);
            assert!(!set.is_set(cpu), "cpu {cpu} should be cleared");
        }
    }

    #[test]
    fn test_count_distinct_indices() {
        let mut set = CpuSet::new();
        let cpus = [0, 5, 17, 100, 511];
        for (k, cpu) in cpus.iter().enumerate() {
            set.set(*cpu);
            assert_eq!(set.count(), k + 1);
        }
        // setting an index twice does not change the count
        set.set(5);
        assert_eq!(set.count(), cpus.len());
        assert_eq!(set.iter().collect::<Vec<_>>(), cpus);
    }

    #[test]
    fn test_out_of_range_index_is_ignored() {
        let mut set = CpuSet::new();
        set.set(CpuSet::CAPACITY);
        set.set(usize::MAX);
        assert_eq!(set.count(), 0);
        assert!(!set.is_set(CpuSet::CAPACITY));
    }

    #[test]
    fn test_index_past_c_int_does_not_wrap() {
        let wide = (1usize << 32) + 3;
        let mut set = CpuSet::new();
        set.set(wide);
        assert_eq!(set.count(), 0);
        assert!(!set.is_set(3));
        assert!(!set.is_set(wide));

        set.set(3);
        set.clear(wide);
        assert!(set.is_set(3));
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn test_and_or_xor() {
        let a: CpuSet = [0, 1, 2, 8].into_iter().collect();
        let b: CpuSet = [2, 3, 8, 9].into_iter().collect();

        assert_eq!(a.and(&b), [2, 8].into_iter().collect::<CpuSet>());
        assert_eq!(a.or(&b), [0, 1, 2, 3, 8, 9].into_iter().collect::<CpuSet>());
        assert_eq!(a.xor(&b), [0, 1, 3, 9].into_iter().collect::<CpuSet>());

        let mut c = a;
        c &= b;
        assert_eq!(c, a & b);
        c |= a;
        assert_eq!(c, a);
        c ^= a;
        assert!(c.is_empty());
    }

    #[test]
    fn test_equality() {
        let a: CpuSet = [4, 5].into_iter().collect();
        let mut b = CpuSet::new();
        assert_ne!(a, b);
        b.set(5);
        b.set(4);
        assert_eq!(a, b);
        assert_eq!(CpuSet::new(), CpuSet::default());
    }

    #[test]
    fn test_list_string_round_trip() {
        let set: CpuSet = "0-3, 6,8-9".parse().unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), [0, 1, 2, 3, 6, 8, 9]);
        assert_eq!(set.to_list_string(), "0-3,6,8-9");
        assert_eq!(set.to_string(), "0-3,6,8-9");
        assert_eq!(CpuSet::new().to_list_string(), "");
    }

    #[test]
    fn test_list_parse_errors() {
        assert_eq!("3-1".parse::<CpuSet>(), Err(Errno::EINVAL));
        assert_eq!("x".parse::<CpuSet>(), Err(Errno::EINVAL));
        assert_eq!(
            format!("{}", CpuSet::CAPACITY).parse::<CpuSet>(),
            Err(Errno::ERANGE)
        );
    }

    #[test]
    fn test_nix_conversion() {
        let os = nix::sched::sched_getaffinity(nix::unistd::Pid::from_raw(0)).unwrap();
        let set = CpuSet::from(&os);
        assert!(set.count() >= 1);

        let back = nix::sched::CpuSet::from(&set);
        for cpu in set.iter() {
            assert!(back.is_set(cpu).unwrap());
        }
    }
}
