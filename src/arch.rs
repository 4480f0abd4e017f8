//! Architecture detection and compatibility ordering.
//!
//! Mirrors §4.1's construction rule: a declared or detected architecture
//! plus `noarch` (and, for a handful of arches, an explicit compatibility
//! chain) make up the pool's known-arch list. Construction fails with
//! [`SackError::Arch`] when fewer than two arches end up known.

use crate::error::{Result, SackError};

/// The architecture axis a [`crate::sack::Sack`] was built for, plus the
/// other architectures packages of that axis may satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchList {
    /// Primary (most specific) architecture, e.g. `"x86_64"`.
    pub primary: String,
    /// Ordered list of compatible architectures, most specific first,
    /// always ending in `"noarch"`.
    pub compatible: Vec<String>,
}

impl ArchList {
    /// Build the arch list for a given primary architecture.
    ///
    /// Fails with [`SackError::Arch`] if the resulting list has fewer
    /// than two entries (primary + `noarch`), which can only happen for
    /// an empty primary string.
    pub fn new(primary: &str) -> Result<Self> {
        if primary.is_empty() {
            return Err(SackError::Arch("empty architecture".into()));
        }
        let mut compatible = compat_chain(primary);
        if !compatible.iter().any(|a| a == "noarch") {
            compatible.push("noarch".to_string());
        }
        if compatible.len() < 2 {
            return Err(SackError::Arch(format!(
                "architecture '{primary}' has no known compatible arches"
            )));
        }
        Ok(ArchList {
            primary: primary.to_string(),
            compatible,
        })
    }

    /// Detect the host architecture from `uname -m`-style normalization,
    /// applying the ARM/MIPS feature promotions from §4.1.
    pub fn detect(uname_machine: &str, vfp: bool, neon: bool, little_endian: bool) -> Result<Self> {
        let primary = normalize_uname(uname_machine, vfp, neon, little_endian);
        Self::new(&primary)
    }

    /// [`ArchList::detect`] fed from the running host: `uname(2)`'s
    /// `machine` field, ARM `vfp`/`neon` sniffed from `/proc/cpuinfo` on
    /// Linux, and the compiled target's endianness. Platforms without a
    /// `uname` syscall fall back to the compiled target architecture
    /// with no feature promotion.
    pub fn detect_host() -> Result<Self> {
        let machine = host_uname_machine().unwrap_or_else(|| std::env::consts::ARCH.to_string());
        let (vfp, neon) = host_arm_features();
        Self::detect(&machine, vfp, neon, cfg!(target_endian = "little"))
    }

    /// Whether `arch` is acceptable for a solvable built for this sack.
    pub fn is_compatible(&self, arch: &str) -> bool {
        arch == "src" || self.compatible.iter().any(|a| a == arch)
    }
}

/// Apply the ARM/MIPS promotions described in §4.1 to a raw `uname -m`
/// string.
fn normalize_uname(machine: &str, vfp: bool, neon: bool, little_endian: bool) -> String {
    match machine {
        "armv6l" if vfp => "armv6hl".to_string(),
        "armv7l" if neon && vfp => "armv7hnl".to_string(),
        "armv7l" if vfp => "armv7hl".to_string(),
        "mipsel" if little_endian => "mipsel".to_string(),
        other => other.to_string(),
    }
}

/// Compatibility chain for common multilib/arch families, most specific
/// first. Unknown arches get a single-entry chain (just themselves).
fn compat_chain(primary: &str) -> Vec<String> {
    let chain: &[&str] = match primary {
        "x86_64" => &["x86_64", "athlon", "i686", "i586", "i486", "i386"],
        "i686" => &["i686", "i586", "i486", "i386"],
        "i586" => &["i586", "i486", "i386"],
        "aarch64" => &["aarch64"],
        "armv7hnl" => &["armv7hnl", "armv7hl", "armv7l", "armv6hl", "armv6l", "armv5tel"],
        "armv7hl" => &["armv7hl", "armv7l", "armv6hl", "armv6l", "armv5tel"],
        "armv6hl" => &["armv6hl", "armv6l", "armv5tel"],
        "ppc64le" => &["ppc64le"],
        "ppc64" => &["ppc64"],
        "s390x" => &["s390x"],
        other => return vec![other.to_string()],
    };
    chain.iter().map(|s| s.to_string()).collect()
}

/// `uname(2)`'s `machine` field, grounded on `rattler_virtual_packages`'s
/// own raw `extern "C" uname` binding (no `libc` dependency needed for a
/// single syscall).
#[cfg(target_os = "linux")]
fn host_uname_machine() -> Option<String> {
    use std::ffi::CStr;
    use std::mem::MaybeUninit;
    use std::os::raw::{c_char, c_int};

    #[repr(C)]
    struct Utsname {
        sysname: [c_char; 65],
        nodename: [c_char; 65],
        release: [c_char; 65],
        version: [c_char; 65],
        machine: [c_char; 65],
        domainname: [c_char; 65],
    }

    extern "C" {
        fn uname(buf: *mut Utsname) -> c_int;
    }

    let mut info = MaybeUninit::<Utsname>::uninit();
    if unsafe { uname(info.as_mut_ptr()) } != 0 {
        return None;
    }
    let info = unsafe { info.assume_init() };
    let machine = unsafe { CStr::from_ptr(info.machine.as_ptr()) };
    Some(machine.to_string_lossy().into_owned())
}

#[cfg(not(target_os = "linux"))]
fn host_uname_machine() -> Option<String> {
    None
}

/// `vfp`/`neon` from `/proc/cpuinfo`'s `Features` line, the same file
/// hawkey's own host detection reads on ARM Linux.
#[cfg(target_os = "linux")]
fn host_arm_features() -> (bool, bool) {
    let cpuinfo = match std::fs::read_to_string("/proc/cpuinfo") {
        Ok(s) => s,
        Err(_) => return (false, false),
    };
    let features = cpuinfo
        .lines()
        .find(|l| l.starts_with("Features"))
        .unwrap_or("");
    let vfp = features.split_whitespace().any(|f| f.starts_with("vfp"));
    let neon = features.split_whitespace().any(|f| f == "neon");
    (vfp, neon)
}

#[cfg(not(target_os = "linux"))]
fn host_arm_features() -> (bool, bool) {
    (false, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x86_64_includes_multilib_chain() {
        let arches = ArchList::new("x86_64").unwrap();
        assert!(arches.is_compatible("i686"));
        assert!(arches.is_compatible("noarch"));
        assert!(arches.is_compatible("src"));
        assert!(!arches.is_compatible("aarch64"));
    }

    #[test]
    fn empty_primary_fails() {
        assert!(ArchList::new("").is_err());
    }

    #[test]
    fn armv6l_with_vfp_promotes() {
        let a = ArchList::detect("armv6l", true, false, true).unwrap();
        assert_eq!(a.primary, "armv6hl");
    }

    #[test]
    fn armv7l_with_neon_and_vfp_promotes_to_hnl() {
        let a = ArchList::detect("armv7l", true, true, true).unwrap();
        assert_eq!(a.primary, "armv7hnl");
    }

    #[test]
    fn armv7l_with_vfp_only_promotes_to_hl() {
        let a = ArchList::detect("armv7l", true, false, true).unwrap();
        assert_eq!(a.primary, "armv7hl");
    }

    #[test]
    fn aarch64_has_at_least_noarch() {
        let a = ArchList::new("aarch64").unwrap();
        assert!(a.compatible.contains(&"noarch".to_string()));
    }
}
