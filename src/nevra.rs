//! NEVRA parsing: name-epoch-version-release-arch, and the `Subject`
//! possibilities iterator built on top of it.
//!
//! Grounded on `hawkey/src/subject_internal.c`'s `nevra_form_regex` table
//! and `hawkey/src/nevra.c`'s comparison/rendering rules.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use std::sync::OnceLock;

use crate::evr::rpmvercmp;

/// Which of the five NEVRA forms a string was parsed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NevraForm {
    /// `name-[epoch:]ver-rel.arch`
    Nevra,
    /// `name-[epoch:]ver-rel`
    Nevr,
    /// `name-[epoch:]ver`
    Nev,
    /// `name.arch`
    Na,
    /// `name`
    Name,
}

impl fmt::Display for NevraForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NevraForm::Nevra => "NEVRA",
            NevraForm::Nevr => "NEVR",
            NevraForm::Nev => "NEV",
            NevraForm::Na => "NA",
            NevraForm::Name => "NAME",
        };
        write!(f, "{s}")
    }
}

/// The most-specific-first form order used when the caller does not pin
/// down a single form (`HY_FORMS_MOST_SPEC`).
pub const FORMS_MOST_SPEC: &[NevraForm] = &[
    NevraForm::Nevra,
    NevraForm::Nevr,
    NevraForm::Nev,
    NevraForm::Na,
    NevraForm::Name,
];

/// The "real" (reality-checked) form order, biased toward common user
/// intent (`HY_FORMS_REAL`): name-or-name.arch guesses are tried before
/// the more specific forms.
pub const FORMS_REAL: &[NevraForm] = &[
    NevraForm::Na,
    NevraForm::Name,
    NevraForm::Nevra,
    NevraForm::Nev,
    NevraForm::Nevr,
];

/// A parsed name-epoch-version-release-arch tuple.
///
/// `epoch` is `None` when absent; absent strings compare less than any
/// present string in [`Nevra::cmp`] (open question (a): the reference
/// implementation's epoch-only-then-unreachable-loop bug is not
/// reproduced here — all four remaining fields participate).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Nevra {
    /// Package name.
    pub name: String,
    /// Epoch, absent meaning unset (not the same as `0`).
    pub epoch: Option<u32>,
    /// Version component.
    pub version: Option<String>,
    /// Release component.
    pub release: Option<String>,
    /// Architecture component.
    pub arch: Option<String>,
}

fn str_cmp(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(y),
    }
}

fn evr_str_cmp(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => rpmvercmp(x, y),
    }
}

impl Nevra {
    /// Order by `(epoch, name, version, release, arch)`, absent epoch
    /// comparing as less than any present epoch, absent strings comparing
    /// less than any present string, version/release compared via
    /// [`rpmvercmp`].
    pub fn cmp(&self, other: &Nevra) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| evr_str_cmp(&self.version, &other.version))
            .then_with(|| evr_str_cmp(&self.release, &other.release))
            .then_with(|| str_cmp(&self.arch, &other.arch))
    }

    /// Render `"[epoch:]version-release"`, omitting the epoch prefix when
    /// absent — matches `hy_nevra_get_evr`. Missing version/release
    /// render as empty strings.
    pub fn evr_string(&self) -> String {
        let version = self.version.as_deref().unwrap_or("");
        let release = self.release.as_deref().unwrap_or("");
        match self.epoch {
            Some(epoch) => format!("{epoch}:{version}-{release}"),
            None => format!("{version}-{release}"),
        }
    }

    /// Build the structured [`crate::evr::Evr`] for this NEVRA's version
    /// triple, treating an absent version/release as empty (matches
    /// [`Nevra::evr_string`]'s rendering of the same fields).
    pub fn evr(&self) -> crate::evr::Evr {
        crate::evr::Evr {
            epoch: self.epoch,
            version: self.version.clone().unwrap_or_default(),
            release: self.release.clone().unwrap_or_default(),
        }
    }

    /// Render the full `name-[epoch:]version-release.arch` string; only
    /// meaningful when every field is present (form `NEVRA`).
    pub fn to_nevra_string(&self) -> String {
        let mut s = self.name.clone();
        if self.version.is_some() || self.release.is_some() {
            s.push('-');
            s.push_str(&self.evr_string());
        }
        if let Some(arch) = &self.arch {
            s.push('.');
            s.push_str(arch);
        }
        s
    }

    /// Parse a string against one specific form's regex.
    pub fn parse_form(s: &str, form: NevraForm) -> Option<Nevra> {
        let caps = regex_for(form).captures(s)?;
        let name = caps.name("name")?.as_str().to_string();
        let epoch = caps
            .name("epoch")
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<u32>().ok());
        let version = caps.name("version").map(|m| m.as_str().to_string());
        let release = caps.name("release").map(|m| m.as_str().to_string());
        let arch = caps.name("arch").map(|m| m.as_str().to_string());
        Some(Nevra {
            name,
            epoch,
            version,
            release,
            arch,
        })
    }

    /// Try every form in `forms` (most-specific first by default),
    /// returning the first successful parse along with its form.
    pub fn parse_possibilities(s: &str, forms: &[NevraForm]) -> Vec<(Nevra, NevraForm)> {
        forms
            .iter()
            .filter_map(|&form| Nevra::parse_form(s, form).map(|n| (n, form)))
            .collect()
    }
}

fn regex_for(form: NevraForm) -> &'static Regex {
    // Named groups, one regex per form (`nevra_form_regex` in
    // `subject_internal.c`): name is always captured; epoch/version/
    // release/arch are only present in the groups a given form has.
    static NEVRA: OnceLock<Regex> = OnceLock::new();
    static NEVR: OnceLock<Regex> = OnceLock::new();
    static NEV: OnceLock<Regex> = OnceLock::new();
    static NA: OnceLock<Regex> = OnceLock::new();
    static NAME: OnceLock<Regex> = OnceLock::new();
    match form {
        NevraForm::Nevra => NEVRA.get_or_init(|| {
            Regex::new(
                r"^(?P<name>[^:]+)-((?P<epoch>[0-9]+):)?(?P<version>[^-:]+)-(?P<release>[^-:]+)\.(?P<arch>[^.:]+)$",
            )
            .unwrap()
        }),
        NevraForm::Nevr => NEVR.get_or_init(|| {
            Regex::new(
                r"^(?P<name>[^:]+)-((?P<epoch>[0-9]+):)?(?P<version>[^-:]+)-(?P<release>[^-:]+)$",
            )
            .unwrap()
        }),
        NevraForm::Nev => NEV.get_or_init(|| {
            Regex::new(r"^(?P<name>[^:]+)-((?P<epoch>[0-9]+):)?(?P<version>[^-:]+)$").unwrap()
        }),
        NevraForm::Na => {
            NA.get_or_init(|| Regex::new(r"^(?P<name>[^:]+)\.(?P<arch>[^.:]+)$").unwrap())
        }
        NevraForm::Name => NAME.get_or_init(|| Regex::new(r"^(?P<name>[^:]+)$").unwrap()),
    }
}

/// Whether `arch` is a "real" architecture: `src`, `noarch`, or known to
/// the sack's [`crate::arch::ArchList`].
pub fn is_real_arch(arch: &str, arches: &crate::arch::ArchList) -> bool {
    arch == "src" || arch == "noarch" || arches.is_compatible(arch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::ArchList;

    #[test]
    fn parse_nevra() {
        let n = Nevra::parse_form("foo-1:2.3-4.x86_64", NevraForm::Nevra).unwrap();
        assert_eq!(n.name, "foo");
        assert_eq!(n.epoch, Some(1));
        assert_eq!(n.version.as_deref(), Some("2.3"));
        assert_eq!(n.release.as_deref(), Some("4"));
        assert_eq!(n.arch.as_deref(), Some("x86_64"));
    }

    #[test]
    fn parse_nevra_without_epoch() {
        let n = Nevra::parse_form("foo-2.3-4.x86_64", NevraForm::Nevra).unwrap();
        assert_eq!(n.epoch, None);
        assert_eq!(n.version.as_deref(), Some("2.3"));
    }

    #[test]
    fn parse_na() {
        let n = Nevra::parse_form("foo.x86_64", NevraForm::Na).unwrap();
        assert_eq!(n.name, "foo");
        assert_eq!(n.arch.as_deref(), Some("x86_64"));
        assert!(n.version.is_none());
    }

    #[test]
    fn parse_name() {
        let n = Nevra::parse_form("foo", NevraForm::Name).unwrap();
        assert_eq!(n.name, "foo");
        assert!(n.arch.is_none());
    }

    #[test]
    fn nevra_round_trip() {
        let original = "foo-1:2.3-4.x86_64";
        let (n, form) = Nevra::parse_possibilities(original, FORMS_MOST_SPEC)
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(form, NevraForm::Nevra);
        assert_eq!(n.to_nevra_string(), original);
        let reparsed = Nevra::parse_form(&n.to_nevra_string(), NevraForm::Nevra).unwrap();
        assert_eq!(reparsed, n);
    }

    #[test]
    fn possibilities_most_spec_tries_nevra_first() {
        let results = Nevra::parse_possibilities("foo-1.0-1.noarch", FORMS_MOST_SPEC);
        assert_eq!(results[0].1, NevraForm::Nevra);
    }

    #[test]
    fn evr_string_omits_epoch_when_absent() {
        let n = Nevra::parse_form("foo-2.3-4.x86_64", NevraForm::Nevra).unwrap();
        assert_eq!(n.evr_string(), "2.3-4");
    }

    #[test]
    fn cmp_orders_by_epoch_first() {
        let a = Nevra::parse_form("foo-1:1.0-1.x86_64", NevraForm::Nevra).unwrap();
        let b = Nevra::parse_form("foo-2.0-1.x86_64", NevraForm::Nevra).unwrap();
        assert_eq!(a.cmp(&b), Ordering::Greater);
    }

    #[test]
    fn is_real_arch_accepts_noarch_and_src() {
        let arches = ArchList::new("x86_64").unwrap();
        assert!(is_real_arch("noarch", &arches));
        assert!(is_real_arch("src", &arches));
        assert!(is_real_arch("i686", &arches));
        assert!(!is_real_arch("sparc64", &arches));
    }
}
