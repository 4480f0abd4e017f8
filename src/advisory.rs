//! Errata records: [`Advisory`], its updated packages, and its external
//! references.
//!
//! Grounded on §3/§6 and `hawkey/src/types.h`'s reserved enum values
//! (kept numerically stable since callers may persist them).

use std::fmt;

/// Severity/category of an advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum AdvisoryType {
    /// Unclassified.
    #[default]
    Unknown = 0,
    /// Security fix.
    Security = 1,
    /// Bug fix.
    Bugfix = 2,
    /// Feature enhancement.
    Enhancement = 3,
}

/// Kind of an [`AdvisoryRef`] external reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum AdvisoryRefType {
    /// Unclassified reference.
    #[default]
    Unknown = 0,
    /// Bugzilla ticket.
    Bugzilla = 1,
    /// CVE identifier.
    Cve = 2,
    /// Vendor-specific reference.
    Vendor = 3,
}

/// One package entry inside an advisory's update list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdvisoryPkg {
    /// Package name.
    pub name: String,
    /// EVR string (`[epoch:]version-release`).
    pub evr: String,
    /// Architecture.
    pub arch: String,
    /// File name of the package (as listed in updateinfo, not a path).
    pub filename: String,
}

/// An external reference attached to an advisory.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdvisoryRef {
    /// Reference kind.
    pub kind: AdvisoryRefType,
    /// Reference id (bug number, CVE id, vendor id).
    pub id: String,
    /// Human-readable title, if any.
    pub title: Option<String>,
    /// URL, if any.
    pub url: Option<String>,
}

/// An errata record parsed from `updateinfo.xml`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Advisory {
    /// Advisory id, e.g. `"RHSA-2024:1234"`.
    pub id: String,
    /// Title.
    pub title: String,
    /// Advisory type.
    pub kind: AdvisoryType,
    /// Free-form description.
    pub description: String,
    /// Rights/copyright text, if present.
    pub rights: Option<String>,
    /// `issued`/`updated` timestamp, as seconds since the epoch.
    pub updated: i64,
    /// Packages this advisory updates.
    pub packages: Vec<AdvisoryPkg>,
    /// External references.
    pub references: Vec<AdvisoryRef>,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.title)
    }
}

impl Advisory {
    /// Whether this advisory mentions a package by name, regardless of
    /// EVR/arch.
    pub fn mentions(&self, name: &str) -> bool {
        self.packages.iter().any(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_id_and_title() {
        let adv = Advisory {
            id: "RHSA-2024:1".into(),
            title: "Fix foo".into(),
            kind: AdvisoryType::Security,
            description: String::new(),
            rights: None,
            updated: 0,
            packages: vec![],
            references: vec![],
        };
        assert_eq!(adv.to_string(), "RHSA-2024:1: Fix foo");
    }

    #[test]
    fn mentions_checks_package_name() {
        let adv = Advisory {
            id: "RHSA-2024:1".into(),
            title: "Fix foo".into(),
            kind: AdvisoryType::Bugfix,
            description: String::new(),
            rights: None,
            updated: 0,
            packages: vec![AdvisoryPkg {
                name: "foo".into(),
                evr: "1.0-1".into(),
                arch: "x86_64".into(),
                filename: "foo-1.0-1.x86_64.rpm".into(),
            }],
            references: vec![],
        };
        assert!(adv.mentions("foo"));
        assert!(!adv.mentions("bar"));
    }

    #[test]
    fn default_advisory_type_is_unknown() {
        assert_eq!(AdvisoryType::default(), AdvisoryType::Unknown);
    }
}
