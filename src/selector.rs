//! Partial package specification used to build solver jobs.
//!
//! Grounded on `hawkey/src/selector.c`: a selector carries at most one
//! filter per field and is materialized against a sack's pool rather
//! than evaluated lazily like [`crate::query::Query`].

use crate::error::{Result, SackError};
use crate::package_set::PackageSet;
use crate::query::{Key, Match};
use crate::reldep::CmpFlags;
use crate::sack::Sack;

/// A single selector field's filter: the comparison flags and the
/// string/reldep operand.
#[derive(Debug, Clone)]
struct Field {
    cmp_flags: CmpFlags,
    value: String,
}

/// A partial package specification: at most one filter per field.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    name: Option<Field>,
    provides: Option<Field>,
    file: Option<Field>,
    arch: Option<Field>,
    evr: Option<Field>,
    reponame: Option<Field>,
}

impl Selector {
    /// A selector with no fields set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (overwriting) one field. Validates the `(key, cmp)`
    /// combination: `NAME`/`ARCH` accept `EQ`/`GLOB` only, `REPONAME`
    /// accepts `EQ` only, the rest follow the same rules as
    /// [`crate::query::Query`]'s equivalent keys.
    pub fn set(mut self, key: Key, cmp_flags: CmpFlags, value: &str) -> Result<Self> {
        let base = cmp_flags
            & (CmpFlags::EQ | CmpFlags::LT | CmpFlags::GT | CmpFlags::SUBSTR | CmpFlags::GLOB);
        let field = Field {
            cmp_flags,
            value: value.to_string(),
        };
        match key {
            Key::Name | Key::Arch => {
                if base != CmpFlags::EQ && base != CmpFlags::GLOB {
                    return Err(SackError::Selector(format!(
                        "{key:?} only accepts EQ or GLOB"
                    )));
                }
                if key == Key::Name {
                    self.name = Some(field);
                } else {
                    self.arch = Some(field);
                }
            }
            Key::Reponame => {
                if base != CmpFlags::EQ {
                    return Err(SackError::Selector("REPONAME only accepts EQ".into()));
                }
                self.reponame = Some(field);
            }
            Key::Provides => {
                if base != CmpFlags::EQ && base != CmpFlags::GLOB {
                    return Err(SackError::Selector("PROVIDES only accepts EQ or GLOB".into()));
                }
                self.provides = Some(field);
            }
            Key::File => {
                self.file = Some(field);
            }
            Key::Evr => {
                self.evr = Some(field);
            }
            other => {
                return Err(SackError::Selector(format!(
                    "{other:?} is not a valid selector field"
                )));
            }
        }
        Ok(self)
    }

    /// Whether this selector has at least one of `name`/`provides`/`file`
    /// set — the minimum needed to be materialized into a job.
    pub fn is_well_formed(&self) -> bool {
        self.name.is_some() || self.provides.is_some() || self.file.is_some()
    }

    /// The `evr` field's comparison flags, if one was set (used by
    /// [`crate::goal::Goal`] to decide whether a selector fixes an exact
    /// EVR, which upgrades treat as an install rather than an update-to-
    /// newest).
    pub fn fixes_evr(&self) -> bool {
        self.evr
            .as_ref()
            .is_some_and(|f| f.cmp_flags.contains(CmpFlags::EQ))
    }

    /// Materialize this selector into the set of packages it names.
    /// `name`/`provides` filters select candidate solvables by that key;
    /// `file` constrains by file-list membership; `arch`/`evr`/`reponame`
    /// further constrain whichever base set was selected. An ill-formed
    /// selector (no `name`/`provides`/`file`) fails with `Selector`.
    pub fn matches(&self, sack: &mut Sack) -> Result<PackageSet> {
        if !self.is_well_formed() {
            return Err(SackError::Selector(
                "selector has no name, provides, or file filter".into(),
            ));
        }

        let mut query = crate::query::Query::new(sack);

        if let Some(f) = &self.name {
            query = query.filter(Key::Name, f.cmp_flags, vec![Match::Str(f.value.clone())])?;
        }
        if let Some(f) = &self.provides {
            query = query.filter(
                Key::Provides,
                f.cmp_flags,
                vec![Match::Str(f.value.clone())],
            )?;
        }
        if let Some(f) = &self.file {
            query = query.filter(Key::File, f.cmp_flags, vec![Match::Str(f.value.clone())])?;
        }
        if let Some(f) = &self.arch {
            query = query.filter(Key::Arch, f.cmp_flags, vec![Match::Str(f.value.clone())])?;
        }
        if let Some(f) = &self.reponame {
            query = query.filter(
                Key::Reponame,
                f.cmp_flags,
                vec![Match::Str(f.value.clone())],
            )?;
        }
        if let Some(f) = &self.evr {
            let evr = crate::evr::Evr::parse(&f.value);
            query = query.filter(Key::Evr, f.cmp_flags, vec![Match::Evr(evr)])?;
        }

        Ok(query.run_set())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nevra::Nevra;
    use crate::pool::PackageRecord;
    use crate::sack::BuildCache;

    fn record(name: &str, version: &str, arch: &str) -> PackageRecord {
        PackageRecord {
            nevra: Nevra {
                name: name.into(),
                epoch: None,
                version: Some(version.into()),
                release: Some("1".into()),
                arch: Some(arch.into()),
            },
            repo: "fedora".into(),
            summary: String::new(),
            description: String::new(),
            url: String::new(),
            license: String::new(),
            sourcerpm: String::new(),
            location: String::new(),
            checksum: None,
            size_installed: 0,
            build_time: 0,
            files: Vec::new(),
            deps: Default::default(),
            installed: false,
        }
    }

    fn sack_with(records: Vec<PackageRecord>) -> Sack {
        let mut sack = Sack::new(None, Some("x86_64"), None, BuildCache::Disabled).unwrap();
        for r in records {
            sack.pool_mut().intern_solvable(r);
        }
        sack.mark_dirty();
        sack
    }

    #[test]
    fn empty_selector_is_ill_formed() {
        let sel = Selector::new();
        assert!(!sel.is_well_formed());
    }

    #[test]
    fn name_only_selector_matches() {
        let mut sack = sack_with(vec![
            record("foo", "1.0", "x86_64"),
            record("bar", "1.0", "x86_64"),
        ]);
        let sel = Selector::new().set(Key::Name, CmpFlags::EQ, "foo").unwrap();
        let matched = sel.matches(&mut sack).unwrap();
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn name_and_arch_constrain_together() {
        let mut sack = sack_with(vec![
            record("foo", "1.0", "x86_64"),
            record("foo", "1.0", "i686"),
        ]);
        let sel = Selector::new()
            .set(Key::Name, CmpFlags::EQ, "foo")
            .unwrap()
            .set(Key::Arch, CmpFlags::EQ, "i686")
            .unwrap();
        let matched = sel.matches(&mut sack).unwrap();
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn invalid_name_cmp_rejected() {
        let err = Selector::new().set(Key::Name, CmpFlags::SUBSTR, "foo");
        assert!(err.is_err());
    }

    #[test]
    fn fixes_evr_reports_eq_constraint() {
        let sel = Selector::new()
            .set(Key::Evr, CmpFlags::EQ, "1.0-1")
            .unwrap();
        assert!(sel.fixes_evr());
        let sel2 = Selector::new()
            .set(Key::Evr, CmpFlags::GT, "1.0-1")
            .unwrap();
        assert!(!sel2.fixes_evr());
    }
}
