//! Arena-based pool mapping resolvo ids to RPM package records.
//!
//! [`RpmPool`] provides the storage that backs every resolvo identifier
//! ([`NameId`], [`SolvableId`], [`VersionSetId`], etc.) with a concrete
//! RPM value. Kept from the teacher's `PortagePool`: the same
//! arena-plus-reverse-map interning pattern, generalized from Portage
//! atoms to NEVRA/Reldep.

use std::collections::HashMap;

use resolvo::{
    ArenaId, ConditionId, NameId, SolvableId, StringId, VersionSetId, VersionSetUnionId,
};

use crate::evr::Evr;
use crate::nevra::Nevra;
use crate::reldep::CmpFlags;

/// One file entry from a package's file list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PackageFile {
    /// Full path.
    pub path: String,
    /// Whether this entry is a directory, a ghost (not actually shipped),
    /// or a regular file.
    pub kind: FileKind,
}

/// Kind of a [`PackageFile`] entry, as carried by `filelists.xml`'s
/// `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FileKind {
    /// A regular file.
    File,
    /// A directory entry.
    Dir,
    /// A ghost file (listed, but not actually shipped in the payload).
    Ghost,
}

/// All dependency relation lists carried by one package.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PackageDeps {
    /// `Requires`.
    pub requires: Vec<ReqExpr>,
    /// `Provides`.
    pub provides: Vec<crate::reldep::Reldep>,
    /// `Conflicts`.
    pub conflicts: Vec<crate::reldep::Reldep>,
    /// `Obsoletes`.
    pub obsoletes: Vec<crate::reldep::Reldep>,
    /// `Recommends` (weak).
    pub recommends: Vec<ReqExpr>,
    /// `Suggests` (weak).
    pub suggests: Vec<ReqExpr>,
    /// `Enhances` (weak).
    pub enhances: Vec<ReqExpr>,
    /// `Supplements` (weak).
    pub supplements: Vec<ReqExpr>,
}

/// A single `Requires`-family entry: either a plain capability
/// constraint, or an RPM "rich"/boolean `(A or B or …)` group.
///
/// Only the `or` rich-dependency shape is modelled; `and`/`unless`/`if`
/// rich dependencies are out of scope for this core (they are rare
/// outside a handful of bootstrapping rpmlib() entries) and are treated
/// as a single opaque [`ReqExpr::Single`] naming the whole expression,
/// which never matches any real provide and so is effectively inert.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReqExpr {
    /// One capability constraint.
    Single(crate::reldep::Reldep),
    /// `(A or B or …)`: satisfied if any alternative is satisfied.
    Or(Vec<crate::reldep::Reldep>),
}

impl ReqExpr {
    /// Parse one `<rpm:entry>`-style requirement string, detecting the
    /// `(A or B or …)` rich boolean shape.
    pub fn parse(name: &str, flags: Option<CmpFlags>, evr: Option<Evr>) -> Self {
        let trimmed = name.trim();
        if let Some(inner) = trimmed
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
        {
            if inner.contains(" or ") {
                let alts = inner
                    .split(" or ")
                    .map(|part| crate::reldep::Reldep::parse(part.trim()).unwrap_or_else(|| {
                        crate::reldep::Reldep::bare(part.trim().to_string())
                    }))
                    .collect();
                return ReqExpr::Or(alts);
            }
        }
        let reldep = match (flags, evr) {
            (Some(flags), Some(evr)) => {
                crate::reldep::Reldep::versioned(trimmed.to_string(), flags, evr)
            }
            _ => crate::reldep::Reldep::bare(trimmed.to_string()),
        };
        ReqExpr::Single(reldep)
    }
}

/// One installable package version: a [`SolvableId`]'s payload.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PackageRecord {
    /// Name/epoch/version/release/arch. `version`/`release`/`arch` are
    /// always present for a loaded package; only `epoch` may be absent.
    pub nevra: Nevra,
    /// Owning repo name (`"@System"` for installed packages).
    pub repo: String,
    /// One-line summary.
    pub summary: String,
    /// Full description.
    pub description: String,
    /// Upstream URL.
    pub url: String,
    /// License string.
    pub license: String,
    /// Source RPM file name, empty for source packages themselves.
    pub sourcerpm: String,
    /// Location (relative path under the repo baseurl), empty for
    /// installed packages.
    pub location: String,
    /// `(checksum-type, hex-digest)` of the package file, if known.
    pub checksum: Option<(String, String)>,
    /// Installed (unpacked) size in bytes.
    pub size_installed: u64,
    /// Build timestamp, seconds since the epoch.
    pub build_time: i64,
    /// File list (only populated once a `filelists` extension is
    /// loaded, or for the system repo).
    pub files: Vec<PackageFile>,
    /// Dependency relations.
    pub deps: PackageDeps,
    /// Whether this record represents an installed (`@System`) package.
    pub installed: bool,
}

impl PackageRecord {
    /// EVR-rendered string, `"[epoch:]version-release"`.
    pub fn evr_string(&self) -> String {
        self.nevra.evr_string()
    }

    /// Full NEVRA string.
    pub fn nevra_string(&self) -> String {
        self.nevra.to_nevra_string()
    }
}

/// A version constraint over one capability name: the [`VersionSetId`]
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionConstraint {
    /// Capability name the constraint applies to.
    pub name: String,
    /// Comparison flags (`EQ`/`LT`/`GT`, possibly combined).
    pub flags: CmpFlags,
    /// EVR to compare against; `None` means "any version" (a bare
    /// capability requirement).
    pub evr: Option<Evr>,
}

impl std::fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(evr) = &self.evr {
            let op = crate::reldep::display_operator(self.flags);
            write!(f, " {op} {evr}")?;
        }
        Ok(())
    }
}

/// Arena-based storage for all resolvo-interned objects.
///
/// Cloned wholesale by [`crate::provider::RpmDependencyProvider`] at the
/// start of every [`crate::goal::Goal::run`]: resolvo takes ownership of
/// its `DependencyProvider`, so the sack's long-lived pool is snapshotted
/// into a fresh provider per solve rather than shared by reference.
#[derive(Default, Clone)]
pub struct RpmPool {
    names: Vec<String>,
    names_rev: HashMap<String, NameId>,

    solvables: Vec<PackageRecord>,
    solvable_names: Vec<NameId>,

    version_sets: Vec<VersionConstraint>,
    version_set_names: Vec<NameId>,
    version_sets_rev: HashMap<VersionConstraint, VersionSetId>,

    version_set_unions: Vec<Vec<VersionSetId>>,

    conditions: Vec<resolvo::Condition>,

    strings: Vec<String>,
    strings_rev: HashMap<String, StringId>,
}

impl RpmPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of solvables registered so far.
    pub fn solvable_count(&self) -> usize {
        self.solvables.len()
    }

    /// Every registered solvable id, ascending.
    pub fn all_solvable_ids(&self) -> impl Iterator<Item = SolvableId> {
        (0..self.solvables.len()).map(SolvableId::from_usize)
    }

    // --- NameId ---

    /// Intern a capability/package name.
    pub fn intern_name(&mut self, name: &str) -> NameId {
        if let Some(&id) = self.names_rev.get(name) {
            return id;
        }
        let id = NameId::from_usize(self.names.len());
        self.names_rev.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    /// Look up the name string for a [`NameId`].
    pub fn resolve_name(&self, id: NameId) -> &str {
        &self.names[id.to_usize()]
    }

    /// Look up a [`NameId`] by name, if already interned.
    pub fn name_id(&self, name: &str) -> Option<NameId> {
        self.names_rev.get(name).copied()
    }

    // --- SolvableId ---

    /// Register a package record, returning its new [`SolvableId`].
    pub fn intern_solvable(&mut self, record: PackageRecord) -> SolvableId {
        let name_id = self.intern_name(&record.nevra.name.clone());
        let id = SolvableId::from_usize(self.solvables.len());
        self.solvables.push(record);
        self.solvable_names.push(name_id);
        id
    }

    /// Look up the record for a [`SolvableId`].
    pub fn resolve_solvable(&self, id: SolvableId) -> &PackageRecord {
        &self.solvables[id.to_usize()]
    }

    /// Mutable access to a solvable's record (used by extension loaders
    /// that extend an already-interned package, e.g. filelists).
    pub fn resolve_solvable_mut(&mut self, id: SolvableId) -> &mut PackageRecord {
        &mut self.solvables[id.to_usize()]
    }

    /// Look up the [`NameId`] for a [`SolvableId`].
    pub fn solvable_name(&self, id: SolvableId) -> NameId {
        self.solvable_names[id.to_usize()]
    }

    // --- VersionSetId ---

    /// Intern a version constraint, deduplicating by value.
    pub fn intern_version_set(&mut self, constraint: VersionConstraint) -> VersionSetId {
        if let Some(&id) = self.version_sets_rev.get(&constraint) {
            return id;
        }
        let name_id = self.intern_name(&constraint.name.clone());
        let id = VersionSetId::from_usize(self.version_sets.len());
        self.version_sets_rev.insert(constraint.clone(), id);
        self.version_sets.push(constraint);
        self.version_set_names.push(name_id);
        id
    }

    /// Look up the constraint for a [`VersionSetId`].
    pub fn resolve_version_set(&self, id: VersionSetId) -> &VersionConstraint {
        &self.version_sets[id.to_usize()]
    }

    /// Look up the [`NameId`] for a [`VersionSetId`].
    pub fn version_set_name(&self, id: VersionSetId) -> NameId {
        self.version_set_names[id.to_usize()]
    }

    // --- VersionSetUnionId ---

    /// Intern a union (OR) of version sets, used for `(A or B …)` rich
    /// dependency groups.
    pub fn intern_version_set_union(&mut self, sets: Vec<VersionSetId>) -> VersionSetUnionId {
        let id = VersionSetUnionId::from_usize(self.version_set_unions.len());
        self.version_set_unions.push(sets);
        id
    }

    /// Look up the version sets in a union.
    pub fn resolve_version_set_union(&self, id: VersionSetUnionId) -> &[VersionSetId] {
        &self.version_set_unions[id.to_usize()]
    }

    // --- ConditionId ---

    /// Intern a resolvo condition (reserved; this core has no
    /// conditional-requirement source today, but the slot is kept so the
    /// `Interner` implementation has somewhere to store one if a future
    /// caller needs rich `if`/`unless` deps).
    pub fn intern_condition(&mut self, condition: resolvo::Condition) -> ConditionId {
        let id = ConditionId::from_usize(self.conditions.len());
        self.conditions.push(condition);
        id
    }

    /// Look up a condition.
    pub fn resolve_condition(&self, id: ConditionId) -> &resolvo::Condition {
        &self.conditions[id.to_usize()]
    }

    // --- StringId ---

    /// Intern a string (used for solver diagnostics).
    pub fn intern_string(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.strings_rev.get(s) {
            return id;
        }
        let id = StringId::from_usize(self.strings.len());
        self.strings_rev.insert(s.to_string(), id);
        self.strings.push(s.to_string());
        id
    }

    /// Look up an interned string.
    pub fn resolve_string(&self, id: StringId) -> &str {
        &self.strings[id.to_usize()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(nevra: &str) -> PackageRecord {
        let n = Nevra::parse_form(nevra, crate::nevra::NevraForm::Nevra).unwrap();
        PackageRecord {
            nevra: n,
            repo: "test".into(),
            summary: String::new(),
            description: String::new(),
            url: String::new(),
            license: String::new(),
            sourcerpm: String::new(),
            location: String::new(),
            checksum: None,
            size_installed: 0,
            build_time: 0,
            files: vec![],
            deps: PackageDeps::default(),
            installed: false,
        }
    }

    #[test]
    fn intern_name_dedup() {
        let mut pool = RpmPool::new();
        let a = pool.intern_name("foo");
        let b = pool.intern_name("foo");
        assert_eq!(a, b);
    }

    #[test]
    fn intern_solvable_links_name() {
        let mut pool = RpmPool::new();
        let id = pool.intern_solvable(record("foo-1.0-1.x86_64"));
        let name_id = pool.solvable_name(id);
        assert_eq!(pool.resolve_name(name_id), "foo");
    }

    #[test]
    fn intern_version_set_dedup() {
        let mut pool = RpmPool::new();
        let c = VersionConstraint {
            name: "foo".into(),
            flags: CmpFlags::GT | CmpFlags::EQ,
            evr: Some(Evr::parse("1.0-1")),
        };
        let a = pool.intern_version_set(c.clone());
        let b = pool.intern_version_set(c);
        assert_eq!(a, b);
    }

    #[test]
    fn req_expr_parses_or_group() {
        let expr = ReqExpr::parse("(pkgconfig(foo) or pkgconfig(bar))", None, None);
        match expr {
            ReqExpr::Or(alts) => {
                assert_eq!(alts.len(), 2);
                assert_eq!(alts[0].name, "pkgconfig(foo)");
            }
            _ => panic!("expected Or"),
        }
    }

    #[test]
    fn req_expr_parses_single() {
        let expr = ReqExpr::parse("libc", Some(CmpFlags::GT | CmpFlags::EQ), Some(Evr::parse("2.17")));
        match expr {
            ReqExpr::Single(r) => assert_eq!(r.name, "libc"),
            _ => panic!("expected Single"),
        }
    }
}
