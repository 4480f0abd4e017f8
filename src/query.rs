//! Lazy compositional package filter.
//!
//! Grounded on `hawkey/src/query.c`'s `hy_query` struct: a filter list
//! plus a result bitmap, applied lazily and idempotently. `Query` here
//! borrows a [`Sack`] mutably only at `apply` time (to refresh the
//! considered set); the rest of the filter-building API is pure data.

use resolvo::SolvableId;

use crate::error::{Result, SackError};
use crate::package_list::PackageList;
use crate::package_set::PackageSet;
use crate::pool::PackageRecord;
use crate::reldep::{CmpFlags, Reldep};
use crate::sack::Sack;
use crate::version_match::{evr_satisfies, glob_matches};

/// Which field of a package record a filter inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Name,
    Arch,
    Evr,
    Version,
    Release,
    Summary,
    Description,
    Url,
    Nevra,
    Location,
    Sourcerpm,
    File,
    Reponame,
    Epoch,
    Pkg,
    Requires,
    Conflicts,
    Provides,
    Obsoletes,
    Recommends,
    Suggests,
    Enhances,
    Supplements,
}

impl Key {
    fn is_string(self) -> bool {
        matches!(
            self,
            Key::Name
                | Key::Arch
                | Key::Evr
                | Key::Version
                | Key::Release
                | Key::Summary
                | Key::Description
                | Key::Url
                | Key::Nevra
                | Key::Location
                | Key::Sourcerpm
                | Key::File
                | Key::Reponame
        )
    }

    fn is_reldep(self) -> bool {
        matches!(
            self,
            Key::Requires
                | Key::Conflicts
                | Key::Provides
                | Key::Obsoletes
                | Key::Recommends
                | Key::Suggests
                | Key::Enhances
                | Key::Supplements
        )
    }
}

/// A single filter's match operand.
#[derive(Debug, Clone)]
pub enum Match {
    /// A string (exact, substring, or glob, per `cmp_flags`).
    Str(String),
    /// An EVR numeric/version comparison target.
    Evr(crate::evr::Evr),
    /// An explicit epoch.
    Epoch(u32),
    /// A single reldep, for `REQUIRES`/`PROVIDES`/… filters.
    Reldep(Reldep),
    /// An explicit package set (`PKG`/`OBSOLETES` with a set operand).
    Set(PackageSet),
}

#[derive(Debug, Clone)]
struct Filter {
    key: Key,
    cmp_flags: CmpFlags,
    matches: Vec<Match>,
}

/// Multiversion/upgrade-relative scalar modifiers, applied after filters
/// in a fixed order.
#[derive(Debug, Clone, Copy, Default)]
struct ScalarModifiers {
    downgradable: bool,
    downgrades: bool,
    updatable: bool,
    updates: bool,
    latest: bool,
    latest_per_arch: bool,
}

/// A lazily-evaluated, composable filter over a sack's package set.
pub struct Query<'s> {
    sack: &'s mut Sack,
    filters: Vec<Filter>,
    modifiers: ScalarModifiers,
    result: Option<PackageSet>,
    applied: bool,
    ignore_excludes: bool,
}

impl<'s> Query<'s> {
    /// Start a new, empty query against `sack`.
    pub fn new(sack: &'s mut Sack) -> Self {
        Query {
            sack,
            filters: Vec::new(),
            modifiers: ScalarModifiers::default(),
            result: None,
            applied: false,
            ignore_excludes: false,
        }
    }

    /// Skip intersecting with the sack's considered set on `apply`.
    pub fn ignore_excludes(mut self, ignore: bool) -> Self {
        self.ignore_excludes = ignore;
        self
    }

    /// Append a filter. Validates the `(key, cmp_flags)` combination up
    /// front; invalid combinations are rejected rather than silently
    /// matching nothing.
    pub fn filter(mut self, key: Key, cmp_flags: CmpFlags, matches: Vec<Match>) -> Result<Self> {
        validate(key, cmp_flags)?;
        self.filters.push(Filter {
            key,
            cmp_flags,
            matches,
        });
        self.applied = false;
        Ok(self)
    }

    /// Convenience: a single-string filter.
    pub fn filter_str(self, key: Key, cmp_flags: CmpFlags, value: &str) -> Result<Self> {
        self.filter(key, cmp_flags, vec![Match::Str(value.to_string())])
    }

    pub fn downgradable(mut self, on: bool) -> Self {
        self.modifiers.downgradable = on;
        self.applied = false;
        self
    }

    pub fn downgrades(mut self, on: bool) -> Self {
        self.modifiers.downgrades = on;
        self.applied = false;
        self
    }

    pub fn updatable(mut self, on: bool) -> Self {
        self.modifiers.updatable = on;
        self.applied = false;
        self
    }

    pub fn updates(mut self, on: bool) -> Self {
        self.modifiers.updates = on;
        self.applied = false;
        self
    }

    pub fn latest(mut self, on: bool) -> Self {
        self.modifiers.latest = on;
        self.applied = false;
        self
    }

    pub fn latest_per_arch(mut self, on: bool) -> Self {
        self.modifiers.latest_per_arch = on;
        self.applied = false;
        self
    }

    /// Drop any computed result and modifiers, keeping the filter list.
    pub fn clear_result(&mut self) {
        self.result = None;
        self.applied = false;
    }

    /// Evaluate the filter list and scalar modifiers if not already
    /// applied. Idempotent: a second call with no intervening `filter`
    /// is a no-op.
    pub fn apply(&mut self) -> &PackageSet {
        if self.applied {
            return self.result.as_ref().unwrap();
        }

        let mut result = if self.ignore_excludes {
            PackageSet::all(self.sack.pool())
        } else {
            self.sack.considered().clone()
        };

        for f in &self.filters {
            let m = eval_filter(self.sack, f);
            if f.cmp_flags.contains(CmpFlags::NOT) {
                result.subtract(&m);
            } else {
                result.intersect_with(&m);
            }
        }

        apply_modifiers(self.sack, &mut result, self.modifiers);

        self.result = Some(result);
        self.applied = true;
        self.filters.clear();
        self.result.as_ref().unwrap()
    }

    /// Materialise the applied result as an ordered [`PackageList`].
    pub fn run(&mut self) -> PackageList {
        PackageList::from_set(self.apply())
    }

    /// Materialise the applied result as a [`PackageSet`].
    pub fn run_set(&mut self) -> PackageSet {
        self.apply().clone()
    }

    /// Require exactly one match, returning its id.
    pub fn get(&mut self) -> Result<SolvableId> {
        let set = self.apply();
        let mut iter = set.iter();
        let first = iter
            .next()
            .ok_or_else(|| SackError::Query("no package matched".into()))?;
        if iter.next().is_some() {
            return Err(SackError::Query(
                "more than one package matched".into(),
            ));
        }
        Ok(first)
    }

    /// Whether `id` is a member of the applied result.
    pub fn contains(&mut self, id: SolvableId) -> bool {
        self.apply().contains(id)
    }

    /// Popcount of the applied result.
    pub fn len(&mut self) -> usize {
        self.apply().len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Union of two applied queries' results into a fresh [`PackageSet`].
    pub fn union(&mut self, other: &mut Query<'_>) -> PackageSet {
        self.apply().union(other.apply())
    }

    /// Intersection of two applied queries' results.
    pub fn intersection(&mut self, other: &mut Query<'_>) -> PackageSet {
        self.apply().intersection(other.apply())
    }

    /// Difference (`self \ other`) of two applied queries' results.
    pub fn difference(&mut self, other: &mut Query<'_>) -> PackageSet {
        self.apply().difference(other.apply())
    }
}

fn validate(key: Key, cmp_flags: CmpFlags) -> Result<()> {
    let base = cmp_flags
        & (CmpFlags::EQ | CmpFlags::LT | CmpFlags::GT | CmpFlags::SUBSTR | CmpFlags::GLOB);

    match key {
        Key::Location | Key::Sourcerpm => {
            if base != CmpFlags::EQ {
                return Err(SackError::Query(format!(
                    "{key:?} only accepts EQ"
                )));
            }
        }
        Key::Epoch => {
            let allowed = base & !(CmpFlags::EQ | CmpFlags::LT | CmpFlags::GT);
            if !allowed.is_empty() || base.is_empty() {
                return Err(SackError::Query("EPOCH accepts EQ/LT/GT only".into()));
            }
        }
        Key::Pkg => {
            if base != CmpFlags::EQ {
                return Err(SackError::Query("PKG only accepts EQ".into()));
            }
        }
        _ if key.is_reldep() => {
            if base != CmpFlags::EQ && base != CmpFlags::GLOB {
                return Err(SackError::Query(format!(
                    "{key:?} only accepts EQ or GLOB"
                )));
            }
        }
        _ if key.is_string() => {}
        _ => {}
    }
    Ok(())
}

fn record_string(record: &PackageRecord, key: Key) -> Option<String> {
    Some(match key {
        Key::Name => record.nevra.name.clone(),
        Key::Arch => record.nevra.arch.clone()?,
        Key::Version => record.nevra.version.clone()?,
        Key::Release => record.nevra.release.clone()?,
        Key::Summary => record.summary.clone(),
        Key::Description => record.description.clone(),
        Key::Url => record.url.clone(),
        Key::Nevra => record.nevra_string(),
        Key::Location => record.location.clone(),
        Key::Sourcerpm => record.sourcerpm.clone(),
        Key::Reponame => record.repo.clone(),
        _ => return None,
    })
}

fn eval_filter(sack: &Sack, f: &Filter) -> PackageSet {
    let pool = sack.pool();
    let base = f.cmp_flags
        & (CmpFlags::EQ | CmpFlags::LT | CmpFlags::GT | CmpFlags::SUBSTR | CmpFlags::GLOB);

    let mut out = PackageSet::with_capacity(pool.solvable_count());

    match f.key {
        Key::Pkg => {
            for m in &f.matches {
                if let Match::Set(set) = m {
                    out.union_with(set);
                }
            }
        }
        Key::Obsoletes if f.matches.iter().any(|m| matches!(m, Match::Set(_))) => {
            let mut target_names = Vec::new();
            for m in &f.matches {
                if let Match::Set(set) = m {
                    for id in set.iter() {
                        target_names.push(pool.resolve_solvable(id).nevra.name.clone());
                    }
                }
            }
            for id in pool.all_solvable_ids() {
                let record = pool.resolve_solvable(id);
                if record
                    .deps
                    .obsoletes
                    .iter()
                    .any(|r| target_names.contains(&r.name))
                {
                    out.insert(id);
                }
            }
        }
        Key::File => {
            for id in pool.all_solvable_ids() {
                let record = pool.resolve_solvable(id);
                let hit = record.files.iter().any(|file| {
                    f.matches.iter().any(|m| match m {
                        Match::Str(pattern) => match base {
                            CmpFlags::GLOB => glob_matches(pattern, &file.path, f.cmp_flags),
                            CmpFlags::SUBSTR => file_contains(&file.path, pattern, f.cmp_flags),
                            _ => str_eq(&file.path, pattern, f.cmp_flags),
                        },
                        _ => false,
                    })
                });
                if hit {
                    out.insert(id);
                }
            }
        }
        Key::Epoch => {
            for id in pool.all_solvable_ids() {
                let record = pool.resolve_solvable(id);
                let epoch = record.nevra.epoch.unwrap_or(0);
                let hit = f.matches.iter().any(|m| match m {
                    Match::Epoch(target) => {
                        (base.contains(CmpFlags::EQ) && epoch == *target)
                            || (base.contains(CmpFlags::LT) && epoch < *target)
                            || (base.contains(CmpFlags::GT) && epoch > *target)
                    }
                    _ => false,
                });
                if hit {
                    out.insert(id);
                }
            }
        }
        key if key.is_reldep() => {
            for id in pool.all_solvable_ids() {
                let record = pool.resolve_solvable(id);
                let reldeps: Vec<&Reldep> = reldep_family(record, key);
                let hit = f.matches.iter().any(|m| match m {
                    Match::Reldep(target) => reldeps.iter().any(|r| reldep_matches(r, target)),
                    Match::Str(pattern) => reldeps.iter().any(|r| {
                        if base == CmpFlags::GLOB {
                            glob_matches(pattern, &r.name, f.cmp_flags)
                        } else {
                            str_eq(&r.name, pattern, f.cmp_flags)
                        }
                    }),
                    _ => false,
                });
                if hit {
                    out.insert(id);
                }
            }
        }
        Key::Version if base == CmpFlags::GLOB => {
            for id in pool.all_solvable_ids() {
                let record = pool.resolve_solvable(id);
                let Some(version) = record.nevra.version.as_deref() else {
                    continue;
                };
                let hit = f.matches.iter().any(|m| match m {
                    Match::Str(pattern) => glob_matches(pattern, version, f.cmp_flags),
                    _ => false,
                });
                if hit {
                    out.insert(id);
                }
            }
        }
        Key::Evr => {
            // EVR compares via evr_satisfies rather than string equality,
            // for every base operator including EQ.
            for id in pool.all_solvable_ids() {
                let record = pool.resolve_solvable(id);
                let candidate = record.nevra.evr();
                let hit = f.matches.iter().any(|m| match m {
                    Match::Evr(target) => evr_satisfies(&candidate, f.cmp_flags, target),
                    _ => false,
                });
                if hit {
                    out.insert(id);
                }
            }
        }
        key if key.is_string() => {
            for id in pool.all_solvable_ids() {
                let record = pool.resolve_solvable(id);
                let Some(value) = record_string(record, key) else {
                    continue;
                };
                let hit = f.matches.iter().any(|m| match m {
                    Match::Str(pattern) => match base {
                        CmpFlags::GLOB => glob_matches(pattern, &value, f.cmp_flags),
                        CmpFlags::SUBSTR => file_contains(&value, pattern, f.cmp_flags),
                        _ => str_eq(&value, pattern, f.cmp_flags),
                    },
                    _ => false,
                });
                if hit {
                    out.insert(id);
                }
            }
        }
        _ => {}
    }

    out
}

fn reldep_family<'a>(record: &'a PackageRecord, key: Key) -> Vec<&'a Reldep> {
    match key {
        Key::Provides => record.deps.provides.iter().collect(),
        Key::Conflicts => record.deps.conflicts.iter().collect(),
        Key::Obsoletes => record.deps.obsoletes.iter().collect(),
        Key::Requires => req_expr_reldeps(&record.deps.requires),
        Key::Recommends => req_expr_reldeps(&record.deps.recommends),
        Key::Suggests => req_expr_reldeps(&record.deps.suggests),
        Key::Enhances => req_expr_reldeps(&record.deps.enhances),
        Key::Supplements => req_expr_reldeps(&record.deps.supplements),
        _ => Vec::new(),
    }
}

fn req_expr_reldeps(exprs: &[crate::pool::ReqExpr]) -> Vec<&Reldep> {
    exprs
        .iter()
        .flat_map(|e| match e {
            crate::pool::ReqExpr::Single(r) => std::slice::from_ref(r),
            crate::pool::ReqExpr::Or(alts) => alts.as_slice(),
        })
        .collect()
}

fn reldep_matches(candidate: &Reldep, target: &Reldep) -> bool {
    if candidate.name != target.name {
        return false;
    }
    match (&candidate.evr, &target.evr) {
        (None, None) => true,
        (Some(_), None) | (None, Some(_)) => true,
        (Some(cevr), Some(tevr)) => evr_satisfies(cevr, target.flags, tevr),
    }
}

fn str_eq(value: &str, pattern: &str, flags: CmpFlags) -> bool {
    if flags.contains(CmpFlags::ICASE) {
        value.eq_ignore_ascii_case(pattern)
    } else {
        value == pattern
    }
}

fn file_contains(value: &str, pattern: &str, flags: CmpFlags) -> bool {
    if flags.contains(CmpFlags::ICASE) {
        value.to_lowercase().contains(&pattern.to_lowercase())
    } else {
        value.contains(pattern)
    }
}

fn apply_modifiers(sack: &Sack, result: &mut PackageSet, modifiers: ScalarModifiers) {
    let pool = sack.pool();

    if modifiers.downgradable || modifiers.downgrades {
        let mut keep = PackageSet::with_capacity(pool.solvable_count());
        for id in result.iter() {
            let record = pool.resolve_solvable(id);
            if modifiers.downgradable && !record.installed {
                continue;
            }
            if modifiers.downgrades && record.installed {
                continue;
            }
            let has_counterpart = pool.all_solvable_ids().any(|other| {
                if other == id {
                    return false;
                }
                let other_record = pool.resolve_solvable(other);
                if other_record.nevra.name != record.nevra.name {
                    return false;
                }
                if modifiers.downgradable {
                    !other_record.installed
                        && other_record.nevra.cmp(&record.nevra) == std::cmp::Ordering::Less
                } else {
                    other_record.installed
                        && record.nevra.cmp(&other_record.nevra) == std::cmp::Ordering::Less
                }
            });
            if has_counterpart {
                keep.insert(id);
            }
        }
        *result = keep;
    }

    if modifiers.updatable || modifiers.updates {
        let mut keep = PackageSet::with_capacity(pool.solvable_count());
        for id in result.iter() {
            let record = pool.resolve_solvable(id);
            if modifiers.updatable && !record.installed {
                continue;
            }
            if modifiers.updates && record.installed {
                continue;
            }
            let has_counterpart = pool.all_solvable_ids().any(|other| {
                if other == id {
                    return false;
                }
                let other_record = pool.resolve_solvable(other);
                if other_record.nevra.name != record.nevra.name {
                    return false;
                }
                if modifiers.updatable {
                    !other_record.installed
                        && record.nevra.cmp(&other_record.nevra) == std::cmp::Ordering::Less
                } else {
                    other_record.installed
                        && other_record.nevra.cmp(&record.nevra) == std::cmp::Ordering::Less
                }
            });
            if has_counterpart {
                keep.insert(id);
            }
        }
        *result = keep;
    }

    if modifiers.latest_per_arch {
        keep_latest(pool, result, true);
    } else if modifiers.latest {
        keep_latest(pool, result, false);
    }
}

fn keep_latest(pool: &crate::pool::RpmPool, result: &mut PackageSet, per_arch: bool) {
    use std::collections::HashMap;

    let mut best: HashMap<(String, Option<String>), SolvableId> = HashMap::new();
    for id in result.iter() {
        let record = pool.resolve_solvable(id);
        let key = (
            record.nevra.name.clone(),
            if per_arch {
                record.nevra.arch.clone()
            } else {
                None
            },
        );
        match best.get(&key) {
            Some(&current) => {
                let current_record = pool.resolve_solvable(current);
                if record.nevra.cmp(&current_record.nevra) == std::cmp::Ordering::Greater {
                    best.insert(key, id);
                }
            }
            None => {
                best.insert(key, id);
            }
        }
    }

    let mut keep = PackageSet::with_capacity(pool.solvable_count());
    for id in best.into_values() {
        keep.insert(id);
    }
    *result = keep;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sack::BuildCache;

    fn record(name: &str, evr: &str, arch: &str, installed: bool) -> PackageRecord {
        let mut nevra = crate::nevra::Nevra {
            name: name.to_string(),
            epoch: None,
            version: None,
            release: None,
            arch: Some(arch.to_string()),
        };
        let parts: Vec<&str> = evr.splitn(2, '-').collect();
        nevra.version = Some(parts[0].to_string());
        nevra.release = parts.get(1).map(|s| s.to_string());
        PackageRecord {
            nevra,
            repo: if installed { "@System".into() } else { "fedora".into() },
            summary: "a summary".into(),
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
            installed,
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
    fn name_eq_filters_exact() {
        let mut sack = sack_with(vec![
            record("foo", "1.0-1", "x86_64", false),
            record("bar", "1.0-1", "x86_64", false),
        ]);
        let mut q = Query::new(&mut sack)
            .filter_str(Key::Name, CmpFlags::EQ, "foo")
            .unwrap();
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn name_glob_matches_prefix() {
        let mut sack = sack_with(vec![
            record("foo-devel", "1.0-1", "x86_64", false),
            record("bar", "1.0-1", "x86_64", false),
        ]);
        let mut q = Query::new(&mut sack)
            .filter_str(Key::Name, CmpFlags::GLOB, "foo*")
            .unwrap();
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn not_modifier_inverts_match_set() {
        let mut sack = sack_with(vec![
            record("foo", "1.0-1", "x86_64", false),
            record("bar", "1.0-1", "x86_64", false),
        ]);
        let mut q = Query::new(&mut sack)
            .filter_str(Key::Name, CmpFlags::EQ | CmpFlags::NOT, "foo")
            .unwrap();
        assert_eq!(q.len(), 1);
        let remaining = q.run();
        let record = sack_ref_record(&sack, remaining.as_slice()[0]);
        assert_eq!(record, "bar");
    }

    fn sack_ref_record(sack: &Sack, id: SolvableId) -> String {
        sack.pool().resolve_solvable(id).nevra.name.clone()
    }

    #[test]
    fn invalid_location_cmp_rejected() {
        let mut sack = sack_with(vec![record("foo", "1.0-1", "x86_64", false)]);
        let err = Query::new(&mut sack).filter_str(Key::Location, CmpFlags::GLOB, "*.rpm");
        assert!(err.is_err());
    }

    #[test]
    fn latest_keeps_highest_evr_per_name() {
        let mut sack = sack_with(vec![
            record("foo", "1.0-1", "x86_64", false),
            record("foo", "2.0-1", "x86_64", false),
        ]);
        let mut q = Query::new(&mut sack).latest(true);
        assert_eq!(q.len(), 1);
        let list = q.run();
        let kept = sack.pool().resolve_solvable(list.as_slice()[0]);
        assert_eq!(kept.nevra.version.as_deref(), Some("2.0"));
    }

    #[test]
    fn updates_finds_noninstalled_newer_than_installed() {
        let mut sack = sack_with(vec![
            record("foo", "1.0-1", "x86_64", true),
            record("foo", "2.0-1", "x86_64", false),
        ]);
        let mut q = Query::new(&mut sack).updates(true);
        assert_eq!(q.len(), 1);
    }
}
