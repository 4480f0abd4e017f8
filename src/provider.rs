//! Bridge between [`RpmPool`] and resolvo's [`DependencyProvider`] trait.
//!
//! [`RpmDependencyProvider`] is built fresh for every [`crate::goal::Goal::run`]
//! from a cloned snapshot of the sack's pool: resolvo takes ownership of its
//! provider, so the sack's long-lived `RpmPool` is never itself handed to the
//! solver. Construction walks every solvable once, builds the capability
//! "provides index" (self-provide plus explicit `Provides`), and converts each
//! package's `Requires`/`Conflicts`/`Obsoletes` into resolvo requirements and
//! constrains.

use std::collections::HashMap;
use std::fmt;

use resolvo::{
    Candidates, Condition, ConditionId, ConditionalRequirement, Dependencies,
    HintDependenciesAvailable, Interner, KnownDependencies, NameId, Requirement, SolvableId,
    SolverCache, StringId, VersionSetId, VersionSetUnionId,
};

use crate::evr::Evr;
use crate::pool::{ReqExpr, RpmPool, VersionConstraint};
use crate::reldep::{CmpFlags, Reldep};
use crate::version_match::evr_satisfies;

/// Dependency provider bridging RPM package records to the resolvo solver.
pub struct RpmDependencyProvider {
    pool: RpmPool,
    /// Every solvable providing a given capability name, self-provide
    /// included.
    provide_candidates: HashMap<NameId, Vec<SolvableId>>,
    /// `(solvable, capability name) -> EVR of that specific provide`, used
    /// by [`filter_candidates`](DependencyProvider::filter_candidates) to
    /// test a versioned requirement. `None` means the provide is bare
    /// (unversioned) and only satisfies bare requirements.
    provide_evr: HashMap<(SolvableId, NameId), Option<Evr>>,
    dependencies: HashMap<SolvableId, KnownDependencies>,
    favored: HashMap<NameId, SolvableId>,
    locked: HashMap<NameId, SolvableId>,
}

impl RpmDependencyProvider {
    /// Build a provider from a pool snapshot plus per-name favored/locked
    /// solvables (installed-package preferences; see
    /// [`crate::goal::Goal::run`]).
    pub fn build(
        mut pool: RpmPool,
        favored: HashMap<NameId, SolvableId>,
        locked: HashMap<NameId, SolvableId>,
    ) -> Self {
        let ids: Vec<SolvableId> = pool.all_solvable_ids().collect();

        let mut provide_candidates: HashMap<NameId, Vec<SolvableId>> = HashMap::new();
        let mut provide_evr: HashMap<(SolvableId, NameId), Option<Evr>> = HashMap::new();

        for &id in &ids {
            let record = pool.resolve_solvable(id).clone();
            let self_name = pool.solvable_name(id);
            register_provide(&mut provide_candidates, &mut provide_evr, id, self_name, Some(record.nevra.evr()));
            for p in record.deps.provides.iter() {
                let name_id = pool.intern_name(&p.name);
                register_provide(&mut provide_candidates, &mut provide_evr, id, name_id, p.evr.clone());
            }
        }

        let mut dependencies: HashMap<SolvableId, KnownDependencies> = HashMap::new();
        for &id in &ids {
            let record = pool.resolve_solvable(id).clone();
            let mut requirements = Vec::new();
            let mut constrains = Vec::new();

            for req in &record.deps.requires {
                push_requirement(&mut pool, req, &mut requirements);
            }
            for reldep in record.deps.conflicts.iter().chain(record.deps.obsoletes.iter()) {
                constrains.push(intern_reldep(&mut pool, reldep));
            }

            dependencies.insert(id, KnownDependencies { requirements, constrains });
        }

        RpmDependencyProvider {
            pool,
            provide_candidates,
            provide_evr,
            dependencies,
            favored,
            locked,
        }
    }

    /// Borrow the snapshot pool (used by [`crate::goal::Goal`] to read back
    /// solved package records).
    pub fn pool(&self) -> &RpmPool {
        &self.pool
    }
}

fn register_provide(
    provide_candidates: &mut HashMap<NameId, Vec<SolvableId>>,
    provide_evr: &mut HashMap<(SolvableId, NameId), Option<Evr>>,
    id: SolvableId,
    name: NameId,
    evr: Option<Evr>,
) {
    let list = provide_candidates.entry(name).or_default();
    if !list.contains(&id) {
        list.push(id);
    }
    provide_evr.entry((id, name)).or_insert(evr);
}

fn intern_reldep(pool: &mut RpmPool, reldep: &Reldep) -> VersionSetId {
    pool.intern_version_set(VersionConstraint {
        name: reldep.name.clone(),
        flags: reldep.flags,
        evr: reldep.evr.clone(),
    })
}

fn push_requirement(pool: &mut RpmPool, req: &ReqExpr, requirements: &mut Vec<ConditionalRequirement>) {
    match req {
        ReqExpr::Single(reldep) => {
            let vs = intern_reldep(pool, reldep);
            requirements.push(ConditionalRequirement {
                condition: None,
                requirement: Requirement::Single(vs),
            });
        }
        ReqExpr::Or(alts) => {
            if alts.is_empty() {
                return;
            }
            let vs_ids: Vec<VersionSetId> = alts.iter().map(|r| intern_reldep(pool, r)).collect();
            if vs_ids.len() == 1 {
                requirements.push(ConditionalRequirement {
                    condition: None,
                    requirement: Requirement::Single(vs_ids[0]),
                });
            } else {
                let union_id = pool.intern_version_set_union(vs_ids);
                requirements.push(ConditionalRequirement {
                    condition: None,
                    requirement: Requirement::Union(union_id),
                });
            }
        }
    }
}

struct DisplaySolvable<'a>(&'a RpmPool, SolvableId);

impl fmt::Display for DisplaySolvable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.resolve_solvable(self.1).nevra_string())
    }
}

struct DisplayVersionSet<'a>(&'a RpmPool, VersionSetId);

impl fmt::Display for DisplayVersionSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.resolve_version_set(self.1))
    }
}

impl Interner for RpmDependencyProvider {
    fn display_solvable(&self, solvable: SolvableId) -> impl fmt::Display + '_ {
        DisplaySolvable(&self.pool, solvable)
    }

    fn display_name(&self, name: NameId) -> impl fmt::Display + '_ {
        self.pool.resolve_name(name)
    }

    fn display_version_set(&self, version_set: VersionSetId) -> impl fmt::Display + '_ {
        DisplayVersionSet(&self.pool, version_set)
    }

    fn display_string(&self, string_id: StringId) -> impl fmt::Display + '_ {
        self.pool.resolve_string(string_id)
    }

    fn version_set_name(&self, version_set: VersionSetId) -> NameId {
        self.pool.version_set_name(version_set)
    }

    fn solvable_name(&self, solvable: SolvableId) -> NameId {
        self.pool.solvable_name(solvable)
    }

    fn version_sets_in_union(
        &self,
        version_set_union: VersionSetUnionId,
    ) -> impl Iterator<Item = VersionSetId> {
        self.pool.resolve_version_set_union(version_set_union).iter().copied()
    }

    fn resolve_condition(&self, condition: ConditionId) -> Condition {
        self.pool.resolve_condition(condition).clone()
    }
}

impl resolvo::DependencyProvider for RpmDependencyProvider {
    async fn get_candidates(&self, name: NameId) -> Option<Candidates> {
        let solvables = self.provide_candidates.get(&name)?;
        Some(Candidates {
            candidates: solvables.clone(),
            favored: self.favored.get(&name).copied(),
            locked: self.locked.get(&name).copied(),
            hint_dependencies_available: HintDependenciesAvailable::All,
            excluded: Vec::new(),
        })
    }

    async fn sort_candidates(&self, _solver: &SolverCache<Self>, solvables: &mut [SolvableId]) {
        // Newest EVR first so the solver prefers the newest available
        // package when multiple versions satisfy a requirement.
        solvables.sort_by(|a, b| {
            let ea = self.pool.resolve_solvable(*a).nevra.evr();
            let eb = self.pool.resolve_solvable(*b).nevra.evr();
            eb.cmp(&ea)
        });
    }

    async fn filter_candidates(
        &self,
        candidates: &[SolvableId],
        version_set: VersionSetId,
        inverse: bool,
    ) -> Vec<SolvableId> {
        let constraint = self.pool.resolve_version_set(version_set);
        let constraint_name = self.pool.version_set_name(version_set);

        candidates
            .iter()
            .copied()
            .filter(|&id| {
                let matches = provide_satisfies(self, id, constraint_name, constraint);
                matches ^ inverse
            })
            .collect()
    }

    async fn get_dependencies(&self, solvable: SolvableId) -> Dependencies {
        match self.dependencies.get(&solvable) {
            Some(deps) => Dependencies::Known(deps.clone()),
            None => Dependencies::Known(KnownDependencies::default()),
        }
    }
}

/// Does solvable `id` carry a provide (self or explicit) satisfying
/// `constraint`, whose name has already been resolved to `constraint_name`?
fn provide_satisfies(
    provider: &RpmDependencyProvider,
    id: SolvableId,
    constraint_name: NameId,
    constraint: &VersionConstraint,
) -> bool {
    let Some(provide_evr) = provider.provide_evr.get(&(id, constraint_name)) else {
        return false;
    };
    match (&constraint.evr, provide_evr) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(want), Some(have)) => {
            let flags = if constraint.flags.intersects(CmpFlags::LT | CmpFlags::GT | CmpFlags::EQ) {
                constraint.flags
            } else {
                CmpFlags::EQ
            };
            evr_satisfies(have, flags, want)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{PackageDeps, PackageRecord as Pkg};
    use crate::reldep::Reldep;
    use resolvo::{Problem, Solver};

    fn base_record(nevra: &str) -> Pkg {
        let n = crate::nevra::Nevra::parse_form(nevra, crate::nevra::NevraForm::Nevra).unwrap();
        Pkg {
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
    fn sort_prefers_newest_evr() {
        let mut pool = RpmPool::new();
        let old = pool.intern_solvable(base_record("foo-1.0-1.x86_64"));
        let new = pool.intern_solvable(base_record("foo-1.1-1.x86_64"));
        let provider = RpmDependencyProvider::build(pool, HashMap::new(), HashMap::new());
        assert!(provider.pool.resolve_solvable(new).nevra.evr() > provider.pool.resolve_solvable(old).nevra.evr());
    }

    #[test]
    fn requires_pulls_in_dependency() {
        let mut pool = RpmPool::new();
        let mut bar = base_record("bar-2.0-1.x86_64");
        bar.deps.provides = vec![Reldep::bare("bar")];
        pool.intern_solvable(bar);

        let mut foo = base_record("foo-1.0-1.x86_64");
        foo.deps.requires.push(ReqExpr::Single(Reldep::bare("bar")));
        pool.intern_solvable(foo);

        let vs = pool.intern_version_set(VersionConstraint {
            name: "foo".into(),
            flags: CmpFlags::empty(),
            evr: None,
        });
        let req = resolvo::ConditionalRequirement {
            condition: None,
            requirement: Requirement::Single(vs),
        };

        let provider = RpmDependencyProvider::build(pool, HashMap::new(), HashMap::new());
        let problem = Problem::new().requirements(vec![req]);
        let mut solver = Solver::new(provider);
        let solution = solver.solve(problem).unwrap();
        assert_eq!(solution.len(), 2);
    }
}
