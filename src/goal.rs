//! Transaction planner: stages install/upgrade/erase jobs, drives the
//! SAT solver once (plus one installonly-limit re-solve pass), and
//! classifies the resulting solution against the pre-solve installed
//! set.
//!
//! Grounded on the teacher's own solve loop (`Solver::new(provider)` +
//! `Problem::new().requirements(...)`, [`crate::provider`]) generalized
//! from a single flat requirement list into staged, overridable
//! per-capability jobs.

use std::collections::{HashMap, HashSet};

use bitflags::bitflags;
use resolvo::{ConditionalRequirement, NameId, Problem, Requirement, Solver, SolvableId};

use crate::error::{Result, SackError};
use crate::pool::{RpmPool, VersionConstraint};
use crate::provider::RpmDependencyProvider;
use crate::reldep::CmpFlags;
use crate::sack::{InstallonlyConfig, Sack};
use crate::selector::Selector;

bitflags! {
    /// Per-job modifiers (`upgrade_to`'s `CheckInstalled`, `erase`'s
    /// `CleanDeps`, `install`'s best-effort marker).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct JobFlags: u32 {
        /// Fail the job at staging time if the target's name has no
        /// installed package.
        const CHECK_INSTALLED = 1 << 0;
        /// Also drop now-unneeded dependencies of an erased package.
        const CLEAN_DEPS = 1 << 1;
        /// The job is best-effort: a solve that cannot satisfy it should
        /// still succeed for everything else.
        const WEAK = 1 << 2;
    }
}

bitflags! {
    /// `Goal::run` behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RunFlags: u32 {
        /// Allow the solve to uninstall packages to reach a solution
        /// (set automatically for the installonly-limit re-solve pass).
        const ALLOW_UNINSTALL = 1 << 0;
        /// Treat `Recommends`/`Suggests`/etc. as absent.
        const IGNORE_WEAK_DEPS = 1 << 1;
        /// Re-verify every installed package's dependencies, not just
        /// the ones jobs touch.
        const VERIFY_ALL = 1 << 2;
        /// Mark every staged job best-effort.
        const BEST_EFFORT = 1 << 3;
    }
}

bitflags! {
    /// Accumulated record of which job kinds this goal has staged, OR'd
    /// in as jobs are added.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ActionMask: u32 {
        const INSTALL = 1 << 0;
        const UPGRADE = 1 << 1;
        const UPGRADE_ALL = 1 << 2;
        const DOWNGRADE = 1 << 3;
        const ERASE = 1 << 4;
        const DISTUPGRADE = 1 << 5;
        const DISTUPGRADE_ALL = 1 << 6;
    }
}

/// Why the solver selected a package's installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Directly named by a staged job.
    User,
    /// Pulled in transitively to satisfy a requirement.
    Dep,
}

#[derive(Debug, Clone)]
enum Job {
    Install { id: SolvableId, flags: JobFlags },
    UpgradeAll,
    UpgradeTo { id: SolvableId },
    UpgradeSelector(Selector),
    DistupgradeAll,
    Distupgrade(SolvableId),
    DistupgradeSelector(Selector),
    DowngradeTo(SolvableId),
    Erase { id: SolvableId, flags: JobFlags },
    UserInstalled(SolvableId),
}

/// The classified result of a successful [`Goal::run`].
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    installs: Vec<SolvableId>,
    erasures: Vec<SolvableId>,
    unneeded: Vec<SolvableId>,
    reinstalls: Vec<SolvableId>,
    upgrades: Vec<(SolvableId, SolvableId)>,
    downgrades: Vec<(SolvableId, SolvableId)>,
    obsoleted: HashMap<SolvableId, Vec<SolvableId>>,
}

impl Transaction {
    pub fn installs(&self) -> &[SolvableId] {
        &self.installs
    }

    pub fn erasures(&self) -> &[SolvableId] {
        &self.erasures
    }

    /// Installed packages the solver dropped as a side effect, rather
    /// than via an explicit `erase` job.
    pub fn list_unneeded(&self) -> &[SolvableId] {
        &self.unneeded
    }

    pub fn reinstalls(&self) -> &[SolvableId] {
        &self.reinstalls
    }

    pub fn upgrades(&self) -> &[(SolvableId, SolvableId)] {
        &self.upgrades
    }

    pub fn downgrades(&self) -> &[(SolvableId, SolvableId)] {
        &self.downgrades
    }

    /// The installed packages obsoleted by `pkg`'s installation, if any.
    pub fn list_obsoleted_by_package(&self, pkg: SolvableId) -> &[SolvableId] {
        self.obsoleted.get(&pkg).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A staged transaction plan: a job queue plus (after `run`) a
/// classified [`Transaction`].
#[derive(Debug, Clone, Default)]
pub struct Goal {
    jobs: Vec<Job>,
    action_mask: ActionMask,
    user_installed: HashSet<SolvableId>,
    explicit: HashSet<SolvableId>,
    result: Option<Transaction>,
    last_run_failed: bool,
    problems: Vec<String>,
    /// `uname -r`-style release string, set via [`Goal::protect_running_kernel`],
    /// used only by the installonly-limit pass to exempt the running kernel.
    running_kernel_release: Option<String>,
}

impl Goal {
    /// An empty goal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install exactly this package (pins its EVR).
    pub fn install(&mut self, id: SolvableId) -> &mut Self {
        self.jobs.push(Job::Install {
            id,
            flags: JobFlags::empty(),
        });
        self.action_mask |= ActionMask::INSTALL;
        self
    }

    /// Install `id`, but don't fail the whole solve if it can't be
    /// satisfied.
    pub fn install_optional(&mut self, id: SolvableId) -> &mut Self {
        self.jobs.push(Job::Install {
            id,
            flags: JobFlags::WEAK,
        });
        self.action_mask |= ActionMask::INSTALL;
        self
    }

    pub fn upgrade_all(&mut self) -> &mut Self {
        self.jobs.push(Job::UpgradeAll);
        self.action_mask |= ActionMask::UPGRADE_ALL;
        self
    }

    /// Upgrade to exactly this package. If `flags` has `CHECK_INSTALLED`
    /// and no package of the same name is currently installed, this
    /// fails immediately with `Validation`.
    pub fn upgrade_to(&mut self, sack: &Sack, id: SolvableId, flags: JobFlags) -> Result<&mut Self> {
        if flags.contains(JobFlags::CHECK_INSTALLED) {
            let name = &sack.pool().resolve_solvable(id).nevra.name;
            let installed = sack
                .pool()
                .all_solvable_ids()
                .any(|i| sack.pool().resolve_solvable(i).installed && &sack.pool().resolve_solvable(i).nevra.name == name);
            if !installed {
                return Err(SackError::Validation(format!(
                    "{name} is not installed"
                )));
            }
        }
        self.jobs.push(Job::UpgradeTo { id });
        self.action_mask |= ActionMask::UPGRADE;
        Ok(self)
    }

    /// Upgrade job for a selector. If the selector fixes an exact EVR,
    /// it is staged as an install instead of an update-to-newest.
    pub fn upgrade_selector(&mut self, sltr: Selector) -> &mut Self {
        self.jobs.push(Job::UpgradeSelector(sltr));
        self.action_mask |= ActionMask::UPGRADE;
        self
    }

    pub fn distupgrade_all(&mut self) -> &mut Self {
        self.jobs.push(Job::DistupgradeAll);
        self.action_mask |= ActionMask::DISTUPGRADE_ALL;
        self
    }

    pub fn distupgrade(&mut self, id: SolvableId) -> &mut Self {
        self.jobs.push(Job::Distupgrade(id));
        self.action_mask |= ActionMask::DISTUPGRADE;
        self
    }

    pub fn distupgrade_selector(&mut self, sltr: Selector) -> &mut Self {
        self.jobs.push(Job::DistupgradeSelector(sltr));
        self.action_mask |= ActionMask::DISTUPGRADE;
        self
    }

    /// Same staging as `install`; classified as a downgrade once the
    /// solution's EVR compares lower than what's installed.
    pub fn downgrade_to(&mut self, id: SolvableId) -> &mut Self {
        self.jobs.push(Job::DowngradeTo(id));
        self.action_mask |= ActionMask::DOWNGRADE;
        self
    }

    pub fn erase(&mut self, id: SolvableId, flags: JobFlags) -> &mut Self {
        self.jobs.push(Job::Erase { id, flags });
        self.action_mask |= ActionMask::ERASE;
        self
    }

    /// Mark a package as user-installed (exempt from `list_unneeded`).
    pub fn userinstalled(&mut self, id: SolvableId) -> &mut Self {
        self.jobs.push(Job::UserInstalled(id));
        self
    }

    /// Exempt the package owning `/boot/vmlinuz-<release>` from the
    /// installonly-limit erasure pass.
    pub fn protect_running_kernel(&mut self, release: &str) -> &mut Self {
        self.running_kernel_release = Some(release.to_string());
        self
    }

    pub fn action_mask(&self) -> ActionMask {
        self.action_mask
    }

    /// Solve the staged jobs against `sack`'s current contents.
    pub fn run(&mut self, sack: &mut Sack, flags: RunFlags) -> Result<()> {
        sack.considered();
        let mut pool = sack.pool().clone();

        let installed_ids: Vec<SolvableId> = pool
            .all_solvable_ids()
            .filter(|&id| pool.resolve_solvable(id).installed)
            .collect();
        let before = crate::package_set::PackageSet::from_ids(pool.solvable_count(), installed_ids.iter().copied());

        // Installonly names (kernel and the like) can have several
        // coexisting installed versions, which a single bare per-name
        // requirement can't express (the solver would keep only one
        // provider). Each installed solvable of such a name instead gets
        // its own pinned requirement, independent of the name-keyed
        // override map every other installed package uses.
        let installonly_names: HashSet<String> = sack.installonly().names.iter().cloned().collect();

        let mut req_map: HashMap<NameId, ConditionalRequirement> = HashMap::new();
        let mut favored: HashMap<NameId, SolvableId> = HashMap::new();
        let mut pinned: HashMap<SolvableId, ConditionalRequirement> = HashMap::new();
        self.explicit.clear();

        for &id in &installed_ids {
            let name_id = pool.solvable_name(id);
            if installonly_names.contains(&pool.resolve_solvable(id).nevra.name) {
                pinned.insert(id, exact_requirement(&mut pool, id));
                continue;
            }
            let vs = pool.intern_version_set(VersionConstraint {
                name: pool.resolve_solvable(id).nevra.name.clone(),
                flags: CmpFlags::empty(),
                evr: None,
            });
            req_map.insert(
                name_id,
                ConditionalRequirement {
                    condition: None,
                    requirement: Requirement::Single(vs),
                },
            );
            favored.insert(name_id, id);
        }

        for job in self.jobs.clone() {
            self.apply_job(
                sack,
                &mut pool,
                &mut req_map,
                &mut favored,
                &mut pinned,
                &installonly_names,
                job,
            )?;
        }

        let requirements: Vec<ConditionalRequirement> = req_map
            .values()
            .cloned()
            .chain(pinned.values().cloned())
            .collect();
        let problem = Problem::new().requirements(requirements);
        let provider = RpmDependencyProvider::build(pool, favored, HashMap::new());
        let mut solver = Solver::new(provider);

        match solver.solve(problem) {
            Ok(solution) => {
                let result_pool = solver.provider().pool().clone();
                let mut after = crate::package_set::PackageSet::from_ids(
                    result_pool.solvable_count(),
                    solution.iter().copied(),
                );

                let installonly = sack.installonly().clone();
                let running = self
                    .running_kernel_release
                    .as_deref()
                    .and_then(|release| sack.running_kernel(release));
                let extra_erased =
                    apply_installonly_limit(&result_pool, running, &mut after, &installonly);

                if !extra_erased.is_empty() && !flags.contains(RunFlags::ALLOW_UNINSTALL) {
                    // Re-solve once, allowing the erasures the limit
                    // pass decided on, by dropping those ids' pinned
                    // requirement (installonly names) or their name's
                    // default requirement, and re-solving.
                    for &id in &extra_erased {
                        pinned.remove(&id);
                        req_map.remove(&result_pool.solvable_name(id));
                    }
                    let requirements: Vec<ConditionalRequirement> = req_map
                        .values()
                        .cloned()
                        .chain(pinned.values().cloned())
                        .collect();
                    let problem = Problem::new().requirements(requirements);
                    let provider = RpmDependencyProvider::build(
                        result_pool.clone(),
                        HashMap::new(),
                        HashMap::new(),
                    );
                    let mut solver = Solver::new(provider);
                    if let Ok(solution) = solver.solve(problem) {
                        let result_pool = solver.provider().pool().clone();
                        after = crate::package_set::PackageSet::from_ids(
                            result_pool.solvable_count(),
                            solution.iter().copied(),
                        );
                        let transaction = classify(
                            &result_pool,
                            &before,
                            &after,
                            &self.explicit,
                            &self.user_installed,
                        );
                        self.result = Some(transaction);
                        self.last_run_failed = false;
                        self.problems.clear();
                        return Ok(());
                    }
                }

                let transaction = classify(
                    &result_pool,
                    &before,
                    &after,
                    &self.explicit,
                    &self.user_installed,
                );
                self.result = Some(transaction);
                self.last_run_failed = false;
                self.problems.clear();
                Ok(())
            }
            Err(e) => {
                self.result = None;
                self.last_run_failed = true;
                self.problems = vec![format!("{e:?}")];
                Err(SackError::NoSolution(self.problems.clone()))
            }
        }
    }

    fn apply_job(
        &mut self,
        sack: &mut Sack,
        pool: &mut RpmPool,
        req_map: &mut HashMap<NameId, ConditionalRequirement>,
        favored: &mut HashMap<NameId, SolvableId>,
        pinned: &mut HashMap<SolvableId, ConditionalRequirement>,
        installonly_names: &HashSet<String>,
        job: Job,
    ) -> Result<()> {
        match job {
            Job::Install { id, .. } | Job::UpgradeTo { id } | Job::DowngradeTo(id) => {
                if installonly_names.contains(&pool.resolve_solvable(id).nevra.name) {
                    let req = exact_requirement(pool, id);
                    pinned.insert(id, req);
                } else {
                    pin_exact(pool, req_map, favored, id);
                }
                self.explicit.insert(id);
            }
            Job::UpgradeAll | Job::DistupgradeAll => {
                for name_id in favored.keys().copied().collect::<Vec<_>>() {
                    favored.remove(&name_id);
                }
            }
            Job::Distupgrade(id) => {
                if installonly_names.contains(&pool.resolve_solvable(id).nevra.name) {
                    // Unpin this specific installed solvable so the solver
                    // is free to replace it; the other pinned versions of
                    // the same name are untouched.
                    pinned.remove(&id);
                } else {
                    let name_id = pool.solvable_name(id);
                    favored.remove(&name_id);
                }
                self.explicit.insert(id);
            }
            Job::UpgradeSelector(sltr) | Job::DistupgradeSelector(sltr) => {
                let fixes_evr = sltr.fixes_evr();
                let matched = sltr.matches(sack)?;
                for id in matched.iter() {
                    let is_installonly = installonly_names.contains(&pool.resolve_solvable(id).nevra.name);
                    if is_installonly {
                        if fixes_evr {
                            let req = exact_requirement(pool, id);
                            pinned.insert(id, req);
                        } else {
                            pinned.remove(&id);
                        }
                    } else if fixes_evr {
                        pin_exact(pool, req_map, favored, id);
                    } else {
                        let name_id = pool.solvable_name(id);
                        favored.remove(&name_id);
                    }
                    self.explicit.insert(id);
                }
            }
            Job::Erase { id, .. } => {
                pinned.remove(&id);
                let name_id = pool.solvable_name(id);
                req_map.remove(&name_id);
                favored.remove(&name_id);
                self.explicit.insert(id);
            }
            Job::UserInstalled(id) => {
                self.user_installed.insert(id);
            }
        }
        Ok(())
    }

    /// Number of unsolvable-rule problems from the last failed run.
    pub fn count_problems(&self) -> usize {
        self.problems.len()
    }

    /// A human-readable description of problem `i` from the last failed
    /// run.
    pub fn describe_problem(&self, i: usize) -> Option<&str> {
        self.problems.get(i).map(String::as_str)
    }

    fn transaction(&self) -> Result<&Transaction> {
        match (&self.result, self.last_run_failed) {
            (Some(t), _) => Ok(t),
            (None, true) => Err(SackError::NoSolution(self.problems.clone())),
            (None, false) => Err(SackError::Op("goal has not been run".into())),
        }
    }

    pub fn installs(&self) -> Result<&[SolvableId]> {
        self.transaction().map(Transaction::installs)
    }

    pub fn erasures(&self) -> Result<&[SolvableId]> {
        self.transaction().map(Transaction::erasures)
    }

    pub fn list_unneeded(&self) -> Result<&[SolvableId]> {
        self.transaction().map(Transaction::list_unneeded)
    }

    pub fn reinstalls(&self) -> Result<&[SolvableId]> {
        self.transaction().map(Transaction::reinstalls)
    }

    pub fn upgrades(&self) -> Result<&[(SolvableId, SolvableId)]> {
        self.transaction().map(Transaction::upgrades)
    }

    pub fn downgrades(&self) -> Result<&[(SolvableId, SolvableId)]> {
        self.transaction().map(Transaction::downgrades)
    }

    pub fn list_obsoleted_by_package(&self, pkg: SolvableId) -> Result<&[SolvableId]> {
        self.transaction().map(|t| t.list_obsoleted_by_package(pkg))
    }

    /// `User` if `pkg` was named directly by a staged job, `Dep` if it
    /// was pulled in transitively.
    pub fn get_reason(&self, pkg: SolvableId) -> Reason {
        if self.explicit.contains(&pkg) {
            Reason::User
        } else {
            Reason::Dep
        }
    }
}

fn pin_exact(
    pool: &mut RpmPool,
    req_map: &mut HashMap<NameId, ConditionalRequirement>,
    favored: &mut HashMap<NameId, SolvableId>,
    id: SolvableId,
) {
    let name_id = pool.solvable_name(id);
    let req = exact_requirement(pool, id);
    req_map.insert(name_id, req);
    favored.insert(name_id, id);
}

/// A requirement satisfied only by `id`'s exact NEVRA, independent of any
/// name-keyed override map.
fn exact_requirement(pool: &mut RpmPool, id: SolvableId) -> ConditionalRequirement {
    let record = pool.resolve_solvable(id).clone();
    let vs = pool.intern_version_set(VersionConstraint {
        name: record.nevra.name.clone(),
        flags: CmpFlags::EQ,
        evr: Some(record.nevra.evr()),
    });
    ConditionalRequirement {
        condition: None,
        requirement: Requirement::Single(vs),
    }
}

/// Keep at most `installonly.limit` providers of each installonly name
/// in `after`, erasing the oldest first, never the running kernel.
/// Returns the ids erased by this pass.
fn apply_installonly_limit(
    pool: &RpmPool,
    running: Option<SolvableId>,
    after: &mut crate::package_set::PackageSet,
    installonly: &InstallonlyConfig,
) -> Vec<SolvableId> {
    if installonly.limit == 0 {
        return Vec::new();
    }
    let mut erased = Vec::new();
    for name in &installonly.names {
        let mut providers: Vec<SolvableId> = after
            .iter()
            .filter(|&id| &pool.resolve_solvable(id).nevra.name == name)
            .collect();
        if providers.len() <= installonly.limit as usize {
            continue;
        }
        // Order the running kernel last regardless of its NEVRA, so it
        // never falls inside the oldest-first eviction prefix below.
        providers.sort_by(|&a, &b| {
            let a_running = Some(a) == running;
            let b_running = Some(b) == running;
            match (a_running, b_running) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => pool
                    .resolve_solvable(a)
                    .nevra
                    .cmp(&pool.resolve_solvable(b).nevra),
            }
        });
        let keep_from = providers.len() - installonly.limit as usize;
        for &id in &providers[..keep_from] {
            after.remove(id);
            erased.push(id);
        }
    }
    erased
}

fn group_by_name<'a>(
    pool: &'a RpmPool,
    set: &crate::package_set::PackageSet,
) -> HashMap<&'a str, Vec<SolvableId>> {
    let mut out: HashMap<&str, Vec<SolvableId>> = HashMap::new();
    for id in set.iter() {
        out.entry(pool.resolve_solvable(id).nevra.name.as_str())
            .or_default()
            .push(id);
    }
    out
}

fn classify(
    pool: &RpmPool,
    before: &crate::package_set::PackageSet,
    after: &crate::package_set::PackageSet,
    explicit: &HashSet<SolvableId>,
    user_installed: &HashSet<SolvableId>,
) -> Transaction {
    use std::cmp::Ordering;

    let before_by_name = group_by_name(pool, before);

    let mut txn = Transaction::default();
    let mut consumed_before: HashSet<SolvableId> = HashSet::new();

    for id in after.iter() {
        if before.contains(id) {
            txn.reinstalls.push(id);
            continue;
        }
        let record = pool.resolve_solvable(id);
        match before_by_name.get(record.nevra.name.as_str()) {
            None => txn.installs.push(id),
            Some(prior_ids) => {
                let prior_id = prior_ids.iter().copied().find(|p| !after.contains(*p)).unwrap_or(prior_ids[0]);
                consumed_before.insert(prior_id);
                let prior_record = pool.resolve_solvable(prior_id);
                match record.nevra.cmp(&prior_record.nevra) {
                    Ordering::Greater => txn.upgrades.push((prior_id, id)),
                    Ordering::Less => txn.downgrades.push((prior_id, id)),
                    Ordering::Equal => txn.reinstalls.push(id),
                }
            }
        }
        for obs in &record.deps.obsoletes {
            if let Some(victims) = before_by_name.get(obs.name.as_str()) {
                for &victim in victims {
                    if !after.contains(victim) {
                        txn.obsoleted.entry(id).or_default().push(victim);
                    }
                }
            }
        }
    }

    let obsoleted_victims: HashSet<SolvableId> =
        txn.obsoleted.values().flatten().copied().collect();

    for id in before.iter() {
        if after.contains(id) || obsoleted_victims.contains(&id) || consumed_before.contains(&id) {
            continue;
        }
        if explicit.contains(&id) || user_installed.contains(&id) {
            txn.erasures.push(id);
        } else {
            txn.unneeded.push(id);
        }
    }

    txn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nevra::Nevra;
    use crate::pool::{PackageDeps, PackageRecord};
    use crate::reldep::Reldep;
    use crate::sack::BuildCache;
    use resolvo::ArenaId;

    fn record(name: &str, version: &str, installed: bool) -> PackageRecord {
        PackageRecord {
            nevra: Nevra {
                name: name.into(),
                epoch: None,
                version: Some(version.into()),
                release: Some("1".into()),
                arch: Some("x86_64".into()),
            },
            repo: if installed { "@System".into() } else { "fedora".into() },
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
            deps: PackageDeps::default(),
            installed,
        }
    }

    #[test]
    fn install_job_records_action_mask() {
        let mut goal = Goal::new();
        goal.install(SolvableId::from_usize(0));
        assert!(goal.action_mask().contains(ActionMask::INSTALL));
    }

    #[test]
    fn listing_before_run_fails_with_op() {
        let goal = Goal::new();
        assert!(goal.installs().is_err());
    }

    #[test]
    fn run_installs_a_new_package() {
        let mut sack = Sack::new(None, Some("x86_64"), None, BuildCache::Disabled).unwrap();
        let mut provide = record("foo", "1.0", false);
        provide.deps.provides = vec![Reldep::bare("foo")];
        let id = sack.pool_mut().intern_solvable(provide);
        sack.mark_dirty();

        let mut goal = Goal::new();
        goal.install(id);
        goal.run(&mut sack, RunFlags::empty()).unwrap();

        assert_eq!(goal.installs().unwrap(), &[id]);
    }
}
