//! In-memory RPM package database and SAT-based transaction planner.
//!
//! [`Sack`](sack::Sack) holds every package known from already-fetched
//! repository metadata plus the local rpmdb; [`Query`](query::Query) and
//! [`Selector`](selector::Selector) build package sets and job targets
//! against it; [`Goal`](goal::Goal) stages install/upgrade/erase jobs and
//! drives [`resolvo`]'s SAT solver to produce a classified transaction
//! plan. Fetching repositories, unpacking RPM payloads, running
//! scriptlets, and verifying signatures are out of scope: this crate
//! only reasons about metadata already on disk.

mod advisory;
mod arch;
mod cache;
mod error;
mod evr;
mod goal;
pub mod metadata;
mod nevra;
mod package_list;
mod package_set;
mod pool;
mod provider;
mod query;
mod reldep;
mod repository;
mod rpmdb;
mod sack;
mod selector;
mod subject;
mod version_match;

pub use advisory::{Advisory, AdvisoryPkg, AdvisoryRef, AdvisoryRefType, AdvisoryType};
pub use arch::ArchList;
pub use error::{Result, SackError};
pub use evr::Evr;
pub use goal::{ActionMask, Goal, JobFlags, Reason, RunFlags, Transaction};
pub use nevra::{Nevra, NevraForm};
pub use package_list::PackageList;
pub use package_set::PackageSet;
pub use pool::{PackageDeps, PackageFile, PackageRecord, ReqExpr, RpmPool, VersionConstraint};
pub use query::{Key, Match, Query};
pub use reldep::{CmpFlags, Reldep};
pub use repository::{Extension, ExtensionState, Repo};
pub use sack::{BuildCache, InstallonlyConfig, Sack};
pub use selector::Selector;
pub use subject::Subject;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PackageDeps as Deps;

    fn record(name: &str, version: &str, repo: &str, installed: bool) -> PackageRecord {
        PackageRecord {
            nevra: Nevra {
                name: name.into(),
                epoch: None,
                version: Some(version.into()),
                release: Some("1".into()),
                arch: Some("x86_64".into()),
            },
            repo: repo.into(),
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
            deps: Deps::default(),
            installed,
        }
    }

    fn empty_sack() -> Sack {
        Sack::new(None, Some("x86_64"), None, BuildCache::Disabled).unwrap()
    }

    /// End-to-end: query a repo for a package, stage it as an install job,
    /// and run the goal to get a one-package transaction.
    #[test]
    fn query_then_install_plan() {
        let mut sack = empty_sack();
        let mut bash = record("bash", "5.2", "fedora", false);
        bash.deps.provides = vec![Reldep::bare("bash")];
        let bash_id = sack.pool_mut().intern_solvable(bash);
        sack.mark_dirty();

        let mut query = Query::new(&mut sack)
            .filter_str(Key::Name, CmpFlags::EQ, "bash")
            .unwrap();
        let found = query.run();
        assert_eq!(found.len(), 1);
        assert_eq!(found.as_slice()[0], bash_id);

        let mut goal = Goal::new();
        goal.install(bash_id);
        goal.run(&mut sack, RunFlags::empty()).unwrap();
        assert_eq!(goal.installs().unwrap(), &[bash_id]);
    }

    /// A two-repo upgrade: an older installed package plus a newer
    /// candidate of the same name, planned via `upgrade_all`.
    #[test]
    fn upgrade_all_picks_newest_candidate() {
        let mut sack = empty_sack();
        let mut old = record("curl", "8.0", "@System", true);
        old.deps.provides = vec![Reldep::bare("curl")];
        sack.pool_mut().intern_solvable(old);

        let mut new = record("curl", "8.4", "fedora", false);
        new.deps.provides = vec![Reldep::bare("curl")];
        let new_id = sack.pool_mut().intern_solvable(new);
        sack.mark_dirty();

        let mut goal = Goal::new();
        goal.upgrade_all();
        goal.run(&mut sack, RunFlags::empty()).unwrap();

        let upgrades = goal.upgrades().unwrap();
        assert_eq!(upgrades.len(), 1);
        assert_eq!(upgrades[0].1, new_id);
    }

    /// Selector construction and matching against a small sack, the same
    /// `Key::Name` + `Key::Arch` combination `Goal::upgrade_selector`
    /// materializes internally.
    #[test]
    fn selector_with_version_constrains_match() {
        let mut sack = empty_sack();
        sack.pool_mut()
            .intern_solvable(record("zsh", "5.8", "fedora", false));
        sack.pool_mut()
            .intern_solvable(record("zsh", "5.9", "fedora", false));
        sack.mark_dirty();

        let sel = Selector::new()
            .set(Key::Name, CmpFlags::EQ, "zsh")
            .unwrap()
            .set(Key::Evr, CmpFlags::EQ, "5.9-1")
            .unwrap();
        let matched = sel.matches(&mut sack).unwrap();
        assert_eq!(matched.len(), 1);
    }

    /// `NOT` inverts a glob filter's match set.
    #[test]
    fn query_not_glob_inverts() {
        let mut sack = empty_sack();
        sack.pool_mut()
            .intern_solvable(record("kernel", "6.1", "fedora", false));
        sack.pool_mut()
            .intern_solvable(record("vim", "9.0", "fedora", false));
        sack.mark_dirty();

        let mut q = Query::new(&mut sack)
            .filter_str(Key::Name, CmpFlags::GLOB | CmpFlags::NOT, "kernel*")
            .unwrap();
        let result = q.run();
        assert_eq!(result.len(), 1);
        let name = sack.pool().resolve_solvable(result.as_slice()[0]).nevra.name.clone();
        assert_eq!(name, "vim");
    }

    /// A glob filter over `Provides`.
    #[test]
    fn query_provides_glob_matches() {
        let mut sack = empty_sack();
        let mut pkgconf = record("glibc-devel", "2.38", "fedora", false);
        pkgconf.deps.provides = vec![Reldep::bare("pkgconfig(glibc)")];
        sack.pool_mut().intern_solvable(pkgconf);
        sack.mark_dirty();

        let mut q = Query::new(&mut sack)
            .filter_str(Key::Provides, CmpFlags::GLOB, "pkgconfig(*)")
            .unwrap();
        assert_eq!(q.run().len(), 1);
    }

    /// Installonly-limit GC: three kernels installed, limit 2, the oldest
    /// (not the running one) is erased by the limit pass.
    #[test]
    fn installonly_limit_erases_oldest_kernel() {
        let mut sack = empty_sack();
        for v in ["6.0", "6.1", "6.2"] {
            let mut k = record("kernel", v, "@System", true);
            k.deps.provides = vec![Reldep::bare("kernel")];
            k.files = vec![crate::pool::PackageFile {
                path: format!("/boot/vmlinuz-{v}-generic"),
                kind: crate::pool::FileKind::File,
            }];
            sack.pool_mut().intern_solvable(k);
        }
        sack.mark_dirty();
        sack.set_installonly(InstallonlyConfig {
            names: vec!["kernel".into()],
            limit: 2,
        });

        let mut goal = Goal::new();
        goal.upgrade_all();
        goal.protect_running_kernel("6.2-generic");
        goal.run(&mut sack, RunFlags::ALLOW_UNINSTALL).unwrap();

        assert_eq!(goal.erasures().unwrap().len(), 1);
        let erased = goal.erasures().unwrap()[0];
        assert_eq!(
            sack.pool().resolve_solvable(erased).nevra.version.as_deref(),
            Some("6.0")
        );
    }
}
