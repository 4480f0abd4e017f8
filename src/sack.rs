//! `Sack`: the in-memory package database. Owns the pool, the repo
//! handles, and the considered-set/provides-ready bookkeeping that
//! [`crate::query::Query`] and [`crate::goal::Goal`] read.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use resolvo::SolvableId;

use crate::advisory::Advisory;
use crate::arch::ArchList;
use crate::cache::{self, content_checksum};
use crate::error::{Result, SackError};
use crate::metadata::{filelists, prestodelta, primary, repomd, updateinfo, DeltaRpm};
use crate::package_set::PackageSet;
use crate::pool::{PackageFile, RpmPool};
use crate::repository::{Extension, ExtensionState, Repo, COMMANDLINE_REPO_NAME, SYSTEM_REPO_NAME};
use crate::rpmdb;

/// Whether a freshly-parsed repo extension should also be written back
/// to an on-disk cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildCache {
    /// Write a cache snapshot after every successful XML/rpmdb parse.
    Enabled,
    /// Never write cache snapshots.
    Disabled,
}

/// Multiversion/"keep N" policy for a set of capability names (§4.1
/// Installonly).
#[derive(Debug, Clone, Default)]
pub struct InstallonlyConfig {
    /// Capability names whose providers are never implicitly obsoleted.
    pub names: Vec<String>,
    /// Maximum providers of each installonly name to keep; `0` disables
    /// the limit.
    pub limit: u32,
}

/// The in-memory package database.
pub struct Sack {
    pool: RpmPool,
    arches: ArchList,
    cache_dir: Option<PathBuf>,
    rootdir: PathBuf,
    build_cache: BuildCache,
    repos: Vec<Repo>,
    advisories: Vec<Advisory>,
    deltas: Vec<DeltaRpm>,
    provides_ready: bool,
    considered_uptodate: bool,
    considered: Option<PackageSet>,
    installonly: InstallonlyConfig,
    running_kernel: Option<Option<SolvableId>>,
    /// Explicitly excluded solvables (`sack.add_excludes`).
    pkg_excludes: Option<PackageSet>,
    /// Explicit whitelist; when set, only its members (within what
    /// survives `repo_excludes`/`pkg_excludes`) are considered.
    pkg_includes: Option<PackageSet>,
    /// Solvables excluded by whole-repo membership (`sack.add_repo_excludes`).
    repo_excludes: Option<PackageSet>,
}

impl Sack {
    /// Construct an empty sack for `arch` (detected by the caller if
    /// `None`), rooted at `rootdir` (`/` if `None`), caching to
    /// `cache_dir` (if any).
    pub fn new(
        cache_dir: Option<PathBuf>,
        arch: Option<&str>,
        rootdir: Option<PathBuf>,
        build_cache: BuildCache,
    ) -> Result<Self> {
        let arches = match arch {
            Some(a) => ArchList::new(a)?,
            None => ArchList::detect_host()?,
        };
        Ok(Sack {
            pool: RpmPool::new(),
            arches,
            cache_dir,
            rootdir: rootdir.unwrap_or_else(|| PathBuf::from("/")),
            build_cache,
            repos: Vec::new(),
            advisories: Vec::new(),
            deltas: Vec::new(),
            provides_ready: false,
            considered_uptodate: false,
            considered: None,
            installonly: InstallonlyConfig::default(),
            running_kernel: None,
            pkg_excludes: None,
            pkg_includes: None,
            repo_excludes: None,
        })
    }

    /// Read-only access to the interned package pool.
    pub fn pool(&self) -> &RpmPool {
        &self.pool
    }

    /// Mutable access to the interned package pool, for callers within
    /// the crate that intern new solvables directly (e.g. a goal
    /// applying a transaction's installs/erasures).
    pub(crate) fn pool_mut(&mut self) -> &mut RpmPool {
        &mut self.pool
    }

    /// The architecture list this sack was constructed for.
    pub fn arches(&self) -> &ArchList {
        &self.arches
    }

    /// Advisories loaded from every repo's `updateinfo` extension.
    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    /// Delta-RPM metadata loaded from every repo's `prestodelta`
    /// extension.
    pub fn deltas(&self) -> &[DeltaRpm] {
        &self.deltas
    }

    /// Repo handles known to this sack, `@System` included once loaded.
    pub fn repos(&self) -> &[Repo] {
        &self.repos
    }

    pub fn installonly(&self) -> &InstallonlyConfig {
        &self.installonly
    }

    pub fn set_installonly(&mut self, config: InstallonlyConfig) {
        self.installonly = config;
    }

    /// Exclude `excludes` from the considered set. Strictly shrinks
    /// every non-`IgnoreExcludes` query's results (§8 invariant 4).
    pub fn add_excludes(&mut self, excludes: &PackageSet) {
        let capacity = self.pool.solvable_count();
        self.pkg_excludes
            .get_or_insert_with(|| PackageSet::with_capacity(capacity))
            .union_with(excludes);
        self.considered_uptodate = false;
    }

    /// Restrict the considered set to `includes` (intersected with
    /// whatever survives exclusion). Called more than once, the
    /// whitelist grows by union, not by further narrowing.
    pub fn add_includes(&mut self, includes: &PackageSet) {
        let capacity = self.pool.solvable_count();
        self.pkg_includes
            .get_or_insert_with(|| PackageSet::with_capacity(capacity))
            .union_with(includes);
        self.considered_uptodate = false;
    }

    /// Exclude every solvable currently loaded from repo `repo_name`.
    pub fn add_repo_excludes(&mut self, repo_name: &str) {
        let capacity = self.pool.solvable_count();
        let set = self
            .repo_excludes
            .get_or_insert_with(|| PackageSet::with_capacity(capacity));
        for id in self.pool.all_solvable_ids() {
            if self.pool.resolve_solvable(id).repo == repo_name {
                set.insert(id);
            }
        }
        self.considered_uptodate = false;
    }

    /// Load the `@System` repo (the rpmdb of installed packages) from
    /// `<rootdir>/var/lib/rpm/Packages`, falling back to
    /// `/usr/share/rpm/Packages`.
    pub fn load_system_repo(&mut self) -> Result<()> {
        let primary_path = self.rootdir.join("var/lib/rpm/Packages");
        let fallback_path = self.rootdir.join("usr/share/rpm/Packages");
        let path = if primary_path.exists() {
            primary_path
        } else {
            fallback_path
        };

        let mut repo = Repo::system();
        let meta = fs::metadata(&path).map_err(|e| SackError::io(&path, e))?;
        let checksum = rpmdb_checksum(&meta);

        let cache_path = self
            .cache_dir
            .as_deref()
            .map(|dir| cache::main_cache_path(dir, SYSTEM_REPO_NAME));

        let records: Vec<crate::pool::PackageRecord> = if let Some(cache_path) = cache_path.as_deref() {
            if let Some(cached) = cache::read_valid(cache_path, &checksum) {
                repo.set_state(Extension::Primary, ExtensionState::LoadedCache);
                cached
            } else {
                let records = rpmdb::scan_packages(&path)?;
                repo.set_state(Extension::Primary, ExtensionState::LoadedFetch);
                self.maybe_write_cache(cache_path, &records, &checksum, &mut repo, Extension::Primary);
                records
            }
        } else {
            let records = rpmdb::scan_packages(&path)?;
            repo.set_state(Extension::Primary, ExtensionState::LoadedFetch);
            records
        };

        repo.set_checksum(checksum);
        for record in records {
            self.pool.intern_solvable(record);
        }
        repo.main_nsolvables = Some(self.pool.solvable_count());

        self.repos.retain(|r| r.name() != SYSTEM_REPO_NAME);
        self.repos.push(repo);
        self.mark_dirty();
        Ok(())
    }

    /// Load a regular repo: `repomd_path` is parsed to discover its
    /// `primary`/`filelists`/`updateinfo`/`prestodelta` extensions,
    /// each loaded from cache when valid, else parsed from
    /// `base_dir.join(location)`.
    pub fn load_repo(&mut self, name: &str, repomd_path: &Path) -> Result<()> {
        let base_dir = repomd_path
            .parent()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("."));

        let repomd_bytes = fs::read(repomd_path).map_err(|e| SackError::io(repomd_path, e))?;
        let checksum = content_checksum(&[&repomd_bytes]);
        let index = repomd::Repomd::parse(repomd_path)?;

        let mut repo = Repo::new(name);
        repo.set_repomd_path(repomd_path.to_string_lossy().into_owned());
        repo.set_checksum(checksum);

        if let Some(data) = index.data.get("primary") {
            let path = base_dir.join(&data.location);
            repo.set_path(Extension::Primary, path.to_string_lossy().into_owned());
            let records = self.load_primary(&path, name, name, &checksum, &mut repo)?;
            for record in records {
                self.pool.intern_solvable(record);
            }
            repo.main_nsolvables = Some(self.pool.solvable_count());
        } else {
            warn!("repo {name}: repomd.xml has no primary data entry");
        }

        if let Some(data) = index.data.get("filelists") {
            let path = base_dir.join(&data.location);
            repo.set_path(Extension::Filelists, path.to_string_lossy().into_owned());
            if let Err(e) = self.load_filelists(&path, name, &checksum, &mut repo) {
                warn!("repo {name}: filelists load failed: {e}");
            }
        }

        if let Some(data) = index.data.get("updateinfo") {
            let path = base_dir.join(&data.location);
            repo.set_path(Extension::Updateinfo, path.to_string_lossy().into_owned());
            match self.load_updateinfo(&path, name, &checksum, &mut repo) {
                Ok(advisories) => self.advisories.extend(advisories),
                Err(e) => warn!("repo {name}: updateinfo load failed: {e}"),
            }
        }

        if let Some(data) = index.data.get("prestodelta") {
            let path = base_dir.join(&data.location);
            repo.set_path(Extension::Prestodelta, path.to_string_lossy().into_owned());
            match self.load_prestodelta(&path, name, &checksum, &mut repo) {
                Ok(deltas) => self.deltas.extend(deltas),
                Err(e) => warn!("repo {name}: prestodelta load failed: {e}"),
            }
        }

        self.repos.retain(|r| r.name() != name);
        self.repos.push(repo);
        self.mark_dirty();
        Ok(())
    }

    fn load_primary(
        &mut self,
        path: &Path,
        repo_name: &str,
        cache_key: &str,
        checksum: &[u8; 32],
        repo: &mut Repo,
    ) -> Result<Vec<crate::pool::PackageRecord>> {
        let cache_path = self
            .cache_dir
            .as_deref()
            .map(|dir| cache::main_cache_path(dir, cache_key));

        if let Some(cache_path) = cache_path.as_deref() {
            if let Some(cached) = cache::read_valid(cache_path, checksum) {
                repo.set_state(Extension::Primary, ExtensionState::LoadedCache);
                return Ok(cached);
            }
        }

        let records: Vec<_> = primary::parse(path, repo_name)?
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        repo.set_state(Extension::Primary, ExtensionState::LoadedFetch);
        if let Some(cache_path) = cache_path.as_deref() {
            self.maybe_write_cache(cache_path, &records, checksum, repo, Extension::Primary);
        }
        Ok(records)
    }

    fn load_filelists(
        &mut self,
        path: &Path,
        repo_name: &str,
        checksum: &[u8; 32],
        repo: &mut Repo,
    ) -> Result<()> {
        let cache_path = self
            .cache_dir
            .as_deref()
            .map(|dir| cache::extension_cache_path(dir, repo_name, "filenames"));

        let lists: Vec<(String, Vec<PackageFile>)> = if let Some(cache_path) = cache_path.as_deref()
        {
            if let Some(cached) = cache::read_valid(cache_path, checksum) {
                repo.set_state(Extension::Filelists, ExtensionState::LoadedCache);
                cached
            } else {
                let lists = filelists::parse(path)?;
                repo.set_state(Extension::Filelists, ExtensionState::LoadedFetch);
                self.maybe_write_cache(cache_path, &lists, checksum, repo, Extension::Filelists);
                lists
            }
        } else {
            let lists = filelists::parse(path)?;
            repo.set_state(Extension::Filelists, ExtensionState::LoadedFetch);
            lists
        };

        let by_pkgid: std::collections::HashMap<String, Vec<PackageFile>> =
            lists.into_iter().collect();

        let ids: Vec<SolvableId> = self.pool.all_solvable_ids().collect();
        for id in ids {
            let record = self.pool.resolve_solvable(id);
            if record.repo != repo_name {
                continue;
            }
            let checksum_digest = record.checksum.as_ref().map(|(_, digest)| digest.clone());
            if let Some(digest) = checksum_digest {
                if let Some(files) = by_pkgid.get(&digest) {
                    let files = files.clone();
                    self.pool.resolve_solvable_mut(id).files = files;
                }
            }
        }
        Ok(())
    }

    fn load_updateinfo(
        &self,
        path: &Path,
        repo_name: &str,
        checksum: &[u8; 32],
        repo: &mut Repo,
    ) -> Result<Vec<Advisory>> {
        let cache_path = self
            .cache_dir
            .as_deref()
            .map(|dir| cache::extension_cache_path(dir, repo_name, "updateinfo"));

        if let Some(cache_path) = cache_path.as_deref() {
            if let Some(cached) = cache::read_valid(cache_path, checksum) {
                repo.set_state(Extension::Updateinfo, ExtensionState::LoadedCache);
                return Ok(cached);
            }
        }
        let advisories = updateinfo::parse(path)?;
        repo.set_state(Extension::Updateinfo, ExtensionState::LoadedFetch);
        if let Some(cache_path) = cache_path.as_deref() {
            self.maybe_write_cache(cache_path, &advisories, checksum, repo, Extension::Updateinfo);
        }
        Ok(advisories)
    }

    fn load_prestodelta(
        &self,
        path: &Path,
        repo_name: &str,
        checksum: &[u8; 32],
        repo: &mut Repo,
    ) -> Result<Vec<DeltaRpm>> {
        let cache_path = self
            .cache_dir
            .as_deref()
            .map(|dir| cache::extension_cache_path(dir, repo_name, "presto"));

        if let Some(cache_path) = cache_path.as_deref() {
            if let Some(cached) = cache::read_valid(cache_path, checksum) {
                repo.set_state(Extension::Prestodelta, ExtensionState::LoadedCache);
                return Ok(cached);
            }
        }
        let deltas = prestodelta::parse(path)?;
        repo.set_state(Extension::Prestodelta, ExtensionState::LoadedFetch);
        if let Some(cache_path) = cache_path.as_deref() {
            self.maybe_write_cache(cache_path, &deltas, checksum, repo, Extension::Prestodelta);
        }
        Ok(deltas)
    }

    fn maybe_write_cache<T: serde::Serialize>(
        &self,
        cache_path: &Path,
        records: &T,
        checksum: &[u8; 32],
        repo: &mut Repo,
        extension: Extension,
    ) {
        if self.build_cache != BuildCache::Enabled {
            return;
        }
        match cache::write_atomic(cache_path, records, checksum) {
            Ok(()) => repo.set_state(extension, ExtensionState::Written),
            Err(e) => warn!("cache write failed for {}: {e}", cache_path.display()),
        }
    }

    /// Admit a single `.rpm` file into the `@commandline` pseudo-repo.
    /// Only readability and a `.rpm` suffix are checked; the header is
    /// decoded with the same reader rpmdb entries use.
    pub fn add_commandline_rpm(&mut self, path: &Path) -> Result<SolvableId> {
        if path.extension().and_then(|e| e.to_str()) != Some("rpm") {
            return Err(SackError::Validation(format!(
                "{} is not a .rpm file",
                path.display()
            )));
        }
        let mut records = rpmdb::scan_packages(path)?;
        let mut record = records
            .pop()
            .ok_or_else(|| SackError::Failed(format!("no header found in {}", path.display())))?;
        record.repo = COMMANDLINE_REPO_NAME.to_string();
        record.installed = false;
        let id = self.pool.intern_solvable(record);
        if !self.repos.iter().any(|r| r.name() == COMMANDLINE_REPO_NAME) {
            self.repos.push(Repo::new(COMMANDLINE_REPO_NAME));
        }
        self.mark_dirty();
        Ok(id)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.provides_ready = false;
        self.considered_uptodate = false;
        self.considered = None;
    }

    /// The set of solvables considered for queries/solves:
    /// `(all − repo_excludes − pkg_excludes) ∩ (pkg_includes if set)`.
    /// Recomputed lazily after any load or exclude/include change
    /// invalidates it.
    pub fn considered(&mut self) -> &PackageSet {
        if !self.considered_uptodate {
            let mut set = PackageSet::all(&self.pool);
            if let Some(repo_excludes) = &self.repo_excludes {
                set.subtract(repo_excludes);
            }
            if let Some(pkg_excludes) = &self.pkg_excludes {
                set.subtract(pkg_excludes);
            }
            if let Some(pkg_includes) = &self.pkg_includes {
                set.intersect_with(pkg_includes);
            }
            self.considered = Some(set);
            self.considered_uptodate = true;
            self.provides_ready = true;
        }
        self.considered.as_ref().unwrap()
    }

    /// Whether the provides index backing dependency resolution is
    /// up to date with the pool's current contents.
    pub fn provides_ready(&self) -> bool {
        self.provides_ready
    }

    /// Find the installed package owning `/boot/vmlinuz-<release>`,
    /// caching the result (`None` is a legal, cached answer).
    pub fn running_kernel(&mut self, uname_release: &str) -> Option<SolvableId> {
        if let Some(cached) = self.running_kernel {
            return cached;
        }
        let target = format!("/boot/vmlinuz-{uname_release}");
        let found = self.pool.all_solvable_ids().find(|&id| {
            let record = self.pool.resolve_solvable(id);
            record.installed && record.files.iter().any(|f| f.path == target)
        });
        self.running_kernel = Some(found);
        found
    }

    /// Drop the cached running-kernel lookup, e.g. after the `@System`
    /// repo is reloaded.
    pub fn invalidate_running_kernel(&mut self) {
        self.running_kernel = None;
    }
}

/// `SHA-256("H000" ∥ dev ∥ ino ∥ size ∥ mtime)` of the rpmdb file's stat,
/// the content checksum used to validate the `@System.solv` cache.
#[cfg(unix)]
fn rpmdb_checksum(meta: &fs::Metadata) -> [u8; 32] {
    use std::os::unix::fs::MetadataExt;
    content_checksum(&[
        &meta.dev().to_be_bytes(),
        &meta.ino().to_be_bytes(),
        &meta.size().to_be_bytes(),
        &meta.mtime().to_be_bytes(),
    ])
}

#[cfg(not(unix))]
fn rpmdb_checksum(meta: &fs::Metadata) -> [u8; 32] {
    content_checksum(&[&meta.len().to_be_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_detects_arch_and_starts_empty() {
        let sack = Sack::new(None, Some("x86_64"), None, BuildCache::Disabled).unwrap();
        assert_eq!(sack.arches().primary, "x86_64");
        assert!(sack.repos().is_empty());
        assert_eq!(sack.pool().solvable_count(), 0);
    }

    #[test]
    fn unknown_arch_fails_construction() {
        let result = Sack::new(None, Some(""), None, BuildCache::Disabled);
        assert!(result.is_err());
    }

    #[test]
    fn considered_set_covers_every_interned_solvable() {
        let mut sack = Sack::new(None, Some("x86_64"), None, BuildCache::Disabled).unwrap();
        let nevra = crate::nevra::Nevra {
            name: "foo".into(),
            epoch: None,
            version: Some("1.0".into()),
            release: Some("1".into()),
            arch: Some("x86_64".into()),
        };
        sack.pool.intern_solvable(crate::pool::PackageRecord {
            nevra,
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
            files: Vec::new(),
            deps: Default::default(),
            installed: false,
        });
        sack.mark_dirty();
        assert_eq!(sack.considered().len(), 1);
    }

    fn record(name: &str, repo: &str) -> crate::pool::PackageRecord {
        crate::pool::PackageRecord {
            nevra: crate::nevra::Nevra {
                name: name.into(),
                epoch: None,
                version: Some("1.0".into()),
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
            deps: Default::default(),
            installed: false,
        }
    }

    #[test]
    fn add_excludes_shrinks_considered_set() {
        let mut sack = Sack::new(None, Some("x86_64"), None, BuildCache::Disabled).unwrap();
        let foo = sack.pool.intern_solvable(record("foo", "test"));
        sack.pool.intern_solvable(record("bar", "test"));
        sack.mark_dirty();
        assert_eq!(sack.considered().len(), 2);

        let mut excludes = PackageSet::with_capacity(sack.pool().solvable_count());
        excludes.insert(foo);
        sack.add_excludes(&excludes);
        assert_eq!(sack.considered().len(), 1);
        assert!(!sack.considered().contains(foo));
    }

    #[test]
    fn add_includes_restricts_considered_set() {
        let mut sack = Sack::new(None, Some("x86_64"), None, BuildCache::Disabled).unwrap();
        let foo = sack.pool.intern_solvable(record("foo", "test"));
        sack.pool.intern_solvable(record("bar", "test"));
        sack.mark_dirty();

        let mut includes = PackageSet::with_capacity(sack.pool().solvable_count());
        includes.insert(foo);
        sack.add_includes(&includes);
        assert_eq!(sack.considered().len(), 1);
        assert!(sack.considered().contains(foo));
    }

    #[test]
    fn add_repo_excludes_drops_whole_repo() {
        let mut sack = Sack::new(None, Some("x86_64"), None, BuildCache::Disabled).unwrap();
        sack.pool.intern_solvable(record("foo", "stale"));
        sack.pool.intern_solvable(record("bar", "fresh"));
        sack.mark_dirty();

        sack.add_repo_excludes("stale");
        let considered = sack.considered();
        assert_eq!(considered.len(), 1);
    }
}
