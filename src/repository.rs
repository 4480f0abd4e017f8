//! Repo handle: names, extension file paths, and per-extension load state.
//!
//! Kept from the teacher's repository abstraction, generalized from a
//! flat `PackageRepository` trait over category/package names into the
//! state-machine `Repo` handle that a [`crate::sack::Sack`] owns one of
//! per loaded repository (plus the synthetic `@System` repo for the
//! rpmdb).

use std::fmt;

/// A single extension's load state. Advances monotonically:
/// `New -> LoadedCache | LoadedFetch -> Written`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtensionState {
    /// Not loaded yet.
    #[default]
    New,
    /// Loaded from an on-disk cache snapshot whose checksum matched.
    LoadedCache,
    /// Loaded by parsing the XML/rpmdb source directly.
    LoadedFetch,
    /// Loaded by parsing, then a fresh cache snapshot was written to disk.
    Written,
}

impl ExtensionState {
    /// Whether this extension has been loaded by any means.
    pub fn is_loaded(self) -> bool {
        !matches!(self, ExtensionState::New)
    }
}

/// Which metadata extension a [`Repo`] tracks state for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    /// `primary.xml`, the main package listing.
    Primary,
    /// `filelists.xml`, extending already-loaded solvables with file lists.
    Filelists,
    /// `updateinfo.xml`, independent advisory records.
    Updateinfo,
    /// `prestodelta.xml`, delta-RPM records.
    Prestodelta,
}

/// Name for the reserved, always-present installed-package repo.
pub const SYSTEM_REPO_NAME: &str = "@System";

/// Name for the synthetic pseudo-repo used by command-line-supplied
/// packages (e.g. `rpm -i ./foo.rpm`).
pub const COMMANDLINE_REPO_NAME: &str = "@commandline";

/// A repository handle: a name, its extension file names, its content
/// checksum, and the load state of each extension.
///
/// Repo handles are reference-counted ([`std::rc::Rc`]-wrapped by
/// [`crate::sack::Sack`]) so that a [`crate::pool::PackageRecord`] can
/// cheaply carry its owning repo's name without duplicating the whole
/// handle per solvable.
#[derive(Debug, Clone)]
pub struct Repo {
    name: String,
    repomd_path: Option<String>,
    primary_path: Option<String>,
    filelists_path: Option<String>,
    prestodelta_path: Option<String>,
    updateinfo_path: Option<String>,
    /// 32-byte content checksum, once known (after the first successful
    /// load of any extension).
    checksum: Option<[u8; 32]>,
    primary_state: ExtensionState,
    filelists_state: ExtensionState,
    updateinfo_state: ExtensionState,
    prestodelta_state: ExtensionState,
    /// Solvable count recorded right after the main (`primary`) extension
    /// finishes loading, so a later extension-load failure can roll the
    /// repo view back to just the main data.
    pub main_nsolvables: Option<usize>,
}

impl Repo {
    /// Create a new, unloaded repo handle.
    pub fn new(name: impl Into<String>) -> Self {
        Repo {
            name: name.into(),
            repomd_path: None,
            primary_path: None,
            filelists_path: None,
            prestodelta_path: None,
            updateinfo_path: None,
            checksum: None,
            primary_state: ExtensionState::New,
            filelists_state: ExtensionState::New,
            updateinfo_state: ExtensionState::New,
            prestodelta_state: ExtensionState::New,
            main_nsolvables: None,
        }
    }

    /// The reserved `@System` repo handle for installed packages.
    pub fn system() -> Self {
        Repo::new(SYSTEM_REPO_NAME)
    }

    /// Repo name, unique within its owning sack.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record the path to a metadata file for one extension.
    pub fn set_path(&mut self, extension: Extension, path: impl Into<String>) {
        let path = path.into();
        match extension {
            Extension::Primary => self.primary_path = Some(path),
            Extension::Filelists => self.filelists_path = Some(path),
            Extension::Updateinfo => self.updateinfo_path = Some(path),
            Extension::Prestodelta => self.prestodelta_path = Some(path),
        }
    }

    /// Record the `repomd.xml` path itself (used to compute the content
    /// checksum for regular repos).
    pub fn set_repomd_path(&mut self, path: impl Into<String>) {
        self.repomd_path = Some(path.into());
    }

    /// Path recorded for one extension, if any.
    pub fn path(&self, extension: Extension) -> Option<&str> {
        match extension {
            Extension::Primary => self.primary_path.as_deref(),
            Extension::Filelists => self.filelists_path.as_deref(),
            Extension::Updateinfo => self.updateinfo_path.as_deref(),
            Extension::Prestodelta => self.prestodelta_path.as_deref(),
        }
    }

    /// The `repomd.xml` path, if recorded.
    pub fn repomd_path(&self) -> Option<&str> {
        self.repomd_path.as_deref()
    }

    /// Current load state of one extension.
    pub fn state(&self, extension: Extension) -> ExtensionState {
        match extension {
            Extension::Primary => self.primary_state,
            Extension::Filelists => self.filelists_state,
            Extension::Updateinfo => self.updateinfo_state,
            Extension::Prestodelta => self.prestodelta_state,
        }
    }

    /// Advance one extension's state. States only move forward; setting an
    /// earlier state than the current one is a no-op (matches the
    /// monotonic state-machine invariant).
    pub fn set_state(&mut self, extension: Extension, state: ExtensionState) {
        let slot = match extension {
            Extension::Primary => &mut self.primary_state,
            Extension::Filelists => &mut self.filelists_state,
            Extension::Updateinfo => &mut self.updateinfo_state,
            Extension::Prestodelta => &mut self.prestodelta_state,
        };
        if rank(state) >= rank(*slot) {
            *slot = state;
        }
    }

    /// Current content checksum, if any extension has loaded successfully.
    pub fn checksum(&self) -> Option<&[u8; 32]> {
        self.checksum.as_ref()
    }

    /// Record a freshly computed content checksum.
    pub fn set_checksum(&mut self, checksum: [u8; 32]) {
        self.checksum = Some(checksum);
    }

    /// Whether a given on-disk checksum suffix matches this repo's current
    /// content checksum (the cache-validity test from the cache-invariants
    /// rule: a cache file is valid iff its trailing 32 bytes equal the
    /// current content checksum).
    pub fn cache_is_valid(&self, stored: &[u8; 32]) -> bool {
        self.checksum.as_ref() == Some(stored)
    }
}

fn rank(state: ExtensionState) -> u8 {
    match state {
        ExtensionState::New => 0,
        ExtensionState::LoadedCache | ExtensionState::LoadedFetch => 1,
        ExtensionState::Written => 2,
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_repo_starts_unloaded() {
        let repo = Repo::new("fedora");
        assert_eq!(repo.state(Extension::Primary), ExtensionState::New);
        assert!(!repo.state(Extension::Primary).is_loaded());
    }

    #[test]
    fn system_repo_has_reserved_name() {
        let repo = Repo::system();
        assert_eq!(repo.name(), SYSTEM_REPO_NAME);
    }

    #[test]
    fn state_does_not_regress() {
        let mut repo = Repo::new("fedora");
        repo.set_state(Extension::Primary, ExtensionState::Written);
        repo.set_state(Extension::Primary, ExtensionState::LoadedFetch);
        assert_eq!(repo.state(Extension::Primary), ExtensionState::Written);
    }

    #[test]
    fn cache_validity_checks_checksum() {
        let mut repo = Repo::new("fedora");
        let sum = [7u8; 32];
        repo.set_checksum(sum);
        assert!(repo.cache_is_valid(&sum));
        assert!(!repo.cache_is_valid(&[0u8; 32]));
    }

    #[test]
    fn paths_round_trip() {
        let mut repo = Repo::new("fedora");
        repo.set_repomd_path("/repo/repodata/repomd.xml");
        repo.set_path(Extension::Primary, "/repo/repodata/primary.xml.gz");
        assert_eq!(repo.repomd_path(), Some("/repo/repodata/repomd.xml"));
        assert_eq!(
            repo.path(Extension::Primary),
            Some("/repo/repodata/primary.xml.gz")
        );
        assert_eq!(repo.path(Extension::Filelists), None);
    }
}
