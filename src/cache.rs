//! Content-addressed, atomically-written on-disk cache for parsed
//! repository/rpmdb snapshots.
//!
//! A cache file is a `rmp-serde`-encoded payload followed by a raw
//! 32-byte SHA-256 checksum trailer. A cache is valid iff the trailer
//! equals the caller's current content checksum (§4.1, §6). Writes go
//! through a `tempfile`-backed sibling plus atomic rename, grounded on
//! the same scheme `archlinux-alpm`'s workspace and `rattler_solve` use
//! for their own on-disk caches.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, SackError};

/// SHA-256 a byte stream with the `"H000"` format-version prefix hawkey
/// itself uses for rpmdb/repomd content checksums.
pub fn content_checksum(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"H000");
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Read a cache file at `path`, returning the decoded payload only if
/// its trailing 32-byte checksum equals `expected`. Any other outcome
/// (missing file, short file, checksum mismatch, corrupt payload) is
/// reported as `Ok(None)` so the caller falls back to a fresh parse,
/// per §7's "cache read mismatch -> fall back to XML parse" rule.
pub fn read_valid<T: DeserializeOwned>(path: &Path, expected: &[u8; 32]) -> Option<T> {
    let bytes = fs::read(path).ok()?;
    if bytes.len() < 32 {
        return None;
    }
    let (payload, trailer) = bytes.split_at(bytes.len() - 32);
    if trailer != expected {
        return None;
    }
    rmp_serde::from_slice(payload).ok()
}

/// Atomically write `value` to `path` with `expected`'s trailing
/// checksum, via a tempfile sibling plus rename. Mode is left at the
/// tempfile default; callers on platforms that care about
/// `0666 & ~umask` may `chmod` the result afterward.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T, checksum: &[u8; 32]) -> Result<()> {
    let mut payload = rmp_serde::to_vec(value)
        .map_err(|e| SackError::CacheWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    payload.extend_from_slice(checksum);

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| SackError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| SackError::CacheWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    tmp.write_all(&payload).map_err(|e| SackError::CacheWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    tmp.persist(path).map_err(|e| SackError::CacheWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let umask_complement = 0o666 & !current_umask();
        if let Ok(file) = File::open(path) {
            let _ = file.set_permissions(fs::Permissions::from_mode(umask_complement));
        }
    }

    Ok(())
}

#[cfg(unix)]
fn current_umask() -> u32 {
    // There is no portable way to read the umask without transiently
    // changing it; `libc::umask` would do both atomically, but this
    // core avoids a libc dependency for one mode bit, so a fixed,
    // already-permissive default is used instead.
    0o022
}

/// Standard cache file name for a repo's main extension.
pub fn main_cache_path(cache_dir: &Path, repo_name: &str) -> PathBuf {
    cache_dir.join(format!("{repo_name}.solv"))
}

/// Standard cache file name for a repo's secondary extension
/// (`"filenames"`, `"presto"`, `"updateinfo"`).
pub fn extension_cache_path(cache_dir: &Path, repo_name: &str, extension: &str) -> PathBuf {
    cache_dir.join(format!("{repo_name}-{extension}.solvx"))
}
