//! Stable error kinds for every fallible operation in this crate.
//!
//! One enum, one variant per kind named in the error-handling design:
//! `Failed`, `Op`, `Solver`, `Io`, `CacheWrite`, `Query`, `Arch`,
//! `Validation`, `Selector`, `NoSolution`, `NoCapability`. Callers match on
//! the kind, not on the message text.

use std::path::PathBuf;

/// Errors surfaced by sack construction, loading, querying, and solving.
#[derive(Debug, thiserror::Error)]
pub enum SackError {
    /// Generic runtime failure with a formatted message.
    #[error("{0}")]
    Failed(String),

    /// Client misuse, e.g. reading goal results before `run`.
    #[error("operation error: {0}")]
    Op(String),

    /// The dependency solver could not be driven to a decision.
    #[error("solver error: {0}")]
    Solver(String),

    /// A file-level I/O failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path the failing operation was acting on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing a cache file failed.
    #[error("failed to write cache {path}: {reason}")]
    CacheWrite {
        /// Cache file path.
        path: PathBuf,
        /// Why the write failed.
        reason: String,
    },

    /// An ill-formed query filter (bad keyname/cmp_flags combination).
    #[error("invalid query filter: {0}")]
    Query(String),

    /// Unknown or insufficiently supported architecture.
    #[error("unknown or unsupported architecture: {0}")]
    Arch(String),

    /// `CheckInstalled` validation failed for an upgrade request.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An ill-specified selector (no name/provides/file field set).
    #[error("invalid selector: {0}")]
    Selector(String),

    /// The solver ran but found no solution.
    #[error("no solution found{}", problems_suffix(.0))]
    NoSolution(Vec<String>),

    /// A requested repo extension (filelists/presto/updateinfo) is absent.
    #[error("capability not available: {0}")]
    NoCapability(String),
}

fn problems_suffix(problems: &[String]) -> String {
    if problems.is_empty() {
        String::new()
    } else {
        format!(": {}", problems.join("; "))
    }
}

impl SackError {
    /// Build an [`SackError::Io`] from a path and a source error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SackError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, SackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_solution_without_problems_has_no_suffix() {
        let err = SackError::NoSolution(vec![]);
        assert_eq!(err.to_string(), "no solution found");
    }

    #[test]
    fn no_solution_with_problems_lists_them() {
        let err = SackError::NoSolution(vec!["conflict on foo".into()]);
        assert_eq!(err.to_string(), "no solution found: conflict on foo");
    }

    #[test]
    fn io_error_includes_path() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = SackError::io("/tmp/x", source);
        assert!(err.to_string().contains("/tmp/x"));
    }
}
