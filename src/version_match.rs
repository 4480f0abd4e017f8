//! EVR comparison against [`CmpFlags`]-tagged constraints.
//!
//! Generalized from the teacher's `portage_atom::Operator`-based
//! `version_matches`/`glob_matches` pair into the EVR/`CmpFlags` world:
//! every reldep match, provides lookup, and `Query` `EQ/LT/GT` filter
//! routes through [`evr_satisfies`].

use crate::evr::Evr;
use crate::reldep::CmpFlags;

/// Whether `candidate` satisfies a comparison against `constraint` under
/// `flags`. `flags` may combine `LT|EQ`, `GT|EQ`, or `EQ|NOT` (`!=`); a
/// bare `LT`/`GT`/`EQ` is also accepted. Flags outside the `LT/GT/EQ/NOT`
/// family (e.g. `ICASE`, `GLOB`) are ignored — they apply to string
/// matching, not EVR matching.
pub fn evr_satisfies(candidate: &Evr, flags: CmpFlags, constraint: &Evr) -> bool {
    use std::cmp::Ordering;

    let ord = candidate.cmp(constraint);
    let mut result = false;
    if flags.contains(CmpFlags::EQ) && ord == Ordering::Equal {
        result = true;
    }
    if flags.contains(CmpFlags::LT) && ord == Ordering::Less {
        result = true;
    }
    if flags.contains(CmpFlags::GT) && ord == Ordering::Greater {
        result = true;
    }
    if flags.contains(CmpFlags::NOT) {
        result = !result;
    }
    result
}

/// Shell-glob match against a rendered string, honouring [`CmpFlags::ICASE`].
///
/// Grounded on the `glob` crate, the same crate `conda-rattler` and
/// `pkgcraft-pkgcraft` reach for when matching shell-style wildcards
/// against package metadata strings.
pub fn glob_matches(pattern: &str, candidate: &str, flags: CmpFlags) -> bool {
    let opts = glob::MatchOptions {
        case_sensitive: !flags.contains(CmpFlags::ICASE),
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    glob::Pattern::new(pattern)
        .map(|p| p.matches_with(candidate, opts))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evr(s: &str) -> Evr {
        Evr::parse(s)
    }

    #[test]
    fn eq_matches_exact() {
        assert!(evr_satisfies(&evr("1.0-1"), CmpFlags::EQ, &evr("1.0-1")));
        assert!(!evr_satisfies(&evr("1.0-1"), CmpFlags::EQ, &evr("1.0-2")));
    }

    #[test]
    fn ge_matches_equal_and_greater() {
        let ge = CmpFlags::GT | CmpFlags::EQ;
        assert!(evr_satisfies(&evr("1.0-1"), ge, &evr("1.0-1")));
        assert!(evr_satisfies(&evr("2.0-1"), ge, &evr("1.0-1")));
        assert!(!evr_satisfies(&evr("0.9-1"), ge, &evr("1.0-1")));
    }

    #[test]
    fn neq_inverts_eq() {
        assert!(evr_satisfies(&evr("1.0-1"), CmpFlags::NEQ, &evr("1.0-2")));
        assert!(!evr_satisfies(&evr("1.0-1"), CmpFlags::NEQ, &evr("1.0-1")));
    }

    #[test]
    fn glob_matches_case_insensitive() {
        assert!(glob_matches("FOO*", "foobar", CmpFlags::ICASE));
        assert!(!glob_matches("FOO*", "foobar", CmpFlags::empty()));
    }
}
