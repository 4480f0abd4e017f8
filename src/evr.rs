//! EVR (`[epoch:]version-release`) parsing and RPM version comparison.
//!
//! The comparison algorithm (`rpmvercmp`) is the one load-bearing piece of
//! arithmetic every other module routes through: [`crate::nevra::Nevra`]
//! ordering, [`crate::query`] `EPOCH`/`VERSION`/`EVR` filters, and
//! [`crate::provider`]'s version-set matching all call [`Evr::cmp`].

use std::cmp::Ordering;
use std::fmt;

/// A parsed `[epoch:]version-release` string.
///
/// `epoch` is `None` when the string carries no explicit epoch, which
/// compares as epoch `0` during [`Evr::cmp`] but renders without an epoch
/// prefix (see [`Evr::to_string`] and `hy_nevra_get_evr`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Evr {
    /// Explicit epoch, if the string had a `N:` prefix.
    pub epoch: Option<u32>,
    /// Version component.
    pub version: String,
    /// Release component (empty if the string had no `-release`).
    pub release: String,
}

impl Evr {
    /// Parse `"[epoch:]version[-release]"`.
    pub fn parse(s: &str) -> Self {
        let (epoch, rest) = match s.split_once(':') {
            Some((e, rest)) => (e.parse::<u32>().ok(), rest),
            None => (None, s),
        };
        match rest.split_once('-') {
            Some((version, release)) => Evr {
                epoch,
                version: version.to_string(),
                release: release.to_string(),
            },
            None => Evr {
                epoch,
                version: rest.to_string(),
                release: String::new(),
            },
        }
    }

    /// Effective epoch for comparison purposes: `0` when absent.
    pub fn epoch_value(&self) -> u32 {
        self.epoch.unwrap_or(0)
    }

    /// Compare two EVRs per the rpmvercmp algorithm: epoch numerically,
    /// then version, then release, each of the latter two via
    /// [`rpmvercmp`]. A missing release compares less than any non-empty
    /// release at equal version.
    pub fn cmp(&self, other: &Evr) -> Ordering {
        self.epoch_value()
            .cmp(&other.epoch_value())
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| rpmvercmp(&self.release, &other.release))
    }
}

impl fmt::Display for Evr {
    /// Render `"[epoch:]version-release"`, omitting the epoch prefix when
    /// absent and the `-release` suffix when release is empty — matches
    /// `hy_nevra_get_evr`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{epoch}:")?;
        }
        write!(f, "{}", self.version)?;
        if !self.release.is_empty() {
            write!(f, "-{}", self.release)?;
        }
        Ok(())
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        Evr::cmp(self, other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Digits(&'a str),
    Alpha(&'a str),
    Tilde,
    Caret,
}

/// Split a version/release component into the alternating digit/alpha
/// segments rpmvercmp compares, skipping any run of non-alphanumeric,
/// non-`~`/`^` bytes as a separator shared implicitly by both sides.
fn segments(s: &str) -> Vec<Segment<'_>> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'~' {
            out.push(Segment::Tilde);
            i += 1;
        } else if b == b'^' {
            out.push(Segment::Caret);
            i += 1;
        } else if b.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            out.push(Segment::Digits(&s[start..i]));
        } else if b.is_ascii_alphabetic() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                i += 1;
            }
            out.push(Segment::Alpha(&s[start..i]));
        } else {
            i += 1;
        }
    }
    out
}

/// Compare two version (or release) strings using RPM's version-compare
/// algorithm.
///
/// Segments alternate between digit runs and alphabetic runs; any other
/// byte is a separator skipped on both sides independently. A `~`
/// (tilde) segment sorts before anything, including the end of string; a
/// `^` (caret) segment sorts after the end of string but before any other
/// segment. Numeric segments always outrank alphabetic segments at the
/// same position; two numeric segments compare by value (leading zeros
/// stripped, so a longer run of significant digits wins); two alphabetic
/// segments compare byte-wise. When one side runs out of segments before
/// the other, the side with a remaining segment is greater, unless that
/// segment is a tilde (which makes it lesser).
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let sa = segments(a);
    let sb = segments(b);
    let mut i = 0;
    loop {
        let ea = sa.get(i);
        let eb = sb.get(i);
        match (ea, eb) {
            (None, None) => return Ordering::Equal,
            (Some(Segment::Tilde), other) => {
                return if matches!(other, Some(Segment::Tilde)) {
                    i += 1;
                    continue;
                } else {
                    Ordering::Less
                };
            }
            (other, Some(Segment::Tilde)) => {
                return if matches!(other, Some(Segment::Tilde)) {
                    i += 1;
                    continue;
                } else {
                    Ordering::Greater
                };
            }
            (None, Some(Segment::Caret)) => return Ordering::Less,
            (Some(Segment::Caret), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Segment::Caret), Some(Segment::Caret)) => {
                i += 1;
                continue;
            }
            (Some(Segment::Caret), Some(_)) => return Ordering::Less,
            (Some(_), Some(Segment::Caret)) => return Ordering::Greater,
            (Some(Segment::Digits(_)), Some(Segment::Alpha(_))) => return Ordering::Greater,
            (Some(Segment::Alpha(_)), Some(Segment::Digits(_))) => return Ordering::Less,
            (Some(Segment::Digits(x)), Some(Segment::Digits(y))) => {
                let xt = x.trim_start_matches('0');
                let yt = y.trim_start_matches('0');
                let ord = xt.len().cmp(&yt.len()).then_with(|| xt.cmp(yt));
                if ord != Ordering::Equal {
                    return ord;
                }
                i += 1;
            }
            (Some(Segment::Alpha(x)), Some(Segment::Alpha(y))) => {
                let ord = x.cmp(y);
                if ord != Ordering::Equal {
                    return ord;
                }
                i += 1;
            }
            (Some(Segment::Tilde), Some(Segment::Tilde)) => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evr(s: &str) -> Evr {
        Evr::parse(s)
    }

    #[test]
    fn parse_full() {
        let e = evr("2:1.2.3-4");
        assert_eq!(e.epoch, Some(2));
        assert_eq!(e.version, "1.2.3");
        assert_eq!(e.release, "4");
    }

    #[test]
    fn parse_no_epoch() {
        let e = evr("1.2.3-4");
        assert_eq!(e.epoch, None);
        assert_eq!(e.version, "1.2.3");
        assert_eq!(e.release, "4");
    }

    #[test]
    fn parse_no_release() {
        let e = evr("1.2.3");
        assert_eq!(e.release, "");
    }

    #[test]
    fn display_roundtrip_with_epoch() {
        assert_eq!(evr("2:1.2.3-4").to_string(), "2:1.2.3-4");
    }

    #[test]
    fn display_roundtrip_without_epoch() {
        assert_eq!(evr("1.2.3-4").to_string(), "1.2.3-4");
    }

    #[test]
    fn epoch_dominates_version() {
        assert_eq!(evr("1:1.0-1").cmp(&evr("2.0-1")), Ordering::Greater);
    }

    #[test]
    fn absent_epoch_is_zero() {
        assert_eq!(evr("1.0-1").cmp(&evr("0:1.0-1")), Ordering::Equal);
    }

    #[test]
    fn numeric_segment_outranks_alpha() {
        assert_eq!(rpmvercmp("1.0.0", "1.0.0a"), Ordering::Greater);
    }

    #[test]
    fn leading_zeros_stripped() {
        assert_eq!(rpmvercmp("00100", "100"), Ordering::Equal);
    }

    #[test]
    fn longer_digit_run_wins() {
        assert_eq!(rpmvercmp("10", "9"), Ordering::Greater);
    }

    #[test]
    fn separators_are_skipped() {
        assert_eq!(rpmvercmp("1.0.0", "1_0_0"), Ordering::Equal);
    }

    #[test]
    fn tilde_sorts_before_anything() {
        assert_eq!(rpmvercmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(rpmvercmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
    }

    #[test]
    fn caret_sorts_after_end_of_string() {
        assert_eq!(rpmvercmp("1.0^", "1.0"), Ordering::Greater);
        assert_eq!(rpmvercmp("1.0^git1", "1.0^"), Ordering::Greater);
    }

    #[test]
    fn release_breaks_version_tie() {
        assert_eq!(evr("1.0-1").cmp(&evr("1.0-2")), Ordering::Less);
    }

    #[test]
    fn missing_release_is_less_at_equal_version() {
        assert_eq!(evr("1.0").cmp(&evr("1.0-1")), Ordering::Less);
    }
}
