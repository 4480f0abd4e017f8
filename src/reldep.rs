//! Relational dependencies: `name [op evr]`, e.g. `libc >= 2.17`.
//!
//! Grounded on `hawkey/src/iutil.c` (`parse_reldep_str`, `get_cmp_flags`)
//! and `hawkey/src/types.h` (`_hy_comparison_type_e`).

use std::fmt;
use std::sync::OnceLock;

use bitflags::bitflags;
use regex::Regex;

use crate::evr::Evr;

bitflags! {
    /// Comparison flags for a [`Reldep`] or a [`crate::query::Query`]
    /// filter. Bits mirror `_hy_comparison_type_e`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CmpFlags: u32 {
        /// Case-insensitive string/glob comparison.
        const ICASE = 1 << 0;
        /// Invert the match set after evaluation.
        const NOT = 1 << 1;
        /// Exact equality.
        const EQ = 1 << 8;
        /// Less-than (numeric/EVR).
        const LT = 1 << 9;
        /// Greater-than (numeric/EVR).
        const GT = 1 << 10;
        /// Substring match (strings only).
        const SUBSTR = 1 << 11;
        /// Shell glob match (strings only).
        const GLOB = 1 << 12;
        /// Restrict a reldep key family's matches to the name field.
        const NAME_ONLY = 1 << 16;
    }
}

impl CmpFlags {
    /// `EQ | NOT`, the `!=` combination.
    pub const NEQ: CmpFlags = CmpFlags::EQ.union(CmpFlags::NOT);
}

/// An interned relational dependency: a capability name with an optional
/// comparison against an EVR.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Reldep {
    /// Capability name, e.g. `"libc"` or `"config(httpd)"`.
    pub name: String,
    /// Comparison flags (the `EQ`/`LT`/`GT` family, possibly combined).
    pub flags: CmpFlags,
    /// The EVR to compare against, if any. `None` means a bare capability
    /// (no version constraint).
    pub evr: Option<Evr>,
}

impl Reldep {
    /// Build a reldep with no version constraint.
    pub fn bare(name: impl Into<String>) -> Self {
        Reldep {
            name: name.into(),
            flags: CmpFlags::empty(),
            evr: None,
        }
    }

    /// Build a versioned reldep.
    pub fn versioned(name: impl Into<String>, flags: CmpFlags, evr: Evr) -> Self {
        Reldep {
            name: name.into(),
            flags,
            evr: Some(evr),
        }
    }

    /// Parse `"name [op evr]"` using the regex
    /// `^(\S*)\s*(<=|>=|!=|<|>|=)?\s*(.*)$`.
    pub fn parse(s: &str) -> Option<Reldep> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"^(\S*)\s*(<=|>=|!=|<|>|=)?\s*(.*)$").unwrap()
        });
        let caps = re.captures(s)?;
        let name = caps.get(1)?.as_str().to_string();
        if name.is_empty() {
            return None;
        }
        let op = caps.get(2).map(|m| m.as_str());
        let rest = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        match op {
            None => Some(Reldep::bare(name)),
            Some(op) => {
                let flags = cmp_flags_for_operator(op)?;
                Some(Reldep::versioned(name, flags, Evr::parse(rest)))
            }
        }
    }
}

/// Map a reldep-string operator token to its comparison flags, per
/// `get_cmp_flags`.
fn cmp_flags_for_operator(op: &str) -> Option<CmpFlags> {
    Some(match op {
        "<" => CmpFlags::LT,
        ">" => CmpFlags::GT,
        "=" => CmpFlags::EQ,
        "<=" => CmpFlags::LT | CmpFlags::EQ,
        ">=" => CmpFlags::GT | CmpFlags::EQ,
        "!=" => CmpFlags::NEQ,
        _ => return None,
    })
}

/// Render the operator token for a comparison-flags combination, as used
/// by both [`Reldep`]'s and [`crate::pool::VersionConstraint`]'s
/// `Display` impls.
pub fn display_operator(flags: CmpFlags) -> &'static str {
    if flags.contains(CmpFlags::LT | CmpFlags::EQ) {
        "<="
    } else if flags.contains(CmpFlags::GT | CmpFlags::EQ) {
        ">="
    } else if flags.contains(CmpFlags::NEQ) {
        "!="
    } else if flags.contains(CmpFlags::LT) {
        "<"
    } else if flags.contains(CmpFlags::GT) {
        ">"
    } else {
        "="
    }
}

impl fmt::Display for Reldep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(evr) = &self.evr {
            write!(f, " {} {evr}", display_operator(self.flags))?;
        }
        Ok(())
    }
}

/// An ordered, appendable sequence of reldeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReldepList {
    entries: Vec<Reldep>,
}

impl ReldepList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one reldep.
    pub fn push(&mut self, reldep: Reldep) {
        self.entries.push(reldep);
    }

    /// Append every entry of `other`, in order.
    pub fn extend(&mut self, other: &ReldepList) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &Reldep> {
        self.entries.iter()
    }
}

impl FromIterator<Reldep> for ReldepList {
    fn from_iter<T: IntoIterator<Item = Reldep>>(iter: T) -> Self {
        ReldepList {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_name() {
        let r = Reldep::parse("libc").unwrap();
        assert_eq!(r.name, "libc");
        assert!(r.evr.is_none());
    }

    #[test]
    fn parse_ge() {
        let r = Reldep::parse("libc >= 2.17").unwrap();
        assert_eq!(r.name, "libc");
        assert!(r.flags.contains(CmpFlags::GT | CmpFlags::EQ));
        assert_eq!(r.evr.unwrap().version, "2.17");
    }

    #[test]
    fn parse_le() {
        let r = Reldep::parse("foo <= 1.0-1").unwrap();
        assert!(r.flags.contains(CmpFlags::LT | CmpFlags::EQ));
    }

    #[test]
    fn parse_neq() {
        let r = Reldep::parse("foo != 1.0").unwrap();
        assert!(r.flags.contains(CmpFlags::NEQ));
    }

    #[test]
    fn parse_no_spaces() {
        let r = Reldep::parse("foo=1.0").unwrap();
        assert_eq!(r.name, "foo");
        assert!(r.flags.contains(CmpFlags::EQ));
        assert_eq!(r.evr.unwrap().version, "1.0");
    }

    #[test]
    fn display_roundtrip() {
        let r = Reldep::parse("libc >= 2.17").unwrap();
        assert_eq!(r.to_string(), "libc >= 2.17");
    }

    #[test]
    fn display_bare() {
        let r = Reldep::bare("libc");
        assert_eq!(r.to_string(), "libc");
    }

    #[test]
    fn reldep_list_extend_preserves_order() {
        let mut a = ReldepList::new();
        a.push(Reldep::bare("x"));
        let mut b = ReldepList::new();
        b.push(Reldep::bare("y"));
        a.extend(&b);
        let names: Vec<_> = a.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }
}
