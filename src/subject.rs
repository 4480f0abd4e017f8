//! Stringly-typed package reference resolution.
//!
//! Grounded on hawkey's `hy_subject2nevra_possibilities`/
//! `hy_subject2reldep_possibilities` (`subject.c`/`subject_internal.c`):
//! turns a bare string into the NEVRA/Reldep forms it could plausibly
//! mean, optionally cross-checked against a sack for which of those
//! forms actually names something real.

use crate::error::Result;
use crate::nevra::{Nevra, NevraForm};
use crate::query::{Key, Query};
use crate::reldep::{CmpFlags, Reldep};
use crate::sack::Sack;

/// Most-specific-first order used when no explicit form list is given.
const DEFAULT_FORMS: &[NevraForm] = &[
    NevraForm::Nevra,
    NevraForm::Nevr,
    NevraForm::Nev,
    NevraForm::Na,
    NevraForm::Name,
];

/// User-intent-biased order `nevra_possibilities_real` defaults to: bare
/// name/arch forms first, since `foo.x86_64` almost always names the
/// installed or available package rather than an NEVR that happens to
/// look the same.
const REAL_BIAS_FORMS: &[NevraForm] = &[
    NevraForm::Na,
    NevraForm::Name,
    NevraForm::Nevra,
    NevraForm::Nev,
    NevraForm::Nevr,
];

/// A stringly-typed package reference, not yet resolved to a concrete
/// NEVRA or Reldep.
#[derive(Debug, Clone)]
pub struct Subject {
    pattern: String,
}

impl Subject {
    pub fn new(pattern: impl Into<String>) -> Self {
        Subject {
            pattern: pattern.into(),
        }
    }

    /// Every NEVRA this string could parse as, in `forms`' order (most-
    /// specific first by default), without consulting a sack. Finite and
    /// non-restartable: each call reparses from scratch.
    pub fn nevra_possibilities(&self, forms: Option<&[NevraForm]>) -> Vec<(Nevra, NevraForm)> {
        Nevra::parse_possibilities(&self.pattern, forms.unwrap_or(DEFAULT_FORMS))
    }

    /// Like [`Subject::nevra_possibilities`], filtered to candidates
    /// whose name is actually known to `sack` (glob-matched if `flags`
    /// has `GLOB`) and whose arch, if present, is `src`, `noarch`, or one
    /// of the sack's compatible arches. Defaults to the user-intent-
    /// biased form order.
    pub fn nevra_possibilities_real(
        &self,
        sack: &mut Sack,
        flags: CmpFlags,
        forms: Option<&[NevraForm]>,
    ) -> Result<Vec<(Nevra, NevraForm)>> {
        let forms = forms.unwrap_or(REAL_BIAS_FORMS);
        let name_cmp = if flags.contains(CmpFlags::GLOB) {
            CmpFlags::GLOB
        } else {
            CmpFlags::EQ
        };
        let mut out = Vec::new();
        for (nevra, form) in Nevra::parse_possibilities(&self.pattern, forms) {
            if let Some(arch) = &nevra.arch {
                if arch != "src" && !sack.arches().is_compatible(arch) {
                    continue;
                }
            }
            let matched = Query::new(sack)
                .filter_str(Key::Name, name_cmp, &nevra.name)?
                .run();
            if !matched.is_empty() {
                out.push((nevra, form));
            }
        }
        Ok(out)
    }

    /// At most one Reldep: this string parsed as a reldep whose name
    /// glob-matches at least one package name known to `sack`.
    pub fn reldep_possibilities_real(&self, sack: &mut Sack) -> Result<Option<Reldep>> {
        let Some(reldep) = Reldep::parse(&self.pattern) else {
            return Ok(None);
        };
        let matched = Query::new(sack)
            .filter_str(Key::Name, CmpFlags::GLOB, &reldep.name)?
            .run();
        Ok(if matched.is_empty() { None } else { Some(reldep) })
    }
}
