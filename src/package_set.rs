//! Dense bitmap set of solvable ids, backed by [`bitvec`].
//!
//! Grounded on `rattler_libsolv_rs`'s own `bitvec`-backed solvable sets —
//! the closest thing in the pack to the pool-wide dense bitmap this spec
//! calls for (§3, §9).

use bitvec::prelude::*;
use resolvo::SolvableId;

use crate::pool::RpmPool;

/// An unordered set of package handles within a sack, stored as a dense
/// bitmap over the pool's solvable-id range.
///
/// Iteration order is ascending solvable id; `len()` is the bitmap's
/// popcount.
#[derive(Debug, Clone, Default)]
pub struct PackageSet {
    bits: BitVec,
}

impl PackageSet {
    /// An empty set sized for `capacity` solvable ids.
    pub fn with_capacity(capacity: usize) -> Self {
        PackageSet {
            bits: bitvec![0; capacity],
        }
    }

    /// Build a set from an explicit id list.
    pub fn from_ids(capacity: usize, ids: impl IntoIterator<Item = SolvableId>) -> Self {
        let mut set = Self::with_capacity(capacity);
        for id in ids {
            set.insert(id);
        }
        set
    }

    fn grow_to(&mut self, index: usize) {
        if index >= self.bits.len() {
            self.bits.resize(index + 1, false);
        }
    }

    /// Insert a solvable id.
    pub fn insert(&mut self, id: SolvableId) {
        let idx = solvable_index(id);
        self.grow_to(idx);
        self.bits.set(idx, true);
    }

    /// Remove a solvable id.
    pub fn remove(&mut self, id: SolvableId) {
        let idx = solvable_index(id);
        if idx < self.bits.len() {
            self.bits.set(idx, false);
        }
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: SolvableId) -> bool {
        self.bits
            .get(solvable_index(id))
            .map(|b| *b)
            .unwrap_or(false)
    }

    /// Number of members (popcount).
    pub fn len(&self) -> usize {
        self.bits.count_ones()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over members in ascending solvable-id order.
    pub fn iter(&self) -> impl Iterator<Item = SolvableId> + '_ {
        self.bits
            .iter_ones()
            .map(|idx| SolvableId::from_usize(idx))
    }

    /// In-place intersection.
    pub fn intersect_with(&mut self, other: &PackageSet) {
        let len = self.bits.len().max(other.bits.len());
        self.grow_to(len.saturating_sub(1));
        for i in 0..self.bits.len() {
            let o = other.bits.get(i).map(|b| *b).unwrap_or(false);
            let s = *self.bits.get(i).unwrap();
            self.bits.set(i, s && o);
        }
    }

    /// In-place union.
    pub fn union_with(&mut self, other: &PackageSet) {
        self.grow_to(other.bits.len().saturating_sub(1));
        for i in 0..other.bits.len() {
            if other.bits[i] {
                self.bits.set(i, true);
            }
        }
    }

    /// In-place set difference: remove every member of `other`.
    pub fn subtract(&mut self, other: &PackageSet) {
        for i in 0..self.bits.len().min(other.bits.len()) {
            if other.bits[i] {
                self.bits.set(i, false);
            }
        }
    }

    /// A new set containing the intersection of `self` and `other`.
    pub fn intersection(&self, other: &PackageSet) -> PackageSet {
        let mut out = self.clone();
        out.intersect_with(other);
        out
    }

    /// A new set containing the union of `self` and `other`.
    pub fn union(&self, other: &PackageSet) -> PackageSet {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    /// A new set containing `self \ other`.
    pub fn difference(&self, other: &PackageSet) -> PackageSet {
        let mut out = self.clone();
        out.subtract(other);
        out
    }

    /// Every solvable id known to `pool`, as a full set.
    pub fn all(pool: &RpmPool) -> Self {
        Self::from_ids(pool.solvable_count(), pool.all_solvable_ids())
    }
}

fn solvable_index(id: SolvableId) -> usize {
    use resolvo::ArenaId;
    id.to_usize()
}
