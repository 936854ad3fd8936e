//! Interval arithmetic over the 256-bit account key space.
//!
//! Account hashes are ordered as big-endian `U256` "tags"; the sets below
//! track which closed ranges of that space are covered. The full space holds
//! 2^256 points, one more than `U256::MAX`, so point counts saturate and the
//! full-space case is detected structurally.

use std::{cmp, collections::BTreeMap, sync::Arc};

use ethereum_types::{H256, U256};
use parking_lot::Mutex;

/// Number of points in the closed range `[lo, hi]`, saturating at `U256::MAX`.
fn span(lo: U256, hi: U256) -> U256 {
    (hi - lo).saturating_add(U256::one())
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .enumerate()
        .map(|(i, limb)| *limb as f64 * 2f64.powi(64 * i as i32))
        .sum()
}

/// The big-endian tag of an account hash.
pub fn node_tag(hash: H256) -> U256 {
    U256::from_big_endian(hash.as_bytes())
}

/// Set of non-overlapping closed ranges over `U256`, keyed by lower bound.
/// Adjacent ranges coalesce, so the representation is canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRangeSet {
    ranges: BTreeMap<U256, U256>,
}

impl TagRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set covering the whole key space.
    pub fn full() -> Self {
        let mut ranges = BTreeMap::new();
        ranges.insert(U256::zero(), U256::MAX);
        Self { ranges }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ranges.get(&U256::zero()) == Some(&U256::MAX)
    }

    pub fn contains(&self, tag: U256) -> bool {
        self.ranges
            .range(..=tag)
            .next_back()
            .is_some_and(|(_, hi)| *hi >= tag)
    }

    /// Unions `[lo, hi]` into the set; returns the count of newly covered
    /// points (saturating).
    pub fn merge(&mut self, lo: U256, hi: U256) -> U256 {
        let (lo, hi) = order(lo, hi);
        let mut new_lo = lo;
        let mut new_hi = hi;
        let mut absorbed = U256::zero();
        // Candidates start at or below hi + 1; anything further right cannot
        // touch the merged range.
        let candidates: Vec<U256> = self
            .ranges
            .range(..=hi.saturating_add(U256::one()))
            .map(|(k, _)| *k)
            .collect();
        for range_lo in candidates {
            let range_hi = self.ranges[&range_lo];
            if range_hi < lo.saturating_sub(U256::one()) {
                continue;
            }
            // Overlapping or adjacent: fold it in
            self.ranges.remove(&range_lo);
            absorbed = absorbed.saturating_add(span(range_lo, range_hi));
            new_lo = cmp::min(new_lo, range_lo);
            new_hi = cmp::max(new_hi, range_hi);
        }
        self.ranges.insert(new_lo, new_hi);
        // Absorbed ranges are disjoint subsets of the merged hull
        span(new_lo, new_hi).saturating_sub(absorbed)
    }

    /// Removes `[lo, hi]` from the set; returns the count of points removed.
    pub fn reduce(&mut self, lo: U256, hi: U256) -> U256 {
        let (lo, hi) = order(lo, hi);
        let mut removed = U256::zero();
        let candidates: Vec<U256> = self.ranges.range(..=hi).map(|(k, _)| *k).collect();
        for range_lo in candidates {
            let range_hi = self.ranges[&range_lo];
            if range_hi < lo {
                continue;
            }
            self.ranges.remove(&range_lo);
            let overlap_lo = cmp::max(range_lo, lo);
            let overlap_hi = cmp::min(range_hi, hi);
            removed = removed.saturating_add(span(overlap_lo, overlap_hi));
            if range_lo < lo {
                // lo > 0 here since range_lo < lo
                self.ranges.insert(range_lo, lo - U256::one());
            }
            if range_hi > hi {
                // hi < MAX here since range_hi > hi
                self.ranges.insert(hi + U256::one(), range_hi);
            }
        }
        removed
    }

    /// Size of the intersection of `[lo, hi]` with the set (saturating).
    pub fn covered(&self, lo: U256, hi: U256) -> U256 {
        let (lo, hi) = order(lo, hi);
        let mut total = U256::zero();
        for (range_lo, range_hi) in self.ranges.range(..=hi) {
            if *range_hi < lo {
                continue;
            }
            let overlap_lo = cmp::max(*range_lo, lo);
            let overlap_hi = cmp::min(*range_hi, hi);
            total = total.saturating_add(span(overlap_lo, overlap_hi));
        }
        total
    }

    /// Total covered points (saturating).
    pub fn total_points(&self) -> U256 {
        self.ranges
            .iter()
            .fold(U256::zero(), |acc, (lo, hi)| acc.saturating_add(span(*lo, *hi)))
    }

    /// Covered fraction of the full 256-bit key space, in `[0, 1]`.
    pub fn full_factor(&self) -> f64 {
        if self.is_full() {
            return 1.0;
        }
        u256_to_f64(self.total_points()) / 2f64.powi(256)
    }

    /// Uncovered fraction of the full key space, in `[0, 1]`.
    pub fn empty_factor(&self) -> f64 {
        1.0 - self.full_factor()
    }
}

fn order(lo: U256, hi: U256) -> (U256, U256) {
    if lo <= hi { (lo, hi) } else { (hi, lo) }
}

/// Process-wide account coverage, shared by every pivot and grown
/// monotonically: range-fetch and healing both mark account keys here, and
/// the healing gate reads the merged fraction.
#[derive(Debug, Clone, Default)]
pub struct CoverageTracker {
    inner: Arc<Mutex<TagRangeSet>>,
}

impl CoverageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&self, lo: U256, hi: U256) -> U256 {
        self.inner.lock().merge(lo, hi)
    }

    pub fn covered(&self, lo: U256, hi: U256) -> U256 {
        self.inner.lock().covered(lo, hi)
    }

    pub fn full_factor(&self) -> f64 {
        self.inner.lock().full_factor()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tag(value: u64) -> U256 {
        U256::from(value)
    }

    #[test]
    fn merge_counts_new_points() {
        let mut set = TagRangeSet::new();
        assert_eq!(set.merge(tag(10), tag(20)), tag(11));
        // Fully contained: nothing new
        assert_eq!(set.merge(tag(12), tag(18)), tag(0));
        // Overlapping tail
        assert_eq!(set.merge(tag(15), tag(25)), tag(5));
        assert!(set.contains(tag(25)));
        assert!(!set.contains(tag(26)));
    }

    #[test]
    fn merge_coalesces_adjacent_ranges() {
        let mut set = TagRangeSet::new();
        set.merge(tag(0), tag(5));
        set.merge(tag(6), tag(10));
        assert_eq!(set.total_points(), tag(11));
        assert_eq!(set.covered(tag(0), tag(10)), tag(11));
        // One canonical range remains
        assert_eq!(set.merge(tag(0), tag(10)), tag(0));
    }

    #[test]
    fn merge_bridges_a_gap() {
        let mut set = TagRangeSet::new();
        set.merge(tag(0), tag(10));
        set.merge(tag(20), tag(30));
        // Bridging counts only the gap
        assert_eq!(set.merge(tag(5), tag(25)), tag(9));
        assert_eq!(set.total_points(), tag(31));
    }

    #[test]
    fn reduce_splits_ranges() {
        let mut set = TagRangeSet::new();
        set.merge(tag(0), tag(100));
        assert_eq!(set.reduce(tag(40), tag(60)), tag(21));
        assert!(set.contains(tag(39)));
        assert!(!set.contains(tag(40)));
        assert!(!set.contains(tag(60)));
        assert!(set.contains(tag(61)));
        assert_eq!(set.total_points(), tag(80));
    }

    #[test]
    fn reduce_of_uncovered_points_is_zero() {
        let mut set = TagRangeSet::new();
        set.merge(tag(10), tag(20));
        assert_eq!(set.reduce(tag(30), tag(40)), tag(0));
        assert_eq!(set.reduce(tag(15), tag(15)), tag(1));
        assert_eq!(set.reduce(tag(15), tag(15)), tag(0));
    }

    #[test]
    fn covered_measures_overlap() {
        let mut set = TagRangeSet::new();
        set.merge(tag(10), tag(20));
        set.merge(tag(30), tag(40));
        assert_eq!(set.covered(tag(0), tag(100)), tag(22));
        assert_eq!(set.covered(tag(15), tag(35)), tag(12));
        assert_eq!(set.covered(tag(21), tag(29)), tag(0));
    }

    #[test]
    fn full_set_has_factor_one() {
        let set = TagRangeSet::full();
        assert!(set.is_full());
        assert_eq!(set.full_factor(), 1.0);
        assert_eq!(set.empty_factor(), 0.0);
        assert!(set.contains(U256::zero()));
        assert!(set.contains(U256::MAX));
    }

    #[test]
    fn reducing_the_full_set_leaves_the_complement() {
        let mut set = TagRangeSet::full();
        set.reduce(U256::zero(), U256::MAX - U256::one());
        assert!(!set.is_full());
        assert!(set.contains(U256::MAX));
        assert_eq!(set.total_points(), tag(1));
    }

    #[test]
    fn half_space_factor_is_about_a_half() {
        let mut set = TagRangeSet::new();
        set.merge(U256::zero(), U256::MAX / U256::from(2));
        let factor = set.full_factor();
        assert!((factor - 0.5).abs() < 1e-9, "factor was {factor}");
    }

    #[test]
    fn point_merges_at_the_boundaries() {
        let mut set = TagRangeSet::new();
        assert_eq!(set.merge(U256::zero(), U256::zero()), tag(1));
        assert_eq!(set.merge(U256::MAX, U256::MAX), tag(1));
        assert!(set.contains(U256::zero()));
        assert!(set.contains(U256::MAX));
        assert!(!set.contains(tag(1)));
    }

    #[test]
    fn coverage_tracker_is_monotonic() {
        let tracker = CoverageTracker::new();
        let mut last = 0.0;
        for i in 0..10u64 {
            tracker.merge(U256::from(i * 100), U256::from(i * 100 + 50));
            let factor = tracker.full_factor();
            assert!(factor >= last);
            last = factor;
        }
    }
}
