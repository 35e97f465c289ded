//! Candidate touch sets and first-order (triplet) generation

use std::fmt;
use std::ops::Deref;

use crate::geometry::{is_trendline_possible, slope_range};
use crate::{Side, OHLCV};

/// Strictly increasing candle indices that are mutually slope-consistent.
///
/// The sorted vector is its own canonical key: equality and hashing are
/// structural, so sets can key hash maps directly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CandidateSet(Vec<usize>);

impl CandidateSet {
    /// Build from arbitrary indices; sorts and drops duplicates.
    pub fn new(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self(indices)
    }

    /// Build from indices the caller guarantees are strictly increasing.
    pub(crate) fn from_sorted(indices: Vec<usize>) -> Self {
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        Self(indices)
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    #[inline]
    pub fn first(&self) -> Option<usize> {
        self.0.first().copied()
    }

    #[inline]
    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Leading `len` indices, used to group sets for the level-wise join
    #[inline]
    pub fn prefix(&self, len: usize) -> &[usize] {
        &self.0[..len.min(self.0.len())]
    }

    /// Copy of this set with `index` inserted in order
    pub fn with(&self, index: usize) -> Self {
        let mut next = Vec::with_capacity(self.0.len() + 1);
        next.extend_from_slice(&self.0);
        match next.binary_search(&index) {
            Ok(_) => {},
            Err(pos) => next.insert(pos, index),
        }
        Self(next)
    }

    /// Copy of this set with the element at `position` removed
    pub fn without_position(&self, position: usize) -> Self {
        let mut next = self.0.clone();
        next.remove(position);
        Self(next)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.binary_search(&index).is_ok()
    }

    /// Whether every element of `self` also appears in `other`
    pub fn is_subset_of(&self, other: &CandidateSet) -> bool {
        if self.0.len() > other.0.len() {
            return false;
        }
        let mut rest = other.0.iter();
        self.0.iter().all(|x| rest.any(|y| y == x))
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.0
    }
}

impl Deref for CandidateSet {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for CandidateSet {
    fn from(indices: Vec<usize>) -> Self {
        Self::new(indices)
    }
}

impl<const N: usize> From<[usize; N]> for CandidateSet {
    fn from(indices: [usize; N]) -> Self {
        Self::new(indices.to_vec())
    }
}

impl fmt::Display for CandidateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, x) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("#")?;
            }
            write!(f, "{}", x)?;
        }
        Ok(())
    }
}

// ============================================================
// TRIPLET GENERATION
// ============================================================

/// All validated 3-point seeds from a time-ordered touch list.
///
/// For every `i < j < k` the pair `(i, j)` fixes a slope range and `k` is kept
/// when its body edge fits that range. O(n³); callers bound `touches.len()`.
/// Fewer than three touches, touches outside `candles`, or a touch list that is
/// not strictly increasing yield no triplets.
pub fn generate_triplets<T: OHLCV>(
    candles: &[T],
    touches: &[usize],
    side: Side,
) -> Vec<CandidateSet> {
    let mut triplets = Vec::new();
    let n = touches.len();
    if n < 3
        || touches.iter().any(|&t| t >= candles.len())
        || touches.windows(2).any(|w| w[0] >= w[1])
    {
        return triplets;
    }

    for i in 0..n {
        let (ti, ci) = (touches[i], &candles[touches[i]]);
        for j in (i + 1)..n {
            let tj = touches[j];
            let range = slope_range(ci, &candles[tj], ti, tj, side);
            if !range.is_feasible() {
                continue;
            }
            for &tk in &touches[(j + 1)..] {
                if is_trendline_possible(ci, &candles[tk], tk - ti, &range, side) {
                    triplets.push(CandidateSet::from_sorted(vec![ti, tj, tk]));
                }
            }
        }
    }

    triplets
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    /// Candles whose body top equals the high, sitting on `105 - 0.5 * i`
    fn collinear(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let h = 105.0 - 0.5 * i as f64;
                Candle::from_ohlcv(1, i as i64, [h, h, h - 3.0, h - 1.0, 1.0]).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_canonical_set() {
        let set = CandidateSet::new(vec![30, 10, 20, 10]);
        assert_eq!(set.as_slice(), &[10, 20, 30]);
        assert_eq!(set, CandidateSet::from([10, 20, 30]));
        assert_eq!(set.to_string(), "10#20#30");
    }

    #[test]
    fn test_with_and_without() {
        let set = CandidateSet::from([1, 5, 9]);
        assert_eq!(set.with(3).as_slice(), &[1, 3, 5, 9]);
        assert_eq!(set.with(5), set);
        assert_eq!(set.without_position(1).as_slice(), &[1, 9]);
        assert_eq!(set.prefix(2), &[1, 5]);
    }

    #[test]
    fn test_subset() {
        let small = CandidateSet::from([2, 4]);
        let big = CandidateSet::from([1, 2, 3, 4]);
        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
        assert!(!CandidateSet::from([2, 5]).is_subset_of(&big));
    }

    #[test]
    fn test_collinear_touches_form_triplet() {
        let bars = collinear(40);
        let triplets = generate_triplets(&bars, &[10, 20, 30], Side::High);
        assert_eq!(triplets, vec![CandidateSet::from([10, 20, 30])]);
    }

    #[test]
    fn test_all_triplets_of_collinear_touches() {
        let bars = collinear(40);
        let triplets = generate_triplets(&bars, &[5, 10, 20, 30], Side::High);
        assert_eq!(triplets.len(), 4);
    }

    #[test]
    fn test_too_few_touches() {
        let bars = collinear(40);
        assert!(generate_triplets(&bars, &[], Side::High).is_empty());
        assert!(generate_triplets(&bars, &[10], Side::High).is_empty());
        assert!(generate_triplets(&bars, &[10, 20], Side::High).is_empty());
    }

    #[test]
    fn test_off_line_point_rejected() {
        let mut bars = collinear(40);
        // Lift the body of bar 20 well above the line
        bars[20] = Candle::from_ohlcv(1, 20, [99.0, 100.0, 90.0, 92.0, 1.0]).unwrap();
        let triplets = generate_triplets(&bars, &[10, 20, 30], Side::High);
        assert!(triplets.is_empty());
    }

    #[test]
    fn test_out_of_range_touch() {
        let bars = collinear(10);
        assert!(generate_triplets(&bars, &[1, 2, 30], Side::High).is_empty());
    }

    #[test]
    fn test_unordered_touches_yield_nothing() {
        let bars = collinear(40);
        assert!(generate_triplets(&bars, &[30, 20, 10], Side::High).is_empty());
        assert!(generate_triplets(&bars, &[10, 30, 20], Side::High).is_empty());
        assert!(generate_triplets(&bars, &[10, 20, 20, 30], Side::High).is_empty());
    }
}
