//! Depth-first maximal hyperclique search over the triplet hypergraph
//!
//! Each triplet `{a, b, c}` is a hyperedge. A set is a hyperclique when every
//! 3-subset is a hyperedge; it is extended by any point that forms an edge with
//! every pair already in it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;

use super::Levels;
use crate::candidates::CandidateSet;

/// `(a, b)` with `a < b` → every `c` such that `{a, b, c}` is a triplet
type PairMap = HashMap<(usize, usize), HashSet<usize>>;

fn build_pair_map(triplets: &[CandidateSet]) -> PairMap {
    let mut pairs = PairMap::new();
    for t in triplets.iter().filter(|t| t.len() == 3) {
        let (a, b, c) = (t[0], t[1], t[2]);
        pairs.entry((a, b)).or_default().insert(c);
        pairs.entry((a, c)).or_default().insert(b);
        pairs.entry((b, c)).or_default().insert(a);
    }
    pairs
}

// ============================================================
// SEARCH
// ============================================================

struct Search<'a> {
    pairs: &'a PairMap,
    /// Nodes already expanded, shared across seeds and workers
    visited: Mutex<HashSet<CandidateSet>>,
}

impl<'a> Search<'a> {
    fn new(pairs: &'a PairMap) -> Self {
        Self { pairs, visited: Mutex::new(HashSet::new()) }
    }

    /// First visit wins; later arrivals at the same node return immediately.
    fn enter(&self, node: &CandidateSet) -> bool {
        let mut visited = self.visited.lock().unwrap_or_else(PoisonError::into_inner);
        if visited.contains(node) {
            return false;
        }
        visited.insert(node.clone());
        true
    }

    /// Points that form a triplet with every pair of `current`, ascending
    fn extensions(&self, current: &CandidateSet) -> Vec<usize> {
        let k = current.len();
        let mut pair_sets: Vec<&HashSet<usize>> = Vec::with_capacity(k * k.saturating_sub(1) / 2);
        for i in 0..k {
            for j in (i + 1)..k {
                match self.pairs.get(&(current[i], current[j])) {
                    Some(thirds) => pair_sets.push(thirds),
                    None => return Vec::new(),
                }
            }
        }
        pair_sets.sort_by_key(|s| s.len());

        let Some((smallest, rest)) = pair_sets.split_first() else {
            return Vec::new();
        };
        let mut out: Vec<usize> = smallest
            .iter()
            .copied()
            .filter(|c| !current.contains(*c) && rest.iter().all(|s| s.contains(c)))
            .collect();
        out.sort_unstable();
        out
    }

    /// Extend `current` depth-first, pushing every node that admits no extension.
    fn extend(&self, current: CandidateSet, found: &mut Vec<CandidateSet>) {
        if !self.enter(&current) {
            return;
        }
        let next = self.extensions(&current);
        if next.is_empty() {
            found.push(current);
            return;
        }
        for c in next {
            self.extend(current.with(c), found);
        }
    }
}

// ============================================================
// COLLECTION
// ============================================================

/// Single owner of the result set; drops duplicates and anything contained in
/// a set already recorded.
#[derive(Default)]
struct MaximalCollector {
    keys: HashSet<CandidateSet>,
    found: Vec<CandidateSet>,
}

impl MaximalCollector {
    fn record(&mut self, set: CandidateSet) -> bool {
        if self.keys.contains(&set) || self.found.iter().any(|m| set.is_subset_of(m)) {
            return false;
        }
        self.keys.insert(set.clone());
        self.found.push(set);
        true
    }

    fn into_levels(self, max_only: bool) -> Levels {
        let mut by_size: BTreeMap<usize, Vec<CandidateSet>> = BTreeMap::new();
        for set in self.found {
            by_size.entry(set.len()).or_default().push(set);
        }
        if max_only {
            by_size = by_size.pop_last().into_iter().collect();
        }
        let mut levels = Levels::default();
        for (k, sets) in by_size {
            levels.insert(k, sets);
        }
        levels
    }
}

/// Every maximal hyperclique reachable from `triplets`, grouped by size.
///
/// With `max_only` only the largest size is kept. With `parallel` each seed
/// triplet is searched on the rayon pool; workers hand their finds back to a
/// single collector so the result does not depend on scheduling.
pub fn find_maximal_hypercliques(
    triplets: &[CandidateSet],
    max_only: bool,
    parallel: bool,
) -> Levels {
    let pairs = build_pair_map(triplets);
    let search = Search::new(&pairs);

    let mut seeds: Vec<&CandidateSet> = triplets.iter().filter(|t| t.len() == 3).collect();
    seeds.sort_unstable();
    seeds.dedup();

    let per_seed: Vec<Vec<CandidateSet>> = if parallel {
        seeds
            .par_iter()
            .map(|seed| {
                let mut found = Vec::new();
                search.extend((*seed).clone(), &mut found);
                found
            })
            .collect()
    } else {
        seeds
            .iter()
            .map(|seed| {
                let mut found = Vec::new();
                search.extend((*seed).clone(), &mut found);
                found
            })
            .collect()
    };

    // Larger sets first so a subset is never recorded ahead of its superset
    let mut candidates: Vec<CandidateSet> = per_seed.into_iter().flatten().collect();
    candidates.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut collector = MaximalCollector::default();
    for set in candidates {
        collector.record(set);
    }
    collector.into_levels(max_only)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sets(raw: &[[usize; 3]]) -> Vec<CandidateSet> {
        raw.iter().map(|t| CandidateSet::from(*t)).collect()
    }

    #[test]
    fn test_pair_map_covers_all_pairs() {
        let pairs = build_pair_map(&sets(&[[1, 2, 3], [1, 2, 4]]));
        assert_eq!(pairs[&(1, 2)], HashSet::from([3, 4]));
        assert_eq!(pairs[&(2, 3)], HashSet::from([1]));
        assert!(!pairs.contains_key(&(3, 4)));
    }

    #[test]
    fn test_maximal_sets_by_size() {
        // {1,2,3,4} is a clique; {2,5,6} stands alone
        let triplets = sets(&[[1, 2, 3], [1, 2, 4], [1, 3, 4], [2, 3, 4], [2, 5, 6]]);
        let levels = find_maximal_hypercliques(&triplets, false, false);
        assert_eq!(levels.max_k(), 4);
        assert_eq!(levels.level(4), &[CandidateSet::from([1, 2, 3, 4])]);
        assert_eq!(levels.level(3), &[CandidateSet::from([2, 5, 6])]);
    }

    #[test]
    fn test_max_only_drops_smaller_levels() {
        let triplets = sets(&[[1, 2, 3], [1, 2, 4], [1, 3, 4], [2, 3, 4], [2, 5, 6]]);
        let levels = find_maximal_hypercliques(&triplets, true, false);
        assert_eq!(levels.sizes().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_partial_overlap_is_not_a_clique() {
        // Missing {1,3,4}: no 4-set, all three triplets are maximal
        let triplets = sets(&[[1, 2, 3], [1, 2, 4], [2, 3, 4]]);
        let levels = find_maximal_hypercliques(&triplets, false, true);
        assert_eq!(levels.max_k(), 3);
        assert_eq!(levels.level(3).len(), 3);
    }

    #[test]
    fn test_collector_rejects_subsets_and_duplicates() {
        let mut collector = MaximalCollector::default();
        assert!(collector.record(CandidateSet::from([1, 2, 3, 4])));
        assert!(!collector.record(CandidateSet::from([1, 2, 3, 4])));
        assert!(!collector.record(CandidateSet::from([1, 3, 4])));
        assert!(collector.record(CandidateSet::from([1, 3, 5])));
    }
}
