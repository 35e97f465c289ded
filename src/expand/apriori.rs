//! Level-wise expansion with prefix join and subset verification

use std::collections::{BTreeMap, HashSet};

use rayon::prelude::*;

use super::Levels;
use crate::candidates::CandidateSet;

/// Grow `triplets` level by level until no (k+1)-set survives verification.
///
/// Level 3 is the deduplicated input. Every later level holds each set whose
/// k-subsets all appear in the previous level, so the result is the complete
/// downward-closed family rather than only the maximal sets.
pub fn find_all_levels_apriori(triplets: &[CandidateSet], parallel_verify: bool) -> Levels {
    let mut levels = Levels::default();
    let Some(k) = triplets.first().map(|s| s.len()) else {
        return levels;
    };

    let mut current: Vec<CandidateSet> =
        triplets.iter().filter(|s| s.len() == k).cloned().collect();
    current.sort_unstable();
    current.dedup();

    let mut k = k;
    while !current.is_empty() {
        let next = next_level(&current, k, parallel_verify);
        levels.insert(k, current);
        current = next;
        k += 1;
    }

    levels
}

/// Join sets sharing their first `k - 1` indices, then keep each joined set
/// whose every k-subset is present in `prev`.
fn next_level(prev: &[CandidateSet], k: usize, parallel_verify: bool) -> Vec<CandidateSet> {
    if k == 0 {
        return Vec::new();
    }

    let mut groups: BTreeMap<&[usize], Vec<&CandidateSet>> = BTreeMap::new();
    for set in prev {
        groups.entry(set.prefix(k - 1)).or_default().push(set);
    }

    let mut seen = HashSet::new();
    let mut joined = Vec::new();
    for group in groups.values().filter(|g| g.len() > 1) {
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                let Some(tail) = b.last() else { continue };
                let candidate = a.with(tail);
                if candidate.len() == k + 1 && seen.insert(candidate.clone()) {
                    joined.push(candidate);
                }
            }
        }
    }

    let known: HashSet<&CandidateSet> = prev.iter().collect();
    let closed =
        |c: &CandidateSet| (0..c.len()).all(|pos| known.contains(&c.without_position(pos)));

    if parallel_verify {
        joined.into_par_iter().filter(|c| closed(c)).collect()
    } else {
        joined.into_iter().filter(|c| closed(c)).collect()
    }
}

// ============================================================
// TESTS
// ============================================================
