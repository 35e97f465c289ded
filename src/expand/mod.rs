//! Growing triplets into maximal k-point candidate sets
//!
//! Two interchangeable strategies consume the same triplet list:
//!
//! - **Apriori**: level-wise prefix join with full-subset verification. Every
//!   level holds *all* consistent k-sets, maximal or not.
//! - **HyperClique**: pair→third-point map plus depth-first extension. Only
//!   maximal sets are emitted, grouped by size (or just the largest size).
//!
//! Both report the same `max_k` and the same sets at `max_k`.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::candidates::CandidateSet;

pub mod apriori;
pub mod hyperclique;

pub use apriori::find_all_levels_apriori;
pub use hyperclique::find_maximal_hypercliques;

// ============================================================
// LEVELS
// ============================================================

/// Candidate sets grouped by size.
///
/// Sets inside a level are kept in lexicographic order so repeated runs walk
/// them identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Levels {
    levels: BTreeMap<usize, Vec<CandidateSet>>,
    max_k: usize,
}

impl Levels {
    /// Size of the largest non-empty level, 0 when nothing was found
    #[inline]
    pub fn max_k(&self) -> usize {
        self.max_k
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level(&self, k: usize) -> &[CandidateSet] {
        self.levels.get(&k).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sets of the largest size, in fitting order
    pub fn maximal(&self) -> &[CandidateSet] {
        self.level(self.max_k)
    }

    /// Level `k` as a set, for order-independent comparisons
    pub fn keys(&self, k: usize) -> HashSet<CandidateSet> {
        self.level(k).iter().cloned().collect()
    }

    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.levels.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[CandidateSet])> + '_ {
        self.levels.iter().map(|(k, sets)| (*k, sets.as_slice()))
    }

    /// Total number of sets over all levels
    pub fn len(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    pub(crate) fn insert(&mut self, k: usize, mut sets: Vec<CandidateSet>) {
        if sets.is_empty() {
            return;
        }
        sets.sort_unstable();
        self.levels.insert(k, sets);
        self.max_k = self.max_k.max(k);
    }
}

// ============================================================
// STRATEGY
// ============================================================

/// Expansion algorithm, chosen once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpansionStrategy {
    /// Level-wise join; candidate verification on the rayon pool when `parallel_verify`
    Apriori {
        #[serde(default = "default_parallel_verify")]
        parallel_verify: bool,
    },
    /// Depth-first hyperclique search returning every maximal set
    HyperClique {
        #[serde(default)]
        parallel: bool,
    },
    /// Depth-first hyperclique search returning only the largest maximal sets
    HyperCliqueMaxOnly {
        #[serde(default)]
        parallel: bool,
    },
}

fn default_parallel_verify() -> bool {
    true
}

impl Default for ExpansionStrategy {
    fn default() -> Self {
        ExpansionStrategy::Apriori { parallel_verify: true }
    }
}

impl ExpansionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ExpansionStrategy::Apriori { .. } => "apriori",
            ExpansionStrategy::HyperClique { .. } => "hyper_clique",
            ExpansionStrategy::HyperCliqueMaxOnly { .. } => "hyper_clique_max_only",
        }
    }

    pub fn expand(&self, triplets: &[CandidateSet]) -> Levels {
        match *self {
            ExpansionStrategy::Apriori { parallel_verify } => {
                find_all_levels_apriori(triplets, parallel_verify)
            },
            ExpansionStrategy::HyperClique { parallel } => {
                find_maximal_hypercliques(triplets, false, parallel)
            },
            ExpansionStrategy::HyperCliqueMaxOnly { parallel } => {
                find_maximal_hypercliques(triplets, true, parallel)
            },
        }
    }
}

// ============================================================
// TESTS
// ============================================================
