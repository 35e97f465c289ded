//! Property tests: expansion invariants and fit soundness over generated series.

use proptest::prelude::*;
use trendscan::fit::TOLERANCE;
use trendscan::prelude::*;

/// Per-bar recipe: (on the line, offset when off it, upper wick, body, lower wick, bullish)
type BarSpec = (bool, f64, f64, f64, f64, bool);

fn bar_spec() -> impl Strategy<Value = BarSpec> {
    (
        prop::bool::weighted(0.6),
        -4.0f64..4.0,
        prop_oneof![Just(0.0), 0.0f64..1.0],
        0.1f64..3.0,
        0.0f64..2.0,
        any::<bool>(),
    )
}

/// Bars hugging `100 - 0.3 * i` with some scattered off the line
fn build(specs: &[BarSpec]) -> Vec<Candle> {
    specs
        .iter()
        .enumerate()
        .map(|(i, &(on_line, offset, wick_up, body, wick_down, bullish))| {
            let line = 100.0 - 0.3 * i as f64;
            let top = if on_line { line } else { line + offset };
            let bottom = top - body;
            let (open, close) = if bullish { (bottom, top) } else { (top, bottom) };
            Candle::from_ohlcv(1, i as i64 * 60, [open, top + wick_up, bottom - wick_down, close, 1.0]).unwrap()
        })
        .collect()
}

fn series() -> impl Strategy<Value = (Vec<Candle>, Vec<usize>)> {
    prop::collection::vec(bar_spec(), 12..40).prop_flat_map(|specs| {
        let n = specs.len();
        (Just(build(&specs)), prop::collection::btree_set(0..n, 3..11))
            .prop_map(|(bars, touches)| (bars, touches.into_iter().collect::<Vec<_>>()))
    })
}

fn side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::High), Just(Side::Low)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_generated_bars_are_valid((bars, _touches) in series()) {
        prop_assert!(trendscan::validate_series(&bars).is_ok());
    }

    #[test]
    fn prop_apriori_levels_are_downward_closed((bars, touches) in series(), side in side()) {
        let triplets = generate_triplets(&bars, &touches, side);
        let levels = ExpansionStrategy::Apriori { parallel_verify: true }.expand(&triplets);

        for (k, sets) in levels.iter() {
            if k == 3 {
                continue;
            }
            let below = levels.keys(k - 1);
            for set in sets {
                for pos in 0..set.len() {
                    prop_assert!(below.contains(&set.without_position(pos)), "{} missing subset", set);
                }
            }
        }
    }

    #[test]
    fn prop_strategies_agree_on_maximal_sets((bars, touches) in series(), side in side()) {
        let triplets = generate_triplets(&bars, &touches, side);
        let apriori = ExpansionStrategy::Apriori { parallel_verify: false }.expand(&triplets);
        let k = apriori.max_k();

        for strategy in [
            ExpansionStrategy::HyperClique { parallel: false },
            ExpansionStrategy::HyperClique { parallel: true },
            ExpansionStrategy::HyperCliqueMaxOnly { parallel: true },
        ] {
            let other = strategy.expand(&triplets);
            prop_assert_eq!(other.max_k(), k);
            prop_assert_eq!(other.keys(k), apriori.keys(k));
        }
    }

    #[test]
    fn prop_hyperclique_sets_are_maximal_and_distinct((bars, touches) in series(), side in side()) {
        let triplets = generate_triplets(&bars, &touches, side);
        let levels = ExpansionStrategy::HyperClique { parallel: true }.expand(&triplets);
        let all: Vec<&CandidateSet> = levels.iter().flat_map(|(_, sets)| sets.iter()).collect();

        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                if i != j {
                    prop_assert!(!a.is_subset_of(b), "{} inside {}", a, b);
                }
            }
        }
    }

    #[test]
    fn prop_triplet_pairs_have_feasible_slope_range((bars, touches) in series(), side in side()) {
        for t in generate_triplets(&bars, &touches, side) {
            prop_assert!(t.windows(2).all(|w| w[0] < w[1]));
            let range = slope_range(&bars[t[0]], &bars[t[1]], t[0], t[1], side);
            prop_assert!(range.min <= range.max);
        }
    }

    #[test]
    fn prop_accepted_fits_stay_inside_every_touch((bars, touches) in series(), side in side()) {
        let triplets = generate_triplets(&bars, &touches, side);
        let levels = ExpansionStrategy::default().expand(&triplets);

        for set in levels.maximal() {
            if let Ok(fit) = fit_trendline(&bars, set, side, &MinilpSolver) {
                prop_assert_eq!(fit.connects, set.len());
                for &i in set.iter() {
                    let y = fit.value_at(i);
                    let (lower, upper) = match side {
                        Side::High => (bars[i].body_top(), bars[i].high),
                        Side::Low => (bars[i].low, bars[i].body_bottom()),
                    };
                    prop_assert!(y <= upper + TOLERANCE && y >= lower - TOLERANCE);
                }
            }
        }
    }
}
