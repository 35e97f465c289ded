//! Line fitting for a maximal touch set
//!
//! A two-variable LP (`slope`, `intercept`) is built so the line stays between
//! wick tip and body edge at every touch, solved by a [`LinearSolver`], and the
//! answer is re-checked against the candles before it is accepted.

use chrono::{DateTime, Utc};
use log::trace;

use crate::geometry::{intercept, slope_range};
use crate::solver::{
    ConstraintSense, LinearModel, LinearSolver, ObjectiveSense, SolveStatus, VarId, VarKind,
};
use crate::{OHLCVExt, Side, TimeFrame, Trendline, OHLCV};

/// Slack allowed when re-validating a solved line against the candles
pub const TOLERANCE: f64 = 1e-9;

/// Why a candidate set produced no line
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitRejection {
    #[error("empty touch set")]
    EmptySet,

    #[error("a line needs at least two touches, got {0}")]
    TooFewPoints(usize),

    #[error("touch index {0} is out of range")]
    IndexOutOfRange(usize),

    #[error("touch indices are not strictly increasing")]
    NotIncreasing,

    #[error("no slope fits both end touches")]
    EmptySlopeRange,

    #[error("solver returned {0:?}")]
    Solver(SolveStatus),

    #[error("solver returned no value for '{0}'")]
    MissingValue(&'static str),

    #[error("line value {value} at index {index} outside [{lower}, {upper}]")]
    Tolerance {
        index: usize,
        value: f64,
        lower: f64,
        upper: f64,
    },
}

/// LP for one touch set, with handles to its two decision variables
#[derive(Debug, Clone, PartialEq)]
pub struct TrendlineModel {
    pub model: LinearModel,
    pub slope: VarId,
    pub intercept: VarId,
    pub side: Side,
    pub touches: Vec<usize>,
}

/// Solved and validated line through a touch set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedLine {
    pub side: Side,
    pub slope: f64,
    pub intercept: f64,
    pub index1: usize,
    pub index2: usize,
    pub connects: usize,
}

impl FittedLine {
    #[inline]
    pub fn value_at(&self, index: usize) -> f64 {
        self.slope * index as f64 + self.intercept
    }

    pub fn into_trendline(
        self,
        token: u32,
        timeframe: TimeFrame,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Trendline {
        Trendline {
            token,
            timeframe,
            side: self.side,
            start_time,
            end_time,
            slope: self.slope,
            intercept: self.intercept,
            index1: self.index1,
            index2: self.index2,
            connects: self.connects,
            total_connects: self.connects,
        }
    }
}

/// Band `[lower, upper]` the line must pass through at a touch candle
fn touch_band<T: OHLCV>(candle: &T, side: Side) -> (f64, f64) {
    match side {
        Side::High => (candle.body_top(), candle.high()),
        Side::Low => (candle.low(), candle.body_bottom()),
    }
}

/// Build the LP for `set` (ascending candle indices) on `side`.
pub fn build_model<T: OHLCV>(
    candles: &[T],
    set: &[usize],
    side: Side,
) -> Result<TrendlineModel, FitRejection> {
    let (&first, &last) = match (set.first(), set.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(FitRejection::EmptySet),
    };
    if set.len() < 2 {
        return Err(FitRejection::TooFewPoints(set.len()));
    }
    if let Some(&bad) = set.iter().find(|&&i| i >= candles.len()) {
        return Err(FitRejection::IndexOutOfRange(bad));
    }
    if set.windows(2).any(|w| w[0] >= w[1]) {
        return Err(FitRejection::NotIncreasing);
    }

    let (c_first, c_last) = (&candles[first], &candles[last]);
    let range = slope_range(c_first, c_last, first, last, side);
    if !range.is_feasible() {
        return Err(FitRejection::EmptySlopeRange);
    }

    let (c_lo, c_hi) = match side {
        Side::High => (
            intercept(range.max, c_last.high(), last),
            intercept(range.min, c_first.high(), first),
        ),
        Side::Low => (
            intercept(range.max, c_first.low(), first),
            intercept(range.min, c_last.low(), last),
        ),
    };

    let mut model = LinearModel::new();
    let slope = model.add_variable("slope", range.min, range.max, VarKind::Continuous);
    let icept = model.add_variable("intercept", c_lo, c_hi, VarKind::Continuous);

    for &i in set {
        let (lower, upper) = touch_band(&candles[i], side);
        let terms = vec![(slope, i as f64), (icept, 1.0)];
        let name = format!("upper_{}", i);
        model.add_constraint(name, terms.clone(), ConstraintSense::LessOrEqual, upper);
        model.add_constraint(format!("lower_{}", i), terms, ConstraintSense::GreaterOrEqual, lower);
    }

    // Highs settle on the lowest admissible line, lows on the highest
    let sense = match side {
        Side::High => ObjectiveSense::Minimize,
        Side::Low => ObjectiveSense::Maximize,
    };
    let index_sum: f64 = set.iter().map(|&i| i as f64).sum();
    model.set_objective(sense, vec![(slope, index_sum), (icept, set.len() as f64)]);

    Ok(TrendlineModel { model, slope, intercept: icept, side, touches: set.to_vec() })
}

/// Fit and validate a line through every index of `set`.
///
/// Rejections are ordinary values; callers typically move on to the next set.
pub fn fit_trendline<T, S>(
    candles: &[T],
    set: &[usize],
    side: Side,
    solver: &S,
) -> Result<FittedLine, FitRejection>
where
    T: OHLCV,
    S: LinearSolver + ?Sized,
{
    let tm = build_model(candles, set, side)?;
    let solution = solver.solve(&tm.model);
    if !solution.is_optimal() {
        return Err(FitRejection::Solver(solution.status));
    }

    let m = solution.value(tm.slope).ok_or(FitRejection::MissingValue("slope"))?;
    let c = solution.value(tm.intercept).ok_or(FitRejection::MissingValue("intercept"))?;

    for &i in set {
        let (lower, upper) = touch_band(&candles[i], side);
        let value = m * i as f64 + c;
        if !(value <= upper + TOLERANCE && value >= lower - TOLERANCE) {
            trace!("fit rejected at {}: {} not in [{}, {}]", i, value, lower, upper);
            return Err(FitRejection::Tolerance { index: i, value, lower, upper });
        }
    }

    Ok(FittedLine {
        side,
        slope: m,
        intercept: c,
        index1: tm.touches[0],
        index2: tm.touches[tm.touches.len() - 1],
        connects: set.len(),
    })
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{MinilpSolver, Solution};
    use crate::Candle;

    /// Returns the same values whatever the model
    struct FixedSolver(Solution);

    impl LinearSolver for FixedSolver {
        fn solve(&self, _model: &LinearModel) -> Solution {
            self.0.clone()
        }
    }

    fn collinear_highs(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let h = 105.0 - 0.5 * i as f64;
                Candle::from_ohlcv(1, i as i64, [h, h, h - 3.0, h - 1.0, 1.0]).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_collinear_highs_fit() {
        let bars = collinear_highs(40);
        let fit = fit_trendline(&bars, &[10, 20, 30], Side::High, &MinilpSolver).unwrap();
        assert!((fit.slope + 0.5).abs() < 1e-9);
        assert!((fit.intercept - 105.0).abs() < 1e-9);
        assert_eq!((fit.index1, fit.index2, fit.connects), (10, 30, 3));
    }

    #[test]
    fn test_highs_with_wicks_settle_on_body_tops() {
        // Body tops on 100 - 0.5i, one point of wick above each
        let bars: Vec<Candle> = (0..40)
            .map(|i| {
                let top = 100.0 - 0.5 * i as f64;
                Candle::from_ohlcv(1, i as i64, [top - 2.0, top + 1.0, top - 3.0, top, 1.0]).unwrap()
            })
            .collect();
        let fit = fit_trendline(&bars, &[10, 20, 30], Side::High, &MinilpSolver).unwrap();
        assert!((fit.slope + 0.5).abs() < 1e-6);
        assert!((fit.intercept - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_low_side_fit() {
        let bars: Vec<Candle> = (0..20)
            .map(|i| {
                let low = 50.0 + 0.25 * i as f64;
                Candle::from_ohlcv(1, i as i64, [low, low + 3.0, low, low + 1.0, 1.0]).unwrap()
            })
            .collect();
        let fit = fit_trendline(&bars, &[4, 8, 12, 16], Side::Low, &MinilpSolver).unwrap();
        assert!((fit.slope - 0.25).abs() < 1e-9);
        assert!((fit.intercept - 50.0).abs() < 1e-9);
        assert_eq!(fit.connects, 4);
    }

    #[test]
    fn test_model_shape() {
        let bars = collinear_highs(40);
        let tm = build_model(&bars, &[10, 20, 30], Side::High).unwrap();
        assert_eq!(tm.model.variables().len(), 2);
        assert_eq!(tm.model.constraints().len(), 6);
        let slope = tm.model.variable(tm.slope).unwrap();
        assert_eq!((slope.lower, slope.upper), (-0.5, -0.5));
        let icept = tm.model.variable(tm.intercept).unwrap();
        assert_eq!((icept.lower, icept.upper), (105.0, 105.0));
        assert_eq!(tm.model.objective().terms, vec![(tm.slope, 60.0), (tm.intercept, 3.0)]);
    }

    #[test]
    fn test_rejects_bad_sets() {
        let bars = collinear_highs(10);
        assert_eq!(build_model(&bars, &[], Side::High).unwrap_err(), FitRejection::EmptySet);
        assert_eq!(build_model(&bars, &[3], Side::High).unwrap_err(), FitRejection::TooFewPoints(1));
        assert_eq!(build_model(&bars, &[3, 12], Side::High).unwrap_err(), FitRejection::IndexOutOfRange(12));
        assert_eq!(build_model(&bars, &[5, 3], Side::High).unwrap_err(), FitRejection::NotIncreasing);
    }

    #[test]
    fn test_solver_failure_rejects() {
        let bars = collinear_highs(40);
        let solver = FixedSolver(Solution::failed(SolveStatus::Infeasible));
        assert_eq!(
            fit_trendline(&bars, &[10, 20, 30], Side::High, &solver).unwrap_err(),
            FitRejection::Solver(SolveStatus::Infeasible)
        );
    }

    #[test]
    fn test_slack_beyond_tolerance_rejects() {
        let bars = collinear_highs(40);
        // Line one cent above the highs
        let solver = FixedSolver(Solution::optimal(vec![-0.5, 105.01]));
        match fit_trendline(&bars, &[10, 20, 30], Side::High, &solver) {
            Err(FitRejection::Tolerance { index, .. }) => assert_eq!(index, 10),
            other => panic!("expected tolerance rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_slack_within_tolerance_accepted() {
        let bars = collinear_highs(40);
        let solver = FixedSolver(Solution::optimal(vec![-0.5, 105.0 + 1e-12]));
        assert!(fit_trendline(&bars, &[10, 20, 30], Side::High, &solver).is_ok());
    }

    #[test]
    fn test_missing_value_rejects() {
        let bars = collinear_highs(40);
        let solver = FixedSolver(Solution::optimal(vec![-0.5]));
        assert_eq!(
            fit_trendline(&bars, &[10, 20, 30], Side::High, &solver).unwrap_err(),
            FitRejection::MissingValue("intercept")
        );
    }

    #[test]
    fn test_into_trendline() {
        let fit = FittedLine { side: Side::High, slope: -0.5, intercept: 105.0, index1: 10, index2: 30, connects: 3 };
        let line = fit.into_trendline(9, TimeFrame::Day, DateTime::UNIX_EPOCH, DateTime::UNIX_EPOCH);
        assert_eq!(line.total_connects, 3);
        assert_eq!(line.slot(), (9, TimeFrame::Day, Side::High));
        assert_eq!(line.value_at(20), fit.value_at(20));
    }
}
