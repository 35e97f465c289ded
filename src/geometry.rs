//! Slope-range and feasibility arithmetic between touch candles
//!
//! A line "touches" a high candle when it passes on or under the high wick and on
//! or above the body top at that candle's index. Lows mirror this: on or above the
//! low wick and on or under the body bottom.

use crate::{OHLCVExt, Side, OHLCV};

/// Outcome of comparing two touch candles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchCompare {
    Lower,
    Equal,
    Higher,
}

/// Band of slopes admissible through two touch points.
///
/// `min > max` means no straight line can touch both candles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeRange {
    pub min: f64,
    pub max: f64,
}

impl SlopeRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn is_feasible(&self) -> bool {
        self.min <= self.max
    }

    #[inline]
    pub fn contains(&self, slope: f64) -> bool {
        self.min <= slope && slope <= self.max
    }

    pub fn intersects(&self, other: &SlopeRange) -> bool {
        !(other.min > self.max || other.max < self.min)
    }

    pub fn intersection(&self, other: &SlopeRange) -> Option<SlopeRange> {
        self
            .intersects(other)
            .then(|| SlopeRange::new(self.min.max(other.min), self.max.min(other.max)))
    }
}

/// Compare the body extreme of each candle against the other's wick.
///
/// For highs `a` is `Higher` when its body top clears `b`'s high, `Lower` when
/// `b`'s body top clears `a`'s high. Lows are the mirror image.
pub fn compare_touch<T: OHLCV>(a: &T, b: &T, side: Side) -> TouchCompare {
    match side {
        Side::High => {
            if a.body_top() > b.high() {
                TouchCompare::Higher
            } else if b.body_top() > a.high() {
                TouchCompare::Lower
            } else {
                TouchCompare::Equal
            }
        },
        Side::Low => {
            if a.body_bottom() < b.low() {
                TouchCompare::Lower
            } else if b.body_bottom() < a.low() {
                TouchCompare::Higher
            } else {
                TouchCompare::Equal
            }
        },
    }
}

/// Slopes for which a line through both touch candles stays between wick and body
/// at each end.
///
/// The band runs from the line joining the first wick to the second body edge up
/// to the line joining the first body edge to the second wick (mirrored for
/// lows). Zero-wick candles collapse it to a single slope.
pub fn slope_range<T: OHLCV>(c1: &T, c2: &T, idx1: usize, idx2: usize, side: Side) -> SlopeRange {
    let dx = idx2 as f64 - idx1 as f64;
    match side {
        Side::High => SlopeRange::new(
            (c2.body_top() - c1.high()) / dx,
            (c2.high() - c1.body_top()) / dx,
        ),
        Side::Low => SlopeRange::new(
            (c2.low() - c1.body_bottom()) / dx,
            (c2.body_bottom() - c1.low()) / dx,
        ),
    }
}

/// Whether `c3`, `dx` bars after `c1`, can sit on a line whose slope lies in `range`.
///
/// Only the body extremes of `c1` and `c3` are tested against the band, so a
/// third candle that reaches the line with its wick alone is not a touch.
pub fn is_trendline_possible<T: OHLCV>(
    c1: &T,
    c3: &T,
    dx: usize,
    range: &SlopeRange,
    side: Side,
) -> bool {
    let anchor = c1.body_extreme(side);
    let edge = c3.body_extreme(side);
    let dx = dx as f64;

    if edge > range.max * dx + anchor {
        return false;
    }
    if edge < range.min * dx + anchor {
        return false;
    }
    true
}

#[inline]
pub fn intercept(slope: f64, y: f64, x: usize) -> f64 {
    y - slope * x as f64
}

// ============================================================
// TESTS
// ============================================================
