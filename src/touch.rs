//! Touch-point extraction: local extrema, timestamp mapping and the trend touch list

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::geometry::{compare_touch, TouchCompare};
use crate::{Candle, Side, OHLCV};

/// Default half-width of the extremum window
pub const DEFAULT_HALF_WINDOW: usize = 5;

/// Indices whose wick extreme is not beaten anywhere in `[i - w, i + w]`.
///
/// Ties qualify, so a flat top of equal highs yields every bar of the plateau.
/// The first and last `w` bars are never reported.
pub fn local_extrema<T: OHLCV>(candles: &[T], side: Side, half_window: usize) -> Vec<usize> {
    let n = candles.len();
    if n <= 2 * half_window {
        return Vec::new();
    }

    (half_window..n - half_window)
        .filter(|&i| {
            let window = &candles[i - half_window..=i + half_window];
            match side {
                Side::High => {
                    let h = candles[i].high();
                    window.iter().all(|c| c.high() <= h)
                },
                Side::Low => {
                    let l = candles[i].low();
                    window.iter().all(|c| c.low() >= l)
                },
            }
        })
        .collect()
}

/// Positions in `candles` whose open time appears in `times`, ascending
pub fn touch_indices(candles: &[Candle], times: &BTreeSet<DateTime<Utc>>) -> Vec<usize> {
    if times.is_empty() {
        return Vec::new();
    }
    candles
        .iter()
        .enumerate()
        .filter(|(_, c)| times.contains(&c.time))
        .map(|(i, _)| i)
        .collect()
}

/// Filter touches down to the ones a trend line can lean on.
///
/// Walks backwards from the latest touch and keeps each earlier touch that is
/// not dominated by the last one kept: for highs it must not sit `Lower`
/// (descending resistance), for lows it must not sit `Higher` (ascending
/// support). Output is in chronological order.
pub fn trend_touches<T: OHLCV>(candles: &[T], touches: &[usize], side: Side) -> Vec<usize> {
    let Some((&latest, earlier)) = touches.split_last() else {
        return Vec::new();
    };
    if touches.iter().any(|&t| t >= candles.len()) {
        return Vec::new();
    }

    let dominated = match side {
        Side::High => TouchCompare::Lower,
        Side::Low => TouchCompare::Higher,
    };

    let mut kept = vec![latest];
    for &t in earlier.iter().rev() {
        let anchor = kept[kept.len() - 1];
        if compare_touch(&candles[t], &candles[anchor], side) != dominated {
            kept.push(t);
        }
    }
    kept.reverse();
    kept
}

// ============================================================
// TESTS
// ============================================================
