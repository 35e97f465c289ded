//! # trendscan - trendline discovery for candle series
//!
//! Finds maximal sets of touch points (local highs or lows) that lie on a single
//! straight resistance/support line, then fits and validates that line with a
//! linear program.
//!
//! ## Quick Start
//!
//! ```rust
//! use trendscan::prelude::*;
//!
//! // Touch candles whose body top sits exactly on their high
//! let bars: Vec<Candle> = (0..40)
//!     .map(|i| {
//!         let h = 105.0 - 0.5 * i as f64;
//!         Candle::from_ohlcv(1, i as i64, [h, h, h - 2.0, h - 1.0, 1000.0])
//!     })
//!     .collect::<Result<_>>()?;
//!
//! let touches = [10, 20, 30];
//! let triplets = generate_triplets(&bars, &touches, Side::High);
//! let levels = ExpansionStrategy::default().expand(&triplets);
//!
//! let fit = fit_trendline(&bars, &levels.maximal()[0], Side::High, &MinilpSolver::default());
//! assert!(fit.is_ok());
//! # Ok::<(), TrendlineError>(())
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub mod analysis;
pub mod candidates;
pub mod config;
pub mod expand;
pub mod fit;
pub mod geometry;
pub mod solver;
pub mod sources;
pub mod timeframe;
pub mod touch;

pub use timeframe::{Session, TimeFrame};

pub mod prelude {
    pub use crate::{
        // Orchestration
        analysis::{AnalysisBuilder, AnalysisService, RunReport, SkipEvent, SkipReason},
        // Candidates
        candidates::{generate_triplets, CandidateSet},
        // Configuration
        config::{AnalysisConfig, ConfigFormat, ConfigLoader, ConfigValidation},
        // Expansion
        expand::{ExpansionStrategy, Levels},
        // Fitting
        fit::{build_model, fit_trendline, FitRejection, FittedLine, TrendlineModel},
        // Geometry
        geometry::{
            compare_touch, intercept, is_trendline_possible, slope_range, SlopeRange, TouchCompare,
        },
        // Solver contract
        solver::{LinearModel, LinearSolver, MinilpSolver, Solution, SolveStatus},
        // Collaborators
        sources::{
            CancelFlag, CandleSource, ExtremumSource, MemoryMarketData, MemoryTrendlineStore,
            ResamplingCandleSource, SymbolResolver, TrendlineSink, WindowExtremumSource,
        },
        // Touch points
        touch::{local_extrema, touch_indices, trend_touches},
        // Types
        Candle,
        OHLCVExt,
        Result,
        Session,
        Side,
        SlotKey,
        TimeFrame,
        Trendline,
        TrendlineError,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, TrendlineError>;

/// Errors surfaced by the engine and its collaborators
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrendlineError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Data source failed for token {token} ({timeframe}): {reason}")]
    Source {
        token: u32,
        timeframe: TimeFrame,
        reason: String,
    },

    #[error("Trendline sink failed: {0}")]
    Sink(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with the body/wick extremes the line geometry works on
pub trait OHLCVExt: OHLCV {
    /// `max(open, close)`
    #[inline]
    fn body_top(&self) -> f64 {
        self.open().max(self.close())
    }

    /// `min(open, close)`
    #[inline]
    fn body_bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    /// Body edge facing the line: top for highs, bottom for lows
    #[inline]
    fn body_extreme(&self, side: Side) -> f64 {
        match side {
            Side::High => self.body_top(),
            Side::Low => self.body_bottom(),
        }
    }

    /// Wick tip beyond the line: high for highs, low for lows
    #[inline]
    fn wick_extreme(&self, side: Side) -> f64 {
        match side {
            Side::High => self.high(),
            Side::Low => self.low(),
        }
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        if self.open().is_nan()
            || self.high().is_nan()
            || self.low().is_nan()
            || self.close().is_nan()
        {
            return Err(TrendlineError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if self.open().is_infinite()
            || self.high().is_infinite()
            || self.low().is_infinite()
            || self.close().is_infinite()
        {
            return Err(TrendlineError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(TrendlineError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if self.body_top() > self.high() || self.body_bottom() < self.low() {
            return Err(TrendlineError::InvalidOHLCV {
                index: 0,
                reason: "body outside wick",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Validate a whole series, reporting the offending bar index
pub fn validate_series<T: OHLCV>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            TrendlineError::InvalidOHLCV { reason, .. } => {
                TrendlineError::InvalidOHLCV { index: i, reason }
            }
            other => other,
        })?;
    }
    Ok(())
}

// ============================================================
// CANDLE
// ============================================================

/// One OHLCV bar of an instrument. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub token: u32,
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(token: u32, time: DateTime<Utc>, ohlcv: [f64; 5]) -> Self {
        let [open, high, low, close, volume] = ohlcv;
        Self {
            token,
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Build from an epoch-seconds timestamp
    pub fn from_ohlcv(token: u32, epoch_secs: i64, ohlcv: [f64; 5]) -> Result<Self> {
        let time = Utc
            .timestamp_opt(epoch_secs, 0)
            .single()
            .ok_or(TrendlineError::InvalidValue("timestamp out of range"))?;
        Ok(Self::new(token, time, ohlcv))
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.time.timestamp_millis())
    }
}

// ============================================================
// SIDE
// ============================================================

/// Which extreme a line is drawn against
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Resistance line along the highs
    #[serde(rename = "h", alias = "high")]
    High,
    /// Support line along the lows
    #[serde(rename = "l", alias = "low")]
    Low,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::High, Side::Low];

    pub fn code(self) -> &'static str {
        match self {
            Side::High => "h",
            Side::Low => "l",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Side {
    type Err = TrendlineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "h" | "H" | "high" | "High" => Ok(Side::High),
            "l" | "L" | "low" | "Low" => Ok(Side::Low),
            _ => Err(TrendlineError::InvalidValue("side must be \"h\" or \"l\"")),
        }
    }
}

// ============================================================
// TRENDLINE
// ============================================================

/// Persistence slot of a trendline: one per `(token, timeframe, side)`
pub type SlotKey = (u32, TimeFrame, Side);

/// A fitted and validated line, `price = slope * index + intercept`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trendline {
    pub token: u32,
    pub timeframe: TimeFrame,
    pub side: Side,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub slope: f64,
    pub intercept: f64,
    /// Candle index of the first touch
    pub index1: usize,
    /// Candle index of the last touch
    pub index2: usize,
    pub connects: usize,
    pub total_connects: usize,
}

impl Trendline {
    #[inline]
    pub fn slot(&self) -> SlotKey {
        (self.token, self.timeframe, self.side)
    }

    #[inline]
    pub fn value_at(&self, index: usize) -> f64 {
        self.slope * index as f64 + self.intercept
    }
}

// ============================================================
// TESTS
// ============================================================
