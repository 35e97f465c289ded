//! Run orchestration: symbols → timeframes → sides → first fitting maximal set
//!
//! Per symbol the loop resolves the token, then for every configured timeframe
//! loads candles and extrema, builds the trend touch list, expands it and tries
//! the maximal sets in order until one fits. Accepted lines are committed to the
//! sink in one batch when the run ends, cancelled or not.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::candidates::generate_triplets;
use crate::config::{AnalysisConfig, ConfigValidation};
use crate::fit::fit_trendline;
use crate::solver::{LinearSolver, MinilpSolver};
use crate::sources::{
    CancelFlag, CandleSource, ExtremumSource, SymbolResolver, TrendlineSink, WindowExtremumSource,
};
use crate::touch::{touch_indices, trend_touches};
use crate::{validate_series, Candle, Result, Side, TimeFrame, Trendline, TrendlineError};

// ============================================================
// REPORT
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No token for the symbol
    UnknownSymbol,
    /// Trend touch list longer than the configured guard
    CostGuard { touches: usize },
    /// Candle or extremum read failed
    SourceFailed(String),
    /// Candles failed OHLC consistency checks
    InvalidCandles(String),
}

/// Something the run passed over without failing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipEvent {
    pub symbol: String,
    pub timeframe: Option<TimeFrame>,
    pub side: Option<Side>,
    pub reason: SkipReason,
}

/// Outcome of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Lines handed to the sink, in discovery order
    pub trendlines: Vec<Trendline>,
    pub skips: Vec<SkipEvent>,
    /// Number of maximal sets sent to the solver
    pub fit_attempts: usize,
    pub cancelled: bool,
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`AnalysisService`]
pub struct AnalysisBuilder {
    config: AnalysisConfig,
    candles: Option<Arc<dyn CandleSource>>,
    extrema: Option<Arc<dyn ExtremumSource>>,
    sink: Option<Arc<dyn TrendlineSink>>,
    resolver: Option<Arc<dyn SymbolResolver>>,
    solver: Arc<dyn LinearSolver>,
}

impl Default for AnalysisBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisBuilder {
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig::default(),
            candles: None,
            extrema: None,
            sink: None,
            resolver: None,
            solver: Arc::new(MinilpSolver),
        }
    }

    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn candle_source<S: CandleSource + 'static>(mut self, source: S) -> Self {
        self.candles = Some(Arc::new(source));
        self
    }

    /// Defaults to the sliding-window detector over the candle source
    pub fn extremum_source<S: ExtremumSource + 'static>(mut self, source: S) -> Self {
        self.extrema = Some(Arc::new(source));
        self
    }

    pub fn sink<S: TrendlineSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Defaults to the config's token table
    pub fn resolver<R: SymbolResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn solver<S: LinearSolver + 'static>(mut self, solver: S) -> Self {
        self.solver = Arc::new(solver);
        self
    }

    pub fn build(self) -> Result<AnalysisService> {
        self.config.validate()?;
        let candles = self
            .candles
            .ok_or(TrendlineError::InvalidConfig("a candle source is required".into()))?;
        let sink = self
            .sink
            .ok_or(TrendlineError::InvalidConfig("a trendline sink is required".into()))?;
        let extrema: Arc<dyn ExtremumSource> = match self.extrema {
            Some(e) => e,
            None => Arc::new(
                WindowExtremumSource::new(candles.clone())
                    .with_half_window(self.config.extremum_window),
            ),
        };
        let resolver: Arc<dyn SymbolResolver> = match self.resolver {
            Some(r) => r,
            None => Arc::new(self.config.clone()),
        };

        Ok(AnalysisService {
            config: self.config,
            candles,
            extrema,
            sink,
            resolver,
            solver: self.solver,
        })
    }
}

// ============================================================
// SERVICE
// ============================================================

/// Trendline discovery over the configured symbols and timeframes
pub struct AnalysisService {
    config: AnalysisConfig,
    candles: Arc<dyn CandleSource>,
    extrema: Arc<dyn ExtremumSource>,
    sink: Arc<dyn TrendlineSink>,
    resolver: Arc<dyn SymbolResolver>,
    solver: Arc<dyn LinearSolver>,
}

impl AnalysisService {
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub async fn run(&self, cancel: &CancelFlag) -> Result<RunReport> {
        self.run_at(Utc::now(), cancel).await
    }

    /// Run with look-back windows measured from `now`.
    ///
    /// Failures inside one symbol or timeframe are logged and recorded as skips;
    /// only a failed final commit is returned as an error.
    pub async fn run_at(&self, now: DateTime<Utc>, cancel: &CancelFlag) -> Result<RunReport> {
        info!(
            "analysis started: {} symbols, {} timeframes, strategy {}",
            self.config.symbols.len(),
            self.config.timeframes.len(),
            self.config.strategy.name()
        );
        let mut report = RunReport::default();

        for symbol in &self.config.symbols {
            if cancel.is_cancelled() {
                info!("analysis cancelled before {}", symbol);
                report.cancelled = true;
                break;
            }
            let Some(token) = self.resolver.resolve(symbol) else {
                warn!("no token for symbol {}, skipping", symbol);
                report.skips.push(SkipEvent {
                    symbol: symbol.clone(),
                    timeframe: None,
                    side: None,
                    reason: SkipReason::UnknownSymbol,
                });
                continue;
            };

            info!("analysing {} ({})", symbol, token);
            for &timeframe in &self.config.timeframes {
                self.analyse_timeframe(symbol, token, timeframe, now, &mut report).await;
            }
            info!("finished {}", symbol);
        }

        if !report.trendlines.is_empty() {
            self.sink.upsert(report.trendlines.clone()).await?;
            info!("committed {} trendlines", report.trendlines.len());
        }
        Ok(report)
    }

    async fn analyse_timeframe(
        &self,
        symbol: &str,
        token: u32,
        timeframe: TimeFrame,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) {
        let skip = |side: Option<Side>, reason: SkipReason| SkipEvent {
            symbol: symbol.to_string(),
            timeframe: Some(timeframe),
            side,
            reason,
        };

        let from = Some(timeframe.analysis_start(now));
        let candles = match self.candles.candles(token, timeframe, from).await {
            Ok(c) => c,
            Err(e) => {
                warn!("{} {}: candle read failed: {}", symbol, timeframe, e);
                report.skips.push(skip(None, SkipReason::SourceFailed(e.to_string())));
                return;
            },
        };
        if let Err(e) = validate_series(&candles) {
            warn!("{} {}: {}", symbol, timeframe, e);
            report.skips.push(skip(None, SkipReason::InvalidCandles(e.to_string())));
            return;
        }
        debug!("{} {}: {} candles", symbol, timeframe, candles.len());

        for &side in &self.config.sides {
            let times = match self.extrema.local_extrema(token, timeframe, side, from).await {
                Ok(t) => t,
                Err(e) => {
                    warn!("{} {} {}: extremum read failed: {}", symbol, timeframe, side, e);
                    report.skips.push(skip(Some(side), SkipReason::SourceFailed(e.to_string())));
                    continue;
                },
            };

            let touches = trend_touches(&candles, &touch_indices(&candles, &times), side);
            if touches.len() > self.config.max_touch_points {
                info!(
                    "{} {} {}: {} touches exceed limit {}, skipping",
                    symbol,
                    timeframe,
                    side,
                    touches.len(),
                    self.config.max_touch_points
                );
                let reason = SkipReason::CostGuard { touches: touches.len() };
                report.skips.push(skip(Some(side), reason));
                continue;
            }

            let attempts = &mut report.fit_attempts;
            if let Some(line) = self.fit_first(&candles, &touches, token, timeframe, side, attempts) {
                debug!(
                    "{} {} {}: slope {:.6} through {} touches",
                    symbol, timeframe, side, line.slope, line.connects
                );
                report.trendlines.push(line);
            }
        }
    }

    /// First maximal set that fits, in enumeration order
    fn fit_first(
        &self,
        candles: &[Candle],
        touches: &[usize],
        token: u32,
        timeframe: TimeFrame,
        side: Side,
        attempts: &mut usize,
    ) -> Option<Trendline> {
        let triplets = generate_triplets(candles, touches, side);
        if triplets.is_empty() {
            return None;
        }
        let levels = self.config.strategy.expand(&triplets);

        for set in levels.maximal() {
            *attempts += 1;
            match fit_trendline(candles, set, side, &*self.solver) {
                Ok(fit) => {
                    let (start, end) = (candles[fit.index1].time, candles[fit.index2].time);
                    return Some(fit.into_trendline(token, timeframe, start, end));
                },
                Err(rejection) => debug!("set {} rejected: {}", set, rejection),
            }
        }
        None
    }
}
