//! Collaborators around the engine: candle and extremum sources, the trendline
//! sink, symbol resolution and cooperative cancellation.
//!
//! The traits are what the analysis loop talks to. The in-memory types and the
//! two adapters are complete implementations, usable in tests and for offline
//! runs over candles loaded by the caller.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;

use crate::timeframe::{resample_in, Session};
use crate::touch::{local_extrema, DEFAULT_HALF_WINDOW};
use crate::{Candle, Result, Side, SlotKey, TimeFrame, Trendline};

// ============================================================
// TRAITS
// ============================================================

/// Time-ordered candles for one instrument and frame
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Candles with `time >= from` (all when `from` is `None`), ascending, no
    /// duplicate timestamps.
    async fn candles(
        &self,
        token: u32,
        timeframe: TimeFrame,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>>;
}

/// Open times of the candles flagged as local highs or lows
#[async_trait]
pub trait ExtremumSource: Send + Sync {
    async fn local_extrema(
        &self,
        token: u32,
        timeframe: TimeFrame,
        side: Side,
        from: Option<DateTime<Utc>>,
    ) -> Result<BTreeSet<DateTime<Utc>>>;
}

/// Persists trendlines, one per `(token, timeframe, side)` slot.
///
/// `upsert` overwrites existing slots and never stores two lines for one slot.
#[async_trait]
pub trait TrendlineSink: Send + Sync {
    async fn upsert(&self, lines: Vec<Trendline>) -> Result<()>;
}

/// Maps a trading symbol to its instrument token
pub trait SymbolResolver: Send + Sync {
    fn resolve(&self, symbol: &str) -> Option<u32>;
}

impl SymbolResolver for HashMap<String, u32> {
    fn resolve(&self, symbol: &str) -> Option<u32> {
        self.get(symbol).copied()
    }
}

#[async_trait]
impl<S: CandleSource + ?Sized> CandleSource for Arc<S> {
    async fn candles(
        &self,
        token: u32,
        timeframe: TimeFrame,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>> {
        (**self).candles(token, timeframe, from).await
    }
}

#[async_trait]
impl<S: ExtremumSource + ?Sized> ExtremumSource for Arc<S> {
    async fn local_extrema(
        &self,
        token: u32,
        timeframe: TimeFrame,
        side: Side,
        from: Option<DateTime<Utc>>,
    ) -> Result<BTreeSet<DateTime<Utc>>> {
        (**self).local_extrema(token, timeframe, side, from).await
    }
}

#[async_trait]
impl<S: TrendlineSink + ?Sized> TrendlineSink for Arc<S> {
    async fn upsert(&self, lines: Vec<Trendline>) -> Result<()> {
        (**self).upsert(lines).await
    }
}

impl<S: SymbolResolver + ?Sized> SymbolResolver for Arc<S> {
    fn resolve(&self, symbol: &str) -> Option<u32> {
        (**self).resolve(symbol)
    }
}

// ============================================================
// CANCELLATION
// ============================================================

/// Shared stop request, checked by the analysis loop between symbols
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================
// IN-MEMORY MARKET DATA
// ============================================================

type SeriesKey = (u32, TimeFrame);

/// Candle series and precomputed extrema held in memory
#[derive(Debug, Default)]
pub struct MemoryMarketData {
    candles: RwLock<HashMap<SeriesKey, Vec<Candle>>>,
    extrema: RwLock<HashMap<(u32, TimeFrame, Side), BTreeSet<DateTime<Utc>>>>,
}

impl MemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the series for `(token, timeframe)`; input is sorted and
    /// deduplicated by time, keeping the last bar seen for each timestamp.
    pub fn insert_candles(&self, token: u32, timeframe: TimeFrame, mut candles: Vec<Candle>) {
        candles.reverse();
        candles.sort_by_key(|c| c.time);
        candles.dedup_by_key(|c| c.time);
        self.candles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((token, timeframe), candles);
    }

    pub fn insert_extrema(
        &self,
        token: u32,
        timeframe: TimeFrame,
        side: Side,
        times: BTreeSet<DateTime<Utc>>,
    ) {
        self
            .extrema
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((token, timeframe, side), times);
    }

    pub fn series_len(&self, token: u32, timeframe: TimeFrame) -> usize {
        self
            .candles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(token, timeframe))
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl CandleSource for MemoryMarketData {
    async fn candles(
        &self,
        token: u32,
        timeframe: TimeFrame,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>> {
        let series = self.candles.read().unwrap_or_else(PoisonError::into_inner);
        let Some(all) = series.get(&(token, timeframe)) else {
            return Ok(Vec::new());
        };
        let start = from.map_or(0, |f| all.partition_point(|c| c.time < f));
        Ok(all[start..].to_vec())
    }
}

#[async_trait]
impl ExtremumSource for MemoryMarketData {
    async fn local_extrema(
        &self,
        token: u32,
        timeframe: TimeFrame,
        side: Side,
        from: Option<DateTime<Utc>>,
    ) -> Result<BTreeSet<DateTime<Utc>>> {
        let extrema = self.extrema.read().unwrap_or_else(PoisonError::into_inner);
        let Some(times) = extrema.get(&(token, timeframe, side)) else {
            return Ok(BTreeSet::new());
        };
        Ok(match from {
            Some(f) => times.range(f..).copied().collect(),
            None => times.clone(),
        })
    }
}

// ============================================================
// IN-MEMORY TRENDLINE STORE
// ============================================================

/// Slot-keyed trendline store
#[derive(Debug, Default)]
pub struct MemoryTrendlineStore {
    slots: Mutex<BTreeMap<SlotKey, Trendline>>,
    batches: AtomicUsize,
}

impl MemoryTrendlineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: SlotKey) -> Option<Trendline> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).get(&slot).cloned()
    }

    /// Every stored line, ordered by slot
    pub fn all(&self) -> Vec<Trendline> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `upsert` calls received
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrendlineSink for MemoryTrendlineStore {
    async fn upsert(&self, lines: Vec<Trendline>) -> Result<()> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for line in lines {
            slots.insert(line.slot(), line);
        }
        Ok(())
    }
}

// ============================================================
// ADAPTERS
// ============================================================

/// Serves derived frames by resampling the base frame of the wrapped source.
///
/// Base frames (15m, 1D) pass straight through; 30m..4H are built from 15m and
/// 1W/1M from 1D. Buckets follow the default [`Session`] unless one is set.
#[derive(Debug, Clone)]
pub struct ResamplingCandleSource<S> {
    inner: S,
    session: Session,
}

impl<S: CandleSource> ResamplingCandleSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, session: Session::default() }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: CandleSource> CandleSource for ResamplingCandleSource<S> {
    async fn candles(
        &self,
        token: u32,
        timeframe: TimeFrame,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>> {
        if timeframe.is_base() {
            return self.inner.candles(token, timeframe, from).await;
        }
        // Widen to the bucket boundary so the first bucket is complete
        let base_from = from.map(|f| timeframe.bucket_start_in(f, &self.session));
        let base = self.inner.candles(token, timeframe.base(), base_from).await?;
        let out = resample_in(&base, timeframe, &self.session);
        debug!(
            "resampled {} {} bars into {} {} bars",
            base.len(),
            timeframe.base(),
            out.len(),
            timeframe
        );
        Ok(out)
    }
}

/// Computes extrema on the fly with the sliding-window detector
#[derive(Debug, Clone)]
pub struct WindowExtremumSource<S> {
    candles: S,
    half_window: usize,
}

impl<S: CandleSource> WindowExtremumSource<S> {
    pub fn new(candles: S) -> Self {
        Self { candles, half_window: DEFAULT_HALF_WINDOW }
    }

    pub fn with_half_window(mut self, half_window: usize) -> Self {
        self.half_window = half_window;
        self
    }
}

#[async_trait]
impl<S: CandleSource> ExtremumSource for WindowExtremumSource<S> {
    async fn local_extrema(
        &self,
        token: u32,
        timeframe: TimeFrame,
        side: Side,
        from: Option<DateTime<Utc>>,
    ) -> Result<BTreeSet<DateTime<Utc>>> {
        let candles = self.candles.candles(token, timeframe, from).await?;
        Ok(
            local_extrema(&candles, side, self.half_window)
                .into_iter()
                .map(|i| candles[i].time)
                .collect(),
        )
    }
}

// ============================================================
// TESTS
// ============================================================
