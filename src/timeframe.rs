//! Sampling granularities and candle resampling
//!
//! Intraday frames (30m..4H) are built from 15-minute candles and bucketed from the
//! session open; weekly and monthly frames are built from daily candles.
//!
//! Buckets are computed on the exchange's wall clock described by [`Session`].
//! The default session treats candle times as exchange-local time stored in
//! UTC fields with a 09:15 open. Feeds that carry true UTC instants pass a
//! session with the exchange offset instead (`+05:30` puts the open at 03:45 UTC).

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDateTime, NaiveTime, Offset, Utc,
};
use serde::{Deserialize, Serialize};

use crate::{Candle, Result, TrendlineError};

// ============================================================
// SESSION
// ============================================================

/// Exchange wall clock used to align buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    offset: FixedOffset,
    open: NaiveTime,
}

impl Session {
    pub fn new(offset: FixedOffset, open: NaiveTime) -> Self {
        Self { offset, open }
    }

    /// Same 09:15 open, candle times read as UTC instants shifted by `offset`
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self { offset, ..Self::default() }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn open(&self) -> NaiveTime {
        self.open
    }

    fn to_local(self, time: DateTime<Utc>) -> NaiveDateTime {
        time.with_timezone(&self.offset).naive_local()
    }

    fn to_utc(self, local: NaiveDateTime) -> DateTime<Utc> {
        local.and_utc() - Duration::seconds(self.offset.local_minus_utc() as i64)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            offset: Utc.fix(),
            open: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

/// Candle sampling granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    #[serde(rename = "15m", alias = "15M")]
    FifteenMinute,
    #[serde(rename = "30m", alias = "30M")]
    ThirtyMinute,
    #[serde(rename = "1H", alias = "1h")]
    OneHour,
    #[serde(rename = "2H", alias = "2h")]
    TwoHour,
    #[serde(rename = "4H", alias = "4h")]
    FourHour,
    #[serde(rename = "1D", alias = "1d")]
    Day,
    #[serde(rename = "1W", alias = "1w")]
    Week,
    #[serde(rename = "1M")]
    Month,
}

impl TimeFrame {
    pub const ALL: [TimeFrame; 8] = [
        TimeFrame::FifteenMinute,
        TimeFrame::ThirtyMinute,
        TimeFrame::OneHour,
        TimeFrame::TwoHour,
        TimeFrame::FourHour,
        TimeFrame::Day,
        TimeFrame::Week,
        TimeFrame::Month,
    ];

    pub fn code(self) -> &'static str {
        match self {
            TimeFrame::FifteenMinute => "15m",
            TimeFrame::ThirtyMinute => "30m",
            TimeFrame::OneHour => "1H",
            TimeFrame::TwoHour => "2H",
            TimeFrame::FourHour => "4H",
            TimeFrame::Day => "1D",
            TimeFrame::Week => "1W",
            TimeFrame::Month => "1M",
        }
    }

    /// Nominal bar length in minutes (a month counts as 30 days)
    pub fn minutes(self) -> i64 {
        match self {
            TimeFrame::FifteenMinute => 15,
            TimeFrame::ThirtyMinute => 30,
            TimeFrame::OneHour => 60,
            TimeFrame::TwoHour => 120,
            TimeFrame::FourHour => 240,
            TimeFrame::Day => 1_440,
            TimeFrame::Week => 10_080,
            TimeFrame::Month => 43_200,
        }
    }

    /// Frame the candles of `self` are resampled from
    pub fn base(self) -> TimeFrame {
        if self <= TimeFrame::FourHour {
            TimeFrame::FifteenMinute
        } else {
            TimeFrame::Day
        }
    }

    #[inline]
    pub fn is_base(self) -> bool {
        self.base() == self
    }

    /// Earliest candle time considered when analysing this frame at `now`
    pub fn analysis_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = start_of_day(now);
        match self {
            TimeFrame::FifteenMinute => now - Duration::days(31),
            TimeFrame::ThirtyMinute => now - Duration::days(61),
            TimeFrame::OneHour => now - Duration::weeks(14),
            TimeFrame::TwoHour => now - Duration::weeks(28),
            TimeFrame::FourHour => sub_years(midnight, 1),
            TimeFrame::Day => sub_years(midnight, 2),
            TimeFrame::Week | TimeFrame::Month => sub_years(midnight, 20),
        }
    }

    /// Start of the bucket `time` falls into, on the default session
    pub fn bucket_start(self, time: DateTime<Utc>) -> DateTime<Utc> {
        self.bucket_start_in(time, &Session::default())
    }

    /// Start of the bucket `time` falls into, on the wall clock of `session`
    pub fn bucket_start_in(self, time: DateTime<Utc>, session: &Session) -> DateTime<Utc> {
        if self == TimeFrame::FifteenMinute {
            return time;
        }
        let local = session.to_local(time);
        let midnight = local.date().and_time(NaiveTime::MIN);
        let start = match self {
            TimeFrame::Day => midnight,
            TimeFrame::Week => {
                let back = local.weekday().num_days_from_monday() as i64;
                midnight - Duration::days(back)
            },
            TimeFrame::Month => {
                let first = local.date().with_day(1).unwrap_or(local.date());
                first.and_time(NaiveTime::MIN)
            },
            _ => {
                let open = local.date().and_time(session.open);
                let len = self.minutes();
                let offset = (local - open).num_minutes().div_euclid(len) * len;
                open + Duration::minutes(offset)
            },
        };
        session.to_utc(start)
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for TimeFrame {
    type Err = TrendlineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "15m" | "15M" => Ok(TimeFrame::FifteenMinute),
            "30m" | "30M" => Ok(TimeFrame::ThirtyMinute),
            "1h" | "1H" | "h" | "H" => Ok(TimeFrame::OneHour),
            "2h" | "2H" => Ok(TimeFrame::TwoHour),
            "4h" | "4H" => Ok(TimeFrame::FourHour),
            "1d" | "1D" | "d" | "D" => Ok(TimeFrame::Day),
            "1w" | "1W" | "w" | "W" => Ok(TimeFrame::Week),
            "1M" | "M" => Ok(TimeFrame::Month),
            _ => Err(TrendlineError::InvalidValue("unknown timeframe code")),
        }
    }
}

fn start_of_day(time: DateTime<Utc>) -> DateTime<Utc> {
    time.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn sub_years(time: DateTime<Utc>, years: u32) -> DateTime<Utc> {
    time
        .checked_sub_months(Months::new(12 * years))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ============================================================
// RESAMPLING
// ============================================================

/// Aggregate time-ordered candles of `timeframe.base()` into `timeframe` buckets
/// on the default session.
pub fn resample(candles: &[Candle], timeframe: TimeFrame) -> Vec<Candle> {
    resample_in(candles, timeframe, &Session::default())
}

/// Aggregate time-ordered candles of `timeframe.base()` into `timeframe` buckets.
///
/// Base frames are returned unchanged. Each bucket takes the first open, the
/// highest high, the lowest low, the last close and the summed volume.
pub fn resample_in(candles: &[Candle], timeframe: TimeFrame, session: &Session) -> Vec<Candle> {
    if timeframe.is_base() {
        return candles.to_vec();
    }

    let mut out: Vec<Candle> = Vec::new();
    let mut current: Option<Candle> = None;

    for candle in candles {
        let bucket = timeframe.bucket_start_in(candle.time, session);
        match current.as_mut() {
            Some(acc) if acc.time == bucket => {
                acc.high = acc.high.max(candle.high);
                acc.low = acc.low.min(candle.low);
                acc.close = candle.close;
                acc.volume += candle.volume;
            },
            _ => {
                if let Some(done) = current.take() {
                    out.push(done);
                }
                current = Some(Candle { time: bucket, ..*candle });
            },
        }
    }

    if let Some(done) = current {
        out.push(done);
    }
    out
}

// ============================================================
// TESTS
// ============================================================
