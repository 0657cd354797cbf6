//! Time-bucketed aggregation
//!
//! A `TimeDivider` feeds every message into an all-time bucket and, for a
//! granular period, into the bucket for the period containing the message.
//! Buckets are created on demand and never merged or removed.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::classifier::{Classifier, Diagnostic};
use crate::error::{Result, StatsError};
use crate::message::ChatMessage;
use crate::timerange::{TimeRange, TimeRangeCount};

/// Bucketing resolution. Discriminants are the persisted period codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimePeriod {
    All = 0,
    Year = 1,
    Month = 2,
    Week = 3,
    Day = 4,
}

impl TimePeriod {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(TimePeriod::All),
            1 => Ok(TimePeriod::Year),
            2 => Ok(TimePeriod::Month),
            3 => Ok(TimePeriod::Week),
            4 => Ok(TimePeriod::Day),
            other => Err(StatsError::InvalidPeriod(other.to_string())),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            TimePeriod::All => "all-time",
            TimePeriod::Year => "yearly",
            TimePeriod::Month => "monthly",
            TimePeriod::Week => "weekly",
            TimePeriod::Day => "daily",
        }
    }

    /// Short label for the period starting at `start` ("2024", "Jan24", ...).
    pub fn label(self, start: DateTime<Utc>) -> String {
        let format = match self {
            TimePeriod::All => return "all-time".to_string(),
            TimePeriod::Year => "%Y",
            TimePeriod::Month => "%b%y",
            TimePeriod::Week => "w%Wy%y",
            TimePeriod::Day => "%d%b%y",
        };
        start.format(format).to_string()
    }

    /// Start of the period containing `t`; `None` for `All` or when the
    /// start is not representable.
    pub fn period_start(self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let date = t.date_naive();
        let start = match self {
            TimePeriod::All => return None,
            TimePeriod::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)?,
            TimePeriod::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?,
            TimePeriod::Week => {
                let back = u64::from(date.weekday().num_days_from_monday());
                date.checked_sub_days(Days::new(back))?
            }
            TimePeriod::Day => date,
        };
        Some(start.and_time(NaiveTime::MIN).and_utc())
    }

    /// Canonical `[start, start + period)` for a period start.
    pub fn period_range(self, start: DateTime<Utc>) -> Option<TimeRange> {
        let date = start.date_naive();
        let end = match self {
            TimePeriod::All => return None,
            TimePeriod::Year => NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?,
            TimePeriod::Month => {
                if date.month() == 12 {
                    NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)?
                }
            }
            TimePeriod::Week => date.checked_add_days(Days::new(7))?,
            TimePeriod::Day => date.checked_add_days(Days::new(1))?,
        };
        TimeRange::new(start, end.and_time(NaiveTime::MIN).and_utc()).ok()
    }
}

impl FromStr for TimePeriod {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "a" | "all" => Ok(TimePeriod::All),
            "y" | "year" => Ok(TimePeriod::Year),
            "m" | "month" => Ok(TimePeriod::Month),
            "w" | "week" => Ok(TimePeriod::Week),
            "d" | "day" => Ok(TimePeriod::Day),
            _ => Err(StatsError::InvalidPeriod(s.to_string())),
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Bucket key inside a `TimeDivider`.
///
/// Ordering puts the two sentinels first, then period starts chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeriodKey {
    /// The unconstrained all-time bucket.
    All,
    /// Messages without a usable timestamp under a granular period.
    Undated,
    /// A bucket covering the period that begins at this instant.
    Start(DateTime<Utc>),
}

impl PeriodKey {
    pub const ALL_KEY: &'static str = "TimeDivider_ALLKEY";
    pub const UNDATED_KEY: &'static str = "TimeDivider_UNDATEDKEY";

    /// Persisted form: a sentinel literal or whole epoch seconds.
    pub fn encode(&self) -> String {
        match self {
            PeriodKey::All => Self::ALL_KEY.to_string(),
            PeriodKey::Undated => Self::UNDATED_KEY.to_string(),
            PeriodKey::Start(t) => t.timestamp().to_string(),
        }
    }

    /// Accepts the sentinels, integer seconds and float seconds ("1546300800.0").
    pub fn decode(s: &str) -> Result<Self> {
        match s {
            Self::ALL_KEY => return Ok(PeriodKey::All),
            Self::UNDATED_KEY => return Ok(PeriodKey::Undated),
            _ => {}
        }
        let secs = match s.parse::<i64>() {
            Ok(secs) => secs,
            Err(_) => {
                let f: f64 = s
                    .parse()
                    .map_err(|_| StatsError::Shape(format!("invalid bucket key {s:?}")))?;
                if !f.is_finite() {
                    return Err(StatsError::Shape(format!("invalid bucket key {s:?}")));
                }
                f.round() as i64
            }
        };
        DateTime::from_timestamp(secs, 0)
            .map(PeriodKey::Start)
            .ok_or_else(|| StatsError::Shape(format!("bucket key {s:?} is out of range")))
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        match self {
            PeriodKey::Start(t) => Some(*t),
            _ => None,
        }
    }
}

/// Partitions a message stream into per-period `TimeRangeCount`s.
#[derive(Debug, Clone)]
pub struct TimeDivider {
    period: TimePeriod,
    all_time: TimeRangeCount,
    /// Undated and period buckets; the all-time bucket lives in `all_time`.
    buckets: BTreeMap<PeriodKey, TimeRangeCount>,
    classifier: Classifier,
}

impl PartialEq for TimeDivider {
    fn eq(&self, other: &Self) -> bool {
        self.period == other.period
            && self.all_time == other.all_time
            && self.buckets == other.buckets
    }
}

impl TimeDivider {
    pub fn new(period: TimePeriod) -> Self {
        Self::with_classifier(period, Classifier::default())
    }

    pub fn with_classifier(period: TimePeriod, classifier: Classifier) -> Self {
        Self {
            period,
            all_time: TimeRangeCount::all_time(),
            buckets: BTreeMap::new(),
            classifier,
        }
    }

    /// Build from a persisted period code; unknown codes are rejected here
    /// rather than on first ingest.
    pub fn from_code(code: u64) -> Result<Self> {
        Ok(Self::new(TimePeriod::from_code(code)?))
    }

    /// Rebuild a loaded tree; `buckets` must not contain `PeriodKey::All`.
    pub(crate) fn from_parts(
        period: TimePeriod,
        all_time: TimeRangeCount,
        buckets: BTreeMap<PeriodKey, TimeRangeCount>,
    ) -> Self {
        Self {
            period,
            all_time,
            buckets,
            classifier: Classifier::default(),
        }
    }

    pub fn period(&self) -> TimePeriod {
        self.period
    }

    /// Start and canonical interval of the period containing `t`; `None`
    /// when either end of that period is not representable.
    fn slot_for(&self, t: DateTime<Utc>) -> Option<(DateTime<Utc>, TimeRange)> {
        let start = self.period.period_start(t)?;
        let range = self.period.period_range(start)?;
        Some((start, range))
    }

    /// Key of the bucket a message at `t` belongs to.
    pub fn key_for(&self, t: Option<DateTime<Utc>>) -> PeriodKey {
        if self.period == TimePeriod::All {
            return PeriodKey::All;
        }
        t.and_then(|t| self.slot_for(t))
            .map_or(PeriodKey::Undated, |(start, _)| PeriodKey::Start(start))
    }

    /// Interval covered by `key`; `None` for the sentinel buckets.
    pub fn range_for(&self, key: &PeriodKey) -> Option<TimeRange> {
        key.start().and_then(|start| self.period.period_range(start))
    }

    /// Count one message into the all-time bucket and its period bucket.
    ///
    /// A timestamp whose period cannot be represented is reported and the
    /// message is counted as undated.
    pub fn ingest(&mut self, msg: &ChatMessage) -> Vec<Diagnostic> {
        let mut diagnostics = self.all_time.apply(msg, &self.classifier);

        if self.period == TimePeriod::All {
            return diagnostics;
        }

        let slot = msg.datetime().and_then(|t| self.slot_for(t));
        if let (None, Some(timestamp_ms)) = (&slot, msg.timestamp_ms) {
            tracing::warn!(
                timestamp_ms,
                period = %self.period,
                "timestamp has no representable period"
            );
            diagnostics.push(Diagnostic::UnrepresentableTimestamp { timestamp_ms });
        }

        let (key, range) = match slot {
            Some((start, range)) => (PeriodKey::Start(start), Some(range)),
            None => (PeriodKey::Undated, None),
        };
        let bucket = self.buckets.entry(key).or_insert_with(|| {
            tracing::debug!(key = %key.encode(), "creating bucket");
            range.map_or_else(TimeRangeCount::all_time, TimeRangeCount::bounded)
        });
        diagnostics.extend(bucket.apply(msg, &self.classifier));
        diagnostics
    }

    pub fn all_time(&self) -> &TimeRangeCount {
        &self.all_time
    }

    pub fn undated(&self) -> Option<&TimeRangeCount> {
        self.buckets.get(&PeriodKey::Undated)
    }

    pub fn get_period(&self, start: DateTime<Utc>) -> Option<&TimeRangeCount> {
        self.buckets.get(&PeriodKey::Start(start))
    }

    /// Period starts, oldest first, excluding the sentinel buckets.
    pub fn all_keys(&self) -> Vec<DateTime<Utc>> {
        self.buckets.keys().filter_map(PeriodKey::start).collect()
    }

    /// Period buckets, oldest first, excluding the sentinel buckets.
    pub fn periods(&self) -> impl Iterator<Item = (DateTime<Utc>, &TimeRangeCount)> {
        self.buckets
            .iter()
            .filter_map(|(k, v)| k.start().map(|t| (t, v)))
    }

    /// Every bucket including sentinels, in key order.
    pub fn buckets(&self) -> impl Iterator<Item = (&PeriodKey, &TimeRangeCount)> {
        std::iter::once((&PeriodKey::All, &self.all_time)).chain(self.buckets.iter())
    }

    /// Number of buckets, including the all-time bucket.
    pub fn len(&self) -> usize {
        self.buckets.len() + 1
    }

    /// True until a message has been counted.
    pub fn is_empty(&self) -> bool {
        self.all_time.everyone.messages == 0
    }
}
