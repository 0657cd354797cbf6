//! Counters confined to one time range

use chrono::{DateTime, Utc};

use crate::classifier::{Classifier, Diagnostic};
use crate::counter::{CounterRecord, Participants};
use crate::error::{Result, StatsError};
use crate::message::ChatMessage;

const RANGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Half-open interval `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(StatsError::InvalidRange {
                start: start.format(RANGE_FORMAT).to_string(),
                end: end.format(RANGE_FORMAT).to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format(RANGE_FORMAT),
            self.end.format(RANGE_FORMAT)
        )
    }
}

/// The "everyone" record plus one record per participant, optionally limited
/// to a time range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeRangeCount {
    range: Option<TimeRange>,
    pub everyone: CounterRecord,
    pub participants: Participants,
}

impl TimeRangeCount {
    /// Unconstrained: accepts every message.
    pub fn all_time() -> Self {
        Self::default()
    }

    pub fn bounded(range: TimeRange) -> Self {
        Self {
            range: Some(range),
            ..Self::default()
        }
    }

    pub(crate) fn from_parts(
        range: Option<TimeRange>,
        everyone: CounterRecord,
        participants: Participants,
    ) -> Self {
        Self {
            range,
            everyone,
            participants,
        }
    }

    pub fn range(&self) -> Option<&TimeRange> {
        self.range.as_ref()
    }

    /// Count `msg` unless it carries a timestamp outside the range.
    ///
    /// Messages without a timestamp are always counted.
    pub fn apply(&mut self, msg: &ChatMessage, classifier: &Classifier) -> Vec<Diagnostic> {
        if let (Some(range), Some(timestamp_ms)) = (&self.range, msg.timestamp_ms) {
            let inside = msg.datetime().is_some_and(|t| range.contains(t));
            if !inside {
                tracing::warn!(timestamp_ms, range = %range, "message not in time range");
                return vec![Diagnostic::OutOfRange {
                    timestamp_ms,
                    range: range.to_string(),
                }];
            }
        }

        classifier.classify(msg, &mut self.everyone, &mut self.participants)
    }

    /// Human-readable interval label.
    pub fn describe(&self) -> String {
        match &self.range {
            None => "all time".to_string(),
            Some(range) => range.to_string(),
        }
    }
}
