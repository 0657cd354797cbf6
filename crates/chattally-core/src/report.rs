//! Tabular summaries derived from a finished divider

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::counter::{CounterRecord, Sentiment, UsageKind};
use crate::divider::{PeriodKey, TimeDivider};
use crate::similarity::EVERYONE_LABEL;
use crate::timerange::TimeRangeCount;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CounterSummary {
    pub messages: u64,
    pub stickers_per_message: f64,
    pub photos_per_message: f64,
    pub links_per_message: f64,
    pub reacts_per_message: f64,
    pub reacts_given: u64,
    pub words: u64,
    pub top_stickers: Vec<(String, u64)>,
    pub top_reacts: Vec<(String, u64)>,
    pub mean_sentiment: Option<Sentiment>,
}

fn ratio(n: u64, d: u64) -> f64 {
    if d == 0 {
        0.0
    } else {
        n as f64 / d as f64
    }
}

fn owned(items: Vec<(&str, u64)>) -> Vec<(String, u64)> {
    items
        .into_iter()
        .map(|(item, count)| (item.to_string(), count))
        .collect()
}

impl CounterSummary {
    pub fn from_record(record: &CounterRecord, top: usize) -> Self {
        Self {
            messages: record.messages,
            stickers_per_message: ratio(record.stickers, record.messages),
            photos_per_message: ratio(record.photos, record.messages),
            links_per_message: ratio(record.shares, record.messages),
            reacts_per_message: ratio(record.reacts_received_total, record.messages),
            reacts_given: record.reacts_given,
            words: record.words,
            top_stickers: owned(record.sticker_use.most_common(top)),
            top_reacts: owned(record.reacts_received_use.most_common(top)),
            mean_sentiment: record.mean_sentiment(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BucketReport {
    pub key: String,
    pub label: String,
    pub range: String,
    pub everyone: CounterSummary,
    pub participants: BTreeMap<String, CounterSummary>,
}

/// Display label for a bucket key.
pub fn bucket_label(divider: &TimeDivider, key: &PeriodKey) -> String {
    match key {
        PeriodKey::All => "all time".to_string(),
        PeriodKey::Undated => "undated".to_string(),
        PeriodKey::Start(start) => divider.period().label(*start),
    }
}

/// One summary per bucket: all time first, then undated, then periods.
pub fn bucket_reports(divider: &TimeDivider, top: usize) -> Vec<BucketReport> {
    divider
        .buckets()
        .map(|(key, trc)| BucketReport {
            key: key.encode(),
            label: bucket_label(divider, key),
            range: trc.describe(),
            everyone: CounterSummary::from_record(&trc.everyone, top),
            participants: trc
                .participants
                .iter()
                .map(|(name, record)| (name.to_string(), CounterSummary::from_record(record, top)))
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PeriodLabel {
    pub start: DateTime<Utc>,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RankedItem {
    pub item: String,
    /// Capped at the outlier limit when one is set.
    pub count: u64,
    pub raw_count: u64,
    pub outlier: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PeriodRanking {
    pub period: PeriodLabel,
    pub items: Vec<RankedItem>,
}

/// The most used items of `kind` in each period that used any.
///
/// Items shorter than `min_length` characters are skipped before taking the
/// top `top`. Counts above `outlier_cap` are clamped to it and flagged.
pub fn period_rankings(
    divider: &TimeDivider,
    kind: UsageKind,
    top: usize,
    min_length: usize,
    outlier_cap: Option<u64>,
) -> Vec<PeriodRanking> {
    divider
        .periods()
        .filter(|(_, trc)| kind.total(&trc.everyone) != 0)
        .map(|(start, trc)| {
            let items = kind
                .table(&trc.everyone)
                .ranked()
                .into_iter()
                .filter(|(item, _)| item.chars().count() >= min_length)
                .take(top)
                .map(|(item, raw_count)| {
                    let outlier = outlier_cap.is_some_and(|cap| raw_count > cap);
                    RankedItem {
                        item: item.to_string(),
                        count: outlier_cap.map_or(raw_count, |cap| raw_count.min(cap)),
                        raw_count,
                        outlier,
                    }
                })
                .collect();
            PeriodRanking {
                period: PeriodLabel {
                    start,
                    label: divider.period().label(start),
                },
                items,
            }
        })
        .collect()
}

/// Values per period, one series per participant (or a single "everyone"
/// series).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PeriodSeries<T> {
    pub periods: Vec<PeriodLabel>,
    pub series: BTreeMap<String, Vec<T>>,
}

impl<T> PeriodSeries<T> {
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

fn labelled<'a>(
    divider: &'a TimeDivider,
    keep: impl Fn(&TimeRangeCount) -> bool + 'a,
) -> Vec<(PeriodLabel, &'a TimeRangeCount)> {
    divider
        .periods()
        .filter(|(_, trc)| keep(trc))
        .map(|(start, trc)| {
            (
                PeriodLabel {
                    start,
                    label: divider.period().label(start),
                },
                trc,
            )
        })
        .collect()
}

/// Series for every all-time participant over `periods`; absent participants
/// read as the default.
fn per_participant<T: Default + Clone>(
    divider: &TimeDivider,
    periods: &[(PeriodLabel, &TimeRangeCount)],
    value: impl Fn(&TimeRangeCount, &CounterRecord) -> T,
) -> BTreeMap<String, Vec<T>> {
    divider
        .all_time()
        .participants
        .names()
        .map(|name| {
            let values = periods
                .iter()
                .map(|(_, trc)| {
                    trc.participants
                        .get(name)
                        .map(|record| value(trc, record))
                        .unwrap_or_default()
                })
                .collect();
            (name.to_string(), values)
        })
        .collect()
}

/// Messages sent per participant per period.
pub fn activity(divider: &TimeDivider) -> PeriodSeries<u64> {
    let periods = labelled(divider, |_| true);
    let series = per_participant(divider, &periods, |_, record| record.messages);
    PeriodSeries {
        periods: periods.into_iter().map(|(label, _)| label).collect(),
        series,
    }
}

fn has_reacts(trc: &TimeRangeCount) -> bool {
    trc.everyone.reacts_received_total != 0
}

/// Reactions received per message, for periods that saw any reaction.
pub fn react_density(divider: &TimeDivider) -> PeriodSeries<f64> {
    let periods = labelled(divider, has_reacts);
    let density = periods
        .iter()
        .map(|(_, trc)| ratio(trc.everyone.reacts_received_total, trc.everyone.messages))
        .collect();
    PeriodSeries {
        periods: periods.into_iter().map(|(label, _)| label).collect(),
        series: BTreeMap::from([(EVERYONE_LABEL.to_string(), density)]),
    }
}

/// Reactions each participant gave divided by all messages in the period.
pub fn reacts_given_density(divider: &TimeDivider) -> PeriodSeries<f64> {
    let periods = labelled(divider, has_reacts);
    let series = per_participant(divider, &periods, |trc, record| {
        ratio(record.reacts_given, trc.everyone.messages)
    });
    PeriodSeries {
        periods: periods.into_iter().map(|(label, _)| label).collect(),
        series,
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ItemBreakdown {
    pub kind: &'static str,
    pub range: String,
    pub items: Vec<(String, u64)>,
    /// Per participant, uses of each entry of `items` in the same order.
    pub participants: BTreeMap<String, Vec<u64>>,
}

/// The top `n` items of the everyone row with each participant's share.
pub fn top_items_by_participant(trc: &TimeRangeCount, kind: UsageKind, n: usize) -> ItemBreakdown {
    let items = owned(kind.table(&trc.everyone).most_common(n));
    let participants = trc
        .participants
        .iter()
        .map(|(name, record)| {
            let table = kind.table(record);
            let uses = items.iter().map(|(item, _)| table.get(item)).collect();
            (name.to_string(), uses)
        })
        .collect();
    ItemBreakdown {
        kind: kind.name(),
        range: trc.describe(),
        items,
        participants,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::divider::TimePeriod;
    use crate::message::{ChatMessage, Reaction, Sticker};
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn msg(t: DateTime<Utc>, sender: &str, content: &str) -> ChatMessage {
        ChatMessage {
            sender_name: Some(sender.to_string()),
            timestamp_ms: Some(t.timestamp_millis()),
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    fn reacted(mut m: ChatMessage, actor: &str) -> ChatMessage {
        m.reactions = Some(vec![Reaction {
            reaction: Some("👍".to_string()),
            actor: Some(actor.to_string()),
        }]);
        m
    }

    fn divider() -> TimeDivider {
        let mut d = TimeDivider::new(TimePeriod::Month);
        d.ingest(&msg(utc(2024, 1, 2), "A", "hello everyone"));
        d.ingest(&msg(utc(2024, 1, 3), "B", "hello"));
        d.ingest(&msg(utc(2024, 2, 3), "A", "hi"));
        d.ingest(&reacted(msg(utc(2024, 3, 1), "A", "hello"), "B"));
        d.ingest(&msg(utc(2024, 3, 2), "C", "hey"));
        d
    }

    #[test]
    fn test_counter_summary_ratios() {
        let mut record = CounterRecord::new();
        record.messages = 4;
        record.stickers = 1;
        record.reacts_received_total = 2;
        record.sticker_use.add("s.png", 1);

        let s = CounterSummary::from_record(&record, 3);
        assert_eq!(s.stickers_per_message, 0.25);
        assert_eq!(s.reacts_per_message, 0.5);
        assert_eq!(s.top_stickers, vec![("s.png".to_string(), 1)]);
        assert_eq!(CounterSummary::from_record(&CounterRecord::new(), 3).links_per_message, 0.0);
    }

    #[test]
    fn test_bucket_reports_start_with_all_time() {
        let reports = bucket_reports(&divider(), 3);
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[0].label, "all time");
        assert_eq!(reports[0].everyone.messages, 5);
        assert_eq!(reports[1].label, "Jan24");
        assert_eq!(reports[1].participants.len(), 2);
    }

    #[test]
    fn test_activity_fills_missing_participants_with_zero() {
        let a = activity(&divider());
        let labels: Vec<&str> = a.periods.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Jan24", "Feb24", "Mar24"]);
        assert_eq!(a.series["A"], vec![1, 1, 1]);
        assert_eq!(a.series["B"], vec![1, 0, 0]);
        assert_eq!(a.series["C"], vec![0, 0, 1]);
    }

    #[test]
    fn test_react_densities_skip_periods_without_reacts() {
        let d = divider();
        let received = react_density(&d);
        assert_eq!(received.periods.len(), 1);
        assert_eq!(received.series[EVERYONE_LABEL], vec![0.5]);

        let given = reacts_given_density(&d);
        assert_eq!(given.series["B"], vec![0.5]);
        assert_eq!(given.series["A"], vec![0.0]);
    }

    #[test]
    fn test_period_rankings_filter_and_cap() {
        let d = divider();
        let rankings = period_rankings(&d, UsageKind::Word, 2, 5, Some(1));

        assert_eq!(rankings.len(), 3);
        let jan = &rankings[0];
        assert_eq!(jan.items[0].item, "hello");
        assert_eq!(jan.items[0].count, 1);
        assert_eq!(jan.items[0].raw_count, 2);
        assert!(jan.items[0].outlier);
        assert_eq!(jan.items[1].item, "everyone");
        assert!(!jan.items[1].outlier);
        // "hi" is too short.
        assert!(rankings[1].items.is_empty());
    }

    #[test]
    fn test_period_rankings_skip_unused_periods() {
        let mut d = TimeDivider::new(TimePeriod::Month);
        d.ingest(&msg(utc(2024, 1, 2), "A", "plain"));
        d.ingest(&ChatMessage {
            sticker: Some(Sticker {
                uri: Some("s.png".to_string()),
            }),
            ..msg(utc(2024, 2, 2), "A", "")
        });

        let rankings = period_rankings(&d, UsageKind::Sticker, 3, 0, None);
        assert_eq!(rankings.len(), 1);
        assert_eq!(rankings[0].period.start, utc(2024, 2, 1));
    }

    #[test]
    fn test_top_items_by_participant() {
        let d = divider();
        let breakdown = top_items_by_participant(d.all_time(), UsageKind::Word, 2);

        assert_eq!(
            breakdown.items,
            vec![("hello".to_string(), 3), ("everyone".to_string(), 1)]
        );
        assert_eq!(breakdown.participants["A"], vec![2, 1]);
        assert_eq!(breakdown.participants["B"], vec![1, 0]);
        assert_eq!(breakdown.participants["C"], vec![0, 0]);
    }
}
