//! Per-cell usage counters
//!
//! A `CounterRecord` holds everything tallied for one (time range × participant)
//! cell, or for the "everyone" row of a time range.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Item identity → occurrence count.
///
/// Keys are discovered at runtime (sticker URIs, link domains, words, ...).
/// Ranking ties are broken by lexicographic item order so `most_common` is
/// deterministic regardless of insertion history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyTable(BTreeMap<String, u64>);

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, item: &str) {
        self.add(item, 1);
    }

    pub fn add(&mut self, item: &str, count: u64) {
        match self.0.get_mut(item) {
            Some(entry) => *entry = entry.saturating_add(count),
            None => {
                self.0.insert(item.to_string(), count);
            }
        }
    }

    /// Count for `item`, zero when never seen.
    pub fn get(&self, item: &str) -> u64 {
        self.0.get(item).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// All items ranked by count descending, then item ascending.
    pub fn ranked(&self) -> Vec<(&str, u64)> {
        let mut items: Vec<(&str, u64)> = self.iter().collect();
        items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        items
    }

    /// The `n` highest-ranked items.
    pub fn most_common(&self, n: usize) -> Vec<(&str, u64)> {
        let mut items = self.ranked();
        items.truncate(n);
        items
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for FrequencyTable {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut table = FrequencyTable::new();
        for (item, count) in iter {
            table.add(&item.into(), count);
        }
        table
    }
}

/// A (polarity, subjectivity) pair. Persisted as a two-element array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Sentiment {
    pub polarity: f64,
    pub subjectivity: f64,
}

impl Sentiment {
    pub fn new(polarity: f64, subjectivity: f64) -> Self {
        Self {
            polarity,
            subjectivity,
        }
    }

    fn accumulate(&mut self, other: Sentiment) {
        self.polarity += other.polarity;
        self.subjectivity += other.subjectivity;
    }
}

impl From<(f64, f64)> for Sentiment {
    fn from((polarity, subjectivity): (f64, f64)) -> Self {
        Self::new(polarity, subjectivity)
    }
}

impl From<Sentiment> for (f64, f64) {
    fn from(s: Sentiment) -> Self {
        (s.polarity, s.subjectivity)
    }
}

/// Scalar totals, frequency tables and sentiment for one cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterRecord {
    #[serde(rename = "msg")]
    pub messages: u64,
    #[serde(rename = "sticker")]
    pub stickers: u64,
    pub photos: u64,
    #[serde(rename = "share")]
    pub shares: u64,
    pub emoji: u64,
    pub words: u64,
    pub reacts_given: u64,
    /// Counts once per message that received at least one reaction.
    pub reacts_received_messages: u64,
    /// Counts every reaction received.
    pub reacts_received_total: u64,
    pub content: u64,

    pub sentiment_total: Sentiment,
    pub sentiments: Vec<Sentiment>,

    pub reacts_received_use: FrequencyTable,
    pub reacts_given_use: FrequencyTable,
    pub sticker_use: FrequencyTable,
    pub photo_use: FrequencyTable,
    pub share_use: FrequencyTable,
    pub emoji_use: FrequencyTable,
    pub words_use: FrequencyTable,
}

impl CounterRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sentiment(&mut self, sentiment: Sentiment) {
        self.sentiments.push(sentiment);
        self.sentiment_total.accumulate(sentiment);
    }

    /// Mean (polarity, subjectivity) over all recorded sentiments.
    pub fn mean_sentiment(&self) -> Option<Sentiment> {
        if self.sentiments.is_empty() {
            return None;
        }
        let n = self.sentiments.len() as f64;
        Some(Sentiment::new(
            self.sentiment_total.polarity / n,
            self.sentiment_total.subjectivity / n,
        ))
    }
}

/// Selects one frequency table (and its scalar total) of a `CounterRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageKind {
    Sticker,
    Photo,
    Share,
    Emoji,
    Word,
    ReactGiven,
    ReactReceived,
}

impl UsageKind {
    pub const ALL: [UsageKind; 7] = [
        UsageKind::Sticker,
        UsageKind::Photo,
        UsageKind::Share,
        UsageKind::Emoji,
        UsageKind::Word,
        UsageKind::ReactGiven,
        UsageKind::ReactReceived,
    ];

    pub fn table(self, record: &CounterRecord) -> &FrequencyTable {
        match self {
            UsageKind::Sticker => &record.sticker_use,
            UsageKind::Photo => &record.photo_use,
            UsageKind::Share => &record.share_use,
            UsageKind::Emoji => &record.emoji_use,
            UsageKind::Word => &record.words_use,
            UsageKind::ReactGiven => &record.reacts_given_use,
            UsageKind::ReactReceived => &record.reacts_received_use,
        }
    }

    /// Scalar matching the table. Photos count messages, not photos, so the
    /// photo table can sum to more than this total.
    pub fn total(self, record: &CounterRecord) -> u64 {
        match self {
            UsageKind::Sticker => record.stickers,
            UsageKind::Photo => record.photos,
            UsageKind::Share => record.shares,
            UsageKind::Emoji => record.emoji,
            UsageKind::Word => record.words,
            UsageKind::ReactGiven => record.reacts_given,
            UsageKind::ReactReceived => record.reacts_received_total,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UsageKind::Sticker => "sticker",
            UsageKind::Photo => "photo",
            UsageKind::Share => "link",
            UsageKind::Emoji => "emoji",
            UsageKind::Word => "word",
            UsageKind::ReactGiven => "react-given",
            UsageKind::ReactReceived => "react-received",
        }
    }
}

impl std::str::FromStr for UsageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sticker" | "stickers" => Ok(UsageKind::Sticker),
            "photo" | "photos" => Ok(UsageKind::Photo),
            "link" | "links" | "share" | "shares" => Ok(UsageKind::Share),
            "emoji" => Ok(UsageKind::Emoji),
            "word" | "words" => Ok(UsageKind::Word),
            "react-given" | "reacts-given" => Ok(UsageKind::ReactGiven),
            "react-received" | "reacts-received" | "react" | "reacts" => {
                Ok(UsageKind::ReactReceived)
            }
            other => Err(format!("unknown usage kind {other:?}")),
        }
    }
}

/// Participant identity → that participant's record.
///
/// Records are only ever created through `get_or_create`, so every access
/// site states whether it may introduce a new participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Participants(BTreeMap<String, CounterRecord>);

impl Participants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, name: &str) -> &mut CounterRecord {
        self.0.entry(name.to_string()).or_default()
    }

    pub fn get(&self, name: &str) -> Option<&CounterRecord> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Participants in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CounterRecord)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }
}
