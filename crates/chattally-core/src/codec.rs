//! JSON persistence for dividers and time ranges
//!
//! Documents are tagged objects. A divider carries `__timedivider__`, its
//! period code and a `trcounts` map from bucket key to a tagged time range;
//! a time range carries `__timerange__`, its bounds as epoch seconds (or
//! null) and the `allcount`/`percount` records.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::counter::{CounterRecord, Participants};
use crate::divider::{PeriodKey, TimeDivider, TimePeriod};
use crate::error::{Result, StatsError};
use crate::timerange::{TimeRange, TimeRangeCount};

const SPECIAL_KEY: &str = "__special__";
const TIMEDIVIDER_KEY: &str = "__timedivider__";
const TIMERANGE_KEY: &str = "__timerange__";

#[derive(Serialize)]
struct TimeRangeOut<'a> {
    #[serde(rename = "__timerange__")]
    tag: bool,
    timerange: Option<(f64, f64)>,
    allcount: &'a CounterRecord,
    percount: &'a Participants,
}

#[derive(Serialize)]
struct DividerOut<'a> {
    #[serde(rename = "__special__")]
    special: bool,
    #[serde(rename = "__timedivider__")]
    tag: bool,
    period: u8,
    trcounts: BTreeMap<String, TimeRangeOut<'a>>,
}

#[derive(Deserialize)]
struct StoredTimeRange {
    timerange: Option<(f64, f64)>,
    allcount: CounterRecord,
    percount: Participants,
}

#[derive(Deserialize)]
struct StoredDivider {
    period: u64,
    trcounts: BTreeMap<String, Value>,
}

impl<'a> From<&'a TimeRangeCount> for TimeRangeOut<'a> {
    fn from(trc: &'a TimeRangeCount) -> Self {
        Self {
            tag: true,
            timerange: trc.range().map(|r| (epoch_secs(r.start()), epoch_secs(r.end()))),
            allcount: &trc.everyone,
            percount: &trc.participants,
        }
    }
}

impl TryFrom<StoredTimeRange> for TimeRangeCount {
    type Error = StatsError;

    fn try_from(s: StoredTimeRange) -> Result<Self> {
        let range = match s.timerange {
            None => None,
            Some((start, end)) => Some(TimeRange::new(
                from_epoch_secs(start)?,
                from_epoch_secs(end)?,
            )?),
        };
        Ok(TimeRangeCount::from_parts(range, s.allcount, s.percount))
    }
}

/// A loaded document: a whole divider or a single time range.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Divider(TimeDivider),
    TimeRange(TimeRangeCount),
}

impl Document {
    pub fn into_divider(self) -> Result<TimeDivider> {
        match self {
            Document::Divider(d) => Ok(d),
            Document::TimeRange(_) => Err(StatsError::Shape(
                "expected a time divider, found a bare time range".to_string(),
            )),
        }
    }
}

fn epoch_secs(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 1000.0
}

fn from_epoch_secs(secs: f64) -> Result<DateTime<Utc>> {
    if !secs.is_finite() {
        return Err(StatsError::Shape(format!("invalid time bound {secs}")));
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
        .ok_or_else(|| StatsError::Shape(format!("time bound {secs} is out of range")))
}

fn is_tagged(obj: &serde_json::Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn encode_divider(divider: &TimeDivider) -> Result<String> {
    let out = DividerOut {
        special: true,
        tag: true,
        period: divider.period().code(),
        trcounts: divider
            .buckets()
            .map(|(key, trc)| (key.encode(), TimeRangeOut::from(trc)))
            .collect(),
    };
    Ok(serde_json::to_string(&out)?)
}

pub fn encode_time_range(trc: &TimeRangeCount) -> Result<String> {
    Ok(serde_json::to_string(&TimeRangeOut::from(trc))?)
}

/// Parse a document, dispatching on its tag.
pub fn decode(text: &str) -> Result<Document> {
    decode_value(serde_json::from_str(text)?)
}

pub fn decode_divider(text: &str) -> Result<TimeDivider> {
    decode(text)?.into_divider()
}

pub fn decode_value(value: Value) -> Result<Document> {
    let Some(obj) = value.as_object() else {
        return Err(StatsError::Shape("document is not an object".to_string()));
    };

    if is_tagged(obj, TIMEDIVIDER_KEY) {
        if obj.contains_key(SPECIAL_KEY) && !is_tagged(obj, SPECIAL_KEY) {
            return Err(StatsError::Shape(format!("{SPECIAL_KEY} must be true")));
        }
        let stored: StoredDivider = serde_json::from_value(value)?;
        return divider_from_stored(stored).map(Document::Divider);
    }
    if is_tagged(obj, TIMERANGE_KEY) {
        return time_range_from_value(value).map(Document::TimeRange);
    }
    Err(StatsError::Shape(format!(
        "document has neither {TIMEDIVIDER_KEY} nor {TIMERANGE_KEY} tag"
    )))
}

fn time_range_from_value(value: Value) -> Result<TimeRangeCount> {
    let tagged = value
        .as_object()
        .is_some_and(|obj| is_tagged(obj, TIMERANGE_KEY));
    if !tagged {
        return Err(StatsError::Shape(format!("bucket is missing the {TIMERANGE_KEY} tag")));
    }
    let stored: StoredTimeRange = serde_json::from_value(value)?;
    stored.try_into()
}

fn divider_from_stored(stored: StoredDivider) -> Result<TimeDivider> {
    let period = TimePeriod::from_code(stored.period)?;
    let mut all_time = None;
    let mut buckets = BTreeMap::new();

    for (raw_key, value) in stored.trcounts {
        let key = PeriodKey::decode(&raw_key)?;
        let trc = time_range_from_value(value)?;

        match (&key, trc.range()) {
            (PeriodKey::Start(_), None) => {
                return Err(StatsError::Shape(format!(
                    "bucket {raw_key:?} has no time range"
                )));
            }
            (PeriodKey::All | PeriodKey::Undated, Some(_)) => {
                return Err(StatsError::Shape(format!(
                    "sentinel bucket {raw_key:?} must not have a time range"
                )));
            }
            _ => {}
        }
        if period == TimePeriod::All && key != PeriodKey::All {
            return Err(StatsError::Shape(format!(
                "all-time divider has extra bucket {raw_key:?}"
            )));
        }

        if key == PeriodKey::All {
            if all_time.replace(trc).is_some() {
                return Err(StatsError::Shape("duplicate all-time bucket".to_string()));
            }
        } else if buckets.insert(key, trc).is_some() {
            return Err(StatsError::Shape(format!("duplicate bucket {raw_key:?}")));
        }
    }

    let all_time = all_time.ok_or_else(|| {
        StatsError::Shape(format!("missing {} bucket", PeriodKey::ALL_KEY))
    })?;
    Ok(TimeDivider::from_parts(period, all_time, buckets))
}

/// Write `divider` to `path`, replacing it atomically where the filesystem
/// allows.
pub fn save(path: &Path, divider: &TimeDivider) -> Result<()> {
    let text = encode_divider(divider)?;

    let temp_path = path.with_extension("json.tmp");
    let file = File::create(&temp_path).map_err(|e| StatsError::io(&temp_path, e))?;
    let mut writer = BufWriter::new(file);
    let written = writer.write_all(text.as_bytes()).and_then(|_| writer.flush());
    drop(writer);
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(StatsError::io(&temp_path, e));
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StatsError::io(path, e));
    }
    tracing::debug!(path = %path.display(), buckets = divider.len(), "saved analysis");
    Ok(())
}

pub fn load(path: &Path) -> Result<Document> {
    let file = File::open(path).map_err(|e| StatsError::io(path, e))?;
    let value: Value = serde_json::from_reader(BufReader::new(file))?;
    decode_value(value)
}

pub fn load_divider(path: &Path) -> Result<TimeDivider> {
    load(path)?.into_divider()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::counter::Sentiment;
    use crate::message::{ChatMessage, Reaction, Sticker};
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn sample_divider() -> TimeDivider {
        let msg = |t: Option<DateTime<Utc>>, sender: &str| ChatMessage {
            sender_name: Some(sender.to_string()),
            timestamp_ms: t.map(|t| t.timestamp_millis()),
            content: Some("hi there".to_string()),
            sticker: Some(Sticker {
                uri: Some("s1.png".to_string()),
            }),
            reactions: Some(vec![Reaction {
                reaction: Some("❤".to_string()),
                actor: Some("B".to_string()),
            }]),
            ..Default::default()
        };

        let mut divider = TimeDivider::new(TimePeriod::Month);
        divider.ingest(&msg(Some(utc(2019, 1, 1)), "A"));
        divider.ingest(&msg(Some(utc(2019, 2, 3)), "B"));
        divider.ingest(&msg(None, "A"));
        divider
    }

    #[test]
    fn test_round_trip_preserves_everything() {
        let divider = sample_divider();
        let decoded = decode_divider(&encode_divider(&divider).unwrap()).unwrap();

        assert_eq!(decoded, divider);
        assert_eq!(decoded.all_keys(), vec![utc(2019, 1, 1), utc(2019, 2, 1)]);
        assert!(decoded.undated().is_some());
    }

    #[test]
    fn test_sentiment_survives_round_trip() {
        let classifier =
            Classifier::new().with_sentiment(crate::sentiment::LexiconSentiment::default());
        let mut divider = TimeDivider::with_classifier(TimePeriod::Year, classifier);
        divider.ingest(&ChatMessage {
            sender_name: Some("A".to_string()),
            timestamp_ms: Some(utc(2020, 5, 1).timestamp_millis()),
            content: Some("great".to_string()),
            ..Default::default()
        });

        let decoded = decode_divider(&encode_divider(&divider).unwrap()).unwrap();
        let a = decoded.all_time().participants.get("A").unwrap();
        assert_eq!(a.sentiments.len(), 1);
        assert_eq!(decoded, divider);
    }

    /// Scores each message from its numeric content with full-precision floats.
    struct WaveSentiment;

    impl crate::sentiment::SentimentAnalyzer for WaveSentiment {
        fn analyze(&self, text: &str) -> Sentiment {
            let i: f64 = text.parse().unwrap_or(0.0);
            Sentiment::new((i * 0.7331).sin() / 3.0, (i * 1.137).cos().abs() / 7.0)
        }
    }

    #[test]
    fn test_arbitrary_sentiment_floats_round_trip_exactly() {
        let classifier = Classifier::new().with_sentiment(WaveSentiment);
        let mut divider = TimeDivider::with_classifier(TimePeriod::All, classifier);
        for i in 0..2000 {
            divider.ingest(&ChatMessage {
                sender_name: Some(format!("p{}", i % 7)),
                content: Some(i.to_string()),
                ..Default::default()
            });
        }

        let decoded = decode_divider(&encode_divider(&divider).unwrap()).unwrap();
        assert_eq!(decoded.all_time().everyone.sentiments.len(), 2000);
        assert_eq!(decoded, divider);
    }

    #[test]
    fn test_encoded_shape() {
        let value: Value = serde_json::from_str(&encode_divider(&sample_divider()).unwrap()).unwrap();

        assert_eq!(value["__special__"], true);
        assert_eq!(value["__timedivider__"], true);
        assert_eq!(value["period"], 2);
        let all = &value["trcounts"]["TimeDivider_ALLKEY"];
        assert_eq!(all["__timerange__"], true);
        assert!(all["timerange"].is_null());
        assert_eq!(all["allcount"]["msg"], 3);
        assert!(value["trcounts"]["TimeDivider_UNDATEDKEY"]["timerange"].is_null());
        assert_eq!(
            value["trcounts"]["1546300800"]["timerange"],
            serde_json::json!([1546300800.0, 1548979200.0])
        );
    }

    #[test]
    fn test_accepts_float_keys_and_missing_special_tag() {
        let divider = sample_divider();
        let mut value: Value = serde_json::from_str(&encode_divider(&divider).unwrap()).unwrap();
        let obj = value.as_object_mut().unwrap();
        obj.remove("__special__");
        let trcounts = obj["trcounts"].as_object_mut().unwrap();
        let jan = trcounts.remove("1546300800").unwrap();
        trcounts.insert("1546300800.0".to_string(), jan);

        let decoded = decode_value(value).unwrap().into_divider().unwrap();
        assert_eq!(decoded, divider);
    }

    #[test]
    fn test_decodes_externally_written_document() {
        let empty = r#"{"msg": 0, "sticker": 0, "photos": 0, "share": 0, "emoji": 0,
            "words": 0, "reacts_given": 0, "reacts_received_messages": 0,
            "reacts_received_total": 0, "sentiment_total": [0, 0], "content": 0,
            "reacts_received_use": {}, "reacts_given_use": {}, "sticker_use": {},
            "photo_use": {}, "share_use": {}, "emoji_use": {}, "words_use": {},
            "sentiments": []}"#;
        let bob = r#"{"msg": 1, "sticker": 1, "photos": 0, "share": 0, "emoji": 0,
            "words": 0, "reacts_given": 0, "reacts_received_messages": 0,
            "reacts_received_total": 0, "sentiment_total": [0.25, 0.5], "content": 0,
            "reacts_received_use": {}, "reacts_given_use": {}, "sticker_use": {"s.png": 1},
            "photo_use": {}, "share_use": {}, "emoji_use": {}, "words_use": {},
            "sentiments": [[0.25, 0.5]]}"#;
        let text = format!(
            r#"{{
  "__timedivider__": true,
  "trcounts": {{
    "TimeDivider_ALLKEY": {{"__timerange__": true, "timerange": null,
                            "allcount": {bob}, "percount": {{"Bob": {bob}}}}},
    "1546300800.0": {{"__timerange__": true,
                      "timerange": [1546300800.0, 1577836800.0],
                      "allcount": {bob}, "percount": {{"Bob": {bob}, "Eve": {empty}}}}}
  }},
  "period": 1,
  "__special__": true
}}"#
        );

        let divider = decode_divider(&text).unwrap();
        assert_eq!(divider.period(), TimePeriod::Year);
        assert_eq!(divider.all_keys(), vec![utc(2019, 1, 1)]);
        let year = divider.get_period(utc(2019, 1, 1)).unwrap();
        assert_eq!(year.range().unwrap().end(), utc(2020, 1, 1));
        assert_eq!(year.participants.len(), 2);
        let bob = divider.all_time().participants.get("Bob").unwrap();
        assert_eq!(bob.sticker_use.get("s.png"), 1);
        assert_eq!(bob.sentiment_total, Sentiment::new(0.25, 0.5));
    }

    #[test]
    fn test_missing_counter_key_is_fatal() {
        let mut value: Value = serde_json::from_str(&encode_divider(&sample_divider()).unwrap()).unwrap();
        value["trcounts"]["TimeDivider_ALLKEY"]["allcount"]
            .as_object_mut()
            .unwrap()
            .remove("words_use");

        assert!(decode_value(value).is_err());
    }

    #[test]
    fn test_missing_all_time_bucket_is_fatal() {
        let mut value: Value = serde_json::from_str(&encode_divider(&sample_divider()).unwrap()).unwrap();
        value["trcounts"]
            .as_object_mut()
            .unwrap()
            .remove("TimeDivider_ALLKEY");

        assert!(matches!(decode_value(value), Err(StatsError::Shape(_))));
    }

    #[test]
    fn test_unknown_period_code_is_rejected() {
        let mut value: Value = serde_json::from_str(&encode_divider(&sample_divider()).unwrap()).unwrap();
        value["period"] = serde_json::json!(9);
        assert!(matches!(
            decode_value(value),
            Err(StatsError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn test_untagged_document_is_rejected() {
        assert!(matches!(decode("{}"), Err(StatsError::Shape(_))));
        assert!(matches!(decode("[1, 2]"), Err(StatsError::Shape(_))));
    }

    #[test]
    fn test_bare_time_range_document() {
        let divider = sample_divider();
        let jan = divider.get_period(utc(2019, 1, 1)).unwrap();
        let doc = decode(&encode_time_range(jan).unwrap()).unwrap();

        assert_eq!(doc, Document::TimeRange(jan.clone()));
        assert!(doc.into_divider().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        let divider = sample_divider();

        save(&path, &divider).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load_divider(&path).unwrap(), divider);
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = load(Path::new("/nonexistent/analysis.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/analysis.json"));
    }
}
