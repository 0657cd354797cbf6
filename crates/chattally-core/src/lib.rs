#![deny(clippy::all)]

mod analyze;
pub mod classifier;
pub mod codec;
pub mod counter;
pub mod divider;
mod error;
pub mod message;
pub mod report;
pub mod sentiment;
pub mod similarity;
pub mod timerange;
pub mod tokenize;

pub use analyze::*;
pub use classifier::{Classifier, Diagnostic};
pub use codec::Document;
pub use counter::{CounterRecord, FrequencyTable, Participants, Sentiment, UsageKind};
pub use divider::{PeriodKey, TimeDivider, TimePeriod};
pub use error::{Result, StatsError};
pub use message::ChatLog;
pub use sentiment::{LexiconSentiment, SentimentAnalyzer};
pub use similarity::{sticker_similarity, usage_similarity, SimilarityMatrix};
pub use timerange::{TimeRange, TimeRangeCount};

pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChatMessage, Reaction, Sticker};

    fn message(sender: &str, content: &str) -> ChatMessage {
        ChatMessage {
            sender_name: Some(sender.to_string()),
            timestamp_ms: Some(1_546_300_800_000),
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_version_matches_manifest() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }

    /// Load an export, analyze it, persist it and read it back.
    #[test]
    fn test_end_to_end_pipeline() {
        let mut first = message("A", "hi hi");
        first.sticker = Some(Sticker {
            uri: Some("s1.png".to_string()),
        });
        first.reactions = Some(vec![Reaction {
            reaction: Some("❤".to_string()),
            actor: Some("B".to_string()),
        }]);
        let chat = ChatLog {
            messages: vec![first, message("B", "hi"), message("C", "hey")],
            ..Default::default()
        };

        let analysis = analyze(&chat, TimePeriod::Month, Classifier::new(), |_, _| {});
        assert!(analysis.diagnostics.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        codec::save(&path, &analysis.divider).unwrap();
        let loaded = codec::load_divider(&path).unwrap();

        assert_eq!(loaded, analysis.divider);
        let everyone = &loaded.all_time().everyone;
        assert_eq!(everyone.messages, 3);
        assert_eq!(everyone.sticker_use.get("s1.png"), 1);
        assert_eq!(everyone.words_use.get("hi"), 3);
        assert_eq!(
            loaded.all_time().participants.get("A").unwrap().reacts_received_total,
            1
        );
    }
}
