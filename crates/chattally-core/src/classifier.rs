//! Message classification
//!
//! Maps one message to counter increments on the "everyone" record and on
//! the participant records. Classification never fails: absent fields skip
//! their counters and malformed pieces are reported as `Diagnostic`s.

use std::fmt;
use std::sync::Arc;

use crate::counter::{CounterRecord, Participants};
use crate::message::ChatMessage;
use crate::sentiment::SentimentAnalyzer;
use crate::tokenize::{self, EmojiDetector, GraphemeEmojiDetector};

/// Sticker/photo identity used when the payload carries no URI.
pub const UNKNOWN_ITEM: &str = "unknown";

/// Non-fatal problem found while counting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Timestamped message outside a bounded time range; nothing was counted.
    OutOfRange { timestamp_ms: i64, range: String },
    /// Timestamp that cannot be represented as a date; bucketed as undated.
    UnrepresentableTimestamp { timestamp_ms: i64 },
    /// Shared link with no host component; the share itself still counts.
    LinkWithoutHost { link: String },
    /// Reaction without a glyph or an actor; that reaction was skipped.
    IncompleteReaction { sender: String, index: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::OutOfRange {
                timestamp_ms,
                range,
            } => write!(f, "message at {timestamp_ms}ms not in time range ({range})"),
            Diagnostic::UnrepresentableTimestamp { timestamp_ms } => {
                write!(f, "timestamp {timestamp_ms}ms is not a valid date")
            }
            Diagnostic::LinkWithoutHost { link } => {
                write!(f, "shared link {link:?} has no host")
            }
            Diagnostic::IncompleteReaction { sender, index } => {
                write!(f, "reaction #{index} on message from {sender:?} is incomplete")
            }
        }
    }
}

/// Counts one message into a set of records.
///
/// Holds the emoji and sentiment collaborators; cheap to clone.
#[derive(Clone)]
pub struct Classifier {
    emoji: Arc<dyn EmojiDetector>,
    sentiment: Option<Arc<dyn SentimentAnalyzer>>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            emoji: Arc::new(GraphemeEmojiDetector),
            sentiment: None,
        }
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("sentiment", &self.sentiment.is_some())
            .finish()
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_emoji_detector(mut self, detector: impl EmojiDetector + 'static) -> Self {
        self.emoji = Arc::new(detector);
        self
    }

    pub fn with_sentiment(mut self, analyzer: impl SentimentAnalyzer + 'static) -> Self {
        self.sentiment = Some(Arc::new(analyzer));
        self
    }

    /// Apply every increment for `msg` to `everyone` and `people`.
    pub fn classify(
        &self,
        msg: &ChatMessage,
        everyone: &mut CounterRecord,
        people: &mut Participants,
    ) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        self.count_message(msg, everyone, people, &mut diagnostics);
        count_reactions(msg, everyone, people, &mut diagnostics);
        diagnostics
    }

    fn count_message(
        &self,
        msg: &ChatMessage,
        everyone: &mut CounterRecord,
        people: &mut Participants,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        let sender = people.get_or_create(msg.sender());
        for record in [&mut *everyone, &mut *sender] {
            record.messages += 1;
            if msg.sticker.is_some() {
                record.stickers += 1;
            }
            if msg.photos.is_some() {
                record.photos += 1;
            }
            if msg.share.is_some() {
                record.shares += 1;
            }
        }

        if let Some(sticker) = &msg.sticker {
            let uri = sticker.uri.as_deref().unwrap_or(UNKNOWN_ITEM);
            everyone.sticker_use.increment(uri);
            sender.sticker_use.increment(uri);
        }

        for photo in msg.photos.iter().flatten() {
            let uri = photo.uri.as_deref().unwrap_or(UNKNOWN_ITEM);
            everyone.photo_use.increment(uri);
            sender.photo_use.increment(uri);
        }

        if let Some(link) = msg.share.as_ref().and_then(|s| s.link.as_deref()) {
            match tokenize::link_domain(link) {
                Some(domain) => {
                    everyone.share_use.increment(&domain);
                    sender.share_use.increment(&domain);
                }
                None => {
                    tracing::warn!(link, "shared link has no host");
                    diagnostics.push(Diagnostic::LinkWithoutHost {
                        link: link.to_string(),
                    });
                }
            }
        }

        let Some(content) = msg.content.as_deref() else {
            return;
        };

        let emoji = self.emoji.detect(content);
        let sentiment = self.sentiment.as_ref().map(|s| s.analyze(content));

        for record in [&mut *everyone, &mut *sender] {
            record.content += 1;

            for glyph in &emoji {
                record.emoji += 1;
                record.emoji_use.increment(glyph);
            }

            for word in tokenize::words(content) {
                record.words += 1;
                record.words_use.increment(word);
            }

            if let Some(sentiment) = sentiment {
                record.record_sentiment(sentiment);
            }
        }
    }
}

fn count_reactions(
    msg: &ChatMessage,
    everyone: &mut CounterRecord,
    people: &mut Participants,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let reactions = match &msg.reactions {
        Some(r) if !r.is_empty() => r,
        _ => return,
    };
    let sender = msg.sender();

    everyone.reacts_received_messages += 1;
    people.get_or_create(sender).reacts_received_messages += 1;

    for (index, react) in reactions.iter().enumerate() {
        let (Some(glyph), Some(actor)) = (react.reaction.as_deref(), react.actor.as_deref())
        else {
            tracing::warn!(sender, index, "skipping incomplete reaction");
            diagnostics.push(Diagnostic::IncompleteReaction {
                sender: sender.to_string(),
                index,
            });
            continue;
        };

        let poster = people.get_or_create(sender);
        poster.reacts_received_total += 1;
        poster.reacts_received_use.increment(glyph);

        let reactor = people.get_or_create(actor);
        reactor.reacts_given += 1;
        reactor.reacts_given_use.increment(glyph);

        everyone.reacts_given += 1;
        everyone.reacts_given_use.increment(glyph);
        everyone.reacts_received_total += 1;
        everyone.reacts_received_use.increment(glyph);
    }
}
