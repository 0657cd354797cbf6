//! Sentiment collaborator
//!
//! The classifier only needs a (polarity, subjectivity) pair per text. The
//! bundled `LexiconSentiment` is a small word-list scorer; callers can plug in
//! anything else through `SentimentAnalyzer`.

use std::collections::HashMap;

use crate::counter::Sentiment;

pub trait SentimentAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> Sentiment;
}

const NEGATORS: &[&str] = &["not", "never", "no", "dont", "don't", "isnt", "isn't"];

/// Polarity in [-1, 1], subjectivity in [0, 1].
const DEFAULT_LEXICON: &[(&str, f64, f64)] = &[
    ("good", 0.7, 0.6),
    ("great", 0.8, 0.75),
    ("love", 0.5, 0.6),
    ("nice", 0.6, 1.0),
    ("happy", 0.8, 1.0),
    ("awesome", 1.0, 1.0),
    ("amazing", 0.6, 0.9),
    ("best", 1.0, 0.3),
    ("fun", 0.3, 0.2),
    ("funny", 0.25, 1.0),
    ("cool", 0.35, 0.65),
    ("thanks", 0.2, 0.2),
    ("lol", 0.8, 0.7),
    ("bad", -0.7, 0.67),
    ("terrible", -1.0, 1.0),
    ("awful", -1.0, 1.0),
    ("hate", -0.8, 0.9),
    ("sad", -0.5, 1.0),
    ("worst", -1.0, 1.0),
    ("boring", -1.0, 1.0),
    ("angry", -0.5, 1.0),
    ("wrong", -0.5, 0.9),
    ("ugh", -0.3, 0.5),
];

/// Averages the scores of known words; a negator directly before a word
/// flips and halves its polarity.
#[derive(Debug, Clone)]
pub struct LexiconSentiment {
    lexicon: HashMap<String, Sentiment>,
}

impl Default for LexiconSentiment {
    fn default() -> Self {
        Self::new(
            DEFAULT_LEXICON
                .iter()
                .map(|(w, p, s)| (w.to_string(), Sentiment::new(*p, *s))),
        )
    }
}

impl LexiconSentiment {
    pub fn new(entries: impl IntoIterator<Item = (String, Sentiment)>) -> Self {
        Self {
            lexicon: entries
                .into_iter()
                .map(|(w, s)| (w.to_lowercase(), s))
                .collect(),
        }
    }

    /// The default word list extended (or overridden) by `entries`.
    pub fn with_overrides(entries: impl IntoIterator<Item = (String, Sentiment)>) -> Self {
        let mut analyzer = Self::default();
        for (word, score) in entries {
            analyzer.lexicon.insert(word.to_lowercase(), score);
        }
        analyzer
    }

    pub fn len(&self) -> usize {
        self.lexicon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lexicon.is_empty()
    }
}

impl SentimentAnalyzer for LexiconSentiment {
    fn analyze(&self, text: &str) -> Sentiment {
        let mut matched = 0usize;
        let mut total = Sentiment::default();
        let mut negated = false;

        for raw in text.split_whitespace() {
            let word = raw
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase();
            if let Some(score) = self.lexicon.get(&word) {
                let polarity = if negated {
                    score.polarity * -0.5
                } else {
                    score.polarity
                };
                total.polarity += polarity;
                total.subjectivity += score.subjectivity;
                matched += 1;
            }
            negated = NEGATORS.contains(&word.as_str());
        }

        if matched == 0 {
            return Sentiment::default();
        }
        let n = matched as f64;
        Sentiment::new(
            (total.polarity / n).clamp(-1.0, 1.0),
            (total.subjectivity / n).clamp(0.0, 1.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_words_are_neutral() {
        let s = LexiconSentiment::default().analyze("the quick brown fox");
        assert_eq!(s, Sentiment::default());
    }

    #[test]
    fn test_averages_known_words() {
        let s = LexiconSentiment::default().analyze("Good! and bad.");
        assert!((s.polarity - 0.0).abs() < 1e-9);
        assert!((s.subjectivity - (0.6 + 0.67) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_negation_flips_and_halves() {
        let s = LexiconSentiment::default().analyze("not good");
        assert!((s.polarity - (-0.35)).abs() < 1e-9);
    }

    #[test]
    fn test_overrides_replace_default_scores() {
        let analyzer =
            LexiconSentiment::with_overrides(vec![("GOOD".to_string(), Sentiment::new(0.1, 0.1))]);
        let s = analyzer.analyze("good");
        assert!((s.polarity - 0.1).abs() < 1e-9);
        assert_eq!(analyzer.len(), DEFAULT_LEXICON.len());
    }
}
