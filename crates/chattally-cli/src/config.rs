use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chattally_core::{LexiconSentiment, Sentiment};
use serde::Deserialize;

static CONFIG: OnceLock<ChattallyConfig> = OnceLock::new();

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChattallyConfig {
    pub period: String,
    pub similarity_min_count: u64,
    pub top: usize,
    pub repair_encoding: bool,
    pub sentiment: SentimentConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    pub enabled: bool,
    /// word = [polarity, subjectivity]
    pub lexicon: HashMap<String, (f64, f64)>,
}

impl Default for ChattallyConfig {
    fn default() -> Self {
        Self {
            period: "month".to_string(),
            similarity_min_count: 3,
            top: 5,
            repair_encoding: true,
            sentiment: SentimentConfig::default(),
        }
    }
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lexicon: HashMap::new(),
        }
    }
}

impl ChattallyConfig {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("chattally").join("config.toml"))
    }

    pub fn load() -> &'static ChattallyConfig {
        CONFIG.get_or_init(|| {
            let Some(path) = Self::config_path() else {
                return Self::default();
            };
            let Ok(content) = fs::read_to_string(&path) else {
                return Self::default();
            };
            Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config");
                Self::default()
            })
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// The bundled lexicon with the configured words layered on top.
    pub fn sentiment_analyzer(&self) -> LexiconSentiment {
        LexiconSentiment::with_overrides(
            self.sentiment
                .lexicon
                .iter()
                .map(|(word, (p, s))| (word.clone(), Sentiment::new(*p, *s))),
        )
    }
}
