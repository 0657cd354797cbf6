//! Chat export message model and loading
//!
//! Every field is optional: exports are inconsistent across years and message
//! kinds, and missing fields only skip their counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, StatsError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sticker {
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Share {
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    #[serde(default)]
    pub reaction: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
    #[serde(default)]
    pub sticker: Option<Sticker>,
    #[serde(default)]
    pub photos: Option<Vec<Photo>>,
    #[serde(default)]
    pub share: Option<Share>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reactions: Option<Vec<Reaction>>,
}

impl ChatMessage {
    /// Message time, `None` when absent or outside the representable range.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.timestamp_ms.and_then(DateTime::from_timestamp_millis)
    }

    pub fn sender(&self) -> &str {
        self.sender_name.as_deref().unwrap_or("")
    }

    fn repair_encoding(&mut self) {
        repair_field(&mut self.sender_name);
        repair_field(&mut self.content);
        for reaction in self.reactions.iter_mut().flatten() {
            repair_field(&mut reaction.reaction);
            repair_field(&mut reaction.actor);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default)]
    pub name: Option<String>,
}

/// One exported conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatLog {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn from_slice(bytes: &mut [u8]) -> std::result::Result<Self, simd_json::Error> {
        simd_json::serde::from_slice(bytes)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let mut bytes = fs::read(path).map_err(|e| StatsError::io(path, e))?;
        Self::from_slice(&mut bytes).map_err(|source| StatsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load every `message_<n>.json` below `dir` into one chronological log.
    pub fn from_export_dir(dir: &Path) -> Result<Self> {
        let mut files: Vec<(u32, PathBuf)> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let index = export_file_index(e.path())?;
                Some((index, e.into_path()))
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(StatsError::Shape(format!(
                "no message_<n>.json files found in {}",
                dir.display()
            )));
        }

        let mut log = ChatLog::default();
        for (_, path) in files {
            let part = Self::from_path(&path)?;
            tracing::debug!(
                path = %path.display(),
                messages = part.messages.len(),
                "loaded export part"
            );
            if log.title.is_none() {
                log.title = part.title;
            }
            for participant in part.participants {
                if !log.participants.contains(&participant) {
                    log.participants.push(participant);
                }
            }
            log.messages.extend(part.messages);
        }
        log.sort_chronologically();
        Ok(log)
    }

    /// Load a single export file, or a whole export directory.
    pub fn load(path: &Path) -> Result<Self> {
        if path.is_dir() {
            Self::from_export_dir(path)
        } else {
            let mut log = Self::from_path(path)?;
            log.sort_chronologically();
            Ok(log)
        }
    }

    /// Oldest first; undated messages keep their relative order at the end.
    pub fn sort_chronologically(&mut self) {
        self.messages
            .sort_by_key(|m| (m.timestamp_ms.is_none(), m.timestamp_ms));
    }

    /// Undo Latin-1 mojibake in names, content and reactions.
    pub fn repair_encoding(&mut self) {
        repair_field(&mut self.title);
        for participant in &mut self.participants {
            repair_field(&mut participant.name);
        }
        for message in &mut self.messages {
            message.repair_encoding();
        }
    }
}

fn export_file_index(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix("message_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

fn repair_field(field: &mut Option<String>) {
    if let Some(repaired) = field.as_deref().and_then(repair_mojibake) {
        *field = Some(repaired);
    }
}

/// Exports write UTF-8 bytes as individual U+0000..U+00FF code points.
/// Returns the decoded text when `s` has that shape, `None` otherwise.
pub fn repair_mojibake(s: &str) -> Option<String> {
    if s.is_ascii() {
        return None;
    }
    let bytes: Option<Vec<u8>> = s.chars().map(|c| u8::try_from(c).ok()).collect();
    String::from_utf8(bytes?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_message_with_missing_fields() {
        let mut raw = br#"{"messages": [{"sender_name": "A"}, {}]}"#.to_vec();
        let log = ChatLog::from_slice(&mut raw).unwrap();
        assert_eq!(log.messages.len(), 2);
        assert_eq!(log.messages[0].sender(), "A");
        assert_eq!(log.messages[1].sender(), "");
        assert!(log.messages[1].datetime().is_none());
    }

    #[test]
    fn test_parse_full_message_ignores_unknown_fields() {
        let mut raw = br#"{
            "title": "group",
            "participants": [{"name": "A"}],
            "messages": [{
                "sender_name": "A",
                "timestamp_ms": 1546300800000,
                "type": "Generic",
                "sticker": {"uri": "s1.png"},
                "photos": [{"uri": "p1.jpg", "creation_timestamp": 1}],
                "share": {"link": "https://example.com/x"},
                "content": "hi",
                "reactions": [{"reaction": "x", "actor": "B"}]
            }]
        }"#
        .to_vec();
        let log = ChatLog::from_slice(&mut raw).unwrap();
        let msg = &log.messages[0];
        assert_eq!(msg.sticker.as_ref().unwrap().uri.as_deref(), Some("s1.png"));
        assert_eq!(msg.photos.as_ref().unwrap().len(), 1);
        assert_eq!(msg.datetime().unwrap().timestamp(), 1546300800);
        assert_eq!(msg.reactions.as_ref().unwrap()[0].actor.as_deref(), Some("B"));
    }

    #[test]
    fn test_repair_mojibake() {
        // "❤" is E2 9D A4 in UTF-8
        let broken: String = [0xE2u8, 0x9D, 0xA4].iter().map(|&b| b as char).collect();
        assert_eq!(repair_mojibake(&broken).as_deref(), Some("❤"));
        assert_eq!(repair_mojibake("plain ascii"), None);
        // Already-correct text with a code point above U+00FF is left alone
        assert_eq!(repair_mojibake("caf\u{e9} ❤"), None);
        // Latin-1 text that is not a valid UTF-8 byte sequence is left alone
        assert_eq!(repair_mojibake("caf\u{e9}"), None);
    }

    #[test]
    fn test_sort_chronologically_puts_undated_last() {
        let mut log = ChatLog {
            messages: vec![
                ChatMessage {
                    timestamp_ms: Some(30),
                    ..Default::default()
                },
                ChatMessage {
                    content: Some("undated".into()),
                    ..Default::default()
                },
                ChatMessage {
                    timestamp_ms: Some(10),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        log.sort_chronologically();
        assert_eq!(log.messages[0].timestamp_ms, Some(10));
        assert_eq!(log.messages[1].timestamp_ms, Some(30));
        assert_eq!(log.messages[2].content.as_deref(), Some("undated"));
    }

    #[test]
    fn test_from_export_dir_merges_parts() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("message_1.json"),
            r#"{"participants":[{"name":"A"}],"messages":[{"sender_name":"A","timestamp_ms":2000}]}"#,
        )
        .unwrap();
        fs::write(
            tmp.path().join("message_2.json"),
            r#"{"participants":[{"name":"A"}],"messages":[{"sender_name":"B","timestamp_ms":1000}]}"#,
        )
        .unwrap();
        fs::write(tmp.path().join("notes.json"), "not an export").unwrap();

        let log = ChatLog::load(tmp.path()).unwrap();
        assert_eq!(log.participants.len(), 1);
        assert_eq!(log.messages.len(), 2);
        assert_eq!(log.messages[0].sender(), "B");
    }

    #[test]
    fn test_from_export_dir_without_parts_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            ChatLog::from_export_dir(tmp.path()),
            Err(StatsError::Shape(_))
        ));
    }
}
