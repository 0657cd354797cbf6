//! Emoji, word and link tokenization
//!
//! Emoji detection is best effort. A grapheme that is neither a known emoji
//! nor contains a pictographic code point is simply not counted as one.

use unicode_segmentation::UnicodeSegmentation;
use url::Url;

/// Finds emoji occurrences in message text.
pub trait EmojiDetector: Send + Sync {
    /// Every emoji occurrence in `text`, in order, one entry per occurrence.
    fn detect<'a>(&self, text: &'a str) -> Vec<&'a str>;
}

/// Extended-grapheme segmentation checked against the emoji table.
///
/// Multi-code-point emoji (flags, skin tones, ZWJ sequences) come out of the
/// segmenter as a single grapheme and are counted once.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphemeEmojiDetector;

impl EmojiDetector for GraphemeEmojiDetector {
    fn detect<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.graphemes(true).filter(|g| is_emoji(g)).collect()
    }
}

fn is_emoji(grapheme: &str) -> bool {
    if grapheme.is_ascii() {
        return false;
    }
    emojis::get(grapheme).is_some() || grapheme.chars().any(is_pictographic)
}

fn is_pictographic(c: char) -> bool {
    matches!(
        u32::from(c),
        0x1F000..=0x1FAFF // symbols, pictographs, emoticons, transport, flags
            | 0x2600..=0x27BF // misc symbols and dingbats
            | 0x2B00..=0x2BFF // arrows, stars
            | 0x2190..=0x21FF // arrows
            | 0x2300..=0x23FF // technical (watch, hourglass)
            | 0x3030 | 0x303D | 0x3297 | 0x3299
            | 0x00A9 | 0x00AE // copyright, registered
    )
}

/// Whitespace-separated words. Punctuation stays attached.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

/// Host component of a shared link, `None` when the link has no host.
pub fn link_domain(link: &str) -> Option<String> {
    let url = Url::parse(link.trim()).ok()?;
    url.host_str().map(|h| h.to_string())
}
