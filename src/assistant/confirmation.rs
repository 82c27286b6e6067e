//! Classify short spoken replies to a pending action
//!
//! Matching is on whole words over a normalised transcript, so "ok" does not
//! fire inside "looks ok-ish" tokens and "no" does not fire inside "nobody".
//! Rejection wins when both vocabularies match.

use std::sync::LazyLock;

use regex::Regex;

/// Affirmative words and phrases (Vietnamese and English)
const CONFIRM_PHRASES: &[&str] = &[
    "có",
    "đúng",
    "đúng rồi",
    "ừ",
    "ừm",
    "ờ",
    "vâng",
    "dạ",
    "được",
    "đồng ý",
    "xác nhận",
    "chắc chắn",
    "gửi đi",
    "gọi đi",
    "làm đi",
    "nghe",
    "ok",
    "okay",
    "oke",
    "yes",
    "yeah",
    "yep",
    "sure",
    "confirm",
];

/// Negative words and phrases (Vietnamese and English)
const REJECT_PHRASES: &[&str] = &[
    "không",
    "ko",
    "hủy",
    "huỷ",
    "thôi",
    "đừng",
    "sai",
    "bỏ qua",
    "dừng",
    "từ chối",
    "no",
    "nope",
    "cancel",
    "stop",
];

/// Spoken ordinals, longest first so "thứ hai" wins over "hai"
const ORDINALS: &[(&str, usize)] = &[
    ("đầu tiên", 1),
    ("thứ nhất", 1),
    ("thứ hai", 2),
    ("thứ ba", 3),
    ("thứ tư", 4),
    ("thứ năm", 5),
    ("thứ sáu", 6),
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
    ("sixth", 6),
    ("một", 1),
    ("hai", 2),
    ("ba", 3),
    ("bốn", 4),
    ("tư", 4),
    ("năm", 5),
    ("sáu", 6),
    ("bảy", 7),
    ("tám", 8),
    ("chín", 9),
    ("mười", 10),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
];

static NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\b(?:số|number|thứ|cái|file|tệp)\s+)?\b(\d{1,3})\b").expect("valid regex")
});

static STICKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:sticker|nhãn dán)\s+(.+?)(?:\s+(?:cho|tới|đến|vào|to|for)\b.*)?$")
        .expect("valid regex")
});

static EMOJI_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:emoji|biểu tượng cảm xúc|biểu tượng|icon)\s+(.+?)(?:\s+(?:cho|tới|đến|vào|to|for)\b.*)?$")
        .expect("valid regex")
});

/// Verdict on a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Confirmation {
    pub is_confirmed: bool,
    pub is_rejected: bool,
}

impl Confirmation {
    /// Neither confirmed nor rejected
    #[must_use]
    pub const fn is_unclear(self) -> bool {
        !self.is_confirmed && !self.is_rejected
    }
}

/// Lowercase, strip punctuation, collapse whitespace
#[must_use]
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `phrase` occurs in `text` on word boundaries (both normalised)
fn contains_phrase(text: &str, phrase: &str) -> bool {
    let words: Vec<&str> = text.split(' ').collect();
    let needle: Vec<&str> = phrase.split(' ').collect();
    words.windows(needle.len()).any(|window| window == needle.as_slice())
}

/// Classify a reply as confirmation, rejection, or neither
#[must_use]
pub fn is_confirmation(transcript: &str) -> Confirmation {
    let text = normalize(transcript);
    if text.is_empty() {
        return Confirmation::default();
    }

    let is_rejected = REJECT_PHRASES.iter().any(|p| contains_phrase(&text, p));
    let is_confirmed = !is_rejected && CONFIRM_PHRASES.iter().any(|p| contains_phrase(&text, p));

    Confirmation {
        is_confirmed,
        is_rejected,
    }
}

/// Extract a 1-based selection index ("số 2", "cái thứ hai", "the first one")
#[must_use]
pub fn parse_selection_index(transcript: &str) -> Option<usize> {
    let text = normalize(transcript);

    if let Some(n) = NUMBER_REGEX
        .captures(&text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
    {
        return Some(n);
    }

    ORDINALS
        .iter()
        .find(|(word, _)| contains_phrase(&text, word))
        .map(|&(_, n)| n)
}

/// Extract the description in "gửi sticker con mèo cho Alice"
#[must_use]
pub fn extract_sticker_description(transcript: &str) -> Option<String> {
    capture_description(&STICKER_REGEX, transcript)
}

/// Extract the description in "send emoji heart to Bob"
#[must_use]
pub fn extract_emoji_description(transcript: &str) -> Option<String> {
    capture_description(&EMOJI_REGEX, transcript)
}

fn capture_description(regex: &Regex, transcript: &str) -> Option<String> {
    let text = normalize(transcript);
    regex
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|d| !d.is_empty())
}
