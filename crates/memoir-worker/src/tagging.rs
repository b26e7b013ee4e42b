//! Keyword tagging of transcriptions.

use async_trait::async_trait;
use regex::Regex;

use crate::error::IngestResult;
use crate::ingest::Tagger;

/// Tags added, in order, until a clip has [`MIN_TAGS`].
const PADDING_TAGS: [&str; 3] = ["personal", "talking", "self"];
const MIN_TAGS: usize = 4;
const MAX_TAGS: usize = 8;

const RULES: [(&str, &str); 6] = [
    (r"(?i)\b(hello|hi|hey)\b", "greeting"),
    (r"(?i)\bmy name is\b", "introduction"),
    (r"\b\d{2}\b", "age"),
    (r"(?i)family", "family"),
    (r"(?i)\bfriends?\b", "friends"),
    (r"(?i)celebrat", "celebration"),
];

/// Deterministic [`Tagger`] matching a fixed keyword set.
#[derive(Debug, Clone)]
pub struct KeywordTagger {
    rules: Vec<(Regex, &'static str)>,
}

impl Default for KeywordTagger {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordTagger {
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .filter_map(|(pattern, tag)| Regex::new(pattern).ok().map(|re| (re, *tag)))
            .collect();
        Self { rules }
    }

    /// Tags for `text`: keyword matches, padded to four, at most eight.
    pub fn tags_for(&self, text: &str) -> Vec<String> {
        let mut tags: Vec<String> = self
            .rules
            .iter()
            .filter(|(re, _)| re.is_match(text))
            .map(|(_, tag)| tag.to_string())
            .collect();

        for padding in PADDING_TAGS {
            if tags.len() >= MIN_TAGS {
                break;
            }
            if !tags.iter().any(|t| t == padding) {
                tags.push(padding.to_string());
            }
        }

        tags.truncate(MAX_TAGS);
        tags
    }
}

#[async_trait]
impl Tagger for KeywordTagger {
    async fn tag(&self, transcription: &str) -> IngestResult<Vec<String>> {
        Ok(self.tags_for(transcription))
    }
}
