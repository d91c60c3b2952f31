use regex::Regex;
use std::collections::HashSet;

pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "do", "for", "from",
    "had", "has", "have", "he", "her", "here", "hers", "him", "his", "how", "i", "if", "in",
    "into", "is", "it", "its", "just", "me", "mine", "more", "most", "my", "no", "not", "now",
    "of", "on", "one", "or", "our", "ours", "out", "so", "than", "that", "the", "their", "theirs",
    "them", "there", "these", "they", "this", "those", "to", "too", "up", "very", "was", "we",
    "were", "what", "when", "where", "which", "who", "why", "will", "with", "you", "your", "yours",
];

pub const DEFAULT_MIN_TOKEN_LEN: usize = 2;

/// Turns post and comment text into lowercase word tokens.
///
/// Links, HTML entities, `r/` and `u/` references, punctuation, stopwords,
/// numbers and tokens shorter than the minimum length are dropped. Never fails;
/// text with nothing usable yields an empty vector.
#[derive(Debug, Clone)]
pub struct Normalizer {
    stopwords: HashSet<String>,
    min_token_len: usize,
    link_re: Regex,
    entity_re: Regex,
    reference_re: Regex,
    word_re: Regex,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            stopwords: STOPWORDS.iter().map(|s| s.to_string()).collect(),
            min_token_len: DEFAULT_MIN_TOKEN_LEN,
            link_re: Regex::new(r"(?i)(?:https?://|www\.)\S+").expect("valid link regex"),
            entity_re: Regex::new(r"&(?:[a-zA-Z]+|#[0-9]+|#[xX][0-9a-fA-F]+);")
                .expect("valid entity regex"),
            reference_re: Regex::new(r"(?i)(?:^|\s|/)[ru]/[a-z0-9_\-]+")
                .expect("valid reference regex"),
            word_re: Regex::new(r"[\p{Alphabetic}\p{Nd}']+").expect("valid word regex"),
        }
    }

    /// Adds domain stopwords on top of the fixed set.
    pub fn with_stopwords<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stopwords.extend(
            extra
                .into_iter()
                .map(|word| word.as_ref().trim().to_lowercase())
                .filter(|word| !word.is_empty()),
        );
        self
    }

    pub fn with_min_token_len(mut self, min_token_len: usize) -> Self {
        self.min_token_len = min_token_len.max(1);
        self
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    pub fn normalize(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let cleaned = self.link_re.replace_all(text, " ");
        let cleaned = self.entity_re.replace_all(&cleaned, " ");
        let cleaned = self.reference_re.replace_all(&cleaned, " ");
        let lowered = cleaned.to_lowercase();

        self.word_re
            .find_iter(&lowered)
            .filter_map(|m| self.accept(m.as_str()))
            .collect()
    }

    fn accept(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim_matches('\'');
        if trimmed.is_empty() || self.is_stopword(trimmed) {
            return None;
        }

        let token: String = trimmed.chars().filter(|c| *c != '\'').collect();
        if token.chars().count() < self.min_token_len
            || self.is_stopword(&token)
            || token.chars().all(|c| c.is_numeric())
        {
            return None;
        }
        Some(token)
    }
}
