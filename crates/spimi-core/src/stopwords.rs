//! Stop-word filtering for the index builder
//!
//! Terms are matched exactly, as supplied by the upstream tokenizer.

use ahash::AHashSet;

const ENGLISH: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "as", "be", "been", "but", "by", "few", "for", "have",
    "he", "her", "here", "him", "his", "how", "i", "in", "is", "it", "its", "many", "me", "my",
    "none", "of", "on", "or", "our", "she", "some", "the", "their", "them", "there", "they",
    "that", "this", "us", "was", "what", "when", "where", "which", "who", "why", "will", "with",
    "you", "your",
];

/// Set of terms that count toward document length but are never indexed
#[derive(Debug, Clone)]
pub struct StopWords {
    words: AHashSet<String>,
}

impl StopWords {
    /// Built-in English stop-word list
    pub fn english() -> Self {
        ENGLISH.iter().copied().collect()
    }

    /// Empty set, every term is indexed
    pub fn none() -> Self {
        Self {
            words: AHashSet::new(),
        }
    }

    pub fn contains(&self, term: &str) -> bool {
        self.words.contains(term)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for StopWords {
    fn default() -> Self {
        Self::english()
    }
}

impl<S: Into<String>> FromIterator<S> for StopWords {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            words: iter.into_iter().map(Into::into).collect(),
        }
    }
}
