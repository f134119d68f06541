//! Sentence segmentation of phrases.

use crate::config::SegmentationConfig;

/// Splits phrases into sentences at configured delimiter characters.
///
/// A run of consecutive delimiters stays attached to the sentence it ends,
/// surrounding whitespace is trimmed and empty pieces are dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentenceSplitter {
    delimiters: Vec<char>,
}

impl SentenceSplitter {
    /// Creates a splitter from a [`SegmentationConfig`].
    pub fn new(config: &SegmentationConfig) -> Self {
        Self {
            delimiters: config.delimiters.chars().collect(),
        }
    }

    fn is_delimiter(&self, c: char) -> bool {
        self.delimiters.contains(&c)
    }

    /// Returns the sentences of `text` in order.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            current.push(c);
            if !self.is_delimiter(c) {
                continue;
            }
            while let Some(&next) = chars.peek() {
                if !self.is_delimiter(next) {
                    break;
                }
                current.push(next);
                chars.next();
            }
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
        push_trimmed(&mut sentences, &current);
        sentences
    }
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self::new(&SegmentationConfig::default())
    }
}

fn push_trimmed(sentences: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}
