use std::fmt;

use serde::{Deserialize, Serialize};

/// Characters that terminate a sentence unless overridden.
pub const DEFAULT_DELIMITERS: &str = ".!:;?\n\r";

/// Controls how phrases are cut into sentences.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Every character in this string ends a sentence.
    pub delimiters: String,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            delimiters: DEFAULT_DELIMITERS.to_string(),
        }
    }
}

/// Numeric precision used to hold embedding vectors in memory and on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantizationMode {
    /// Full single precision.
    Float32,
    /// IEEE half precision.
    #[default]
    Float16,
    /// Symmetric 8-bit integers with one scale per vector.
    Int8,
}

/// Configuration a shard is bound to for its whole lifetime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Sentence segmentation rules.
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    /// Storage precision of embeddings.
    #[serde(default)]
    pub quantization: QuantizationMode,
}

/// Selects whether searches and enumerations work on phrases or sentences.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// Whole texts as they were added.
    #[default]
    Phrase,
    /// Sentences produced by segmentation.
    Sentence,
}

/// Ranked match returned by a shard search.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    /// Matched phrase or sentence.
    pub text: String,
    /// Cosine distance to the query; smaller is more similar.
    pub distance: f32,
}

impl Candidate {
    /// Creates a new [`Candidate`].
    pub fn new(text: impl Into<String>, distance: f32) -> Self {
        Self {
            text: text.into(),
            distance,
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.4})", self.text, self.distance)
    }
}
