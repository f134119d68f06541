//! Feature-hashing embedder producing deterministic bag-of-features vectors.

use xxhash_rust::xxh64::xxh64;

use crate::{EmbeddingError, EmbeddingModel, normalize_in_place};

const MODEL_NAME: &str = "hashing-embedder";
const MODEL_VERSION: u32 = 1;
const TOKEN_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Embeds text by hashing word tokens and their character trigrams into a
/// fixed number of signed buckets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashingEmbedder {
    dimension: usize,
    seed: u64,
}

impl HashingEmbedder {
    /// Creates an embedder with `dimension` buckets and the given hash seed.
    pub fn new(dimension: usize, seed: u64) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InvalidDimension);
        }
        Ok(Self { dimension, seed })
    }

    /// Seed mixed into every feature hash.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn accumulate(&self, feature: &str, weight: f32, buckets: &mut [f32]) {
        let hash = xxh64(feature.as_bytes(), self.seed);
        let index = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        buckets[index] += sign * weight;
    }
}

impl EmbeddingModel for HashingEmbedder {
    fn name(&self) -> &str {
        MODEL_NAME
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut buckets = vec![0.0; self.dimension];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            self.accumulate(token, TOKEN_WEIGHT, &mut buckets);
            let padded: Vec<char> = std::iter::once('#')
                .chain(token.chars())
                .chain(std::iter::once('#'))
                .collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.accumulate(&trigram, TRIGRAM_WEIGHT, &mut buckets);
            }
        }
        normalize_in_place(&mut buckets);
        Ok(buckets)
    }

    fn identity_hash(&self) -> u64 {
        let descriptor = format!(
            "{MODEL_NAME}:v{MODEL_VERSION}:{}:{}",
            self.dimension, self.seed
        );
        xxh64(descriptor.as_bytes(), 0)
    }
}
