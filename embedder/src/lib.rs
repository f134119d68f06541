//! Embedding model interface consumed by the shard registry, plus deterministic models.

pub mod hashing;
pub mod table;

use thiserror::Error;

pub use hashing::HashingEmbedder;
pub use table::TableEmbedder;

/// Errors raised while constructing or invoking an embedding model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EmbeddingError {
    /// The model was configured with an unusable dimensionality.
    #[error("embedding dimension must be greater than zero")]
    InvalidDimension,
    /// A vector did not match the dimensionality of the model.
    #[error("expected embedding dimension {expected}, found {found} for `{key}`")]
    DimensionMismatch {
        key: String,
        expected: usize,
        found: usize,
    },
}

/// Turns text into fixed-size vectors.
///
/// Implementations are shared between threads: the registry calls `encode`
/// concurrently from the search fan-out and from each shard without locking.
pub trait EmbeddingModel: Send + Sync {
    /// Human readable model name. Persisted as a label only.
    fn name(&self) -> &str;

    /// Length of every vector produced by [`EmbeddingModel::encode`].
    fn dimension(&self) -> usize;

    /// Embeds a single piece of text.
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Stable content fingerprint. Two models with equal hashes must produce
    /// identical vectors for identical inputs.
    fn identity_hash(&self) -> u64;
}

/// Scales `vector` to unit length in place. Zero vectors are left untouched.
pub fn normalize_in_place(vector: &mut [f32]) {
    let norm = vector
        .iter()
        .map(|v| (*v as f64).powi(2))
        .sum::<f64>()
        .sqrt();
    if norm <= f64::EPSILON {
        return;
    }
    for value in vector.iter_mut() {
        *value = (*value as f64 / norm) as f32;
    }
}
