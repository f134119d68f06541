//! Interface of one independently addressable text index.

use std::sync::Arc;

use embedder::{EmbeddingError, EmbeddingModel};
use thiserror::Error;

use crate::config::{Candidate, Granularity, ShardConfig};
use crate::io::{Archive, ArchiveError, PayloadError};

/// Errors that can occur while operating a shard.
#[derive(Debug, Error)]
pub enum ShardError {
    /// The embedding model failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// A vector does not match the dimensionality of the shard.
    #[error("expected embedding dimension {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// Container access failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    /// Vector payload could not be encoded or decoded.
    #[error(transparent)]
    Payload(#[from] PayloadError),
    /// Shard metadata could not be encoded or decoded.
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    /// Persisted components disagree with each other.
    #[error("inconsistent shard payload: {0}")]
    InconsistentPayload(String),
}

/// One text index over embeddings.
///
/// `k = None` asks a search for every candidate; `Some(k)` for at most `k`.
/// Searches return candidates ascending by distance.
pub trait Shard: Send + Sync + Sized {
    /// Creates an empty shard bound to `embedder` and `config`.
    fn create(embedder: Arc<dyn EmbeddingModel>, config: &ShardConfig) -> Self;

    /// Configuration the shard was created with.
    fn config(&self) -> &ShardConfig;

    /// Segments, embeds and stores `text`.
    fn add(&mut self, text: &str) -> Result<(), ShardError>;

    /// Removes every phrase equal to `text`, returning how many were removed.
    fn remove(&mut self, text: &str) -> usize;

    /// Stored phrases in insertion order.
    fn phrases(&self) -> Vec<&str>;

    /// Stored sentences in insertion order.
    fn sentences(&self) -> Vec<&str>;

    /// Number of stored phrases.
    fn num_phrases(&self) -> usize;

    /// Number of stored sentences.
    fn num_sentences(&self) -> usize;

    /// Embeds `query` with the shard's model and searches.
    fn search_text(
        &self,
        query: &str,
        k: Option<usize>,
        granularity: Granularity,
    ) -> Result<Vec<Candidate>, ShardError>;

    /// Searches with a precomputed query embedding.
    fn search_vector(
        &self,
        query: &[f32],
        k: Option<usize>,
        granularity: Granularity,
    ) -> Result<Vec<Candidate>, ShardError>;

    /// Replaces the embedding model without re-embedding stored vectors.
    fn rebind_embedder(&mut self, embedder: Arc<dyn EmbeddingModel>);

    /// Writes the shard under `path` inside `archive`.
    fn save(&self, archive: &mut Archive, path: &str) -> Result<(), ShardError>;

    /// Reconstructs a shard written by [`Shard::save`].
    fn load(
        embedder: Arc<dyn EmbeddingModel>,
        archive: &Archive,
        path: &str,
    ) -> Result<Self, ShardError>;
}
