use embedder::EmbeddingError;
use retriever::{ArchiveError, ShardError};
use thiserror::Error;

use crate::shard_id::ShardId;

/// Errors surfaced by the shard registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An explicit shard id was requested but is not registered.
    #[error("shard `{0}` not found")]
    ShardNotFound(ShardId),
    /// The archive was written with a different embedding model.
    #[error(
        "the registry uses a different embedding model than the one stored in {path} \
         (stored hash {stored}, supplied hash {supplied})"
    )]
    IncompatibleEmbeddingModel {
        path: String,
        stored: u64,
        supplied: u64,
    },
    /// A replacement model would not reproduce the vectors already stored.
    #[error(
        "embedding model hash {supplied} differs from the model that produced \
         the stored vectors ({current})"
    )]
    EmbedderMismatch { current: u64, supplied: u64 },
    /// A shard id cannot be written to the line-oriented manifest.
    #[error("shard id `{0}` contains a line break and cannot be persisted")]
    UnencodableShardId(ShardId),
    /// The manifest of an archive is malformed.
    #[error("corrupt shard manifest: {0}")]
    CorruptManifest(String),
    /// The stored embedder fingerprint is not a number.
    #[error("invalid embedder fingerprint `{0}`")]
    InvalidFingerprint(String),
    /// A search was cancelled before every shard answered.
    #[error("search cancelled")]
    Cancelled,
    /// The embedding model failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// A shard operation failed.
    #[error(transparent)]
    Shard(#[from] ShardError),
    /// Container access failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    /// Registry metadata could not be encoded or decoded.
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}
