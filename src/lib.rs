//! Sharded semantic search: a registry of independently addressable text
//! shards, a parallel fan-out search that merges their rankings, and an
//! archive format guarded by the identity hash of the embedding model.

pub mod config;
pub mod error;
pub mod persistence;
pub mod registry;
pub mod search;
pub mod shard_id;

pub use config::RegistryMetadata;
pub use error::RegistryError;
pub use persistence::{
    EMBEDDER_HASH_FILE, MANIFEST_FILE, METADATA_FILE, SHARD_DIR, escape_shard_id, shard_path,
};
pub use registry::ShardRegistry;
pub use search::{CancelFlag, FanOut, SearchRequest, SearchResults};
pub use shard_id::ShardId;

pub use embedder::{EmbeddingError, EmbeddingModel, HashingEmbedder, TableEmbedder};
pub use retriever::{
    Archive, Candidate, Granularity, QuantizationMode, SearchEngine, SegmentationConfig, Shard,
    ShardConfig,
};
