use retriever::{QuantizationMode, SegmentationConfig, ShardConfig};
use serde::{Deserialize, Serialize};

/// Registry metadata persisted as `MultiSearchEngine.json`.
///
/// `embedder` only labels the model that wrote the archive; the live model
/// passed to `load` is authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryMetadata {
    /// Sentence delimiters handed to shards created after load.
    pub delimiters: String,
    /// Storage precision handed to shards created after load.
    pub quantization: QuantizationMode,
    /// Name of the model used at save time.
    #[serde(default)]
    pub embedder: String,
}

impl RegistryMetadata {
    /// Captures the metadata of a registry.
    pub fn new(config: &ShardConfig, embedder: &str) -> Self {
        Self {
            delimiters: config.segmentation.delimiters.clone(),
            quantization: config.quantization,
            embedder: embedder.to_string(),
        }
    }

    /// Configuration for shards created by the reloaded registry.
    pub fn shard_config(&self) -> ShardConfig {
        ShardConfig {
            segmentation: SegmentationConfig {
                delimiters: self.delimiters.clone(),
            },
            quantization: self.quantization,
        }
    }
}
