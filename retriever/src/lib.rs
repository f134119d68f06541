//! Text shards over embeddings: segmentation, exact cosine search, quantized
//! storage and the archive container they persist into.

pub mod config;
pub mod io;
pub mod quantization;
pub mod shard;
pub mod splitter;
pub mod store;

pub use config::{
    Candidate, DEFAULT_DELIMITERS, Granularity, QuantizationMode, SegmentationConfig, ShardConfig,
};
pub use io::{Archive, ArchiveError, PayloadError, join_path};
pub use shard::{Shard, ShardError};
pub use splitter::SentenceSplitter;
pub use store::{SearchEngine, cosine_distance};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_matches_documented_values() {
        let config = ShardConfig::default();
        assert_eq!(config.segmentation.delimiters, ".!:;?\n\r");
        assert_eq!(config.quantization, QuantizationMode::Float16);
        assert_eq!(Granularity::default(), Granularity::Phrase);
    }

    #[test]
    fn candidates_render_with_distance() {
        assert_eq!(Candidate::new("Good my lord.", 0.25).to_string(), "Good my lord. (0.2500)");
    }
}
