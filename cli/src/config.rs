use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use multisearch::{
    EmbeddingModel, HashingEmbedder, QuantizationMode, SegmentationConfig, ShardConfig,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Embedding model shared by every command.
///
/// Archives only load with the exact model they were built with, so `build`
/// and `query` must agree on these values.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EmbedderSettings {
    #[serde(default = "EmbedderSettings::default_dimension")]
    pub dimension: usize,
    #[serde(default)]
    pub seed: u64,
}

impl EmbedderSettings {
    fn default_dimension() -> usize {
        256
    }

    /// Instantiates the configured model.
    pub fn build(&self) -> Result<Arc<dyn EmbeddingModel>> {
        let model = HashingEmbedder::new(self.dimension, self.seed)
            .with_context(|| format!("invalid embedder dimension {}", self.dimension))?;
        Ok(Arc::new(model))
    }
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            dimension: Self::default_dimension(),
            seed: 0,
        }
    }
}

/// Settings driving the `build` command.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BuildSettings {
    #[serde(default)]
    pub embedder: EmbedderSettings,
    /// Characters that end a sentence.
    #[serde(default = "BuildSettings::default_delimiters")]
    pub delimiters: String,
    /// Storage precision of the embeddings.
    #[serde(default)]
    pub quantization: QuantizationMode,
    /// Directory inside the archive that receives the registry.
    #[serde(default)]
    pub dirname: String,
    /// Optional flamegraph destination collected while building.
    #[serde(default)]
    pub profile_output: Option<PathBuf>,
}

impl BuildSettings {
    fn default_delimiters() -> String {
        SegmentationConfig::default().delimiters
    }

    /// Shard configuration for the registry being built.
    pub fn shard_config(&self) -> ShardConfig {
        ShardConfig {
            segmentation: SegmentationConfig {
                delimiters: self.delimiters.clone(),
            },
            quantization: self.quantization,
        }
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            embedder: EmbedderSettings::default(),
            delimiters: Self::default_delimiters(),
            quantization: QuantizationMode::default(),
            dirname: String::new(),
            profile_output: None,
        }
    }
}

/// Settings consumed by the `query` command.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct QuerySettings {
    #[serde(default)]
    pub embedder: EmbedderSettings,
    #[serde(default)]
    pub dirname: String,
    /// Result bound used when `--k` is not given.
    #[serde(default = "QuerySettings::default_k")]
    pub k: usize,
    /// Optional profiling output.
    #[serde(default)]
    pub profile_output: Option<PathBuf>,
}

impl QuerySettings {
    fn default_k() -> usize {
        5
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            embedder: EmbedderSettings::default(),
            dirname: String::new(),
            k: Self::default_k(),
            profile_output: None,
        }
    }
}

/// Settings for the `stats` command.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StatsSettings {
    #[serde(default)]
    pub embedder: EmbedderSettings,
    #[serde(default)]
    pub dirname: String,
}

/// Loads TOML settings for the requested command, falling back to defaults when missing.
pub fn load_settings<T>(command: &str, explicit: Option<PathBuf>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let (candidate, explicit_provided) = match explicit {
        Some(path) => (path, true),
        None => (PathBuf::from(format!("{command}.toml")), false),
    };

    if candidate.exists() {
        let raw = std::fs::read_to_string(&candidate).with_context(|| {
            format!(
                "failed to read configuration for `{command}` from {}",
                candidate.display()
            )
        })?;
        let parsed = toml::from_str(&raw).with_context(|| {
            format!(
                "failed to parse TOML configuration for `{command}` at {}",
                candidate.display()
            )
        })?;
        Ok(parsed)
    } else if explicit_provided {
        bail!(
            "configuration file for `{command}` not found at {}",
            candidate.display()
        );
    } else {
        Ok(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn load_settings_returns_default_when_missing() {
        let settings: BuildSettings =
            load_settings("no-such-command", None).expect("default settings");
        assert_eq!(settings, BuildSettings::default());
        assert_eq!(settings.delimiters, ".!:;?\n\r");
    }

    #[test]
    fn load_settings_errors_for_missing_explicit_path() {
        let result: Result<QuerySettings> =
            load_settings("query", Some(PathBuf::from("definitely_missing.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn load_settings_parses_toml_payload() {
        let file = NamedTempFile::new().expect("temp file");
        let path = file.into_temp_path();
        std::fs::write(
            &path,
            r#"quantization = "Int8"
delimiters = ".;"
dirname = "Dialogue"
profile_output = "profiles/build.svg"

[embedder]
dimension = 64
seed = 9
"#,
        )
        .expect("write config");

        let settings: BuildSettings =
            load_settings("build", Some(path.to_path_buf())).expect("parsed settings");
        assert_eq!(settings.quantization, QuantizationMode::Int8);
        assert_eq!(settings.dirname, "Dialogue");
        assert_eq!(
            settings.embedder,
            EmbedderSettings {
                dimension: 64,
                seed: 9
            }
        );
        assert_eq!(settings.shard_config().segmentation.delimiters, ".;");
        assert_eq!(
            settings.profile_output,
            Some(PathBuf::from("profiles/build.svg"))
        );
    }

    #[test]
    fn zero_dimension_embedder_is_rejected() {
        let settings = EmbedderSettings {
            dimension: 0,
            seed: 0,
        };
        assert!(settings.build().is_err());
    }
}
