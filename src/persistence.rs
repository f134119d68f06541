//! Registry persistence with an embedding-model integrity check.
//!
//! Layout below `dirname` inside an [`Archive`]:
//!
//! * `MultiSearchEngine.json`: [`RegistryMetadata`].
//! * `EmbedderHash.txt`: decimal identity hash of the model used at save time.
//! * `EngineEntries.csv`: two lines per shard, the literal id followed by the
//!   sub-path the shard was written under.
//! * `Dialogues/<escaped id>/...`: shard state, owned by the shard.

use std::path::Path;
use std::sync::Arc;

use embedder::EmbeddingModel;
use retriever::{Archive, ArchiveError, Shard, join_path};
use tracing::{debug, info, warn};

use crate::config::RegistryMetadata;
use crate::error::RegistryError;
use crate::registry::ShardRegistry;
use crate::shard_id::ShardId;

pub const METADATA_FILE: &str = "MultiSearchEngine.json";
pub const EMBEDDER_HASH_FILE: &str = "EmbedderHash.txt";
pub const MANIFEST_FILE: &str = "EngineEntries.csv";
pub const SHARD_DIR: &str = "Dialogues";

/// Path segment of the default shard. `~` never survives escaping of a named id.
const DEFAULT_SEGMENT: &str = "~default";

/// Maps a shard id to a path segment, injectively.
///
/// ASCII alphanumerics, `-`, `_` and any `.` that is not the first character
/// are kept; every other byte of the UTF-8 form is written as `%XX`.
pub fn escape_shard_id(id: &ShardId) -> String {
    let name = match id.canonical() {
        ShardId::Default => return DEFAULT_SEGMENT.to_string(),
        ShardId::Named(name) => name,
    };
    let mut escaped = String::with_capacity(name.len());
    for (index, byte) in name.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric()
            || byte == b'-'
            || byte == b'_'
            || (byte == b'.' && index > 0);
        if keep {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&format!("%{byte:02X}"));
        }
    }
    escaped
}

/// Sub-path a shard is written under.
pub fn shard_path(dirname: &str, id: &ShardId) -> String {
    join_path(&[dirname, SHARD_DIR, &escape_shard_id(id)])
}

fn encode_manifest(entries: &[(&ShardId, String)]) -> Result<String, RegistryError> {
    let mut manifest = String::new();
    for (id, path) in entries {
        if id.as_str().contains(['\n', '\r']) {
            return Err(RegistryError::UnencodableShardId((*id).clone()));
        }
        manifest.push_str(id.as_str());
        manifest.push('\n');
        manifest.push_str(path);
        manifest.push('\n');
    }
    Ok(manifest)
}

fn decode_manifest(text: &str) -> Result<Vec<(ShardId, String)>, RegistryError> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() % 2 != 0 {
        return Err(RegistryError::CorruptManifest(format!(
            "expected pairs of lines, found {} lines",
            lines.len()
        )));
    }
    Ok(lines
        .chunks(2)
        .map(|pair| (ShardId::from(pair[0]), pair[1].to_string()))
        .collect())
}

fn open_for_update(path: &Path) -> Result<Archive, RegistryError> {
    match Archive::read_from(path) {
        Ok(archive) => Ok(archive),
        Err(ArchiveError::Io(err)) => Err(ArchiveError::Io(err).into()),
        Err(err) => {
            warn!(path = %path.display(), %err, "existing file is not a readable archive, replacing it");
            Ok(Archive::new())
        }
    }
}

fn parse_fingerprint(text: &str) -> Result<u64, RegistryError> {
    let trimmed = text.trim();
    trimmed
        .parse()
        .map_err(|_| RegistryError::InvalidFingerprint(trimmed.to_string()))
}

impl<S: Shard> ShardRegistry<S> {
    /// Saves the registry under `dirname` into the archive file at `path`.
    ///
    /// Entries of an existing archive outside `dirname` are preserved; the
    /// `dirname` subtree is replaced. A file at `path` that is not a readable
    /// archive is overwritten.
    pub fn save<P: AsRef<Path>>(&self, path: P, dirname: &str) -> Result<(), RegistryError> {
        let path = path.as_ref();
        let mut archive = if path.exists() {
            open_for_update(path)?
        } else {
            Archive::new()
        };
        let stale = archive.remove_prefix(dirname);
        if stale > 0 {
            debug!(dirname, stale, "replacing previous registry entries");
        }
        self.save_to_archive(&mut archive, dirname)?;
        archive.write_to(path)?;
        info!(
            path = %path.display(),
            dirname,
            shards = self.len(),
            "registry saved"
        );
        Ok(())
    }

    /// Writes metadata, fingerprint, every shard in registry order and the
    /// manifest into `archive`.
    pub fn save_to_archive(&self, archive: &mut Archive, dirname: &str) -> Result<(), RegistryError> {
        let entries: Vec<(&ShardId, String)> = self
            .shard_ids()
            .map(|id| (id, shard_path(dirname, id)))
            .collect();
        let manifest = encode_manifest(&entries)?;

        let metadata = RegistryMetadata::new(self.config(), self.embedder().name());
        archive.insert(
            &join_path(&[dirname, METADATA_FILE]),
            serde_json::to_vec_pretty(&metadata)?,
        );
        archive.insert_text(
            &join_path(&[dirname, EMBEDDER_HASH_FILE]),
            &self.embedder().identity_hash().to_string(),
        );
        for ((_, shard), (_, sub_path)) in self.shards().zip(&entries) {
            shard.save(archive, sub_path)?;
        }
        archive.insert_text(&join_path(&[dirname, MANIFEST_FILE]), &manifest);
        Ok(())
    }

    /// Loads a registry saved under `dirname` in the archive file at `path`.
    pub fn load<P: AsRef<Path>>(
        embedder: Arc<dyn EmbeddingModel>,
        path: P,
        dirname: &str,
    ) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let archive = Archive::read_from(path)?;
        Self::load_from_archive(embedder, &archive, &path.display().to_string(), dirname)
    }

    /// Loads a registry from an in-memory archive. `path_label` names the
    /// archive in errors.
    ///
    /// The stored fingerprint is checked before any shard is read; on any
    /// failure nothing is returned.
    pub fn load_from_archive(
        embedder: Arc<dyn EmbeddingModel>,
        archive: &Archive,
        path_label: &str,
        dirname: &str,
    ) -> Result<Self, RegistryError> {
        let metadata: RegistryMetadata =
            serde_json::from_slice(archive.get(&join_path(&[dirname, METADATA_FILE]))?)?;

        let stored = parse_fingerprint(archive.get_text(&join_path(&[dirname, EMBEDDER_HASH_FILE]))?)?;
        let supplied = embedder.identity_hash();
        if stored != supplied {
            warn!(
                path = path_label,
                dirname,
                stored,
                supplied,
                stored_model = %metadata.embedder,
                "embedding model does not match archive"
            );
            return Err(RegistryError::IncompatibleEmbeddingModel {
                path: path_label.to_string(),
                stored,
                supplied,
            });
        }

        let manifest = decode_manifest(archive.get_text(&join_path(&[dirname, MANIFEST_FILE]))?)?;
        let mut shards = Vec::with_capacity(manifest.len());
        for (id, sub_path) in manifest {
            let shard = S::load(Arc::clone(&embedder), archive, &sub_path)?;
            shards.push((id, shard));
        }

        let registry = Self::from_shards(embedder, metadata.shard_config(), shards)?;
        info!(
            path = path_label,
            dirname,
            shards = registry.len(),
            "registry loaded"
        );
        Ok(registry)
    }
}
