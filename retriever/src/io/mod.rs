//! Hierarchical byte-addressable container and tensor payload helpers.
//!
//! An [`Archive`] maps slash-separated paths to byte blobs and is persisted
//! as a single bincode file. Shards and the registry only ever address it by
//! path, so the file encoding can change without touching either.

mod tensors;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use bincode::Options;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

pub use tensors::{decode_matrix, encode_matrix};

const ARCHIVE_MAGIC: &str = "multisearch-archive";
const ARCHIVE_VERSION: u32 = 1;

/// Errors raised while reading or writing an [`Archive`].
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Filesystem interaction failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The container could not be encoded or decoded.
    #[error("bincode error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),
    /// The file is not an archive produced by this crate.
    #[error("not a multisearch archive")]
    InvalidFormat,
    /// The archive was written by an incompatible format revision.
    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u32),
    /// A required entry is absent.
    #[error("archive entry `{0}` not found")]
    MissingEntry(String),
    /// A text entry does not hold valid UTF-8.
    #[error("archive entry `{path}` is not valid utf-8")]
    InvalidUtf8 { path: String },
}

/// Errors raised while encoding or decoding tensor payloads.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// safetensors encoding or decoding failed.
    #[error("safetensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),
    /// The payload dtype does not match the expected storage precision.
    #[error("expected tensor dtype {expected:?}, found {found:?}")]
    UnsupportedDType {
        expected: safetensors::Dtype,
        found: safetensors::Dtype,
    },
    /// Payload length or rank does not match the declared shape.
    #[error("tensor shape mismatch (expected {expected}, found {found})")]
    InvalidShape { expected: usize, found: usize },
}

/// In-memory view of a container file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Archive {
    entries: BTreeMap<String, Vec<u8>>,
}

#[derive(Deserialize)]
struct ArchiveFile {
    magic: String,
    version: u32,
    entries: BTreeMap<String, Vec<u8>>,
}

/// Borrowed twin of [`ArchiveFile`]; both encode to the same bytes.
#[derive(Serialize)]
struct ArchiveFileRef<'a> {
    magic: &'a str,
    version: u32,
    entries: &'a BTreeMap<String, Vec<u8>>,
}

impl Archive {
    /// Creates an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether the archive holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores `bytes` under `path`, replacing any previous entry.
    pub fn insert(&mut self, path: &str, bytes: Vec<u8>) {
        self.entries.insert(normalize_path(path), bytes);
    }

    /// Stores UTF-8 text under `path`.
    pub fn insert_text(&mut self, path: &str, text: &str) {
        self.insert(path, text.as_bytes().to_vec());
    }

    /// Reports whether `path` is present.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&normalize_path(path))
    }

    /// Returns the bytes stored under `path`.
    pub fn get(&self, path: &str) -> Result<&[u8], ArchiveError> {
        let key = normalize_path(path);
        self.entries
            .get(&key)
            .map(Vec::as_slice)
            .ok_or(ArchiveError::MissingEntry(key))
    }

    /// Returns the text stored under `path`.
    pub fn get_text(&self, path: &str) -> Result<&str, ArchiveError> {
        let bytes = self.get(path)?;
        std::str::from_utf8(bytes).map_err(|_| ArchiveError::InvalidUtf8 {
            path: normalize_path(path),
        })
    }

    /// Drops every entry at or below `prefix`, returning how many were removed.
    /// An empty prefix clears the archive.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let prefix = normalize_path(prefix);
        let before = self.entries.len();
        if prefix.is_empty() {
            self.entries.clear();
        } else {
            let nested = format!("{prefix}/");
            self.entries
                .retain(|key, _| key != &prefix && !key.starts_with(&nested));
        }
        before - self.entries.len()
    }

    /// Iterates entry paths in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// Writes the archive to a single file at `path`.
    ///
    /// The bytes go to a temporary file in the same directory which then
    /// replaces `path`, so an interrupted write leaves the previous file intact.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ArchiveError> {
        let path = path.as_ref();
        let file = ArchiveFileRef {
            magic: ARCHIVE_MAGIC,
            version: ARCHIVE_VERSION,
            entries: &self.entries,
        };
        let bytes = bincode::DefaultOptions::new().serialize(&file)?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(parent)?;
        staged.write_all(&bytes)?;
        staged.as_file().sync_all()?;
        staged.persist(path).map_err(|err| err.error)?;
        Ok(())
    }

    /// Reads an archive previously written with [`Archive::write_to`].
    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        let file: ArchiveFile = bincode::DefaultOptions::new()
            .with_limit(bytes.len() as u64)
            .deserialize(&bytes)?;
        if file.magic != ARCHIVE_MAGIC {
            return Err(ArchiveError::InvalidFormat);
        }
        if file.version != ARCHIVE_VERSION {
            return Err(ArchiveError::UnsupportedVersion(file.version));
        }
        Ok(Self {
            entries: file.entries,
        })
    }
}

/// Canonical form of an entry path: no empty, leading or trailing components.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Joins path components with `/`, skipping empty ones.
pub fn join_path(parts: &[&str]) -> String {
    normalize_path(&parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn archive_round_trip() {
        let mut archive = Archive::new();
        archive.insert_text("base/meta.json", "{}");
        archive.insert("base/Dialogues/a/vectors.st", vec![1, 2, 3]);
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.bin");
        archive.write_to(&path).unwrap();

        let restored = Archive::read_from(&path).unwrap();
        assert_eq!(restored, archive);
        assert_eq!(restored.get_text("base/meta.json").unwrap(), "{}");
        assert_eq!(
            restored.paths().collect::<Vec<_>>(),
            vec!["base/Dialogues/a/vectors.st", "base/meta.json"]
        );
    }

    #[test]
    fn paths_are_normalised_on_insert_and_lookup() {
        let mut archive = Archive::new();
        archive.insert("/Dialogues//x/", vec![7]);
        assert!(archive.contains("Dialogues/x"));
        assert_eq!(archive.get("//Dialogues/x").unwrap(), &[7]);
        assert_eq!(join_path(&["", "Dialogues", "x"]), "Dialogues/x");
    }

    #[test]
    fn remove_prefix_only_touches_the_subtree() {
        let mut archive = Archive::new();
        archive.insert("base/a.json", vec![1]);
        archive.insert("base/Dialogues/x/b.st", vec![2]);
        archive.insert("basement/c.json", vec![3]);
        assert_eq!(archive.remove_prefix("base/"), 2);
        assert_eq!(archive.paths().collect::<Vec<_>>(), vec!["basement/c.json"]);
        assert_eq!(archive.remove_prefix(""), 1);
        assert!(archive.is_empty());
    }

    #[test]
    fn missing_entries_are_reported_by_path() {
        let archive = Archive::new();
        let err = archive.get("nope.txt").unwrap_err();
        assert!(matches!(err, ArchiveError::MissingEntry(ref path) if path == "nope.txt"));
    }

    #[test]
    fn non_utf8_text_is_rejected() {
        let mut archive = Archive::new();
        archive.insert("bad.txt", vec![0xff, 0xfe]);
        assert!(matches!(
            archive.get_text("bad.txt"),
            Err(ArchiveError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn garbage_files_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.bin");
        std::fs::write(&path, b"definitely not an archive").unwrap();
        assert!(Archive::read_from(&path).is_err());
    }

    #[test]
    fn writing_replaces_an_existing_file_without_leftovers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.bin");
        std::fs::write(&path, b"stale bytes from an older run").unwrap();

        let mut archive = Archive::new();
        archive.insert_text("base/meta.json", "{}");
        archive.write_to(&path).unwrap();

        assert_eq!(Archive::read_from(&path).unwrap(), archive);
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("store.bin")]);
    }

    #[test]
    fn failed_write_keeps_the_previous_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.bin");
        let mut previous = Archive::new();
        previous.insert_text("kept.txt", "still here");
        previous.write_to(&path).unwrap();

        let target = dir.path().join("missing").join("store.bin");
        let err = Archive::new().write_to(&target).unwrap_err();
        assert!(matches!(err, ArchiveError::Io(_)));
        assert!(!target.exists());
        assert_eq!(Archive::read_from(&path).unwrap(), previous);
    }

    #[test]
    fn foreign_magic_and_newer_versions_are_distinguished() {
        #[derive(Serialize)]
        struct Header<'a> {
            magic: &'a str,
            version: u32,
            entries: BTreeMap<String, Vec<u8>>,
        }
        let dir = tempdir().unwrap();
        let write = |name: &str, magic: &str, version: u32| {
            let path = dir.path().join(name);
            let bytes = bincode::DefaultOptions::new()
                .serialize(&Header { magic, version, entries: BTreeMap::new() })
                .unwrap();
            std::fs::write(&path, bytes).unwrap();
            path
        };
        let foreign = write("foreign.bin", "someone-else", ARCHIVE_VERSION);
        let newer = write("newer.bin", ARCHIVE_MAGIC, ARCHIVE_VERSION + 1);
        assert!(matches!(Archive::read_from(foreign), Err(ArchiveError::InvalidFormat)));
        assert!(matches!(
            Archive::read_from(newer),
            Err(ArchiveError::UnsupportedVersion(v)) if v == ARCHIVE_VERSION + 1
        ));
    }

    #[test]
    fn missing_files_surface_io_errors() {
        let dir = tempdir().unwrap();
        let err = Archive::read_from(dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, ArchiveError::Io(_)));
    }
}
