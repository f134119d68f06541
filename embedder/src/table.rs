//! Lookup-table embedder used for deterministic fixtures.

use std::collections::HashMap;

use xxhash_rust::xxh64::Xxh64;

use crate::{EmbeddingError, EmbeddingModel};

const MODEL_NAME: &str = "table-embedder";

/// Maps known texts to fixed embeddings.
#[derive(Clone, Debug)]
pub struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    dimension: usize,
    identity: u64,
}

impl TableEmbedder {
    /// Creates a table embedder ensuring all embeddings share `dimension`.
    pub fn new(
        dimension: usize,
        table: HashMap<String, Vec<f32>>,
    ) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InvalidDimension);
        }
        for (key, values) in &table {
            if values.len() != dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    key: key.clone(),
                    expected: dimension,
                    found: values.len(),
                });
            }
        }
        let identity = table_identity(dimension, &table);
        Ok(Self {
            table,
            dimension,
            identity,
        })
    }

    /// Builds a table embedder from `(text, vector)` pairs.
    pub fn from_entries<I, S>(dimension: usize, entries: I) -> Result<Self, EmbeddingError>
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: Into<String>,
    {
        let table = entries
            .into_iter()
            .map(|(key, vector)| (key.into(), vector))
            .collect();
        Self::new(dimension, table)
    }

    /// Number of texts known to the table.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Reports whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl EmbeddingModel for TableEmbedder {
    fn name(&self) -> &str {
        MODEL_NAME
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    /// Unknown texts map to the zero vector.
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimension]))
    }

    fn identity_hash(&self) -> u64 {
        self.identity
    }
}

fn table_identity(dimension: usize, table: &HashMap<String, Vec<f32>>) -> u64 {
    let mut keys: Vec<&String> = table.keys().collect();
    keys.sort();
    let mut hasher = Xxh64::new(0);
    hasher.update(MODEL_NAME.as_bytes());
    hasher.update(&(dimension as u64).to_le_bytes());
    for key in keys {
        hasher.update(&(key.len() as u64).to_le_bytes());
        hasher.update(key.as_bytes());
        for value in &table[key] {
            hasher.update(&value.to_bits().to_le_bytes());
        }
    }
    hasher.digest()
}
