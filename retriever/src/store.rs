use std::sync::Arc;

use embedder::EmbeddingModel;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Candidate, Granularity, QuantizationMode, ShardConfig};
use crate::io::{Archive, decode_matrix, encode_matrix, join_path};
use crate::shard::{Shard, ShardError};
use crate::splitter::SentenceSplitter;

const METADATA_FILE: &str = "SearchEngine.json";
const PHRASES_FILE: &str = "phrases.st";
const SENTENCES_FILE: &str = "sentences.st";

#[derive(Clone, Debug, PartialEq)]
struct SentenceRecord {
    text: String,
    embedding: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq)]
struct PhraseRecord {
    text: String,
    embedding: Vec<f32>,
    sentences: Vec<SentenceRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EngineMetadata {
    config: ShardConfig,
    dimension: usize,
    phrases: Vec<PhraseMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PhraseMetadata {
    text: String,
    sentences: Vec<String>,
}

/// Exact cosine-distance index over phrases and their sentences.
pub struct SearchEngine {
    embedder: Arc<dyn EmbeddingModel>,
    config: ShardConfig,
    splitter: SentenceSplitter,
    phrases: Vec<PhraseRecord>,
    sentence_count: usize,
}

impl SearchEngine {
    /// Constructs an empty engine using the supplied model and configuration.
    pub fn new(embedder: Arc<dyn EmbeddingModel>, config: ShardConfig) -> Self {
        let splitter = SentenceSplitter::new(&config.segmentation);
        Self {
            embedder,
            config,
            splitter,
            phrases: Vec::new(),
            sentence_count: 0,
        }
    }

    /// Embedding dimensionality of the bound model.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    fn encode_checked(&self, text: &str) -> Result<Vec<f32>, ShardError> {
        let vector = self.embedder.encode(text)?;
        if vector.len() != self.dimension() {
            return Err(ShardError::DimensionMismatch {
                expected: self.dimension(),
                found: vector.len(),
            });
        }
        Ok(vector)
    }

    fn embed_stored(&self, text: &str) -> Result<Vec<f32>, ShardError> {
        let vector = self.encode_checked(text)?;
        Ok(self.config.quantization.apply(&vector))
    }

    fn scored<'a>(&'a self, query: &[f32], granularity: Granularity) -> Vec<(&'a str, f32)> {
        match granularity {
            Granularity::Phrase => self
                .phrases
                .iter()
                .map(|phrase| {
                    (
                        phrase.text.as_str(),
                        cosine_distance(query, &phrase.embedding),
                    )
                })
                .collect(),
            Granularity::Sentence => self
                .phrases
                .iter()
                .flat_map(|phrase| phrase.sentences.iter())
                .map(|sentence| {
                    (
                        sentence.text.as_str(),
                        cosine_distance(query, &sentence.embedding),
                    )
                })
                .collect(),
        }
    }
}

impl Shard for SearchEngine {
    fn create(embedder: Arc<dyn EmbeddingModel>, config: &ShardConfig) -> Self {
        Self::new(embedder, config.clone())
    }

    fn config(&self) -> &ShardConfig {
        &self.config
    }

    fn add(&mut self, text: &str) -> Result<(), ShardError> {
        let embedding = self.embed_stored(text)?;
        let sentences = self
            .splitter
            .split(text)
            .into_iter()
            .map(|sentence| {
                let embedding = if sentence == text {
                    embedding.clone()
                } else {
                    self.embed_stored(&sentence)?
                };
                Ok(SentenceRecord {
                    text: sentence,
                    embedding,
                })
            })
            .collect::<Result<Vec<_>, ShardError>>()?;
        self.sentence_count += sentences.len();
        self.phrases.push(PhraseRecord {
            text: text.to_string(),
            embedding,
            sentences,
        });
        Ok(())
    }

    fn remove(&mut self, text: &str) -> usize {
        let before = self.phrases.len();
        self.phrases.retain(|phrase| phrase.text != text);
        let removed = before - self.phrases.len();
        if removed > 0 {
            self.sentence_count = self.phrases.iter().map(|p| p.sentences.len()).sum();
        }
        removed
    }

    fn phrases(&self) -> Vec<&str> {
        self.phrases.iter().map(|p| p.text.as_str()).collect()
    }

    fn sentences(&self) -> Vec<&str> {
        self.phrases
            .iter()
            .flat_map(|p| p.sentences.iter().map(|s| s.text.as_str()))
            .collect()
    }

    fn num_phrases(&self) -> usize {
        self.phrases.len()
    }

    fn num_sentences(&self) -> usize {
        self.sentence_count
    }

    fn search_text(
        &self,
        query: &str,
        k: Option<usize>,
        granularity: Granularity,
    ) -> Result<Vec<Candidate>, ShardError> {
        let query = self.encode_checked(query)?;
        self.search_vector(&query, k, granularity)
    }

    fn search_vector(
        &self,
        query: &[f32],
        k: Option<usize>,
        granularity: Granularity,
    ) -> Result<Vec<Candidate>, ShardError> {
        if query.len() != self.dimension() {
            return Err(ShardError::DimensionMismatch {
                expected: self.dimension(),
                found: query.len(),
            });
        }
        let mut scored = self.scored(query, granularity);
        // stable sort: equal distances keep insertion order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        if let Some(k) = k {
            scored.truncate(k);
        }
        Ok(scored
            .into_iter()
            .map(|(text, distance)| Candidate::new(text, distance))
            .collect())
    }

    fn rebind_embedder(&mut self, embedder: Arc<dyn EmbeddingModel>) {
        self.embedder = embedder;
    }

    fn save(&self, archive: &mut Archive, path: &str) -> Result<(), ShardError> {
        let dimension = self.dimension();
        let metadata = EngineMetadata {
            config: self.config.clone(),
            dimension,
            phrases: self
                .phrases
                .iter()
                .map(|p| PhraseMetadata {
                    text: p.text.clone(),
                    sentences: p.sentences.iter().map(|s| s.text.clone()).collect(),
                })
                .collect(),
        };
        archive.insert(
            &join_path(&[path, METADATA_FILE]),
            serde_json::to_vec(&metadata)?,
        );

        let mode = self.config.quantization;
        if !self.phrases.is_empty() {
            let data: Vec<f32> = self
                .phrases
                .iter()
                .flat_map(|p| p.embedding.iter().copied())
                .collect();
            let bytes = encode_matrix(&data, self.phrases.len(), dimension, mode)?;
            archive.insert(&join_path(&[path, PHRASES_FILE]), bytes);
        }
        if self.sentence_count > 0 {
            let data: Vec<f32> = self
                .phrases
                .iter()
                .flat_map(|p| p.sentences.iter())
                .flat_map(|s| s.embedding.iter().copied())
                .collect();
            let bytes = encode_matrix(&data, self.sentence_count, dimension, mode)?;
            archive.insert(&join_path(&[path, SENTENCES_FILE]), bytes);
        }
        debug!(
            path,
            phrases = self.phrases.len(),
            sentences = self.sentence_count,
            "shard saved"
        );
        Ok(())
    }

    fn load(
        embedder: Arc<dyn EmbeddingModel>,
        archive: &Archive,
        path: &str,
    ) -> Result<Self, ShardError> {
        let metadata: EngineMetadata =
            serde_json::from_slice(archive.get(&join_path(&[path, METADATA_FILE]))?)?;
        if metadata.dimension != embedder.dimension() {
            return Err(ShardError::DimensionMismatch {
                expected: embedder.dimension(),
                found: metadata.dimension,
            });
        }
        let mode = metadata.config.quantization;
        let phrase_rows = metadata.phrases.len();
        let sentence_rows: usize = metadata.phrases.iter().map(|p| p.sentences.len()).sum();
        let phrase_vectors = read_rows(
            archive,
            &join_path(&[path, PHRASES_FILE]),
            phrase_rows,
            metadata.dimension,
            mode,
        )?;
        let sentence_vectors = read_rows(
            archive,
            &join_path(&[path, SENTENCES_FILE]),
            sentence_rows,
            metadata.dimension,
            mode,
        )?;

        let mut engine = Self::new(embedder, metadata.config);
        let mut phrase_iter = phrase_vectors.into_iter();
        let mut sentence_iter = sentence_vectors.into_iter();
        for phrase in metadata.phrases {
            let embedding = phrase_iter.next().ok_or_else(|| {
                ShardError::InconsistentPayload("missing phrase embedding".to_string())
            })?;
            let sentences = phrase
                .sentences
                .into_iter()
                .map(|text| {
                    sentence_iter
                        .next()
                        .map(|embedding| SentenceRecord { text, embedding })
                        .ok_or_else(|| {
                            ShardError::InconsistentPayload(
                                "missing sentence embedding".to_string(),
                            )
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            engine.sentence_count += sentences.len();
            engine.phrases.push(PhraseRecord {
                text: phrase.text,
                embedding,
                sentences,
            });
        }
        debug!(
            path,
            phrases = engine.phrases.len(),
            sentences = engine.sentence_count,
            "shard loaded"
        );
        Ok(engine)
    }
}

fn read_rows(
    archive: &Archive,
    path: &str,
    rows: usize,
    dimension: usize,
    mode: QuantizationMode,
) -> Result<Vec<Vec<f32>>, ShardError> {
    if rows == 0 {
        return Ok(Vec::new());
    }
    if dimension == 0 {
        return Err(ShardError::InconsistentPayload(format!(
            "`{path}` declares {rows} rows of dimension zero"
        )));
    }
    let (data, found_rows, found_dims) = decode_matrix(archive.get(path)?, mode)?;
    if found_rows != rows || found_dims != dimension {
        return Err(ShardError::InconsistentPayload(format!(
            "`{path}` holds {found_rows}x{found_dims}, expected {rows}x{dimension}"
        )));
    }
    Ok(data.chunks(dimension).map(<[f32]>::to_vec).collect())
}

/// Cosine distance `1 - cos`, clamped at zero. Zero vectors are at distance 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64).powi(2);
        norm_b += (*y as f64).powi(2);
    }
    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return 1.0;
    }
    (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())).max(0.0) as f32
}
