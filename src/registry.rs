//! Routing of text operations to shards keyed by [`ShardId`].
//!
//! Shards are created lazily on the first `add` for a new id and bound to the
//! configuration captured when the registry was built. Removing text never
//! drops a shard; an emptied shard stays registered until the registry goes.

use std::collections::HashMap;
use std::sync::Arc;

use embedder::EmbeddingModel;
use retriever::{Granularity, SearchEngine, Shard, ShardConfig};
use tracing::debug;

use crate::error::RegistryError;
use crate::shard_id::ShardId;

/// Ordered collection of shards sharing one embedding model.
pub struct ShardRegistry<S = SearchEngine> {
    embedder: Arc<dyn EmbeddingModel>,
    config: ShardConfig,
    shards: Vec<(ShardId, S)>,
    offsets: HashMap<ShardId, usize>,
}

impl<S: Shard> ShardRegistry<S> {
    /// Creates an empty registry; `config` applies to every shard created later.
    pub fn new(embedder: Arc<dyn EmbeddingModel>, config: ShardConfig) -> Self {
        Self {
            embedder,
            config,
            shards: Vec::new(),
            offsets: HashMap::new(),
        }
    }

    /// Creates an empty registry with default segmentation and quantization.
    pub fn with_defaults(embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self::new(embedder, ShardConfig::default())
    }

    /// Assembles a registry from already constructed shards, keeping their order.
    pub(crate) fn from_shards(
        embedder: Arc<dyn EmbeddingModel>,
        config: ShardConfig,
        shards: Vec<(ShardId, S)>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new(embedder, config);
        for (id, shard) in shards {
            let id = id.canonical().clone();
            if registry.offsets.contains_key(&id) {
                return Err(RegistryError::CorruptManifest(format!(
                    "shard `{id}` listed twice"
                )));
            }
            registry.offsets.insert(id.clone(), registry.shards.len());
            registry.shards.push((id, shard));
        }
        Ok(registry)
    }

    /// Shared embedding model.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingModel> {
        &self.embedder
    }

    /// Rebinds the embedding model of the registry and of every shard.
    ///
    /// Stored vectors are not recomputed, so once any shard exists the new
    /// model must carry the same identity hash as the current one.
    pub fn set_embedder(&mut self, embedder: Arc<dyn EmbeddingModel>) -> Result<(), RegistryError> {
        let current = self.embedder.identity_hash();
        let supplied = embedder.identity_hash();
        if !self.shards.is_empty() && current != supplied {
            return Err(RegistryError::EmbedderMismatch { current, supplied });
        }
        for (_, shard) in &mut self.shards {
            shard.rebind_embedder(Arc::clone(&embedder));
        }
        self.embedder = embedder;
        Ok(())
    }

    /// Configuration handed to newly created shards.
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    /// Number of registered shards.
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Reports whether no shard has been created yet.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Reports whether `id` is registered.
    pub fn contains(&self, id: &ShardId) -> bool {
        self.offsets.contains_key(id.canonical())
    }

    /// Registered ids in registry order.
    pub fn shard_ids(&self) -> impl Iterator<Item = &ShardId> + '_ {
        self.shards.iter().map(|(id, _)| id)
    }

    /// Registered shards with their ids, in registry order.
    pub fn shards(&self) -> impl Iterator<Item = (&ShardId, &S)> + '_ {
        self.shards.iter().map(|(id, shard)| (id, shard))
    }

    /// Direct access to one shard.
    pub fn shard(&self, id: &ShardId) -> Option<&S> {
        self.offsets
            .get(id.canonical())
            .map(|&offset| &self.shards[offset].1)
    }

    /// Adds `text` to `shard`, creating the shard on first use.
    pub fn add(&mut self, text: &str, shard: impl Into<ShardId>) -> Result<(), RegistryError> {
        let id = shard.into().canonical().clone();
        let offset = match self.offsets.get(&id) {
            Some(&offset) => offset,
            None => {
                let created = S::create(Arc::clone(&self.embedder), &self.config);
                let offset = self.shards.len();
                debug!(shard = %id, offset, "created shard");
                self.offsets.insert(id.clone(), offset);
                self.shards.push((id, created));
                offset
            }
        };
        self.shards[offset].1.add(text)?;
        Ok(())
    }

    /// Resolves a shard selection: `None` is every shard in registry order,
    /// `Some(id)` exactly that shard.
    pub fn filter(&self, shard: Option<&ShardId>) -> Result<Vec<(&ShardId, &S)>, RegistryError> {
        match shard {
            None => Ok(self.shards().collect()),
            Some(id) => {
                let offset = self.offset_of(id)?;
                let (id, shard) = &self.shards[offset];
                Ok(vec![(id, shard)])
            }
        }
    }

    fn offset_of(&self, id: &ShardId) -> Result<usize, RegistryError> {
        let id = id.canonical();
        self.offsets
            .get(id)
            .copied()
            .ok_or_else(|| RegistryError::ShardNotFound(id.clone()))
    }

    /// Removes every phrase equal to `text` from the selected shards and
    /// returns how many were removed in total.
    pub fn remove(&mut self, text: &str, shard: Option<&ShardId>) -> Result<usize, RegistryError> {
        let removed = match shard {
            None => self
                .shards
                .iter_mut()
                .map(|(_, shard)| shard.remove(text))
                .sum(),
            Some(id) => {
                let offset = self.offset_of(id)?;
                self.shards[offset].1.remove(text)
            }
        };
        debug!(removed, "removed text");
        Ok(removed)
    }

    /// Concatenates the phrases or sentences of the selected shards.
    pub fn get(
        &self,
        shard: Option<&ShardId>,
        granularity: Granularity,
    ) -> Result<Vec<&str>, RegistryError> {
        let mut texts = Vec::new();
        for (_, shard) in self.filter(shard)? {
            match granularity {
                Granularity::Phrase => texts.extend(shard.phrases()),
                Granularity::Sentence => texts.extend(shard.sentences()),
            }
        }
        Ok(texts)
    }

    /// Phrases of the selected shards.
    pub fn get_phrases(&self, shard: Option<&ShardId>) -> Result<Vec<&str>, RegistryError> {
        self.get(shard, Granularity::Phrase)
    }

    /// Sentences of the selected shards.
    pub fn get_sentences(&self, shard: Option<&ShardId>) -> Result<Vec<&str>, RegistryError> {
        self.get(shard, Granularity::Sentence)
    }

    /// Phrase count over the selected shards.
    pub fn num_phrases(&self, shard: Option<&ShardId>) -> Result<usize, RegistryError> {
        Ok(self
            .filter(shard)?
            .into_iter()
            .map(|(_, shard)| shard.num_phrases())
            .sum())
    }

    /// Sentence count over the selected shards.
    pub fn num_sentences(&self, shard: Option<&ShardId>) -> Result<usize, RegistryError> {
        Ok(self
            .filter(shard)?
            .into_iter()
            .map(|(_, shard)| shard.num_sentences())
            .sum())
    }
}
