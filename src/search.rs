//! Search across the shards of a registry.
//!
//! A selection of exactly one shard is answered by that shard directly. Any
//! other selection embeds the query once, searches every selected shard in
//! parallel with the shared embedding and merges the partial lists into one
//! ranking ascending by distance.

use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Instant;

use rayon::prelude::*;
use retriever::{Candidate, Granularity, Shard};
use tracing::debug;

use crate::error::RegistryError;
use crate::registry::ShardRegistry;
use crate::shard_id::ShardId;

/// Ranked texts with their distances, index-aligned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchResults {
    pub texts: Vec<String>,
    pub distances: Vec<f32>,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Iterates `(text, distance)` pairs in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.texts
            .iter()
            .map(String::as_str)
            .zip(self.distances.iter().copied())
    }
}

impl From<Vec<Candidate>> for SearchResults {
    fn from(candidates: Vec<Candidate>) -> Self {
        let mut results = SearchResults {
            texts: Vec::with_capacity(candidates.len()),
            distances: Vec::with_capacity(candidates.len()),
        };
        for candidate in candidates {
            results.texts.push(candidate.text);
            results.distances.push(candidate.distance);
        }
        results
    }
}

/// When to take the parallel path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FanOut {
    /// Single-shard selections are answered by the shard itself.
    #[default]
    Auto,
    /// Always embed once and merge, even for one shard.
    Always,
}

/// Shared flag that aborts an in-flight search.
///
/// Shards that have not started when the flag is raised are skipped and the
/// search returns [`RegistryError::Cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

/// Parameters of [`ShardRegistry::search_with`].
#[derive(Clone, Debug, Default)]
pub struct SearchRequest {
    /// Result bound; `None` returns every candidate.
    pub k: Option<usize>,
    /// Shard selection; `None` searches every shard.
    pub shard: Option<ShardId>,
    pub granularity: Granularity,
    pub fan_out: FanOut,
    pub cancel: Option<CancelFlag>,
}

impl SearchRequest {
    pub fn new(k: Option<usize>) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }

    pub fn in_shard(mut self, shard: impl Into<ShardId>) -> Self {
        self.shard = Some(shard.into());
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn cancel_on(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

struct Ranked<'a> {
    shard: &'a ShardId,
    rank: usize,
    candidate: Candidate,
}

/// Distance first, then shard id, then the rank inside the shard.
fn merge_order(a: &Ranked<'_>, b: &Ranked<'_>) -> Ordering {
    a.candidate
        .distance
        .total_cmp(&b.candidate.distance)
        .then_with(|| a.shard.cmp(b.shard))
        .then_with(|| a.rank.cmp(&b.rank))
}

impl<S: Shard> ShardRegistry<S> {
    /// Searches the selected shards for texts closest to `query`.
    pub fn search(
        &self,
        query: &str,
        k: Option<usize>,
        shard: Option<&ShardId>,
        granularity: Granularity,
    ) -> Result<SearchResults, RegistryError> {
        let request = SearchRequest {
            k,
            shard: shard.cloned(),
            granularity,
            ..SearchRequest::default()
        };
        self.search_with(query, &request)
    }

    pub fn search_phrases(
        &self,
        query: &str,
        k: Option<usize>,
        shard: Option<&ShardId>,
    ) -> Result<SearchResults, RegistryError> {
        self.search(query, k, shard, Granularity::Phrase)
    }

    pub fn search_sentences(
        &self,
        query: &str,
        k: Option<usize>,
        shard: Option<&ShardId>,
    ) -> Result<SearchResults, RegistryError> {
        self.search(query, k, shard, Granularity::Sentence)
    }

    /// Searches with full control over the execution path.
    ///
    /// Shard failures abort the whole search; partial results are never
    /// returned.
    pub fn search_with(
        &self,
        query: &str,
        request: &SearchRequest,
    ) -> Result<SearchResults, RegistryError> {
        let selected = self.filter(request.shard.as_ref())?;
        if selected.is_empty() {
            return Ok(SearchResults::default());
        }
        if request.is_cancelled() {
            return Err(RegistryError::Cancelled);
        }

        if selected.len() == 1 && request.fan_out == FanOut::Auto {
            let (_, shard) = selected[0];
            let candidates = shard.search_text(query, request.k, request.granularity)?;
            return Ok(candidates.into());
        }

        let start = Instant::now();
        let embedding = self.embedder().encode(query)?;

        let partials: Vec<Result<Vec<Ranked<'_>>, RegistryError>> = selected
            .par_iter()
            .map(|&(id, shard)| {
                if request.is_cancelled() {
                    return Err(RegistryError::Cancelled);
                }
                let candidates = shard.search_vector(&embedding, request.k, request.granularity)?;
                Ok(candidates
                    .into_iter()
                    .enumerate()
                    .map(|(rank, candidate)| Ranked {
                        shard: id,
                        rank,
                        candidate,
                    })
                    .collect())
            })
            .collect();

        let mut pool = Vec::new();
        for partial in partials {
            pool.extend(partial?);
        }
        let pooled = pool.len();
        pool.sort_by(merge_order);
        if let Some(k) = request.k {
            pool.truncate(k);
        }

        debug!(
            shards = selected.len(),
            pooled,
            returned = pool.len(),
            latency_us = start.elapsed().as_micros() as u64,
            "merged shard results"
        );
        Ok(pool
            .into_iter()
            .map(|ranked| ranked.candidate)
            .collect::<Vec<_>>()
            .into())
    }
}
