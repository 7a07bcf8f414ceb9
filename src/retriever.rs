//! # Retriever
//!
//! Exact nearest-neighbor retrieval over a [`Collection`].
//!
//! Every record's embedding is scored against the query with cosine
//! similarity, records under the relevance threshold are dropped, and the best
//! `k` come back in descending order. Equal scores rank by insertion order, so
//! the output is fully deterministic.
//!
//! The scan is linear. At tens of thousands of records a full pass costs a few
//! milliseconds, so there is no approximate index to build or keep in sync.
//! Scoring fans out over `rayon` once a collection is large enough to benefit.
//!
//! ```rust
//! use olympiq::record::Record;
//! use olympiq::retriever::nearest;
//! use olympiq::vector_store::MemoryStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! store.create_collection("test")?;
//! store.upsert("test", Record::new("A", "gold medal curling", vec![1.0, 0.0, 0.0]))?;
//! store.upsert("test", Record::new("B", "unrelated topic", vec![0.0, 1.0, 0.0]))?;
//!
//! let hits = nearest(&store, "test", &[0.9, 0.1, 0.0], 1, 0.5)?;
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].record.id(), "A");
//! # Ok(()) }
//! ```

use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

use crate::api::EmbeddingProvider;
use crate::error::{QueryError, StoreError};
use crate::record::{Record, RecordMetadata};
use crate::vector_store::{Collection, MemoryStore};

/// Below this many records the scan stays on the calling thread.
const PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// A record paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: Record,
    pub similarity: f64,
}

/// Cosine similarity of two vectors.
///
/// Returns `0.0` when either vector has zero magnitude, and compares only the
/// common prefix if lengths differ (callers check dimensions first).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut mag_a, mut mag_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a.sqrt() * mag_b.sqrt())
}

/// Rank the records of `collection` against `query`.
///
/// Fails with `DimensionMismatch` when the query length disagrees with the
/// collection. An empty collection accepts any query and yields nothing.
pub fn search_collection(
    collection: &Collection,
    query: &[f32],
    k: usize,
    min_relevance: f64,
) -> Result<Vec<ScoredRecord>, StoreError> {
    collection.check_dimension(query.len())?;
    if k == 0 || collection.is_empty() {
        return Ok(Vec::new());
    }

    let records = collection.records();
    let score = |(pos, rec): (usize, &Record)| {
        let sim = cosine_similarity(query, rec.embedding());
        (sim >= min_relevance).then_some((pos, sim))
    };

    let mut candidates: Vec<(usize, f64)> = if records.len() >= PARALLEL_SCAN_THRESHOLD {
        records.par_iter().enumerate().filter_map(score).collect()
    } else {
        records.iter().enumerate().filter_map(score).collect()
    };

    // Descending similarity, then ascending insertion position.
    let rank = |a: &(usize, f64), b: &(usize, f64)| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    };

    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, rank);
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(rank);

    debug!(
        collection = collection.name(),
        scanned = records.len(),
        returned = candidates.len(),
        "similarity scan"
    );

    Ok(candidates
        .into_iter()
        .map(|(pos, similarity)| ScoredRecord {
            record: records[pos].clone(),
            similarity,
        })
        .collect())
}

/// Top-`k` records of collection `name` with similarity `>= min_relevance`.
pub fn nearest(
    store: &MemoryStore,
    name: &str,
    query: &[f32],
    k: usize,
    min_relevance: f64,
) -> Result<Vec<ScoredRecord>, StoreError> {
    let collection = store.get_collection(name)?;
    let guard = collection.read();
    search_collection(&guard, query, k, min_relevance)
}

/// One hit of a text query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryQueryResult {
    pub id: String,
    pub text: String,
    pub relevance: f64,
    pub metadata: RecordMetadata,
    pub is_reference: bool,
}

impl From<ScoredRecord> for MemoryQueryResult {
    fn from(hit: ScoredRecord) -> Self {
        Self {
            id: hit.record.id().to_string(),
            text: hit.record.text().to_string(),
            relevance: hit.similarity,
            metadata: hit.record.metadata().clone(),
            is_reference: hit.record.is_reference(),
        }
    }
}

/// Text-level access to a [`MemoryStore`]: queries and saved passages are
/// embedded with `E` before touching the store.
pub struct SemanticMemory<'a, E> {
    store: &'a MemoryStore,
    embedder: E,
}

impl<'a, E: EmbeddingProvider> SemanticMemory<'a, E> {
    pub fn new(store: &'a MemoryStore, embedder: E) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &MemoryStore {
        self.store
    }

    /// Embed `query` and return up to `limit` matches from `collection`.
    ///
    /// The collection is checked before the embedding call so a typo in the
    /// name costs no remote request.
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        min_relevance: f64,
    ) -> Result<Vec<MemoryQueryResult>, QueryError> {
        self.store.get_collection(collection)?;
        let vector = self.embedder.embed(query).await?;
        let hits = nearest(self.store, collection, &vector, limit, min_relevance)?;
        Ok(hits.into_iter().map(MemoryQueryResult::from).collect())
    }

    /// Embed `text` and upsert it as a locally generated record.
    pub async fn save_information(
        &self,
        collection: &str,
        id: &str,
        text: &str,
        description: Option<&str>,
    ) -> Result<(), QueryError> {
        self.store.create_collection(collection)?;
        let vector = self.embedder.embed(text).await?;
        let metadata = RecordMetadata {
            description: description.map(str::to_string),
            ..Default::default()
        };
        self.store
            .upsert(collection, Record::new(id, text, vector).with_metadata(metadata))?;
        Ok(())
    }
}
