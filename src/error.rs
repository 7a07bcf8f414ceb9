//! # Error types
//!
//! Typed failures for the store, the ingestion pipeline, the remote providers
//! and configuration validation. Application glue (`main`, command dispatch)
//! still speaks `Box<dyn Error>`; these enums convert into it through `?`.

use thiserror::Error;

/// Failures raised by [`MemoryStore`](crate::vector_store::MemoryStore) and the
/// retriever.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The named collection does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// The record id does not exist in the collection.
    #[error("record {id} not found in collection {collection}")]
    RecordNotFound { collection: String, id: String },

    /// Strict collection creation hit an existing name.
    #[error("collection already exists: {0}")]
    AlreadyExists(String),

    /// Embedding length disagrees with the collection's dimensionality.
    #[error("dimension mismatch in {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },
}

impl StoreError {
    /// `true` for both the collection and record flavors of not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::CollectionNotFound(_) | StoreError::RecordNotFound { .. }
        )
    }
}

/// A batch upsert stopped at `failed`; everything in `applied` stays in the store.
///
/// `failed` is `None` when no record was attempted (the collection is missing).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("batch upsert stopped at record {} after {} applied: {source}", .failed.as_deref().unwrap_or("<none>"), .applied.len())]
pub struct BatchUpsertError {
    pub applied: Vec<String>,
    pub failed: Option<String>,
    #[source]
    pub source: StoreError,
}

/// Failures from the remote embedding / chat-completion collaborators.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("rate limited: {0}")]
    RateLimited(String),
}

/// Failures while loading source rows into a collection.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The serialized vector in a row could not be parsed.
    #[error("row {row}: malformed embedding: {reason}")]
    MalformedEmbedding { row: usize, reason: String },

    /// The row itself could not be read or a non-vector column failed to parse.
    #[error("row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    /// A row parsed but the schema's required field was empty or absent.
    #[error("row {row}: missing field {field}")]
    MissingField { row: usize, field: &'static str },

    /// The header row lacks a column the schema requires.
    #[error("source has no column named {0:?}")]
    MissingColumn(String),

    /// The store rejected a parsed record.
    #[error("row {row}: {source}")]
    Rejected {
        row: usize,
        #[source]
        source: StoreError,
    },

    /// Abort policy: the run stopped at `row` after `ingested` records were kept.
    #[error("ingestion aborted at row {row} after {ingested} records: {source}")]
    Aborted {
        row: usize,
        ingested: usize,
        #[source]
        source: Box<IngestError>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),
}

impl IngestError {
    /// Row-scoped failures are subject to the malformed-row policy; anything
    /// else ends the run.
    pub fn row(&self) -> Option<usize> {
        match self {
            IngestError::MalformedEmbedding { row, .. }
            | IngestError::MalformedRow { row, .. }
            | IngestError::MissingField { row, .. }
            | IngestError::Rejected { row, .. } => Some(*row),
            _ => None,
        }
    }
}

/// Configuration validation failures. All of them are fatal at startup.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("API key is missing. Set api_key in config.yaml or export OPENAI_API_KEY")]
    MissingCredential,

    #[error("{0} missing. Set it in config.yaml")]
    Missing(&'static str),

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
}

/// Failures of one question-answering round.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
