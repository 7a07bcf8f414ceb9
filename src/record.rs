//! # Records
//!
//! A [`Record`] is the unit of stored content: an id, the passage text, its
//! embedding vector and a few optional annotations. Records are immutable once
//! built; the store replaces them wholesale on upsert and never patches one in
//! place.
//!
//! ## Quick start
//! ```rust
//! use olympiq::record::{Record, RecordMetadata};
//!
//! let rec = Record::new("PK_0", "Curling at the 2022 Winter Olympics", vec![1.0, 0.0, 0.0])
//!     .with_metadata(RecordMetadata::default().with_description("Wikipedia section"))
//!     .as_reference();
//!
//! assert_eq!(rec.id(), "PK_0");
//! assert_eq!(rec.dimension(), 3);
//! assert!(rec.is_reference());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Optional key-value annotations carried alongside a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Free-form description of the passage.
    pub description: Option<String>,
    /// Where the passage came from (file name, URL, ...).
    pub external_source_name: Option<String>,
    /// Anything else worth keeping next to the text.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional: BTreeMap<String, String>,
}

impl RecordMetadata {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_external_source(mut self, source: impl Into<String>) -> Self {
        self.external_source_name = Some(source.into());
        self
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.external_source_name.is_none() && self.additional.is_empty()
    }
}

/// One stored passage and its embedding.
///
/// Fields are private so a record cannot change after construction; use the
/// builder-style `with_*` methods before handing it to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: String,
    text: String,
    embedding: Vec<f32>,
    #[serde(default)]
    metadata: RecordMetadata,
    #[serde(default)]
    is_reference: bool,
}

impl Record {
    /// Build a locally generated record with empty metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding,
            metadata: RecordMetadata::default(),
            is_reference: false,
        }
    }

    pub fn with_metadata(mut self, metadata: RecordMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Mark the record as externally sourced content.
    pub fn as_reference(mut self) -> Self {
        self.is_reference = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    pub fn is_reference(&self) -> bool {
        self.is_reference
    }

    /// Length of the embedding vector.
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}
