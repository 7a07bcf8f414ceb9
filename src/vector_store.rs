//! # VectorStore
//!
//! In-process embedding store for olympiq.
//!
//! A [`MemoryStore`] owns named [`Collection`]s; each collection maps record ids
//! to [`Record`]s and remembers the order in which ids were first inserted so
//! that similarity ties resolve deterministically.
//!
//! ## Responsibilities
//! - **Lifecycle**: idempotent collection creation, strict creation, deletion.
//! - **Upsert**: insert-or-replace by id, wholesale.
//! - **Dimensionality**: the first record fixes a collection's vector length;
//!   later records of a different length are rejected and leave the
//!   collection untouched.
//! - **Sharing**: each collection sits behind its own reader/writer lock, so
//!   queries can run while another collection is being loaded.
//!
//! Nothing here is persisted. The store lives for the process and is dropped
//! with it.
//!
//! ## Quick Example
//! ```rust
//! use olympiq::record::Record;
//! use olympiq::vector_store::MemoryStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! store.create_collection("test")?;
//! store.upsert("test", Record::new("A", "gold medal curling", vec![1.0, 0.0, 0.0]))?;
//! assert_eq!(store.len("test")?, 1);
//! # Ok(()) }
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{BatchUpsertError, StoreError};
use crate::record::Record;

/// A collection shared between the store and its readers.
pub type SharedCollection = Arc<RwLock<Collection>>;

/// A named set of records with a single embedding dimensionality.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    /// Fixed by the first accepted record.
    dimension: Option<usize>,
    /// Records in first-insertion order. Replacing a record keeps its slot.
    records: Vec<Record>,
    positions: HashMap<String, usize>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimension: None,
            records: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The established embedding length, or `None` before the first insert.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.positions.get(id).map(|&pos| &self.records[pos])
    }

    /// Records in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub(crate) fn records(&self) -> &[Record] {
        &self.records
    }

    /// Fail with `DimensionMismatch` unless `len` matches the established
    /// dimensionality. An empty, never-written collection accepts anything.
    pub fn check_dimension(&self, len: usize) -> Result<(), StoreError> {
        match self.dimension {
            Some(expected) if expected != len => Err(StoreError::DimensionMismatch {
                collection: self.name.clone(),
                expected,
                actual: len,
            }),
            _ => Ok(()),
        }
    }

    /// Insert `record`, or replace the record with the same id.
    ///
    /// Returns the replaced record, if any. On error the collection is unchanged.
    pub fn upsert(&mut self, record: Record) -> Result<Option<Record>, StoreError> {
        self.check_dimension(record.dimension())?;
        self.dimension.get_or_insert(record.dimension());

        match self.positions.get(record.id()) {
            Some(&pos) => Ok(Some(std::mem::replace(&mut self.records[pos], record))),
            None => {
                self.positions
                    .insert(record.id().to_string(), self.records.len());
                self.records.push(record);
                Ok(None)
            }
        }
    }

    /// Remove a record by id, keeping the relative order of the rest.
    pub fn remove(&mut self, id: &str) -> Option<Record> {
        let pos = self.positions.remove(id)?;
        let removed = self.records.remove(pos);
        for rec in &self.records[pos..] {
            if let Some(p) = self.positions.get_mut(rec.id()) {
                *p -= 1;
            }
        }
        Some(removed)
    }
}

/// Process-scoped owner of all collections.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, SharedCollection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `name` if it does not exist yet. Re-creating is a no-op.
    pub fn create_collection(&self, name: &str) -> Result<(), StoreError> {
        match self.try_create_collection(name) {
            Err(StoreError::AlreadyExists(_)) => {
                debug!(collection = name, "collection already exists, keeping it");
                Ok(())
            }
            other => other,
        }
    }

    /// Strict creation: fails with `AlreadyExists` when the name is taken.
    pub fn try_create_collection(&self, name: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        info!(collection = name, "creating collection");
        collections.insert(
            name.to_string(),
            Arc::new(RwLock::new(Collection::new(name))),
        );
        Ok(())
    }

    pub fn does_collection_exist(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    /// Collection names, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_collection(&self, name: &str) -> Result<SharedCollection, StoreError> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    /// Drop a collection together with its records.
    pub fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        match self.collections.write().remove(name) {
            Some(_) => {
                info!(collection = name, "deleted collection");
                Ok(())
            }
            None => Err(StoreError::CollectionNotFound(name.to_string())),
        }
    }

    /// Insert or replace `record` in collection `name`.
    pub fn upsert(&self, name: &str, record: Record) -> Result<(), StoreError> {
        let collection = self.get_collection(name)?;
        let mut guard = collection.write();
        if let Some(old) = guard.upsert(record)? {
            debug!(collection = name, id = old.id(), "replaced record");
        }
        Ok(())
    }

    /// Upsert each record in order, stopping at the first failure.
    ///
    /// Records applied before the failure stay in the collection and are listed
    /// in the error. On success the applied ids are returned.
    pub fn upsert_batch<I>(&self, name: &str, records: I) -> Result<Vec<String>, BatchUpsertError>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut applied = Vec::new();
        let collection = match self.get_collection(name) {
            Ok(c) => c,
            Err(source) => {
                return Err(BatchUpsertError {
                    applied,
                    failed: None,
                    source,
                });
            }
        };

        let mut guard = collection.write();
        for record in records {
            let id = record.id().to_string();
            if let Err(source) = guard.upsert(record) {
                warn!(collection = name, id = %id, applied = applied.len(), "batch upsert stopped: {source}");
                return Err(BatchUpsertError {
                    applied,
                    failed: Some(id),
                    source,
                });
            }
            applied.push(id);
        }
        Ok(applied)
    }

    /// Fetch a copy of one record.
    pub fn get(&self, name: &str, id: &str) -> Result<Record, StoreError> {
        let collection = self.get_collection(name)?;
        let guard = collection.read();
        guard.get(id).cloned().ok_or_else(|| StoreError::RecordNotFound {
            collection: name.to_string(),
            id: id.to_string(),
        })
    }

    pub fn remove(&self, name: &str, id: &str) -> Result<Record, StoreError> {
        let collection = self.get_collection(name)?;
        let mut guard = collection.write();
        guard.remove(id).ok_or_else(|| StoreError::RecordNotFound {
            collection: name.to_string(),
            id: id.to_string(),
        })
    }

    /// Number of records in collection `name`.
    pub fn len(&self, name: &str) -> Result<usize, StoreError> {
        Ok(self.get_collection(name)?.read().len())
    }
}
