//! In-memory Record Store
//!
//! DashMap-backed implementation of [`RecordStore`]. Per-record atomicity
//! comes from the map's shard locking: `conditional_update` holds the
//! record's write guard across predicate check and mutation.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{Document, Mutation, Predicate, RecordStore, StoreError};

/// In-memory document store, one map per collection.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError> {
        let col = self
            .collections
            .entry(collection.to_string())
            .or_default();

        match col.entry(id.to_string()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(doc);
                Ok(())
            }
        }
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let Some(col) = self.collections.get(collection) else {
            return Ok(None);
        };
        Ok(col.get(id).map(|rec| rec.value().clone()))
    }

    async fn conditional_update(
        &self,
        collection: &str,
        id: &str,
        predicate: Predicate,
        mutation: Mutation,
    ) -> Result<bool, StoreError> {
        let Some(col) = self.collections.get(collection) else {
            return Ok(false);
        };
        // get_mut holds the shard write lock: predicate + mutation are one
        // atomic step for this record.
        let Some(mut rec) = col.get_mut(id) else {
            return Ok(false);
        };
        if !predicate(&rec) {
            return Ok(false);
        }
        mutation(&mut rec);
        Ok(true)
    }

    async fn scan(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let Some(col) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(col.iter().map(|rec| rec.value().clone()).collect())
    }
}
