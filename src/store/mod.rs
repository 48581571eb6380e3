//! Record Store abstraction
//!
//! The saga protocol assumes nothing about the backing store beyond
//! key-addressed documents and atomicity per single record. This module
//! defines that contract: `get`, `insert`, and `conditional_update` — a
//! compare-and-act write that applies a mutation only if the stored
//! document still satisfies a predicate. `conditional_update` is the only
//! atomicity primitive the rest of the crate relies on.

use async_trait::async_trait;
use thiserror::Error;

mod memory;

pub use memory::MemoryStore;

/// Documents are schemaless JSON values, as in the document databases
/// this store models.
pub type Document = serde_json::Value;

/// Predicate evaluated against the stored document under the record lock.
pub type Predicate = Box<dyn Fn(&Document) -> bool + Send>;

/// Mutation applied in place if the predicate matched.
pub type Mutation = Box<dyn FnOnce(&mut Document) + Send>;

/// Store-level errors
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("duplicate key: {collection}/{id}")]
    DuplicateKey { collection: String, id: String },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Key-addressed document storage with single-record atomic updates.
///
/// No cross-record atomicity is offered or assumed. Implementations must
/// guarantee that `conditional_update` evaluates the predicate and applies
/// the mutation as one atomic step with respect to other operations on the
/// same record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new document. Fails with `DuplicateKey` if `id` exists.
    async fn insert(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError>;

    /// Fetch a document by id, `None` if absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Apply `mutation` iff the stored document currently satisfies
    /// `predicate`, atomically. Returns whether it matched.
    ///
    /// A missing record never matches.
    async fn conditional_update(
        &self,
        collection: &str,
        id: &str,
        predicate: Predicate,
        mutation: Mutation,
    ) -> Result<bool, StoreError>;

    /// Full collection scan. Used by the recovery sweep; ordering is not
    /// guaranteed.
    async fn scan(&self, collection: &str) -> Result<Vec<Document>, StoreError>;
}
