//! DocumentStore trait definition

use async_trait::async_trait;

use crate::store::{ConditionalUpdate, Document, Precondition, Query, StoreError};

/// DocumentStore trait - the persistence seam for orders and users
///
/// Implementations (in-memory, PostgreSQL, ...) can be swapped without
/// touching the repository. All timestamps are assigned by the store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id
    ///
    /// # Returns
    /// The document with `id` merged in, or `None`
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Insert a new document
    ///
    /// The store assigns the id and stamps `createdAt`/`updatedAt`.
    async fn create(&self, collection: &str, data: Document) -> StoreResult<Document>;

    /// Merge `patch` into an existing document and refresh `updatedAt`
    async fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<Document>;

    /// Like [`update`](Self::update), but only if `precondition` holds at write time
    ///
    /// The check and the write are atomic with respect to other writers.
    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        precondition: &Precondition,
        patch: Document,
    ) -> StoreResult<ConditionalUpdate>;

    /// Remove a document
    ///
    /// # Returns
    /// `true` if a document was removed
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool>;

    /// Run a collection query (equality filter, ordering, limit)
    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>>;
}

/// Result type for DocumentStore operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
