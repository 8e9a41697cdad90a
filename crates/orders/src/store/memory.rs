//! In-memory document store implementation

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::store::traits::{DocumentStore, StoreResult};
use crate::store::{
    compare_fields, into_object, merge_patch, with_id, Clock, ConditionalUpdate, Direction, Document,
    Precondition, Query, StoreError,
};

type Collection = HashMap<String, Map<String, Value>>;

/// In-memory document store for development and tests
///
/// Failure injection switches let tests exercise the degraded paths:
/// `fail_filtered_queries` mimics a missing index or permission error on
/// filtered queries, `fail_writes` mimics an unreachable backend.
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    clock: Clock,
    fail_filtered_queries: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            clock: Clock::new(),
            fail_filtered_queries: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every filtered query fail
    pub fn set_fail_filtered_queries(&self, fail: bool) {
        self.fail_filtered_queries.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert a document verbatim under `id`, without stamping
    ///
    /// Used to load fixtures and legacy-shaped documents.
    pub fn seed(&self, collection: &str, id: &str, data: Document) -> StoreResult<()> {
        let data = into_object(data)?;
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes are disabled".to_string()));
        }
        Ok(())
    }

    fn patch_object(&self, patch: Document) -> StoreResult<Map<String, Value>> {
        let mut patch = into_object(patch)?;
        patch.remove("createdAt");
        patch.insert("updatedAt".to_string(), Value::String(self.clock.now()));
        Ok(patch)
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|data| with_id(id, data)))
    }

    async fn create(&self, collection: &str, data: Document) -> StoreResult<Document> {
        self.check_writable()?;

        let mut data = into_object(data)?;
        data.remove("id");
        let now = self.clock.now();
        data.insert("createdAt".to_string(), Value::String(now.clone()));
        data.insert("updatedAt".to_string(), Value::String(now));

        let id = Uuid::new_v4().simple().to_string();
        let doc = with_id(&id, &data);

        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id, data);

        Ok(doc)
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<Document> {
        self.check_writable()?;
        let patch = self.patch_object(patch)?;

        let mut collections = self.collections.write();
        let data = collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        merge_patch(data, patch);
        Ok(with_id(id, data))
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        precondition: &Precondition,
        patch: Document,
    ) -> StoreResult<ConditionalUpdate> {
        self.check_writable()?;
        let patch = self.patch_object(patch)?;

        // Check and write under one write lock
        let mut collections = self.collections.write();
        let Some(data) = collections.get_mut(collection).and_then(|c| c.get_mut(id)) else {
            return Ok(ConditionalUpdate::NotFound);
        };

        if !precondition.holds(data) {
            return Ok(ConditionalUpdate::PreconditionFailed(with_id(id, data)));
        }

        merge_patch(data, patch);
        Ok(ConditionalUpdate::Updated(with_id(id, data)))
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        self.check_writable()?;
        let mut collections = self.collections.write();
        Ok(collections
            .get_mut(collection)
            .map(|c| c.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        if query.filter.is_some() && self.fail_filtered_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Query(
                "index not defined for filtered query".to_string(),
            ));
        }

        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<(&String, &Map<String, Value>)> = docs
            .iter()
            .filter(|(_, data)| match &query.filter {
                Some(filter) => data.get(&filter.field) == Some(&filter.value),
                None => true,
            })
            .collect();

        if let Some(field) = &query.order_by {
            matched.sort_by(|(_, a), (_, b)| {
                let ord = compare_fields(a.get(field), b.get(field));
                match query.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .take(limit)
            .map(|(id, data)| with_id(id, data))
            .collect())
    }
}
