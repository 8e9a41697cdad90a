//! Document store adapter
//!
//! The order repository talks to a hierarchical document store through
//! [`DocumentStore`]. Documents are JSON objects addressed by collection name
//! and a store-assigned id; every document the store returns carries that id
//! merged in as `id`, plus store-assigned `createdAt`/`updatedAt`.

pub mod traits;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;

pub use traits::{DocumentStore, StoreResult};

/// A stored document (always a JSON object)
pub type Document = Value;

/// Errors surfaced by a document store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Document does not exist
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// Query rejected (missing index, permission denied, bad field)
    #[error("Query failed: {0}")]
    Query(String),

    /// Backend unreachable or write failed
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Sort direction for [`Query::order_by`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    #[default]
    Descending,
}

/// Equality filter on a top-level field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

/// Collection query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub order_by: Option<String>,
    pub direction: Direction,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(field.into());
        self.direction = direction;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Guard for [`DocumentStore::update_if`]: `field` must currently equal `expected`
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    pub field: String,
    pub expected: Value,
}

impl Precondition {
    pub fn field_equals(field: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
        }
    }

    /// A missing field compares as `null`
    pub fn holds(&self, doc: &Map<String, Value>) -> bool {
        doc.get(&self.field).unwrap_or(&Value::Null) == &self.expected
    }
}

/// Result of a guarded update
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalUpdate {
    /// Patch applied; carries the stored document
    Updated(Document),
    /// No such document
    NotFound,
    /// Guard did not hold; carries the current document, unchanged
    PreconditionFailed(Document),
}

/// Hands out strictly increasing RFC 3339 timestamps
///
/// Consecutive writes to the same document always observe a later
/// `updatedAt`, even when the wall clock has not moved.
#[derive(Debug)]
pub struct Clock {
    last: Mutex<DateTime<Utc>>,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn now(&self) -> String {
        let mut last = self.last.lock();
        let now = Utc::now();
        let step = *last + chrono::Duration::microseconds(1);
        let next = if now >= step { now } else { step };
        *last = next;
        next.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Shallow merge; `null` in the patch removes the field
pub(crate) fn merge_patch(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        if key == "id" {
            continue;
        }
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

/// Store view of a document: its data plus the key as `id`
pub(crate) fn with_id(id: &str, data: &Map<String, Value>) -> Document {
    let mut doc = data.clone();
    doc.insert("id".to_string(), Value::String(id.to_string()));
    Value::Object(doc)
}

pub(crate) fn into_object(data: Document) -> StoreResult<Map<String, Value>> {
    match data {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "documents must be JSON objects, got {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Ordering used for `order_by`; missing values sort last
pub(crate) fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
