//! PostgreSQL document store implementation
//!
//! Every collection lives in one JSONB table:
//!
//! ```sql
//! CREATE TABLE documents (
//!     collection TEXT NOT NULL,
//!     id         TEXT NOT NULL,
//!     data       JSONB NOT NULL,
//!     PRIMARY KEY (collection, id)
//! );
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::sync::Arc;
use uuid::Uuid;

use crate::store::traits::{DocumentStore, StoreResult};
use crate::store::{
    into_object, with_id, Clock, ConditionalUpdate, Direction, Document, Precondition, Query, StoreError,
};

/// PostgreSQL document store
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
    clock: Clock,
}

impl PostgresDocumentStore {
    /// Create a new PostgreSQL document store
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            clock: Clock::new(),
        }
    }

    /// Create the documents table and the indexes the order repository relies on
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data JSONB NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS documents_user_created_idx
                ON documents (collection, (data->>'userId'), (data->>'createdAt') DESC)
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(unavailable)?;
        }

        tracing::info!("Document store schema ready");
        Ok(())
    }

    fn stamp_patch(&self, patch: Document) -> StoreResult<Map<String, Value>> {
        let mut patch = into_object(patch)?;
        patch.remove("id");
        patch.remove("createdAt");
        patch.insert("updatedAt".to_string(), Value::String(self.clock.now()));
        Ok(patch)
    }

    fn row_to_document(row: &PgRow) -> StoreResult<Document> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let Json(data): Json<Value> = row
            .try_get("data")
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(with_id(&id, &into_object(data)?))
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Field names are interpolated into SQL, so only plain identifiers pass
fn checked_field(field: &str) -> StoreResult<&str> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(field)
    } else {
        Err(StoreError::Query(format!("invalid field name '{}'", field)))
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query("SELECT id, data FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn create(&self, collection: &str, data: Document) -> StoreResult<Document> {
        let mut data = into_object(data)?;
        data.remove("id");
        let now = self.clock.now();
        data.insert("createdAt".to_string(), Value::String(now.clone()));
        data.insert("updatedAt".to_string(), Value::String(now));

        let id = Uuid::new_v4().simple().to_string();

        sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&id)
            .bind(Json(Value::Object(data.clone())))
            .execute(&*self.pool)
            .await
            .map_err(unavailable)?;

        Ok(with_id(&id, &data))
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<Document> {
        let patch = self.stamp_patch(patch)?;

        let row = sqlx::query(
            r#"
            UPDATE documents SET data = jsonb_strip_nulls(data || $3)
            WHERE collection = $1 AND id = $2
            RETURNING id, data
            "#,
        )
            .bind(collection)
            .bind(id)
            .bind(Json(Value::Object(patch)))
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?;

        match row {
            Some(row) => Self::row_to_document(&row),
            None => Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        precondition: &Precondition,
        patch: Document,
    ) -> StoreResult<ConditionalUpdate> {
        let patch = self.stamp_patch(patch)?;

        // The guard is part of the UPDATE, so check and write are one statement
        let row = sqlx::query(
            r#"
            UPDATE documents SET data = jsonb_strip_nulls(data || $3)
            WHERE collection = $1 AND id = $2 AND COALESCE(data->$4, 'null'::jsonb) = $5
            RETURNING id, data
            "#,
        )
            .bind(collection)
            .bind(id)
            .bind(Json(Value::Object(patch)))
            .bind(&precondition.field)
            .bind(Json(&precondition.expected))
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?;

        if let Some(row) = row {
            return Ok(ConditionalUpdate::Updated(Self::row_to_document(&row)?));
        }

        match self.get(collection, id).await? {
            Some(current) => Ok(ConditionalUpdate::PreconditionFailed(current)),
            None => Ok(ConditionalUpdate::NotFound),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(unavailable)?;

        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        let mut sql = String::from("SELECT id, data FROM documents WHERE collection = $1");

        if let Some(filter) = &query.filter {
            sql.push_str(&format!(" AND data->'{}' = $2", checked_field(&filter.field)?));
        }

        if let Some(field) = &query.order_by {
            let direction = match query.direction {
                Direction::Ascending => "ASC",
                Direction::Descending => "DESC",
            };
            sql.push_str(&format!(
                " ORDER BY data->>'{}' {} NULLS LAST",
                checked_field(field)?,
                direction
            ));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut statement = sqlx::query(&sql).bind(collection);
        if let Some(filter) = &query.filter {
            statement = statement.bind(Json(&filter.value));
        }

        let rows = statement
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.iter().map(Self::row_to_document).collect()
    }
}
