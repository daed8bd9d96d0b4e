//! Postgres document store: one `(id, doc jsonb, created_at)` table per collection.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use uuid::Uuid;

use super::{Collection, DocumentStore, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Unique violations surface as [`StoreError::Duplicate`] named after the index.
fn map_err(collection: Collection, e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            StoreError::Duplicate(db.constraint().map(str::to_string).unwrap_or_else(|| collection.table().to_string()))
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert(&self, collection: Collection, id: Uuid, doc: Value) -> Result<(), StoreError> {
        let sql = format!("INSERT INTO {} (id, doc) VALUES ($1, $2)", collection.table());
        sqlx::query(&sql).bind(id).bind(Json(doc)).execute(&self.pool).await.map_err(|e| map_err(collection, e))?;
        Ok(())
    }

    async fn replace(&self, collection: Collection, id: Uuid, doc: Value) -> Result<bool, StoreError> {
        let sql = format!("UPDATE {} SET doc = $2 WHERE id = $1", collection.table());
        let res = sqlx::query(&sql).bind(id).bind(Json(doc)).execute(&self.pool).await.map_err(|e| map_err(collection, e))?;
        Ok(res.rows_affected() > 0)
    }

    async fn get(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, StoreError> {
        let sql = format!("SELECT doc FROM {} WHERE id = $1", collection.table());
        let row: Option<(Json<Value>,)> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|(Json(doc),)| doc))
    }

    async fn find(&self, collection: Collection, filter: Value) -> Result<Vec<Value>, StoreError> {
        let sql = format!("SELECT doc FROM {} WHERE doc @> $1 ORDER BY created_at, id", collection.table());
        let rows: Vec<(Json<Value>,)> = sqlx::query_as(&sql).bind(Json(filter)).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(Json(doc),)| doc).collect())
    }

    async fn count(&self, collection: Collection, filter: Value) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE doc @> $1", collection.table());
        let (n,): (i64,) = sqlx::query_as(&sql).bind(Json(filter)).fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", collection.table());
        let res = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    async fn increment(&self, collection: Collection, id: Uuid, field: &'static str, by: i64) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE {} SET doc = jsonb_set(doc, ARRAY[$3::text], to_jsonb(COALESCE((doc->>$3)::bigint, 0) + $2)) WHERE id = $1",
            collection.table()
        );
        let res = sqlx::query(&sql).bind(id).bind(by).bind(field).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }
}
