//! Document persistence for batches, calls and the do-not-call list.
//!
//! The engine only sees [`DocumentStore`]: JSON documents addressed by collection and id, plus
//! lookup by a top-level field.

use crate::error::StoreError;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub const BATCHES: &str = "batches";
pub const CALLS: &str = "calls";
pub const DNC: &str = "dnc";

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Insert or replace.
    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError>;

    /// Documents whose top-level `field` equals `value`.
    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError>;
}

pub async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(collection, id).await? {
        Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
        None => Ok(None),
    }
}

pub async fn save<T: Serialize>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    doc: &T,
) -> Result<(), StoreError> {
    store.put(collection, id, serde_json::to_value(doc)?).await
}

pub async fn find<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    field: &str,
    value: impl Serialize,
) -> Result<Vec<T>, StoreError> {
    let value = serde_json::to_value(value)?;
    store
        .query(collection, field, &value)
        .await?
        .into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
        .collect()
}

/// Process-local store, used in tests and when no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    // collection => id => document
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| doc.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Postgres-backed store keeping every document as a jsonb row.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let doc = sqlx::query_scalar::<_, Json<Value>>(
            "
            select body
            from documents
            where collection = $1 and id = $2
            ",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc.map(|Json(body)| body))
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        sqlx::query(
            "
            insert into documents (
              collection,
              id,
              body
            ) values (
              $1,
              $2,
              $3
            )
            on conflict (collection, id)
            do update set body = excluded.body, updated = now()
            ",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(doc))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        let docs = sqlx::query_scalar::<_, Json<Value>>(
            "
            select body
            from documents
            where collection = $1 and body -> $2 = $3
            order by created
            ",
        )
        .bind(collection)
        .bind(field)
        .bind(Json(value))
        .fetch_all(&self.pool)
        .await?;
        Ok(docs.into_iter().map(|Json(body)| body).collect())
    }
}
