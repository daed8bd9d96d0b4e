//! Document store
//!
//! Every aggregate is persisted as one JSON document in a named collection.
//! [`DocumentStore`] is the object-safe seam over the backing database;
//! [`Repo`] layers typed access for one aggregate on top of it. Filters are
//! query-by-example: a document matches when it contains the filter value
//! (Postgres `@>` semantics).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Brand, Category, Discount, Order, PendingPayment, Product, Review, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection { Users, Products, Categories, Brands, Orders, Discounts, Reviews, PendingPayments }

impl Collection {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Users => "users", Self::Products => "products", Self::Categories => "categories", Self::Brands => "brands",
            Self::Orders => "orders", Self::Discounts => "discounts", Self::Reviews => "reviews", Self::PendingPayments => "pending_payments",
        }
    }

    /// Unique keys as dotted JSON paths. A key with several paths is composite.
    /// Documents where any path is null or missing are exempt.
    pub fn unique_keys(&self) -> &'static [&'static [&'static str]] {
        match self {
            Self::Users => &[&["email"]],
            Self::Products | Self::Categories | Self::Brands => &[&["slug"]],
            Self::Orders => &[&["orderNumber"], &["paymentDetails.transactionId"]],
            Self::Discounts => &[&["code"]],
            Self::Reviews => &[&["userId", "productId"]],
            Self::PendingPayments => &[&["reference"]],
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate value for unique key {0}")]
    Duplicate(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Corrupt document: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: Collection, id: Uuid, doc: Value) -> Result<(), StoreError>;
    /// Returns false when no document with `id` exists.
    async fn replace(&self, collection: Collection, id: Uuid, doc: Value) -> Result<bool, StoreError>;
    async fn get(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, StoreError>;
    /// Matching documents, oldest first.
    async fn find(&self, collection: Collection, filter: Value) -> Result<Vec<Value>, StoreError>;
    async fn count(&self, collection: Collection, filter: Value) -> Result<u64, StoreError>;
    async fn delete(&self, collection: Collection, id: Uuid) -> Result<bool, StoreError>;
    /// Atomically adds `by` to a top-level integer field.
    async fn increment(&self, collection: Collection, id: Uuid, field: &'static str, by: i64) -> Result<bool, StoreError>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;
    fn id(&self) -> Uuid;
}

macro_rules! document {
    ($($ty:ty => $collection:ident),* $(,)?) => {
        $(impl Document for $ty {
            const COLLECTION: Collection = Collection::$collection;
            fn id(&self) -> Uuid { self.id }
        })*
    };
}

document! {
    User => Users, Product => Products, Category => Categories, Brand => Brands,
    Order => Orders, Discount => Discounts, Review => Reviews, PendingPayment => PendingPayments,
}

/// Typed access to the collection of `T`.
pub struct Repo<T> {
    store: SharedStore,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repo<T> {
    fn clone(&self) -> Self { Self { store: self.store.clone(), _marker: PhantomData } }
}

impl<T: Document> Repo<T> {
    pub fn new(store: SharedStore) -> Self { Self { store, _marker: PhantomData } }

    pub async fn insert(&self, doc: &T) -> Result<(), StoreError> {
        self.store.insert(T::COLLECTION, doc.id(), serde_json::to_value(doc)?).await
    }

    pub async fn save(&self, doc: &T) -> Result<bool, StoreError> {
        self.store.replace(T::COLLECTION, doc.id(), serde_json::to_value(doc)?).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<T>, StoreError> {
        self.store.get(T::COLLECTION, id).await?.map(serde_json::from_value).transpose().map_err(Into::into)
    }

    pub async fn find(&self, filter: Value) -> Result<Vec<T>, StoreError> {
        self.store.find(T::COLLECTION, filter).await?.into_iter().map(|v| serde_json::from_value(v).map_err(Into::into)).collect()
    }

    pub async fn find_one(&self, filter: Value) -> Result<Option<T>, StoreError> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    pub async fn all(&self) -> Result<Vec<T>, StoreError> { self.find(Value::Object(Default::default())).await }
    pub async fn count(&self, filter: Value) -> Result<u64, StoreError> { self.store.count(T::COLLECTION, filter).await }
    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> { self.store.delete(T::COLLECTION, id).await }

    pub async fn increment(&self, id: Uuid, field: &'static str, by: i64) -> Result<bool, StoreError> {
        self.store.increment(T::COLLECTION, id, field, by).await
    }
}

/// Value at a dotted path, treating JSON null as absent.
pub(crate) fn json_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |v, key| v.get(key)).filter(|v| !v.is_null())
}

/// Postgres `@>` containment between two JSON values.
pub(crate) fn json_contains(doc: &Value, pattern: &Value) -> bool {
    match (doc, pattern) {
        (Value::Object(d), Value::Object(p)) => p.iter().all(|(k, pv)| d.get(k).is_some_and(|dv| json_contains(dv, pv))),
        (Value::Array(d), Value::Array(p)) => p.iter().all(|pv| d.iter().any(|dv| json_contains(dv, pv))),
        (Value::Array(d), scalar) if !scalar.is_object() => d.iter().any(|dv| dv == scalar),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_contains() {
        let doc = json!({"email": "a@b.c", "tags": ["x", "y"], "paymentDetails": {"transactionId": "T1", "amount": 10.0}});
        assert!(json_contains(&doc, &json!({})));
        assert!(json_contains(&doc, &json!({"email": "a@b.c"})));
        assert!(json_contains(&doc, &json!({"tags": ["y"]})));
        assert!(json_contains(&doc, &json!({"paymentDetails": {"transactionId": "T1"}})));
        assert!(json_contains(&doc, &json!({"paymentDetails": {"amount": 10}})));
        assert!(!json_contains(&doc, &json!({"email": "other"})));
        assert!(!json_contains(&doc, &json!({"missing": null})));
    }

    #[test]
    fn test_json_path_skips_null() {
        let doc = json!({"paymentDetails": null, "a": {"b": 1}});
        assert_eq!(json_path(&doc, "a.b"), Some(&json!(1)));
        assert_eq!(json_path(&doc, "paymentDetails.transactionId"), None);
        assert_eq!(json_path(&doc, "paymentDetails"), None);
    }
}
