//! In-process document store used by tests and database-less development.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{json_contains, json_path, Collection, DocumentStore, StoreError};

/// Documents are kept per collection in a `BTreeMap`; v7 ids make key order creation order.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, BTreeMap<Uuid, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn check_unique(collection: Collection, docs: &BTreeMap<Uuid, Value>, id: Uuid, doc: &Value) -> Result<(), StoreError> {
    for key in collection.unique_keys() {
        let Some(values) = key.iter().map(|path| json_path(doc, path)).collect::<Option<Vec<_>>>() else { continue };
        let clash = docs.iter().filter(|(other, _)| **other != id).any(|(_, other)| {
            key.iter().zip(&values).all(|(path, value)| json_path(other, path) == Some(*value))
        });
        if clash { return Err(StoreError::Duplicate(format!("{}.{}", collection.table(), key.join("+")))); }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: Collection, id: Uuid, doc: Value) -> Result<(), StoreError> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection).or_default();
        if docs.contains_key(&id) { return Err(StoreError::Duplicate(format!("{}.id", collection.table()))); }
        check_unique(collection, docs, id, &doc)?;
        docs.insert(id, doc);
        Ok(())
    }

    async fn replace(&self, collection: Collection, id: Uuid, doc: Value) -> Result<bool, StoreError> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection).or_default();
        if !docs.contains_key(&id) { return Ok(false); }
        check_unique(collection, docs, id, &doc)?;
        docs.insert(id, doc);
        Ok(true)
    }

    async fn get(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, StoreError> {
        Ok(self.collections.read().await.get(&collection).and_then(|docs| docs.get(&id)).cloned())
    }

    async fn find(&self, collection: Collection, filter: Value) -> Result<Vec<Value>, StoreError> {
        let guard = self.collections.read().await;
        Ok(guard.get(&collection).map(|docs| docs.values().filter(|d| json_contains(d, &filter)).cloned().collect()).unwrap_or_default())
    }

    async fn count(&self, collection: Collection, filter: Value) -> Result<u64, StoreError> {
        let guard = self.collections.read().await;
        Ok(guard.get(&collection).map(|docs| docs.values().filter(|d| json_contains(d, &filter)).count() as u64).unwrap_or(0))
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.collections.write().await.get_mut(&collection).and_then(|docs| docs.remove(&id)).is_some())
    }

    async fn increment(&self, collection: Collection, id: Uuid, field: &'static str, by: i64) -> Result<bool, StoreError> {
        let mut guard = self.collections.write().await;
        let Some(doc) = guard.get_mut(&collection).and_then(|docs| docs.get_mut(&id)) else { return Ok(false) };
        let current = doc.get(field).and_then(Value::as_i64).unwrap_or(0);
        if let Value::Object(map) = doc { map.insert(field.to_string(), Value::from(current + by)); }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unique_keys_enforced() {
        let store = MemoryStore::new();
        store.insert(Collection::Users, Uuid::now_v7(), json!({"email": "a@b.c"})).await.unwrap();
        let err = store.insert(Collection::Users, Uuid::now_v7(), json!({"email": "a@b.c"})).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_composite_and_nullable_keys() {
        let store = MemoryStore::new();
        let (u, p) = (Uuid::now_v7(), Uuid::now_v7());
        store.insert(Collection::Reviews, Uuid::now_v7(), json!({"userId": u, "productId": p})).await.unwrap();
        store.insert(Collection::Reviews, Uuid::now_v7(), json!({"userId": u, "productId": Uuid::now_v7()})).await.unwrap();
        assert!(store.insert(Collection::Reviews, Uuid::now_v7(), json!({"userId": u, "productId": p})).await.is_err());

        store.insert(Collection::Orders, Uuid::now_v7(), json!({"orderNumber": "A", "paymentDetails": null})).await.unwrap();
        store.insert(Collection::Orders, Uuid::now_v7(), json!({"orderNumber": "B", "paymentDetails": null})).await.unwrap();
        store.insert(Collection::Orders, Uuid::now_v7(), json!({"orderNumber": "C", "paymentDetails": {"transactionId": "T"}})).await.unwrap();
        assert!(store.insert(Collection::Orders, Uuid::now_v7(), json!({"orderNumber": "D", "paymentDetails": {"transactionId": "T"}})).await.is_err());
    }

    #[tokio::test]
    async fn test_find_and_increment() {
        let store = MemoryStore::new();
        let id = Uuid::now_v7();
        store.insert(Collection::Discounts, id, json!({"code": "SAVE10", "usageCount": 0})).await.unwrap();
        assert!(store.increment(Collection::Discounts, id, "usageCount", 1).await.unwrap());
        let found = store.find(Collection::Discounts, json!({"code": "SAVE10"})).await.unwrap();
        assert_eq!(found[0]["usageCount"], json!(1));
        assert_eq!(store.count(Collection::Discounts, json!({"code": "NOPE"})).await.unwrap(), 0);
        assert!(store.delete(Collection::Discounts, id).await.unwrap());
        assert!(!store.increment(Collection::Discounts, id, "usageCount", 1).await.unwrap());
    }
}
