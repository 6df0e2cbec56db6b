//! # Typed Collections
//!
//! [`Collection<T>`] wraps a shared [`RecordStore`] with (de)serialization
//! for one domain type, so callers work with `Inventory`, `Bill`, ... rather
//! than raw JSON.
//!
//! ```rust,ignore
//! let inventory: Collection<Inventory> = Collection::new(store.clone());
//! let record = inventory.find_one(&Query::by("barcode", "890")).await?;
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use tally_core::{Bill, Customer, Inventory, Product};

use crate::error::{DbError, DbResult};
use crate::store::{IncrementOutcome, Query, RecordKind, RecordStore};

// =============================================================================
// Document Trait
// =============================================================================

/// A domain type stored as a document of a fixed kind.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: RecordKind;

    /// Entity name used in not-found messages.
    const ENTITY: &'static str;

    fn id(&self) -> &str;
}

impl Document for Product {
    const KIND: RecordKind = RecordKind::Product;
    const ENTITY: &'static str = "Product";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for Inventory {
    const KIND: RecordKind = RecordKind::Inventory;
    const ENTITY: &'static str = "Inventory";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for Bill {
    const KIND: RecordKind = RecordKind::Bill;
    const ENTITY: &'static str = "Bill";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for Customer {
    const KIND: RecordKind = RecordKind::Customer;
    const ENTITY: &'static str = "Customer";

    fn id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// Collection
// =============================================================================

/// Typed view over one record kind.
pub struct Collection<T> {
    store: Arc<dyn RecordStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Collection {
            store: Arc::clone(&self.store),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

fn decode<T: Document>(doc: Value) -> DbResult<T> {
    serde_json::from_value(doc)
        .map_err(|e| DbError::InvalidDocument(format!("{} does not decode: {}", T::ENTITY, e)))
}

impl<T: Document> Collection<T> {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Collection {
            store,
            _marker: PhantomData,
        }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<T>> {
        self.store.get(T::KIND, id).await?.map(decode::<T>).transpose()
    }

    /// Like [`get`](Self::get), but absence is a `NotFound` error.
    pub async fn require(&self, id: &str) -> DbResult<T> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found(T::ENTITY, id))
    }

    pub async fn find(&self, query: &Query) -> DbResult<Vec<T>> {
        self.store
            .find(T::KIND, query)
            .await?
            .into_iter()
            .map(decode::<T>)
            .collect()
    }

    pub async fn find_one(&self, query: &Query) -> DbResult<Option<T>> {
        self.store.find_one(T::KIND, query).await?.map(decode::<T>).transpose()
    }

    pub async fn insert(&self, doc: &T) -> DbResult<T> {
        let value = serde_json::to_value(doc)?;
        decode(self.store.insert(T::KIND, value).await?)
    }

    /// Shallow-merges `patch` (serialized field names) into the document.
    pub async fn update(&self, id: &str, patch: Value) -> DbResult<Option<T>> {
        self.store.update(T::KIND, id, patch).await?.map(decode::<T>).transpose()
    }

    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        self.store.delete(T::KIND, id).await
    }

    pub async fn count(&self, query: &Query) -> DbResult<u64> {
        self.store.count(T::KIND, query).await
    }

    pub async fn increment(
        &self,
        id: &str,
        field: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> DbResult<IncrementOutcome<T>> {
        self.store
            .increment(T::KIND, id, field, delta, floor)
            .await?
            .try_map(decode::<T>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use chrono::Utc;
    use serde_json::json;

    fn inventory() -> Collection<Inventory> {
        Collection::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let col = inventory();
        let record = Inventory::new(Some("p1".into()), Some("890".into()), 5, 10, Utc::now());
        col.insert(&record).await.unwrap();

        let found = col.find_one(&Query::by("barcode", "890")).await.unwrap().unwrap();
        assert_eq!(found, record);

        let missing = col.require("nope").await.unwrap_err();
        assert_eq!(missing.to_string(), "Inventory not found: nope");
    }

    #[tokio::test]
    async fn test_typed_increment() {
        let col = inventory();
        let record = Inventory::new(Some("p1".into()), None, 5, 10, Utc::now());
        col.insert(&record).await.unwrap();

        match col.increment(&record.id, "quantity", -5, Some(0)).await.unwrap() {
            IncrementOutcome::Applied(inv) => assert_eq!(inv.quantity, 0),
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undecodable_document_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(RecordKind::Inventory, json!({"id": "bad", "quantity": "lots"}))
            .await
            .unwrap();

        let col: Collection<Inventory> = Collection::new(store);
        let err = col.get("bad").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidDocument(_)));
    }
}
