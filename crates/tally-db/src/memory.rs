//! # In-Memory Record Store
//!
//! A [`RecordStore`] held entirely in process memory. Same semantics as the
//! PostgreSQL store: unique fields, shallow-merge updates, guarded atomic
//! increments, insertion ordering. Used by the engine tests and for running
//! the server without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::store::{IncrementOutcome, Order, Query, RecordKind, RecordStore};

#[derive(Debug)]
struct Row {
    seq: u64,
    body: Value,
}

#[derive(Debug, Default)]
struct State {
    next_seq: u64,
    rows: HashMap<(RecordKind, String), Row>,
}

impl State {
    /// Returns the first unique field of `body` already taken by another
    /// document of the same kind.
    fn unique_clash(&self, kind: RecordKind, id: &str, body: &Value) -> Option<DbError> {
        for field in kind.unique_fields() {
            let value = match body.get(*field) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };

            let taken = self.rows.iter().any(|((k, other_id), row)| {
                *k == kind && other_id != id && row.body.get(*field) == Some(value)
            });

            if taken {
                let shown = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                return Some(DbError::duplicate(*field, shown));
            }
        }
        None
    }
}

/// Process-local document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn document_id(doc: &Value) -> DbResult<String> {
    if !doc.is_object() {
        return Err(DbError::InvalidDocument("document must be a JSON object".into()));
    }
    doc.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DbError::InvalidDocument("document needs a string id".into()))
}

fn merge(body: &mut Value, patch: Value) -> DbResult<()> {
    let (Some(target), Value::Object(patch)) = (body.as_object_mut(), patch) else {
        return Err(DbError::InvalidDocument("patch must be a JSON object".into()));
    };
    for (key, value) in patch {
        if key != "id" {
            target.insert(key, value);
        }
    }
    Ok(())
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find(&self, kind: RecordKind, query: &Query) -> DbResult<Vec<Value>> {
        let state = self.state.read().await;

        let mut hits: Vec<&Row> = state
            .rows
            .iter()
            .filter(|((k, _), row)| *k == kind && query.matches(&row.body))
            .map(|(_, row)| row)
            .collect();

        match query.order() {
            Order::OldestFirst => hits.sort_by_key(|row| row.seq),
            Order::NewestFirst => hits.sort_by_key(|row| std::cmp::Reverse(row.seq)),
        }

        let limit = query.limit_count().unwrap_or(u64::MAX) as usize;
        let docs: Vec<Value> = hits
            .into_iter()
            .skip(query.skip_count() as usize)
            .take(limit)
            .map(|row| row.body.clone())
            .collect();

        debug!(kind = %kind, count = docs.len(), "memory find");
        Ok(docs)
    }

    async fn get(&self, kind: RecordKind, id: &str) -> DbResult<Option<Value>> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .get(&(kind, id.to_string()))
            .map(|row| row.body.clone()))
    }

    async fn insert(&self, kind: RecordKind, doc: Value) -> DbResult<Value> {
        let id = document_id(&doc)?;
        let mut state = self.state.write().await;

        if state.rows.contains_key(&(kind, id.clone())) {
            return Err(DbError::duplicate("id", id));
        }
        if let Some(err) = state.unique_clash(kind, &id, &doc) {
            return Err(err);
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        state.rows.insert(
            (kind, id.clone()),
            Row {
                seq,
                body: doc.clone(),
            },
        );

        debug!(kind = %kind, id = %id, "memory insert");
        Ok(doc)
    }

    async fn update(&self, kind: RecordKind, id: &str, patch: Value) -> DbResult<Option<Value>> {
        let mut state = self.state.write().await;
        let key = (kind, id.to_string());

        let Some(row) = state.rows.get(&key) else {
            return Ok(None);
        };

        let mut merged = row.body.clone();
        merge(&mut merged, patch)?;

        if let Some(err) = state.unique_clash(kind, id, &merged) {
            return Err(err);
        }

        if let Some(row) = state.rows.get_mut(&key) {
            row.body = merged.clone();
        }

        debug!(kind = %kind, id = %id, "memory update");
        Ok(Some(merged))
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> DbResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.rows.remove(&(kind, id.to_string())).is_some())
    }

    async fn count(&self, kind: RecordKind, query: &Query) -> DbResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .iter()
            .filter(|((k, _), row)| *k == kind && query.matches(&row.body))
            .count() as u64)
    }

    async fn increment(
        &self,
        kind: RecordKind,
        id: &str,
        field: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> DbResult<IncrementOutcome> {
        let mut state = self.state.write().await;

        let Some(row) = state.rows.get_mut(&(kind, id.to_string())) else {
            return Ok(IncrementOutcome::Missing);
        };

        let current = row.body.get(field).and_then(Value::as_i64).unwrap_or(0);
        let Some(next) = current.checked_add(delta) else {
            return Err(DbError::QueryFailed(format!(
                "{field} out of range: {current} + {delta}"
            )));
        };

        if floor.is_some_and(|floor| next < floor) {
            return Ok(IncrementOutcome::Rejected(row.body.clone()));
        }

        let Some(body) = row.body.as_object_mut() else {
            return Err(DbError::InvalidDocument(format!("{kind} {id} is not an object")));
        };
        body.insert(field.to_string(), Value::from(next));

        debug!(kind = %kind, id = %id, field, delta, value = next, "memory increment");
        Ok(IncrementOutcome::Applied(row.body.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_insert_get_update_delete() {
        let store = MemoryStore::new();
        store
            .insert(RecordKind::Product, json!({"id": "p1", "name": "Tea", "barcode": "890"}))
            .await
            .unwrap();

        let updated = store
            .update(RecordKind::Product, "p1", json!({"name": "Green Tea", "id": "zzz"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["name"], "Green Tea");
        assert_eq!(updated["id"], "p1");
        assert_eq!(updated["barcode"], "890");

        assert!(store.update(RecordKind::Product, "nope", json!({})).await.unwrap().is_none());
        assert!(store.delete(RecordKind::Product, "p1").await.unwrap());
        assert!(!store.delete(RecordKind::Product, "p1").await.unwrap());
        assert!(store.get(RecordKind::Product, "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_fields_enforced_per_kind() {
        let store = MemoryStore::new();
        store
            .insert(RecordKind::Inventory, json!({"id": "i1", "productId": "p1", "barcode": null}))
            .await
            .unwrap();

        let err = store
            .insert(RecordKind::Inventory, json!({"id": "i2", "productId": "p1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "productId"));

        // nulls never clash
        store
            .insert(RecordKind::Inventory, json!({"id": "i3", "productId": "p2", "barcode": null}))
            .await
            .unwrap();

        // same value in another kind is fine
        store
            .insert(RecordKind::Product, json!({"id": "i9", "barcode": "p1"}))
            .await
            .unwrap();

        let err = store
            .insert(RecordKind::Inventory, json!({"id": "i1", "productId": "p7"}))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_find_order_and_pagination() {
        let store = MemoryStore::new();
        for n in 1..=5 {
            store
                .insert(RecordKind::Bill, json!({"id": format!("b{n}"), "userId": "u1", "n": n}))
                .await
                .unwrap();
        }
        store
            .insert(RecordKind::Bill, json!({"id": "other", "userId": "u2"}))
            .await
            .unwrap();

        let query = Query::by("userId", "u1").newest_first().skip(1).limit(2);
        let page = store.find(RecordKind::Bill, &query).await.unwrap();
        let ids: Vec<&str> = page.iter().filter_map(|d| d["id"].as_str()).collect();
        assert_eq!(ids, vec!["b4", "b3"]);

        assert_eq!(store.count(RecordKind::Bill, &query).await.unwrap(), 5);

        let first = store
            .find_one(RecordKind::Bill, &Query::by("userId", "u1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first["id"], "b1");
    }

    #[tokio::test]
    async fn test_guarded_increment() {
        let store = MemoryStore::new();
        store
            .insert(RecordKind::Inventory, json!({"id": "i1", "quantity": 3}))
            .await
            .unwrap();

        let out = store
            .increment(RecordKind::Inventory, "i1", "quantity", -2, Some(0))
            .await
            .unwrap();
        assert!(matches!(out, IncrementOutcome::Applied(ref d) if d["quantity"] == 1));

        let out = store
            .increment(RecordKind::Inventory, "i1", "quantity", -2, Some(0))
            .await
            .unwrap();
        assert!(matches!(out, IncrementOutcome::Rejected(ref d) if d["quantity"] == 1));

        let out = store
            .increment(RecordKind::Inventory, "i1", "quantity", -5, None)
            .await
            .unwrap();
        assert!(matches!(out, IncrementOutcome::Applied(ref d) if d["quantity"] == -4));

        let out = store
            .increment(RecordKind::Inventory, "missing", "quantity", 1, None)
            .await
            .unwrap();
        assert_eq!(out, IncrementOutcome::Missing);
    }

    #[tokio::test]
    async fn test_increment_overflow_is_an_error() {
        let store = MemoryStore::new();
        store
            .insert(RecordKind::Inventory, json!({"id": "i1", "quantity": 1}))
            .await
            .unwrap();

        let err = store
            .increment(RecordKind::Inventory, "i1", "quantity", i64::MAX, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::QueryFailed(_)));

        // nothing written, lock released
        let doc = store.get(RecordKind::Inventory, "i1").await.unwrap().unwrap();
        assert_eq!(doc["quantity"], 1);
    }

    #[tokio::test]
    async fn test_concurrent_guarded_decrements_never_oversell() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(RecordKind::Inventory, json!({"id": "i1", "quantity": 10}))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .increment(RecordKind::Inventory, "i1", "quantity", -1, Some(0))
                    .await
                    .unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), IncrementOutcome::Applied(_)) {
                applied += 1;
            }
        }

        assert_eq!(applied, 10);
        let doc = store.get(RecordKind::Inventory, "i1").await.unwrap().unwrap();
        assert_eq!(doc["quantity"], 0);
    }

    #[tokio::test]
    async fn test_rejects_documents_without_id() {
        let store = MemoryStore::new();
        let err = store
            .insert(RecordKind::Customer, json!({"phone": "1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidDocument(_)));
    }
}
