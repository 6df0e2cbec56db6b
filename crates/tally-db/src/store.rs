//! # Record Store
//!
//! The generic document interface every entity is persisted through.
//!
//! ## Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RecordStore                                      │
//! │                                                                         │
//! │  find / find_one / count ◄── Query { filters, order, skip, limit }     │
//! │  insert                  ◄── JSON object with an "id" string           │
//! │  update                  ◄── shallow merge patch                       │
//! │  delete                                                                 │
//! │  increment               ◄── atomic delta on one integer field         │
//! │                                                                         │
//! │  Implementations:                                                       │
//! │  ├── PgRecordStore  (PostgreSQL JSONB, production)                     │
//! │  └── MemoryStore    (tests and single-process setups)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Documents are `serde_json::Value` objects. Field names are the serialized
//! (camelCase) names of the domain types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::DbResult;

// =============================================================================
// Record Kind
// =============================================================================

/// The entity collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Product,
    Inventory,
    Bill,
    Customer,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Product,
        RecordKind::Inventory,
        RecordKind::Bill,
        RecordKind::Customer,
    ];

    /// Value of the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Product => "product",
            RecordKind::Inventory => "inventory",
            RecordKind::Bill => "bill",
            RecordKind::Customer => "customer",
        }
    }

    /// Fields that must be unique among documents of this kind when present
    /// and not null.
    pub fn unique_fields(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Product => &["barcode"],
            RecordKind::Inventory => &["productId", "barcode"],
            RecordKind::Bill => &["billNumber"],
            RecordKind::Customer => &["phone"],
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Query
// =============================================================================

/// A single predicate on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals value. `Null` also matches an absent field.
    Eq(String, Value),

    /// Field equals any of the values. An empty list matches nothing.
    In(String, Vec<Value>),

    /// RFC 3339 timestamp field within `[from, to)`.
    Between {
        field: String,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

/// Result ordering by insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Filters, ordering and pagination for `find` and `count`.
///
/// ## Example
/// ```rust
/// use tally_db::Query;
///
/// let query = Query::new()
///     .eq("userId", "u1")
///     .eq("isDeleted", false)
///     .newest_first()
///     .skip(20)
///     .limit(20);
/// assert_eq!(query.filters().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
    order: Order,
    skip: u64,
    limit: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single equality filter.
    pub fn by(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().eq(field, value)
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.into(), value.into()));
        self
    }

    pub fn is_in<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filters.push(Filter::In(
            field.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn between(
        mut self,
        field: impl Into<String>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Self {
        self.filters.push(Filter::Between {
            field: field.into(),
            from,
            to,
        });
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.order = Order::NewestFirst;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn skip_count(&self) -> u64 {
        self.skip
    }

    pub fn limit_count(&self) -> Option<u64> {
        self.limit
    }

    /// Evaluates the filters against a document. Ordering and pagination
    /// are the caller's concern.
    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|filter| match filter {
            Filter::Eq(field, expected) => field_equals(doc, field, expected),
            Filter::In(field, values) => values.iter().any(|v| field_equals(doc, field, v)),
            Filter::Between { field, from, to } => doc
                .get(field)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|at| {
                    let at = at.with_timezone(&Utc);
                    at >= *from && at < *to
                })
                .unwrap_or(false),
        })
    }
}

fn field_equals(doc: &Value, field: &str, expected: &Value) -> bool {
    match doc.get(field) {
        Some(actual) => actual == expected,
        None => expected.is_null(),
    }
}

// =============================================================================
// Increment Outcome
// =============================================================================

/// Result of an atomic [`RecordStore::increment`].
#[derive(Debug, Clone, PartialEq)]
pub enum IncrementOutcome<D = Value> {
    /// The delta was applied; carries the document after the write.
    Applied(D),

    /// The floor guard failed; nothing was written. Carries the current
    /// document so callers can report what was available.
    Rejected(D),

    /// No document with that id.
    Missing,
}

impl<D> IncrementOutcome<D> {
    pub fn try_map<T, E>(self, f: impl FnOnce(D) -> Result<T, E>) -> Result<IncrementOutcome<T>, E> {
        Ok(match self {
            IncrementOutcome::Applied(d) => IncrementOutcome::Applied(f(d)?),
            IncrementOutcome::Rejected(d) => IncrementOutcome::Rejected(f(d)?),
            IncrementOutcome::Missing => IncrementOutcome::Missing,
        })
    }
}

// =============================================================================
// Record Store Trait
// =============================================================================

/// Create/read/update/query interface over the document store.
///
/// Every operation is atomic on a single document; nothing spans documents.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Documents matching `query`, ordered and paginated.
    async fn find(&self, kind: RecordKind, query: &Query) -> DbResult<Vec<Value>>;

    /// First document matching `query`.
    async fn find_one(&self, kind: RecordKind, query: &Query) -> DbResult<Option<Value>> {
        let query = query.clone().limit(1);
        Ok(self.find(kind, &query).await?.into_iter().next())
    }

    /// Document by id.
    async fn get(&self, kind: RecordKind, id: &str) -> DbResult<Option<Value>> {
        self.find_one(kind, &Query::by("id", id)).await
    }

    /// Inserts a document. It must be a JSON object with a string `id`.
    ///
    /// Fails with `UniqueViolation` when the id or a unique field clashes.
    async fn insert(&self, kind: RecordKind, doc: Value) -> DbResult<Value>;

    /// Shallow-merges `patch` into the document. Returns `None` when absent.
    /// The `id` field is never changed.
    async fn update(&self, kind: RecordKind, id: &str, patch: Value) -> DbResult<Option<Value>>;

    /// Removes a document. Returns whether one existed.
    async fn delete(&self, kind: RecordKind, id: &str) -> DbResult<bool>;

    /// Number of documents matching the filters (pagination is ignored).
    async fn count(&self, kind: RecordKind, query: &Query) -> DbResult<u64>;

    /// Atomically adds `delta` to the integer `field` (absent counts as 0).
    ///
    /// With `floor`, the write happens only if the result stays `>= floor`;
    /// otherwise nothing changes and the outcome is `Rejected`.
    async fn increment(
        &self,
        kind: RecordKind,
        id: &str,
        field: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> DbResult<IncrementOutcome>;

    /// Cheap liveness probe.
    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_eq_and_null_matching() {
        let doc = json!({"id": "1", "barcode": "890", "location": null});

        assert!(Query::by("barcode", "890").matches(&doc));
        assert!(!Query::by("barcode", "891").matches(&doc));
        assert!(Query::by("location", Value::Null).matches(&doc));
        // absent field behaves as null
        assert!(Query::by("warehouse", Value::Null).matches(&doc));
        assert!(!Query::by("warehouse", "main").matches(&doc));
    }

    #[test]
    fn test_in_matching() {
        let doc = json!({"status": "low_stock"});
        assert!(Query::new().is_in("status", ["low_stock", "out_of_stock"]).matches(&doc));
        assert!(!Query::new().is_in("status", Vec::<String>::new()).matches(&doc));
    }

    #[test]
    fn test_between_is_half_open() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let query = Query::new().between("createdAt", from, to);

        assert!(query.matches(&json!({"createdAt": "2026-01-01T00:00:00Z"})));
        assert!(query.matches(&json!({"createdAt": "2026-01-01T23:59:59.999Z"})));
        assert!(!query.matches(&json!({"createdAt": "2026-01-02T00:00:00Z"})));
        assert!(!query.matches(&json!({"createdAt": "not a date"})));
        assert!(!query.matches(&json!({})));
    }

    #[test]
    fn test_unique_fields() {
        assert_eq!(RecordKind::Inventory.unique_fields(), &["productId", "barcode"]);
        assert_eq!(RecordKind::Bill.to_string(), "bill");
    }
}
