//! # PostgreSQL Record Store
//!
//! [`RecordStore`] over a single JSONB `documents` table.
//!
//! ## Query Translation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Filter::Eq(f, v)          COALESCE(body -> f, 'null') = v::jsonb       │
//! │  Filter::In(f, [a, b])     (... = a OR ... = b)       [] → FALSE        │
//! │  Filter::Between(f, a, b)  (body ->> f)::timestamptz >= a AND < b       │
//! │  Order                     ORDER BY seq ASC | DESC                      │
//! │  skip / limit              OFFSET / LIMIT                               │
//! │                                                                         │
//! │  increment(f, d, floor)    UPDATE ... jsonb_set(body, {f}, f + d)      │
//! │                            WHERE f + d >= floor  (single statement)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Queries are built at runtime with `QueryBuilder`, so the crate compiles
//! without a live database.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::store::{Filter, IncrementOutcome, Order, Query, RecordKind, RecordStore};

/// Document store backed by the `documents` table.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        PgRecordStore { pool }
    }
}

// =============================================================================
// SQL Building
// =============================================================================

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, kind: RecordKind, query: &Query) {
    qb.push(" WHERE kind = ");
    qb.push_bind(kind.as_str());

    for filter in query.filters() {
        match filter {
            Filter::Eq(field, value) => {
                qb.push(" AND ");
                push_field_equals(qb, field, value);
            }
            Filter::In(field, values) => {
                if values.is_empty() {
                    qb.push(" AND FALSE");
                    continue;
                }
                qb.push(" AND (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        qb.push(" OR ");
                    }
                    push_field_equals(qb, field, value);
                }
                qb.push(")");
            }
            Filter::Between { field, from, to } => {
                qb.push(" AND (body ->> ");
                qb.push_bind(field.clone());
                qb.push(")::timestamptz >= ");
                qb.push_bind(*from);
                qb.push(" AND (body ->> ");
                qb.push_bind(field.clone());
                qb.push(")::timestamptz < ");
                qb.push_bind(*to);
            }
        }
    }
}

fn push_field_equals(qb: &mut QueryBuilder<'_, Postgres>, field: &str, value: &Value) {
    qb.push("COALESCE(body -> ");
    qb.push_bind(field.to_string());
    qb.push(", 'null'::jsonb) = ");
    qb.push_bind(Json(value.clone()));
}

fn select_sql(kind: RecordKind, query: &Query) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT body FROM documents");
    push_filters(&mut qb, kind, query);

    qb.push(match query.order() {
        Order::OldestFirst => " ORDER BY seq ASC",
        Order::NewestFirst => " ORDER BY seq DESC",
    });

    if let Some(limit) = query.limit_count() {
        qb.push(" LIMIT ");
        qb.push_bind(limit as i64);
    }
    if query.skip_count() > 0 {
        qb.push(" OFFSET ");
        qb.push_bind(query.skip_count() as i64);
    }
    qb
}

fn count_sql(kind: RecordKind, query: &Query) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM documents");
    push_filters(&mut qb, kind, query);
    qb
}

/// Rewrites an anonymous unique violation with the offending value, which
/// PostgreSQL reports only in the error detail.
fn with_value(err: DbError, doc: &Value) -> DbError {
    match err {
        DbError::UniqueViolation { field, .. } => {
            let value = doc
                .get(&field)
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or_else(|| "unknown".to_string());
            DbError::UniqueViolation { field, value }
        }
        other => other,
    }
}

fn object_id(doc: &Value) -> DbResult<String> {
    if !doc.is_object() {
        return Err(DbError::InvalidDocument("document must be a JSON object".into()));
    }
    doc.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DbError::InvalidDocument("document needs a string id".into()))
}

// =============================================================================
// RecordStore Implementation
// =============================================================================

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find(&self, kind: RecordKind, query: &Query) -> DbResult<Vec<Value>> {
        debug!(kind = %kind, filters = query.filters().len(), "Finding documents");

        let rows: Vec<Json<Value>> = select_sql(kind, query)
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|Json(body)| body).collect())
    }

    async fn get(&self, kind: RecordKind, id: &str) -> DbResult<Option<Value>> {
        debug!(kind = %kind, id = %id, "Getting document");

        let row: Option<Json<Value>> =
            sqlx::query_scalar("SELECT body FROM documents WHERE kind = $1 AND id = $2")
                .bind(kind.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|Json(body)| body))
    }

    async fn insert(&self, kind: RecordKind, doc: Value) -> DbResult<Value> {
        let id = object_id(&doc)?;
        debug!(kind = %kind, id = %id, "Inserting document");

        sqlx::query("INSERT INTO documents (kind, id, body) VALUES ($1, $2, $3)")
            .bind(kind.as_str())
            .bind(&id)
            .bind(Json(&doc))
            .execute(&self.pool)
            .await
            .map_err(|e| with_value(e.into(), &doc))?;

        Ok(doc)
    }

    async fn update(&self, kind: RecordKind, id: &str, patch: Value) -> DbResult<Option<Value>> {
        let Value::Object(mut patch) = patch else {
            return Err(DbError::InvalidDocument("patch must be a JSON object".into()));
        };
        patch.remove("id");
        let patch = Value::Object(patch);

        debug!(kind = %kind, id = %id, "Updating document");

        let row: Option<Json<Value>> = sqlx::query_scalar(
            r#"
            UPDATE documents
            SET body = body || $3, updated_at = now()
            WHERE kind = $1 AND id = $2
            RETURNING body
            "#,
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(Json(&patch))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| with_value(e.into(), &patch))?;

        Ok(row.map(|Json(body)| body))
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> DbResult<bool> {
        debug!(kind = %kind, id = %id, "Deleting document");

        let result = sqlx::query("DELETE FROM documents WHERE kind = $1 AND id = $2")
            .bind(kind.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, kind: RecordKind, query: &Query) -> DbResult<u64> {
        let count: i64 = count_sql(kind, query)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn increment(
        &self,
        kind: RecordKind,
        id: &str,
        field: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> DbResult<IncrementOutcome> {
        debug!(kind = %kind, id = %id, field, delta, ?floor, "Incrementing field");

        // One statement: the read of the old value and the write of the new
        // one happen under the same row lock.
        let applied: Option<Json<Value>> = sqlx::query_scalar(
            r#"
            UPDATE documents
            SET body = jsonb_set(
                    body,
                    ARRAY[$3::text],
                    to_jsonb(COALESCE((body ->> $3::text)::bigint, 0) + $4)
                ),
                updated_at = now()
            WHERE kind = $1 AND id = $2
              AND ($5::bigint IS NULL OR COALESCE((body ->> $3::text)::bigint, 0) + $4 >= $5)
            RETURNING body
            "#,
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(field)
        .bind(delta)
        .bind(floor)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(Json(body)) = applied {
            return Ok(IncrementOutcome::Applied(body));
        }

        // Nothing written: either the guard failed or the row is absent.
        Ok(match self.get(kind, id).await? {
            Some(current) => IncrementOutcome::Rejected(current),
            None => IncrementOutcome::Missing,
        })
    }

    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
