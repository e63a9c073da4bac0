use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{SessionStore, StoreError};
use crate::catalog::{self, ColumnKind, TABLE};
use crate::error::ValidationError;
use crate::models::{SessionId, SessionRecord, SessionSummary, SubjectProfile};
use crate::patch::FieldPatch;

/// Session store backed by the `child_assessment_features` table.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Appends `col = $n` assignments for every column of `patch`.
///
/// Column names come from the catalog, never from the caller, and values are
/// bound with the column's SQL type.
fn push_assignments(
    builder: &mut QueryBuilder<'_, Postgres>,
    patch: &FieldPatch,
) -> Result<(), ValidationError> {
    let mut first = true;
    for (name, value) in patch.iter() {
        let column = catalog::column(name)
            .ok_or_else(|| ValidationError::UnknownColumn(name.clone()))?;
        if !first {
            builder.push(", ");
        }
        first = false;
        builder.push(column.name.as_str()).push(" = ");
        match column.kind {
            ColumnKind::Integer => {
                let v = match value {
                    Value::Null => None,
                    v => Some(
                        v.as_i64()
                            .and_then(|n| i32::try_from(n).ok())
                            .ok_or_else(|| ValidationError::ColumnType {
                                column: name.clone(),
                                expected: "integer",
                                actual: v.to_string(),
                            })?,
                    ),
                };
                builder.push_bind(v);
            }
            ColumnKind::Text => {
                builder.push_bind(value.as_str().map(str::to_string));
            }
            ColumnKind::Uuid | ColumnKind::Timestamp => {
                return Err(ValidationError::ReadOnlyColumn(name.clone()));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, subject: &SubjectProfile) -> Result<SessionId, StoreError> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO child_assessment_features (child_name, age, gender)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&subject.name)
        .bind(subject.age)
        .bind(&subject.gender)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(session_id = %row.0, "Created assessment session");
        Ok(SessionId::new(row.0))
    }

    async fn patch_session(&self, id: SessionId, patch: &FieldPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        patch.validate()?;

        let mut builder = QueryBuilder::<Postgres>::new(format!("UPDATE {TABLE} SET "));
        push_assignments(&mut builder, patch)?;
        builder.push(" WHERE id = ").push_bind(id.as_uuid());

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        tracing::debug!(session_id = %id, columns = patch.len(), "Patched session");
        Ok(())
    }

    async fn finalize_session(&self, id: SessionId, media: &FieldPatch) -> Result<(), StoreError> {
        media.validate()?;

        let mut builder = QueryBuilder::<Postgres>::new(format!("UPDATE {TABLE} SET "));
        if !media.is_empty() {
            push_assignments(&mut builder, media)?;
            builder.push(", ");
        }
        builder
            .push("completed_at = NOW() WHERE id = ")
            .push_bind(id.as_uuid());

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        tracing::info!(session_id = %id, media = media.len(), "Finalized session");
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StoreError> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT to_jsonb(t) FROM child_assessment_features t WHERE t.id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((Value::Object(map),)) => Ok(SessionRecord(map)),
            Some((other,)) => Err(StoreError::InvalidResponse(format!(
                "expected row object, got {other}"
            ))),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let rows = sqlx::query_as::<_, SessionSummary>(
            r#"
            SELECT id, child_name, gender, age, report_url,
                   session_timestamp AS created_at
            FROM child_assessment_features
            ORDER BY session_timestamp DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn health(&self) -> Result<String, StoreError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// Tests — require a live PostgreSQL; each test skips when it is unavailable
// ============================================================================
