use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{SessionStore, StoreError};
use crate::catalog;
use crate::models::{SessionId, SessionRecord, SessionSummary, SubjectProfile};
use crate::patch::FieldPatch;

/// Process-local session table. Counts row writes so callers can assert
/// that no-op patches really are no-ops.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<SessionId, Map<String, Value>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of create/patch/finalize writes applied so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

fn empty_row(id: SessionId, subject: &SubjectProfile) -> Map<String, Value> {
    let mut row: Map<String, Value> = catalog::columns()
        .iter()
        .map(|c| (c.name.clone(), Value::Null))
        .collect();
    row.insert("id".into(), Value::String(id.to_string()));
    row.insert("child_name".into(), Value::String(subject.name.clone()));
    row.insert("age".into(), Value::from(subject.age));
    row.insert("gender".into(), Value::String(subject.gender.clone()));
    row.insert(
        "session_timestamp".into(),
        Value::String(Utc::now().to_rfc3339()),
    );
    row
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, subject: &SubjectProfile) -> Result<SessionId, StoreError> {
        let id = SessionId::new(Uuid::new_v4());
        self.rows.write().await.insert(id, empty_row(id, subject));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn patch_session(&self, id: SessionId, patch: &FieldPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        patch.validate()?;
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        for (column, value) in patch.iter() {
            row.insert(column.clone(), value.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finalize_session(&self, id: SessionId, media: &FieldPatch) -> Result<(), StoreError> {
        media.validate()?;
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        for (column, value) in media.iter() {
            row.insert(column.clone(), value.clone());
        }
        row.insert(
            "completed_at".into(),
            Value::String(Utc::now().to_rfc3339()),
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StoreError> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .map(SessionRecord)
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let rows = self.rows.read().await;
        let mut out = rows
            .values()
            .map(summarize)
            .collect::<Result<Vec<_>, _>>()?;
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn health(&self) -> Result<String, StoreError> {
        Ok(format!("memory ({} sessions)", self.rows.read().await.len()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn summarize(row: &Map<String, Value>) -> Result<SessionSummary, StoreError> {
    let text = |col: &str| row.get(col).and_then(Value::as_str).map(str::to_string);
    let id = text("id")
        .and_then(|s| Uuid::parse_str(&s).ok())
        .ok_or_else(|| StoreError::InvalidResponse("row without id".into()))?;
    let created_at = text("session_timestamp")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| StoreError::InvalidResponse("row without timestamp".into()))?;
    Ok(SessionSummary {
        id,
        child_name: text("child_name").unwrap_or_default(),
        gender: text("gender").unwrap_or_default(),
        age: row
            .get("age")
            .and_then(Value::as_i64)
            .and_then(|a| i32::try_from(a).ok())
            .unwrap_or_default(),
        report_url: text("report_url"),
        created_at,
    })
}
