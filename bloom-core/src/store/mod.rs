//! Relational store contract for session rows.
//!
//! Three backends share the trait:
//! - **Postgres** — the production table, via sqlx
//! - **Memory** — process-local map, for tests and offline runs
//! - **Http** — a client for a remote `bloom-server`

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ValidationError;
use crate::models::{SessionId, SessionRecord, SessionSummary, SubjectProfile};
use crate::patch::FieldPatch;

pub mod http;
pub mod memory;
pub mod postgres;

pub use http::HttpSessionStore;
pub use memory::MemoryStore;
pub use postgres::PgSessionStore;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a row holding only the subject metadata and returns its id.
    async fn create_session(&self, subject: &SubjectProfile) -> Result<SessionId, StoreError>;

    /// Applies `patch` to the row. An empty patch performs no write.
    async fn patch_session(&self, id: SessionId, patch: &FieldPatch) -> Result<(), StoreError>;

    /// Stores the media URLs and marks the session complete.
    async fn finalize_session(&self, id: SessionId, media: &FieldPatch) -> Result<(), StoreError>;

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StoreError>;

    /// All sessions, newest first.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError>;

    /// Backend version string, or an error when the backend is unreachable.
    async fn health(&self) -> Result<String, StoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether a retry could succeed. Validation and missing rows never will.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::RowNotFound) => false,
            StoreError::Database(_) | StoreError::Http(_) | StoreError::Unavailable(_) => true,
            StoreError::Api { code, .. } => *code >= 500 || *code == 429,
            StoreError::NotFound(_)
            | StoreError::Validation(_)
            | StoreError::InvalidResponse(_) => false,
        }
    }

    /// Whether the request certainly never reached the store, so even a
    /// non-idempotent call such as session creation can be resent.
    pub fn is_unsent(&self) -> bool {
        match self {
            StoreError::Http(e) => e.is_connect(),
            StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            StoreError::Api { code, .. } => *code == 429 || *code == 503,
            StoreError::Unavailable(_) => true,
            _ => false,
        }
    }
}
