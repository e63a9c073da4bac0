use std::sync::Arc;

use thiserror::Error;

use crate::config::{PersistenceConfig, SubjectConfig};
use crate::error::ValidationError;
use crate::models::{SessionId, SubjectProfile};
use crate::persist::{self, PersistError};
use crate::store::{SessionStore, StoreError};

#[derive(Error, Debug)]
pub enum IssueError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("could not create session: {0}")]
    Store(#[from] PersistError),
}

/// Issues the single session id for one assessment attempt.
pub struct SessionIssuer {
    store: Arc<dyn SessionStore>,
    subject_rules: SubjectConfig,
    retry: PersistenceConfig,
    issued: Option<(SessionId, SubjectProfile)>,
}

impl SessionIssuer {
    pub fn new(
        store: Arc<dyn SessionStore>,
        subject_rules: SubjectConfig,
        retry: PersistenceConfig,
    ) -> Self {
        Self {
            store,
            subject_rules,
            retry,
            issued: None,
        }
    }

    /// Validates `subject` and creates the session row. Once an id has been
    /// issued, later calls return it without touching the store.
    ///
    /// Creation is not idempotent, so it is only resent when the failed
    /// request never reached the store.
    pub async fn issue(&mut self, subject: &SubjectProfile) -> Result<SessionId, IssueError> {
        if let Some((id, _)) = &self.issued {
            tracing::debug!(session_id = %id, "Session already issued");
            return Ok(*id);
        }
        subject.validate(&self.subject_rules)?;

        let store = Arc::clone(&self.store);
        let id = persist::with_retry_if(
            &self.retry,
            || store.create_session(subject),
            StoreError::is_unsent,
        )
        .await?;
        tracing::info!(session_id = %id, store = store.name(), "Issued session");
        self.issued = Some((id, subject.clone()));
        Ok(id)
    }

    pub fn issued(&self) -> Option<SessionId> {
        self.issued.as_ref().map(|(id, _)| *id)
    }

    pub fn subject(&self) -> Option<&SubjectProfile> {
        self.issued.as_ref().map(|(_, s)| s)
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.store)
    }
}
