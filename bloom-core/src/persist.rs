//! Partial persistence client.
//!
//! Pushes column patches for one session as the wizard progresses. Transient
//! store failures are retried with jittered exponential backoff; once retries
//! are exhausted the configured [`PersistPolicy`] decides between queueing the
//! patch for a later flush and failing the push outright. Queued patches are
//! always delivered in arrival order, ahead of any newer patch, so a later
//! value for the same column can never be overwritten by an older one.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::{PersistPolicy, PersistenceConfig};
use crate::models::SessionId;
use crate::patch::FieldPatch;
use crate::store::{SessionStore, StoreError};

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("store rejected the write: {0}")]
    Rejected(StoreError),

    #[error("All {attempts} attempts failed: {source}")]
    RetryExhausted { attempts: usize, source: StoreError },

    #[error("{pending} queued patch(es) could not be delivered: {source}")]
    Undelivered { pending: usize, source: Box<PersistError> },
}

/// What happened to a pushed patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Written to the store.
    Applied,
    /// Empty patch; nothing to write.
    Skipped,
    /// Held for a later flush; `pending` counts the whole queue.
    Queued { pending: usize },
}

/// Backoff shared by every store call: 2x, 4x, 8x ... the base delay, jittered.
pub(crate) fn backoff(config: &PersistenceConfig) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(config.retry_delay_ms.max(1))
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(config.max_retries)
}

/// Runs `op` under the shared retry policy, retrying only transient errors.
pub(crate) async fn with_retry<T, F, Fut>(
    config: &PersistenceConfig,
    op: F,
) -> Result<T, PersistError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    with_retry_if(config, op, StoreError::is_transient).await
}

/// Like [`with_retry`], but only errors accepted by `resend` are retried.
/// Transient errors that stop early still report as exhausted.
pub(crate) async fn with_retry_if<T, F, Fut>(
    config: &PersistenceConfig,
    mut op: F,
    resend: fn(&StoreError) -> bool,
) -> Result<T, PersistError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    let mut attempts = 0;
    let result = RetryIf::spawn(
        backoff(config),
        || {
            attempts += 1;
            op()
        },
        |e: &StoreError| resend(e),
    )
    .await;

    result.map_err(|e| {
        if e.is_transient() {
            tracing::error!(attempts, error = %e, "All store retry attempts failed");
            PersistError::RetryExhausted { attempts, source: e }
        } else {
            PersistError::Rejected(e)
        }
    })
}

pub struct PersistenceClient {
    store: Arc<dyn SessionStore>,
    session: SessionId,
    config: PersistenceConfig,
    pending: VecDeque<FieldPatch>,
}

impl PersistenceClient {
    pub fn new(store: Arc<dyn SessionStore>, session: SessionId, config: PersistenceConfig) -> Self {
        Self {
            store,
            session,
            config,
            pending: VecDeque::new(),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn policy(&self) -> PersistPolicy {
        self.config.policy
    }

    /// Pushes one patch. Older queued patches are flushed first.
    pub async fn push(&mut self, patch: FieldPatch) -> Result<PushOutcome, PersistError> {
        if patch.is_empty() {
            return Ok(PushOutcome::Skipped);
        }
        patch
            .validate()
            .map_err(|e| PersistError::Rejected(e.into()))?;

        if !self.pending.is_empty() {
            if let Err(e) = self.flush().await {
                tracing::warn!(
                    session_id = %self.session,
                    error = %e,
                    "Queue still blocked, holding patch behind it"
                );
                self.pending.push_back(patch);
                return Ok(PushOutcome::Queued {
                    pending: self.pending.len(),
                });
            }
        }

        let store = Arc::clone(&self.store);
        let session = self.session;
        let result = with_retry(&self.config, || store.patch_session(session, &patch)).await;
        match result {
            Ok(()) => Ok(PushOutcome::Applied),
            Err(e @ PersistError::RetryExhausted { .. })
                if self.config.policy == PersistPolicy::Queue =>
            {
                self.pending.push_back(patch);
                tracing::warn!(
                    session_id = %self.session,
                    pending = self.pending.len(),
                    error = %e,
                    "Patch queued for later delivery"
                );
                Ok(PushOutcome::Queued {
                    pending: self.pending.len(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Delivers queued patches oldest first, stopping at the first failure.
    /// Returns how many were delivered.
    pub async fn flush(&mut self) -> Result<usize, PersistError> {
        let mut delivered = 0;
        while let Some(patch) = self.pending.front() {
            let store = Arc::clone(&self.store);
            let session = self.session;
            if let Err(e) = with_retry(&self.config, || store.patch_session(session, patch)).await {
                return Err(PersistError::Undelivered {
                    pending: self.pending.len(),
                    source: Box::new(e),
                });
            }
            self.pending.pop_front();
            delivered += 1;
        }
        if delivered > 0 {
            tracing::info!(session_id = %self.session, delivered, "Flushed queued patches");
        }
        Ok(delivered)
    }

    /// Flushes the queue, then stores media URLs and marks the session complete.
    pub async fn finalize(&mut self, media: &FieldPatch) -> Result<(), PersistError> {
        self.flush().await?;
        let store = Arc::clone(&self.store);
        let session = self.session;
        with_retry(&self.config, || store.finalize_session(session, media)).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{SessionRecord, SessionSummary, SubjectProfile};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Memory store whose next `failures` calls fail transiently. With
    /// `lose_create_reply` set, creates are applied but answered with a 500.
    pub(crate) struct FlakyStore {
        pub inner: MemoryStore,
        pub failures: AtomicUsize,
        pub attempts: AtomicUsize,
        pub lose_create_reply: AtomicBool,
    }

    impl FlakyStore {
        pub(crate) fn new(failures: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures: AtomicUsize::new(failures),
                attempts: AtomicUsize::new(0),
                lose_create_reply: AtomicBool::new(false),
            }
        }

        fn trip(&self) -> Result<(), StoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn create_session(&self, subject: &SubjectProfile) -> Result<SessionId, StoreError> {
            self.trip()?;
            let id = self.inner.create_session(subject).await?;
            if self.lose_create_reply.load(Ordering::SeqCst) {
                return Err(StoreError::Api {
                    code: 500,
                    message: "reply lost".into(),
                });
            }
            Ok(id)
        }
        async fn patch_session(&self, id: SessionId, patch: &FieldPatch) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.patch_session(id, patch).await
        }
        async fn finalize_session(&self, id: SessionId, media: &FieldPatch) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.finalize_session(id, media).await
        }
        async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StoreError> {
            self.inner.get_session(id).await
        }
        async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
            self.inner.list_sessions().await
        }
        async fn health(&self) -> Result<String, StoreError> {
            self.inner.health().await
        }
        fn name(&self) -> &str {
            "flaky"
        }
    }

    pub(crate) fn fast_config(max_retries: usize, policy: PersistPolicy) -> PersistenceConfig {
        PersistenceConfig {
            max_retries,
            retry_delay_ms: 1,
            policy,
        }
    }

    async fn setup(failures: usize) -> (Arc<FlakyStore>, SessionId) {
        let store = Arc::new(FlakyStore::new(0));
        let id = store
            .create_session(&SubjectProfile::new("Ava", 7, "female"))
            .await
            .unwrap();
        store.failures.store(failures, Ordering::SeqCst);
        store.attempts.store(0, Ordering::SeqCst);
        (store, id)
    }

    #[tokio::test]
    async fn empty_patch_is_skipped_without_store_call() {
        let (store, id) = setup(0).await;
        let mut client = PersistenceClient::new(store.clone(), id, fast_config(2, PersistPolicy::Queue));
        let outcome = client.push(FieldPatch::new()).await.unwrap();
        assert_eq!(outcome, PushOutcome::Skipped);
        assert_eq!(store.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let (store, id) = setup(2).await;
        let mut client = PersistenceClient::new(store.clone(), id, fast_config(3, PersistPolicy::Queue));
        let outcome = client
            .push(FieldPatch::new().with("test1_q1", 1))
            .await
            .unwrap();
        assert_eq!(outcome, PushOutcome::Applied);
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn hard_fail_surfaces_exhausted_retries() {
        let (store, id) = setup(10).await;
        let mut client =
            PersistenceClient::new(store.clone(), id, fast_config(1, PersistPolicy::HardFail));
        let err = client
            .push(FieldPatch::new().with("test1_q1", 1))
            .await
            .unwrap_err();
        match err {
            PersistError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
        assert_eq!(client.pending(), 0);
    }

    #[tokio::test]
    async fn queued_patches_are_delivered_in_order() {
        let (store, id) = setup(2).await;
        let mut client = PersistenceClient::new(store.clone(), id, fast_config(0, PersistPolicy::Queue));

        let first = client
            .push(FieldPatch::new().with("test1_q1", 0))
            .await
            .unwrap();
        assert_eq!(first, PushOutcome::Queued { pending: 1 });

        // The flush attempt fails too, so the newer patch queues behind.
        let second = client
            .push(FieldPatch::new().with("test1_q1", 1))
            .await
            .unwrap();
        assert_eq!(second, PushOutcome::Queued { pending: 2 });

        assert_eq!(client.flush().await.unwrap(), 2);
        let row = store.inner.get_session(id).await.unwrap();
        assert_eq!(row.get("test1_q1"), Some(&json!(1)), "newest value must win");
    }

    #[tokio::test]
    async fn finalize_flushes_queue_first() {
        let (store, id) = setup(1).await;
        let mut client = PersistenceClient::new(store.clone(), id, fast_config(0, PersistPolicy::Queue));
        client
            .push(FieldPatch::new().with("test4_q1", 1))
            .await
            .unwrap();
        assert_eq!(client.pending(), 1);

        client.finalize(&FieldPatch::new()).await.unwrap();
        assert_eq!(client.pending(), 0);
        let row = store.inner.get_session(id).await.unwrap();
        assert!(row.is_complete());
        assert_eq!(row.get("test4_q1"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn invalid_patch_is_rejected_not_queued() {
        let (store, id) = setup(0).await;
        let mut client = PersistenceClient::new(store, id, fast_config(2, PersistPolicy::Queue));
        let err = client
            .push(FieldPatch::new().with("bogus", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Rejected(StoreError::Validation(_))));
        assert_eq!(client.pending(), 0);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let store = Arc::new(FlakyStore::new(0));
        let missing = SessionId::new(uuid::Uuid::new_v4());
        let mut client = PersistenceClient::new(store.clone(), missing, fast_config(3, PersistPolicy::Queue));
        let err = client
            .push(FieldPatch::new().with("test1_q1", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Rejected(StoreError::NotFound(_))));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
    }
}
