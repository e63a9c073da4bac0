//! Camera/microphone capture as an owned, shared resource.
//!
//! A [`MediaLease`] wraps one acquired capture handle. Clones share the same
//! handle; the backend's `release` runs exactly once, when the last clone is
//! dropped, whether the assessment completed, was abandoned, or unwound.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Backend-issued handle for an acquired capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaHandle(pub u64);

/// Encoded output of a stopped capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub bytes: Bytes,
    pub extension: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("media permission denied: {0}")]
    PermissionDenied(String),

    #[error("capture device unavailable: {0}")]
    Unavailable(String),

    #[error("capture failed: {0}")]
    Capture(String),
}

#[async_trait]
pub trait MediaCapture: Send + Sync {
    async fn acquire(&self, kinds: &[MediaKind]) -> Result<MediaHandle, MediaError>;

    /// Stops recording and returns what was captured, if anything.
    async fn stop(&self, handle: MediaHandle) -> Result<Option<Recording>, MediaError>;

    /// Frees the device. Called from `Drop`, so it must not block.
    fn release(&self, handle: MediaHandle);
}

struct LeaseInner {
    capture: Arc<dyn MediaCapture>,
    handle: MediaHandle,
    kinds: Vec<MediaKind>,
    stopped: AtomicBool,
}

impl Drop for LeaseInner {
    fn drop(&mut self) {
        self.capture.release(self.handle);
        tracing::debug!(handle = self.handle.0, "Released media capture");
    }
}

#[derive(Clone)]
pub struct MediaLease {
    inner: Arc<LeaseInner>,
}

impl fmt::Debug for MediaLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaLease")
            .field("handle", &self.inner.handle)
            .field("kinds", &self.inner.kinds)
            .field("holders", &self.holders())
            .finish()
    }
}

impl MediaLease {
    pub async fn acquire(
        capture: Arc<dyn MediaCapture>,
        kinds: &[MediaKind],
    ) -> Result<Self, MediaError> {
        let handle = capture.acquire(kinds).await.map_err(|e| {
            tracing::warn!(error = %e, "Media capture not acquired");
            e
        })?;
        tracing::info!(handle = handle.0, ?kinds, "Acquired media capture");
        Ok(Self {
            inner: Arc::new(LeaseInner {
                capture,
                handle,
                kinds: kinds.to_vec(),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    pub fn handle(&self) -> MediaHandle {
        self.inner.handle
    }

    pub fn kinds(&self) -> &[MediaKind] {
        &self.inner.kinds
    }

    /// Live clones of this lease, including `self`.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Stops recording. Only the first call reaches the backend; later calls
    /// return `Ok(None)`.
    pub async fn stop(&self) -> Result<Option<Recording>, MediaError> {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.capture.stop(self.inner.handle).await
    }
}
