//! Object storage for captured artifacts (reading audio, writing images,
//! session video). Objects are keyed `<folder>/<millis>-<uuid>.<ext>` and
//! addressed publicly as `<public_base_url>/<key>`.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::{HttpConfig, StorageConfig};

/// Folder for the whole-session recording.
pub const VIDEO_FOLDER: &str = "videos";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("upload rejected ({code}): {message}")]
    Rejected { code: u16, message: String },
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `folder` and returns the public URL.
    async fn upload(&self, bytes: Bytes, folder: &str, extension: &str)
        -> Result<String, StorageError>;

    /// Reads an object back by key (`folder/name`).
    async fn fetch(&self, key: &str) -> Result<Bytes, StorageError>;
}

fn is_segment(s: &str, max: usize) -> bool {
    !s.is_empty()
        && s.len() <= max
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// New object key for an upload, after checking folder and extension.
pub fn object_key(folder: &str, extension: &str) -> Result<String, StorageError> {
    if !is_segment(folder, 64) {
        return Err(StorageError::InvalidKey(format!("folder {folder:?}")));
    }
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    if !is_segment(&ext, 8) {
        return Err(StorageError::InvalidKey(format!("extension {extension:?}")));
    }
    Ok(format!(
        "{folder}/{}-{}.{ext}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    ))
}

fn public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Files under a local directory, served by `bloom-server` at `/media`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.resolved_root(), config.public_base_url.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `key` under the root, refusing anything that could escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(key);
        let plain = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !plain {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(
        &self,
        bytes: Bytes,
        folder: &str,
        extension: &str,
    ) -> Result<String, StorageError> {
        let key = object_key(folder, extension)?;
        let path = self.path_for(&key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        tracing::info!(key = %key, size = bytes.len(), "Stored object");
        Ok(public_url(&self.public_base_url, &key))
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local object store for tests and offline runs.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Bytes>>,
    public_base_url: String,
}

impl MemoryObjectStore {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            public_base_url: public_base_url.into(),
        }
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        bytes: Bytes,
        folder: &str,
        extension: &str,
    ) -> Result<String, StorageError> {
        let key = object_key(folder, extension)?;
        self.objects.write().await.insert(key.clone(), bytes);
        Ok(public_url(&self.public_base_url, &key))
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

/// Uploads through a remote `bloom-server`'s `/upload` endpoint.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(
        config: &HttpConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, StorageError> {
        Self::new(base_url, config.request_timeout())
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(
        &self,
        bytes: Bytes,
        folder: &str,
        extension: &str,
    ) -> Result<String, StorageError> {
        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .query(&[("folder", folder), ("ext", extension)])
            .body(bytes)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Rejected {
                code: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let body: UploadResponse = response.json().await?;
        Ok(body.url)
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, StorageError> {
        let response = self
            .client
            .get(format!("{}/media/{key}", self.base_url))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(response.error_for_status()?.bytes().await?)
    }
}
