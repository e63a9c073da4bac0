//! Bloom HTTP REST API
//!
//! Axum server through which the assessment front end creates, patches and
//! finalizes session rows and uploads captured media.
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`; the inner functions are tested
//! directly against the in-memory stores.
//!
//! Endpoints:
//! - GET  /health            — health check with store status
//! - GET  /version           — server version info
//! - POST /session/create    — issue a session id for a subject
//! - POST /session/save      — partial column update
//! - POST /session/finalize  — store media URLs, mark complete
//! - GET  /session/:id       — full session row
//! - POST /session/upload    — whole-session video, sets `video_link`
//! - POST /upload            — single artifact, returns its public URL
//! - GET  /media/*key        — serve a stored artifact
//! - GET  /assessments       — session listing, newest first

use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bloom_core::config::SubjectConfig;
use bloom_core::storage::{ObjectStore, StorageError, VIDEO_FOLDER};
use bloom_core::store::{SessionStore, StoreError};
use bloom_core::{BloomConfig, FieldPatch, SessionId, SubjectProfile};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn SessionStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub config: BloomConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let upload_limit = state.config.http.max_upload_mb * 1024 * 1024;
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/session/create", post(create_handler))
        .route("/session/save", post(save_handler))
        .route("/session/finalize", post(finalize_handler))
        .route("/session/upload", post(session_upload_handler))
        .route("/session/:id", get(get_session_handler))
        .route("/upload", post(upload_handler))
        .route("/media/*key", get(media_handler))
        .route("/assessments", get(assessments_handler))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Bloom HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct CreateRequest {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub media: Map<String, Value>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UploadParams {
    pub folder: Option<String>,
    pub ext: Option<String>,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

fn error_body(message: impl Into<String>) -> Value {
    json!({
        "error": message.into(),
        "status": "error",
    })
}

/// Maps a store failure onto a status code and error body.
pub fn store_error_response(e: &StoreError) -> (StatusCode, Value) {
    let status = match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "Store request failed");
    }
    (status, error_body(e.to_string()))
}

fn storage_error_response(e: &StorageError) -> (StatusCode, Value) {
    let status = match e {
        StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "Object storage request failed");
    }
    (status, error_body(e.to_string()))
}

fn parse_session(raw: Option<&str>) -> Result<SessionId, (StatusCode, Value)> {
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                error_body("sessionId is required"),
            ))
        }
    };
    raw.parse().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            error_body(format!("invalid sessionId: {raw}")),
        )
    })
}

/// Inner health check — asks the store for its version.
pub async fn health_inner(store: &dyn SessionStore) -> (StatusCode, Value) {
    match store.health().await {
        Ok(version) => (
            StatusCode::OK,
            json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": version,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "status": "unhealthy",
                "version": env!("CARGO_PKG_VERSION"),
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "bloom/1",
    })
}

/// Inner create — validates the subject and inserts the session row.
pub async fn create_inner(
    store: &dyn SessionStore,
    rules: &SubjectConfig,
    req: CreateRequest,
) -> (StatusCode, Value) {
    let subject = SubjectProfile::new(
        req.name.unwrap_or_default(),
        req.age.unwrap_or_default(),
        req.gender.unwrap_or_default(),
    );
    if let Err(e) = subject.validate(rules) {
        return (StatusCode::BAD_REQUEST, error_body(e.to_string()));
    }

    match store.create_session(&subject).await {
        Ok(id) => (StatusCode::OK, json!({ "sessionId": id })),
        Err(e) => store_error_response(&e),
    }
}

/// Inner save — applies a partial column update. An empty payload is a no-op.
pub async fn save_inner(store: &dyn SessionStore, req: SaveRequest) -> (StatusCode, Value) {
    let id = match parse_session(req.session_id.as_deref()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let patch = FieldPatch::from(req.payload);
    if patch.is_empty() {
        return (StatusCode::OK, json!({ "success": true }));
    }

    match store.patch_session(id, &patch).await {
        Ok(()) => (StatusCode::OK, json!({ "success": true })),
        Err(e) => store_error_response(&e),
    }
}

/// Inner finalize — stores media URLs and marks the session complete.
pub async fn finalize_inner(
    store: &dyn SessionStore,
    req: FinalizeRequest,
) -> (StatusCode, Value) {
    let id = match parse_session(req.session_id.as_deref()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match store.finalize_session(id, &FieldPatch::from(req.media)).await {
        Ok(()) => (StatusCode::OK, json!({ "success": true })),
        Err(e) => store_error_response(&e),
    }
}

/// Inner get — the full session row.
pub async fn get_session_inner(store: &dyn SessionStore, raw_id: &str) -> (StatusCode, Value) {
    let id = match parse_session(Some(raw_id)) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match store.get_session(id).await {
        Ok(record) => (StatusCode::OK, Value::Object(record.0)),
        Err(e) => store_error_response(&e),
    }
}

/// Inner session upload — stores the session video and links it to the row.
pub async fn session_upload_inner(
    store: &dyn SessionStore,
    objects: &dyn ObjectStore,
    raw_id: Option<&str>,
    ext: Option<&str>,
    body: Bytes,
) -> (StatusCode, Value) {
    let id = match parse_session(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, error_body("no video provided"));
    }
    if let Err(e) = store.get_session(id).await {
        return store_error_response(&e);
    }

    let url = match objects
        .upload(body, VIDEO_FOLDER, ext.unwrap_or("webm"))
        .await
    {
        Ok(url) => url,
        Err(e) => return storage_error_response(&e),
    };
    let patch = FieldPatch::new().with("video_link", url.clone());
    match store.patch_session(id, &patch).await {
        Ok(()) => {
            tracing::info!(session_id = %id, video_link = %url, "Linked session video");
            (
                StatusCode::OK,
                json!({ "success": true, "video_link": url }),
            )
        }
        Err(e) => store_error_response(&e),
    }
}

/// Inner upload — stores one artifact and returns its public URL.
pub async fn upload_inner(
    objects: &dyn ObjectStore,
    params: UploadParams,
    body: Bytes,
) -> (StatusCode, Value) {
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, error_body("no file provided"));
    }
    let folder = params.folder.as_deref().unwrap_or("audio");
    let ext = params.ext.as_deref().unwrap_or("webm");
    match objects.upload(body, folder, ext).await {
        Ok(url) => (StatusCode::OK, json!({ "url": url })),
        Err(e) => storage_error_response(&e),
    }
}

/// Inner list — every session, newest first.
pub async fn assessments_inner(store: &dyn SessionStore) -> (StatusCode, Value) {
    match store.list_sessions().await {
        Ok(rows) => match serde_json::to_value(rows) {
            Ok(v) => (StatusCode::OK, v),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())),
        },
        Err(e) => store_error_response(&e),
    }
}

/// Content type for a stored artifact, from its extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "webm" => "video/webm",
        "mp4" => "video/mp4",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(state.store.as_ref()).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn create_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<CreateRequest>,
) -> impl IntoResponse {
    let (status, body) = create_inner(state.store.as_ref(), &state.config.subject, req).await;
    (status, Json(body))
}

pub async fn save_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<SaveRequest>,
) -> impl IntoResponse {
    let (status, body) = save_inner(state.store.as_ref(), req).await;
    (status, Json(body))
}

pub async fn finalize_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<FinalizeRequest>,
) -> impl IntoResponse {
    let (status, body) = finalize_inner(state.store.as_ref(), req).await;
    (status, Json(body))
}

pub async fn get_session_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = get_session_inner(state.store.as_ref(), &id).await;
    (status, Json(body))
}

pub async fn session_upload_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let session = headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok());
    let (status, body) = session_upload_inner(
        state.store.as_ref(),
        state.objects.as_ref(),
        session,
        params.ext.as_deref(),
        body,
    )
    .await;
    (status, Json(body))
}

pub async fn upload_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> impl IntoResponse {
    let (status, body) = upload_inner(state.objects.as_ref(), params, body).await;
    (status, Json(body))
}

pub async fn media_handler(
    State(state): State<Arc<HttpState>>,
    Path(key): Path<String>,
) -> Response {
    match state.objects.fetch(&key).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type_for(&key))],
            bytes,
        )
            .into_response(),
        Err(e) => {
            let (status, body) = storage_error_response(&e);
            (status, Json(body)).into_response()
        }
    }
}

pub async fn assessments_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = assessments_inner(state.store.as_ref()).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — call inner functions directly against in-memory stores
// ============================================================================
