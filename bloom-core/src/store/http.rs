use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{SessionStore, StoreError};
use crate::config::HttpConfig;
use crate::models::{SessionId, SessionRecord, SessionSummary, SubjectProfile};
use crate::patch::FieldPatch;

/// Session store that talks to a remote `bloom-server` over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpSessionStore {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    session_id: SessionId,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    store: Option<String>,
}

impl HttpSessionStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Client for `base_url` using the configured request timeout.
    pub fn from_config(
        config: &HttpConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, StoreError> {
        Self::new(base_url, config.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Maps non-2xx responses onto `StoreError`.
    async fn check(response: Response, id: Option<SessionId>) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(StoreError::NotFound(id));
            }
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or(body);
        tracing::error!(code = status.as_u16(), message = %message, "Bloom server error");
        Err(StoreError::Api {
            code: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SessionStore for HttpSessionStore {
    async fn create_session(&self, subject: &SubjectProfile) -> Result<SessionId, StoreError> {
        let response = self
            .client
            .post(self.url("/session/create"))
            .json(subject)
            .send()
            .await?;
        let body: CreateResponse = Self::check(response, None).await?.json().await?;
        Ok(body.session_id)
    }

    async fn patch_session(&self, id: SessionId, patch: &FieldPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        patch.validate()?;
        let response = self
            .client
            .post(self.url("/session/save"))
            .json(&json!({ "sessionId": id, "payload": patch }))
            .send()
            .await?;
        Self::check(response, Some(id)).await?;
        Ok(())
    }

    async fn finalize_session(&self, id: SessionId, media: &FieldPatch) -> Result<(), StoreError> {
        media.validate()?;
        let response = self
            .client
            .post(self.url("/session/finalize"))
            .json(&json!({ "sessionId": id, "media": media }))
            .send()
            .await?;
        Self::check(response, Some(id)).await?;
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("/session/{id}")))
            .send()
            .await?;
        Ok(Self::check(response, Some(id)).await?.json().await?)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let response = self.client.get(self.url("/assessments")).send().await?;
        Ok(Self::check(response, None).await?.json().await?)
    }

    async fn health(&self) -> Result<String, StoreError> {
        let response = self.client.get(self.url("/health")).send().await?;
        let body: HealthBody = Self::check(response, None).await?.json().await?;
        body.store
            .ok_or_else(|| StoreError::InvalidResponse("health body without store".into()))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> HttpSessionStore {
        HttpSessionStore::new(server.uri(), Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn test_create_session_returns_server_id() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/session/create"))
            .and(body_json(json!({"name": "Ava", "age": 7, "gender": "female"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sessionId": id})))
            .mount(&server)
            .await;

        let got = store_for(&server)
            .create_session(&SubjectProfile::new("Ava", 7, "female"))
            .await
            .unwrap();
        assert_eq!(got.as_uuid(), id);
    }

    #[tokio::test]
    async fn test_patch_posts_session_and_payload() {
        let server = MockServer::start().await;
        let id = SessionId::new(Uuid::new_v4());

        Mock::given(method("POST"))
            .and(path("/session/save"))
            .and(body_json(json!({
                "sessionId": id,
                "payload": {"test1_q1": 1, "test1_q1_time": 4}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let patch = FieldPatch::new().with("test1_q1", 1).with("test1_q1_time", 4);
        store_for(&server).patch_session(id, &patch).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_patch_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        store_for(&server)
            .patch_session(SessionId::new(Uuid::new_v4()), &FieldPatch::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/save"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "DB error"})))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .patch_session(
                SessionId::new(Uuid::new_v4()),
                &FieldPatch::new().with("test1_q1", 0),
            )
            .await
            .unwrap_err();
        match err {
            StoreError::Api { code, message } => {
                assert_eq!(code, 500);
                assert_eq!(message, "DB error");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_session_maps_to_not_found() {
        let server = MockServer::start().await;
        let id = SessionId::new(Uuid::new_v4());
        Mock::given(method("GET"))
            .and(path(format!("/session/{id}")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
            .mount(&server)
            .await;

        let err = store_for(&server).get_session(id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(got) if got == id));
    }

    #[tokio::test]
    async fn test_health_reads_store_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "healthy",
                "store": "PostgreSQL 16.2",
            })))
            .mount(&server)
            .await;

        assert_eq!(store_for(&server).health().await.unwrap(), "PostgreSQL 16.2");
    }

    #[tokio::test]
    async fn test_configured_timeout_cuts_slow_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"store": "slow"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = HttpConfig {
            request_timeout_seconds: 1,
            ..HttpConfig::default()
        };
        let store = HttpSessionStore::from_config(&config, server.uri()).unwrap();
        let err = store.health().await.unwrap_err();
        match err {
            StoreError::Http(e) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
