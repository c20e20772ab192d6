//! Google Cloud REST client
//!
//! Thin JSON-over-HTTPS wrapper: bearer token authentication, the configured
//! user agent, and decoding of Google's error envelope.

use crate::error::{GcpError, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use stratus_cloud::{ProviderConfig, Service};

/// Source of OAuth2 access tokens
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// A pre-issued access token (e.g. from `gcloud auth print-access-token`)
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AuthProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(GcpError::InvalidConfig("access token is empty".into()));
        }
        Ok(self.0.clone())
    }
}

/// Authenticated client shared by every resource handler
#[derive(Clone)]
pub struct GcpClient {
    http: reqwest::Client,
    config: Arc<ProviderConfig>,
    auth: Arc<dyn AuthProvider>,
}

impl GcpClient {
    /// Create a client that authenticates with the config's access token
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let auth = Arc::new(StaticToken::new(config.access_token.clone()));
        Self::with_auth(config, auth)
    }

    pub fn with_auth(config: ProviderConfig, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            config: Arc::new(config),
            auth,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn project(&self) -> &str {
        &self.config.project
    }

    /// Join a service base URL and a path
    pub fn url(&self, service: Service, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.endpoint(service),
            path.trim_start_matches('/')
        )
    }

    pub async fn get(&self, url: &str) -> Result<serde_json::Value> {
        self.send(Method::GET, url, None).await
    }

    pub async fn post(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        self.send(Method::POST, url, Some(body)).await
    }

    pub async fn patch(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        self.send(Method::PATCH, url, Some(body)).await
    }

    pub async fn put(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        self.send(Method::PUT, url, Some(body)).await
    }

    pub async fn delete(&self, url: &str) -> Result<serde_json::Value> {
        self.send(Method::DELETE, url, None).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let token = self.auth.token().await?;

        tracing::debug!("{} {}", method, url);

        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &text));
        }

        decode_body(&text)
    }
}

/// Decode a success body; an empty body is `null`
fn decode_body(text: &str) -> Result<serde_json::Value> {
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(text).map_err(|e| GcpError::Decode(e.to_string()))
}

/// Build an error from a non-2xx response body
fn api_error(status: u16, text: &str) -> GcpError {
    match serde_json::from_str::<ErrorEnvelope>(text) {
        Ok(envelope) => GcpError::Api {
            status,
            code: envelope
                .error
                .status
                .unwrap_or_else(|| envelope.error.code.to_string()),
            message: envelope.error.message,
        },
        Err(_) => GcpError::Api {
            status,
            code: status.to_string(),
            message: text.trim().to_string(),
        },
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TOKEN, client_for, not_found};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> GcpClient {
        let mut config = ProviderConfig::new("my-project", "token");
        config.endpoints.compute = "http://localhost:9000/compute/v1/".into();
        GcpClient::new(config).unwrap()
    }

    #[test]
    fn test_url_join() {
        let client = client();
        assert_eq!(
            client.url(Service::Compute, "/projects/p/zones/z/instances"),
            "http://localhost:9000/compute/v1/projects/p/zones/z/instances"
        );
        assert_eq!(
            client.url(Service::CloudFunctions, "operations/abc"),
            "https://cloudfunctions.googleapis.com/v1/operations/abc"
        );
        assert_eq!(client.project(), "my-project");
    }

    #[test]
    fn test_api_error_envelope() {
        let body = r#"{"error":{"code":404,"message":"The resource 'x' was not found","status":"NOT_FOUND"}}"#;
        match api_error(404, body) {
            GcpError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, "NOT_FOUND");
                assert_eq!(message, "The resource 'x' was not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_without_status_string() {
        let err = api_error(400, r#"{"error":{"code":400,"message":"bad"}}"#);
        assert!(matches!(err, GcpError::Api { ref code, .. } if code == "400"));
    }

    #[test]
    fn test_api_error_plain_text() {
        let err = api_error(502, "Bad Gateway\n");
        assert!(matches!(err, GcpError::Api { status: 502, ref message, .. } if message == "Bad Gateway"));
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body("").unwrap(), serde_json::Value::Null);
        assert_eq!(decode_body(r#"{"a":1}"#).unwrap()["a"], 1);
        assert!(matches!(decode_body("<html>"), Err(GcpError::Decode(_))));
    }

    #[tokio::test]
    async fn test_send_authenticates_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/p"))
            .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "p" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/logging/v2/projects/p/sinks"))
            .and(body_json(json!({ "name": "audit" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let project = client
            .get(&client.url(Service::Compute, "projects/p"))
            .await
            .unwrap();
        assert_eq!(project["name"], "p");

        let empty = client
            .post(
                &client.url(Service::Logging, "projects/p/sinks"),
                &json!({ "name": "audit" }),
            )
            .await
            .unwrap();
        assert!(empty.is_null());
    }

    #[tokio::test]
    async fn test_send_maps_error_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/compute/v1/projects/p/zones/z/instances/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(not_found()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/crm/v1/projects/p"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": 403, "message": "denied", "status": "PERMISSION_DENIED" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .delete(&client.url(Service::Compute, "projects/p/zones/z/instances/gone"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(
            stratus_cloud::CloudError::from(err),
            stratus_cloud::CloudError::ResourceNotFound(_)
        ));

        let err = client
            .get(&client.url(Service::ResourceManager, "projects/p"))
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
        assert!(matches!(err, GcpError::Api { ref code, .. } if code == "PERMISSION_DENIED"));
    }

    #[tokio::test]
    async fn test_static_token() {
        assert_eq!(StaticToken::new("abc").token().await.unwrap(), "abc");
        tokio_test::assert_err!(StaticToken::new("").token().await);
    }
}
