//! `google_logging_project_sink`
//!
//! The Logging API applies sink changes synchronously, so no operation is
//! polled.

use crate::client::GcpClient;
use async_trait::async_trait;
use serde_json::Value;
use stratus_cloud::{
    CloudError, ResourceConfig, ResourceLifecycle, ResourceState, Result, Service,
};

pub const RESOURCE_TYPE: &str = "google_logging_project_sink";

pub struct LoggingSink {
    client: GcpClient,
}

impl LoggingSink {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }

    fn sink_url(&self, project: &str, id: &str) -> String {
        self.client
            .url(Service::Logging, &format!("projects/{}/sinks/{}", project, id))
    }

    fn project_of(&self, state: &ResourceState) -> String {
        state
            .get("project")
            .unwrap_or(self.client.project())
            .to_string()
    }

    fn body(config: &ResourceConfig) -> Value {
        let mut body = config.body_without(&["project"]);
        body.insert("name".to_string(), Value::String(config.id.clone()));
        Value::Object(body)
    }

    fn to_state(id: &str, project: &str, doc: &Value) -> ResourceState {
        ResourceState::new(id, RESOURCE_TYPE)
            .with_document(doc)
            .with_attribute("project", project)
    }
}

#[async_trait]
impl ResourceLifecycle for LoggingSink {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, config: &ResourceConfig) -> Result<ResourceState> {
        let project = config
            .get_config::<String>("project")
            .unwrap_or_else(|| self.client.project().to_string());
        let url = format!(
            "{}?uniqueWriterIdentity=true",
            self.client
                .url(Service::Logging, &format!("projects/{}/sinks", project))
        );

        tracing::info!("Creating logging sink {}", config.id);
        let sink = self.client.post(&url, &Self::body(config)).await?;
        Ok(Self::to_state(&config.id, &project, &sink))
    }

    async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>> {
        let project = self.project_of(state);
        match self.client.get(&self.sink_url(&project, &state.id)).await {
            Ok(sink) => Ok(Some(Self::to_state(&state.id, &project, &sink))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        prior: &ResourceState,
        config: &ResourceConfig,
    ) -> Result<ResourceState> {
        let project = self.project_of(prior);
        let url = format!(
            "{}?uniqueWriterIdentity=true",
            self.sink_url(&project, &prior.id)
        );

        tracing::info!("Updating logging sink {}", prior.id);
        let sink = self.client.put(&url, &Self::body(config)).await?;
        if sink.is_null() {
            return Err(CloudError::ApiError(format!(
                "empty response updating sink {}",
                prior.id
            )));
        }
        Ok(Self::to_state(&prior.id, &project, &sink))
    }

    async fn delete(&self, state: &ResourceState) -> Result<()> {
        let project = self.project_of(state);
        tracing::info!("Deleting logging sink {}", state.id);
        match self.client.delete(&self.sink_url(&project, &state.id)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{client_for, not_found};
    use serde_json::json;
    use stratus_cloud::ProviderConfig;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SINK_PATH: &str = "/logging/v2/projects/p/sinks/audit-sink";

    fn sink_config() -> ResourceConfig {
        ResourceConfig::new(
            RESOURCE_TYPE,
            "audit-sink",
            "google",
            json!({ "destination": "storage.googleapis.com/audit-bucket" }),
        )
    }

    #[test]
    fn test_body_sets_name_and_drops_project() {
        let config = ResourceConfig::new(
            RESOURCE_TYPE,
            "audit-sink",
            "google",
            json!({
                "project": "other",
                "destination": "storage.googleapis.com/audit-bucket",
                "filter": "logName:cloudaudit"
            }),
        );
        let body = LoggingSink::body(&config);

        assert_eq!(body["name"], "audit-sink");
        assert_eq!(body["destination"], "storage.googleapis.com/audit-bucket");
        assert!(body.get("project").is_none());
    }

    #[test]
    fn test_state_from_sink() {
        let sink = json!({
            "name": "audit-sink",
            "destination": "storage.googleapis.com/audit-bucket",
            "writerIdentity": "serviceAccount:p-123@gcp-sa-logging.iam.gserviceaccount.com"
        });
        let state = LoggingSink::to_state("audit-sink", "p", &sink);

        assert_eq!(state.id, "audit-sink");
        assert_eq!(state.get("project"), Some("p"));
        assert_eq!(
            state.get("writerIdentity"),
            Some("serviceAccount:p-123@gcp-sa-logging.iam.gserviceaccount.com")
        );
    }

    #[test]
    fn test_sink_url() {
        let sink = LoggingSink::new(GcpClient::new(ProviderConfig::new("p", "t")).unwrap());
        assert_eq!(
            sink.sink_url("p", "audit"),
            "https://logging.googleapis.com/v2/projects/p/sinks/audit"
        );
        let state = ResourceState::new("audit", RESOURCE_TYPE);
        assert_eq!(sink.project_of(&state), "p");
    }

    #[tokio::test]
    async fn test_create_requests_unique_writer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logging/v2/projects/p/sinks"))
            .and(query_param("uniqueWriterIdentity", "true"))
            .and(body_partial_json(json!({
                "name": "audit-sink",
                "destination": "storage.googleapis.com/audit-bucket"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "audit-sink",
                "writerIdentity": "serviceAccount:w@example.com"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sink = LoggingSink::new(client_for(&server));
        let state = sink.create(&sink_config()).await.unwrap();
        assert_eq!(state.id, "audit-sink");
        assert_eq!(state.get("project"), Some("p"));
        assert_eq!(state.get("writerIdentity"), Some("serviceAccount:w@example.com"));
    }

    #[tokio::test]
    async fn test_read_missing_sink_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SINK_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(not_found()))
            .expect(1)
            .mount(&server)
            .await;

        let sink = LoggingSink::new(client_for(&server));
        let state = ResourceState::new("audit-sink", RESOURCE_TYPE);
        assert!(sink.read(&state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_puts_sink() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(SINK_PATH))
            .and(query_param("uniqueWriterIdentity", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "audit-sink",
                "destination": "storage.googleapis.com/audit-bucket"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sink = LoggingSink::new(client_for(&server));
        let prior = ResourceState::new("audit-sink", RESOURCE_TYPE).with_attribute("project", "p");
        let state = sink.update(&prior, &sink_config()).await.unwrap();
        assert_eq!(state.get("destination"), Some("storage.googleapis.com/audit-bucket"));
    }

    #[tokio::test]
    async fn test_update_empty_response_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(SINK_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = LoggingSink::new(client_for(&server));
        let prior = ResourceState::new("audit-sink", RESOURCE_TYPE);
        assert!(matches!(
            sink.update(&prior, &sink_config()).await,
            Err(CloudError::ApiError(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_sink_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(SINK_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(not_found()))
            .expect(1)
            .mount(&server)
            .await;

        let sink = LoggingSink::new(client_for(&server));
        sink.delete(&ResourceState::new("audit-sink", RESOURCE_TYPE))
            .await
            .unwrap();
    }
}
