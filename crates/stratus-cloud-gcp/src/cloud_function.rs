//! `google_cloudfunctions_function`
//!
//! Create, update and delete return `google.longrunning.Operation`s that are
//! resolved with the Cloud Functions poller before the function is read back.

use crate::client::GcpClient;
use crate::operation::{functions_poller, handle_from_response};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use stratus_cloud::{
    CloudError, OperationScope, PollConfig, ResourceConfig, ResourceLifecycle, ResourceState,
    Result, Service,
};

pub const RESOURCE_TYPE: &str = "google_cloudfunctions_function";

const CREATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Keys in the resource config that locate the function rather than describe it
const LOCATION_KEYS: [&str; 3] = ["project", "region", "name"];

pub struct CloudFunction {
    client: GcpClient,
    poll: PollConfig,
}

impl CloudFunction {
    pub fn new(client: GcpClient, poll: PollConfig) -> Self {
        Self { client, poll }
    }

    fn location(&self, project: Option<String>, region: Option<String>) -> Result<(String, String)> {
        let project = project.unwrap_or_else(|| self.client.project().to_string());
        let region = match region {
            Some(region) => region,
            None => self.client.config().require_region(RESOURCE_TYPE)?.to_string(),
        };
        Ok((project, region))
    }

    fn location_from_state(&self, state: &ResourceState) -> Result<(String, String)> {
        self.location(
            state.get("project").map(str::to_string),
            state.get("region").map(str::to_string),
        )
    }

    async fn wait(&self, response: &Value, timeout: Duration) -> Result<()> {
        let handle = handle_from_response(response, OperationScope::Named)?;
        functions_poller(&self.client, self.poll.with_timeout(timeout))
            .wait(&handle)
            .await?;
        Ok(())
    }

    async fn fetch(&self, project: &str, region: &str, id: &str) -> Result<Option<Value>> {
        let url = self
            .client
            .url(Service::CloudFunctions, &function_name(project, region, id));
        match self.client.get(&url).await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_at(&self, project: &str, region: &str, id: &str) -> Result<Option<ResourceState>> {
        Ok(self.fetch(project, region, id).await?.map(|doc| {
            ResourceState::new(id, RESOURCE_TYPE)
                .with_document(&doc)
                .with_attribute("project", project)
                .with_attribute("region", region)
        }))
    }
}

fn function_name(project: &str, region: &str, id: &str) -> String {
    format!("projects/{}/locations/{}/functions/{}", project, region, id)
}

/// Top-level keys whose desired value differs from the live document
fn changed_fields(desired: &Map<String, Value>, live: &Value) -> Vec<String> {
    desired
        .iter()
        .filter(|(key, value)| live.get(key.as_str()) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect()
}

#[async_trait]
impl ResourceLifecycle for CloudFunction {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, config: &ResourceConfig) -> Result<ResourceState> {
        let (project, region) =
            self.location(config.get_config("project"), config.get_config("region"))?;
        let mut body = config.body_without(&LOCATION_KEYS);
        body.insert(
            "name".to_string(),
            Value::String(function_name(&project, &region, &config.id)),
        );

        tracing::info!("Creating cloud function {} in {}", config.id, region);
        let url = self.client.url(
            Service::CloudFunctions,
            &format!("projects/{}/locations/{}/functions", project, region),
        );
        let response = self.client.post(&url, &Value::Object(body)).await?;
        self.wait(&response, CREATE_TIMEOUT).await?;

        self.read_at(&project, &region, &config.id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("function {}", config.id)))
    }

    async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>> {
        let (project, region) = self.location_from_state(state)?;
        self.read_at(&project, &region, &state.id).await
    }

    async fn update(
        &self,
        prior: &ResourceState,
        config: &ResourceConfig,
    ) -> Result<ResourceState> {
        let (project, region) = self.location_from_state(prior)?;
        let name = function_name(&project, &region, &prior.id);
        let live = self
            .fetch(&project, &region, &prior.id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("function {}", prior.id)))?;

        let mut body = config.body_without(&LOCATION_KEYS);
        let mask = changed_fields(&body, &live);
        if mask.is_empty() {
            tracing::debug!("Cloud function {} is up to date", prior.id);
        } else {
            tracing::info!("Updating cloud function {}: {}", prior.id, mask.join(","));
            body.insert("name".to_string(), Value::String(name.clone()));
            let url = format!(
                "{}?updateMask={}",
                self.client.url(Service::CloudFunctions, &name),
                mask.join(",")
            );
            let response = self.client.patch(&url, &Value::Object(body)).await?;
            self.wait(&response, UPDATE_TIMEOUT).await?;
        }

        self.read_at(&project, &region, &prior.id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("function {}", prior.id)))
    }

    async fn delete(&self, state: &ResourceState) -> Result<()> {
        let (project, region) = self.location_from_state(state)?;
        let url = self.client.url(
            Service::CloudFunctions,
            &function_name(&project, &region, &state.id),
        );

        tracing::info!("Deleting cloud function {}", state.id);
        match self.client.delete(&url).await {
            Ok(response) => self.wait(&response, DELETE_TIMEOUT).await,
            Err(e) if e.is_not_found() => {
                tracing::debug!("Cloud function already gone: {}", state.id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
