//! Google Cloud provider implementation

use crate::client::GcpClient;
use crate::{cloud_function, compute_instance, logging_sink, org_policy};
use crate::{CloudFunction, ComputeInstance, LoggingSink, OrgPolicy};
use std::collections::HashMap;
use stratus_cloud::{
    AuthStatus, CloudError, PollConfig, ProviderConfig, ResourceConfig, ResourceLifecycle,
    ResourceState, Result, Service,
};

/// Google Cloud provider
///
/// Owns one authenticated client and one handler per supported resource
/// type, and routes lifecycle calls by `resource_type`.
pub struct GcpProvider {
    client: GcpClient,
    handlers: HashMap<&'static str, Box<dyn ResourceLifecycle>>,
}

impl GcpProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Self::with_poll_config(config, PollConfig::default())
    }

    /// Build with a custom poll interval; per-call timeouts still apply
    pub fn with_poll_config(config: ProviderConfig, poll: PollConfig) -> Result<Self> {
        config.validate()?;
        let client = GcpClient::new(config)?;
        Ok(Self::from_client(client, poll))
    }

    pub fn from_client(client: GcpClient, poll: PollConfig) -> Self {
        let mut provider = Self {
            client: client.clone(),
            handlers: HashMap::new(),
        };
        provider.register(ComputeInstance::new(client.clone(), poll));
        provider.register(CloudFunction::new(client.clone(), poll));
        provider.register(LoggingSink::new(client.clone()));
        provider.register(OrgPolicy::new(client));
        provider
    }

    fn register(&mut self, handler: impl ResourceLifecycle + 'static) {
        self.handlers
            .insert(handler.resource_type(), Box::new(handler));
    }

    pub fn name(&self) -> &str {
        "google"
    }

    pub fn project(&self) -> &str {
        self.client.project()
    }

    /// Supported resource types, sorted
    pub fn resource_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn handler(&self, resource_type: &str) -> Result<&dyn ResourceLifecycle> {
        self.handlers
            .get(resource_type)
            .map(|h| h.as_ref())
            .ok_or_else(|| CloudError::ProviderNotFound(resource_type.to_string()))
    }

    pub async fn check_auth(&self) -> Result<AuthStatus> {
        let url = self.client.url(
            Service::ResourceManager,
            &format!("projects/{}", self.client.project()),
        );
        match self.client.get(&url).await {
            Ok(project) => {
                let info = project
                    .get("projectId")
                    .and_then(|v| v.as_str())
                    .unwrap_or(self.client.project());
                Ok(AuthStatus::ok(info))
            }
            Err(e) if e.is_auth_failure() => {
                tracing::warn!("Authentication check failed: {}", e);
                Ok(AuthStatus::failed(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create(&self, config: &ResourceConfig) -> Result<ResourceState> {
        let handler = self.handler(&config.resource_type)?;
        let state = handler.create(config).await?;
        Ok(state.with_schema_version(handler.schema_version()))
    }

    pub async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>> {
        let handler = self.handler(&state.resource_type)?;
        Ok(handler
            .read(state)
            .await?
            .map(|s| s.with_schema_version(handler.schema_version())))
    }

    pub async fn update(
        &self,
        prior: &ResourceState,
        config: &ResourceConfig,
    ) -> Result<ResourceState> {
        let handler = self.handler(&config.resource_type)?;
        let state = handler.update(prior, config).await?;
        Ok(state.with_schema_version(handler.schema_version()))
    }

    pub async fn delete(&self, state: &ResourceState) -> Result<()> {
        self.handler(&state.resource_type)?.delete(state).await
    }

    pub async fn upgrade_state(&self, state: ResourceState) -> Result<ResourceState> {
        let handler = self.handler(&state.resource_type)?;
        if state.schema_version == handler.schema_version() {
            return Ok(state);
        }
        tracing::info!(
            "Upgrading {} state {} from v{} to v{}",
            state.resource_type,
            state.id,
            state.schema_version,
            handler.schema_version()
        );
        handler.upgrade_state(state).await
    }
}

/// Resource types served by [`GcpProvider`], sorted
pub const RESOURCE_TYPES: [&str; 4] = [
    cloud_function::RESOURCE_TYPE,
    compute_instance::RESOURCE_TYPE,
    logging_sink::RESOURCE_TYPE,
    org_policy::RESOURCE_TYPE,
];
