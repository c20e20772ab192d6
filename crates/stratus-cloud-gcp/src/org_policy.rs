//! `google_organization_policy`
//!
//! Policies are set, read and cleared with the synchronous Resource Manager
//! v1 `:setOrgPolicy` / `:getOrgPolicy` / `:clearOrgPolicy` calls.

use crate::client::GcpClient;
use async_trait::async_trait;
use serde_json::{Value, json};
use stratus_cloud::{
    CloudError, ResourceConfig, ResourceLifecycle, ResourceState, Result, Service,
};

pub const RESOURCE_TYPE: &str = "google_organization_policy";

const POLICY_KINDS: [&str; 3] = ["listPolicy", "booleanPolicy", "restoreDefault"];

pub struct OrgPolicy {
    client: GcpClient,
}

/// Prefix a bare constraint name with `constraints/`
pub fn canonical_constraint(constraint: &str) -> String {
    if constraint.starts_with("constraints/") {
        constraint.to_string()
    } else {
        format!("constraints/{}", constraint)
    }
}

fn policy_id(org_id: &str, constraint: &str) -> String {
    format!("organizations/{}/{}", org_id, constraint)
}

/// Whether a policy returned by `getOrgPolicy` actually sets anything
fn is_set(policy: &Value) -> bool {
    POLICY_KINDS.iter().any(|kind| policy.get(kind).is_some())
}

impl OrgPolicy {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }

    fn method_url(&self, org_id: &str, method: &str) -> String {
        self.client.url(
            Service::ResourceManager,
            &format!("organizations/{}:{}", org_id, method),
        )
    }

    fn target(config: &ResourceConfig) -> Result<(String, String)> {
        let org_id = config
            .get_config::<String>("org_id")
            .ok_or_else(|| CloudError::InvalidConfig(format!("{} requires org_id", RESOURCE_TYPE)))?;
        let constraint = config.get_config::<String>("constraint").ok_or_else(|| {
            CloudError::InvalidConfig(format!("{} requires constraint", RESOURCE_TYPE))
        })?;
        Ok((org_id, canonical_constraint(&constraint)))
    }

    fn target_from_state(state: &ResourceState) -> Result<(String, String)> {
        match (state.get("org_id"), state.get("constraint")) {
            (Some(org_id), Some(constraint)) => {
                Ok((org_id.to_string(), canonical_constraint(constraint)))
            }
            _ => Err(CloudError::StateError(format!(
                "{} state {} is missing org_id or constraint",
                RESOURCE_TYPE, state.id
            ))),
        }
    }

    fn to_state(org_id: &str, constraint: &str, policy: &Value) -> ResourceState {
        ResourceState::new(policy_id(org_id, constraint), RESOURCE_TYPE)
            .with_document(policy)
            .with_attribute("org_id", org_id)
            .with_attribute("constraint", constraint)
    }

    async fn set(&self, config: &ResourceConfig) -> Result<ResourceState> {
        let (org_id, constraint) = Self::target(config)?;
        let mut policy = config.body_without(&["org_id", "constraint"]);
        policy.insert("constraint".to_string(), Value::String(constraint.clone()));

        tracing::info!("Setting {} on organizations/{}", constraint, org_id);
        let response = self
            .client
            .post(
                &self.method_url(&org_id, "setOrgPolicy"),
                &json!({ "policy": policy }),
            )
            .await?;
        Ok(Self::to_state(&org_id, &constraint, &response))
    }
}

#[async_trait]
impl ResourceLifecycle for OrgPolicy {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, config: &ResourceConfig) -> Result<ResourceState> {
        self.set(config).await
    }

    async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>> {
        let (org_id, constraint) = Self::target_from_state(state)?;
        let policy = match self
            .client
            .post(
                &self.method_url(&org_id, "getOrgPolicy"),
                &json!({ "constraint": constraint }),
            )
            .await
        {
            Ok(policy) => policy,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if !is_set(&policy) {
            tracing::debug!("No policy set for {} on organizations/{}", constraint, org_id);
            return Ok(None);
        }
        Ok(Some(Self::to_state(&org_id, &constraint, &policy)))
    }

    async fn update(
        &self,
        _prior: &ResourceState,
        config: &ResourceConfig,
    ) -> Result<ResourceState> {
        self.set(config).await
    }

    async fn delete(&self, state: &ResourceState) -> Result<()> {
        let (org_id, constraint) = Self::target_from_state(state)?;
        tracing::info!("Clearing {} on organizations/{}", constraint, org_id);
        self.client
            .post(
                &self.method_url(&org_id, "clearOrgPolicy"),
                &json!({ "constraint": constraint }),
            )
            .await?;
        Ok(())
    }
}
