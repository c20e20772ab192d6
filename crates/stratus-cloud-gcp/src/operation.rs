//! Operation sources for Google Cloud APIs
//!
//! Compute Engine returns its own `Operation` resource (`status`, `error.errors`).
//! Cloud Functions returns `google.longrunning.Operation`
//! (`done`, `error`, `response`). Both are fed to the shared
//! [`OperationPoller`].

use crate::client::GcpClient;
use crate::error::{GcpError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use stratus_cloud::{
    CloudError, OperationError, OperationHandle, OperationPoller, OperationScope, OperationSource,
    OperationStatus, PollConfig, Service,
};

pub type ComputePoller = OperationPoller<ComputeOperationSource>;
pub type LongRunningPoller = OperationPoller<LongRunningOperationSource>;

/// Poller for zonal, regional and global Compute Engine operations
pub fn compute_poller(client: &GcpClient, config: PollConfig) -> ComputePoller {
    OperationPoller::new(ComputeOperationSource::new(client.clone()), config)
}

/// Poller for Cloud Functions long-running operations
pub fn functions_poller(client: &GcpClient, config: PollConfig) -> LongRunningPoller {
    OperationPoller::new(
        LongRunningOperationSource::new(client.clone(), Service::CloudFunctions),
        config,
    )
}

/// Extract the operation handle from a mutating call's response
pub fn handle_from_response(
    response: &serde_json::Value,
    scope: OperationScope,
) -> Result<OperationHandle> {
    let name = response
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| GcpError::Decode(format!("response has no operation name: {}", response)))?;
    Ok(OperationHandle::new(name, scope))
}

fn transport(err: GcpError) -> CloudError {
    CloudError::Transport(err.to_string())
}

/// Status queries against `.../operations/{name}` on Compute Engine
#[derive(Clone)]
pub struct ComputeOperationSource {
    client: GcpClient,
}

impl ComputeOperationSource {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OperationSource for ComputeOperationSource {
    async fn query(&self, handle: &OperationHandle) -> stratus_cloud::Result<OperationStatus> {
        let url = self.client.url(Service::Compute, &handle.to_string());
        let body = self.client.get(&url).await.map_err(transport)?;
        compute_status(handle, body).map_err(transport)
    }
}

/// Status queries against `{service}/{operation name}` for longrunning APIs
#[derive(Clone)]
pub struct LongRunningOperationSource {
    client: GcpClient,
    service: Service,
}

impl LongRunningOperationSource {
    pub fn new(client: GcpClient, service: Service) -> Self {
        Self { client, service }
    }
}

#[async_trait]
impl OperationSource for LongRunningOperationSource {
    async fn query(&self, handle: &OperationHandle) -> stratus_cloud::Result<OperationStatus> {
        let url = self.client.url(self.service, &handle.to_string());
        let body = self.client.get(&url).await.map_err(transport)?;
        longrunning_status(body).map_err(transport)
    }
}

fn compute_status(handle: &OperationHandle, body: serde_json::Value) -> Result<OperationStatus> {
    let op: ComputeOperation = serde_json::from_value(body.clone())
        .map_err(|e| GcpError::Decode(format!("compute operation: {}", e)))?;

    match op.status.as_str() {
        "PENDING" | "RUNNING" => Ok(OperationStatus::Pending),
        "DONE" => {
            let errors = op.error.map(|e| e.errors).unwrap_or_default();
            match errors.first() {
                None => Ok(OperationStatus::Succeeded(body)),
                Some(first) => {
                    let message = errors
                        .iter()
                        .map(|e| e.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; ");
                    let details = serde_json::to_value(&errors)?;
                    Ok(OperationStatus::Failed(
                        OperationError::new(first.code.clone(), message).with_details(details),
                    ))
                }
            }
        }
        other => Err(GcpError::UnexpectedStatus {
            operation: handle.to_string(),
            status: other.to_string(),
        }),
    }
}

fn longrunning_status(body: serde_json::Value) -> Result<OperationStatus> {
    let op: LongRunningOperation = serde_json::from_value(body)
        .map_err(|e| GcpError::Decode(format!("longrunning operation: {}", e)))?;

    if !op.done {
        return Ok(OperationStatus::Pending);
    }

    if let Some(status) = op.error {
        let code = status.code.map(|c| c.to_string());
        return Ok(OperationStatus::Failed(
            OperationError::new(code, status.message)
                .with_details(serde_json::Value::Array(status.details)),
        ));
    }

    Ok(OperationStatus::Succeeded(
        op.response.unwrap_or(serde_json::Value::Null),
    ))
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ComputeOperation {
    status: String,
    error: Option<ComputeOperationErrors>,
}

#[derive(Debug, Deserialize)]
struct ComputeOperationErrors {
    #[serde(default)]
    errors: Vec<ComputeOperationErrorItem>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct ComputeOperationErrorItem {
    code: Option<String>,
    #[serde(default)]
    message: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LongRunningOperation {
    #[serde(default)]
    done: bool,
    error: Option<RpcStatus>,
    response: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RpcStatus {
    code: Option<i64>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}
