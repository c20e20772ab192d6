//! Google Cloud provider for Stratus
//!
//! This crate implements [`ResourceLifecycle`](stratus_cloud::ResourceLifecycle)
//! handlers for Google Cloud and resolves the operations returned by mutating
//! calls with the shared [`OperationPoller`](stratus_cloud::OperationPoller).
//!
//! # Resources
//!
//! - `google_compute_instance` (Compute Engine operations, state schema v3)
//! - `google_cloudfunctions_function` (long-running operations)
//! - `google_logging_project_sink`
//! - `google_organization_policy`
//!
//! # Requirements
//!
//! - `GOOGLE_PROJECT` and `GOOGLE_OAUTH_ACCESS_TOKEN` env vars, or an explicit
//!   [`ProviderConfig`](stratus_cloud::ProviderConfig)
//! - `GOOGLE_REGION` / `GOOGLE_ZONE` when resources omit their location
//!
//! # Example
//!
//! ```ignore
//! use stratus_cloud::{ProviderConfig, ResourceConfig};
//! use stratus_cloud_gcp::GcpProvider;
//!
//! let provider = GcpProvider::new(ProviderConfig::from_env()?)?;
//!
//! let auth = provider.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//!
//! let sink = ResourceConfig::new(
//!     "google_logging_project_sink",
//!     "audit-sink",
//!     "google",
//!     serde_json::json!({ "destination": "storage.googleapis.com/audit-bucket" }),
//! );
//! let state = provider.create(&sink).await?;
//! ```

pub mod client;
pub mod cloud_function;
pub mod compute_instance;
pub mod error;
pub mod logging_sink;
pub mod operation;
pub mod org_policy;
pub mod provider;

#[cfg(test)]
mod testing;

pub use client::{AuthProvider, GcpClient, StaticToken};
pub use cloud_function::CloudFunction;
pub use compute_instance::{ComputeInstance, InstanceLookup, LiveDisk};
pub use error::{GcpError, Result};
pub use logging_sink::LoggingSink;
pub use operation::{
    ComputeOperationSource, ComputePoller, LongRunningOperationSource, LongRunningPoller,
    compute_poller, functions_poller, handle_from_response,
};
pub use org_policy::OrgPolicy;
pub use provider::{GcpProvider, RESOURCE_TYPES};
