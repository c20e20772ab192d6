//! Resource lifecycle abstraction
//!
//! The host owns the resource graph, diffing and planning. A provider only
//! translates create/read/update/delete calls into vendor API calls and keeps
//! previously written state readable.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle handler for one resource type
///
/// All cloud resource handlers (compute instances, functions, etc.) implement
/// this trait so the provider can dispatch on the resource type.
#[async_trait]
pub trait ResourceLifecycle: Send + Sync {
    /// Host-facing type name (e.g., "google_compute_instance")
    fn resource_type(&self) -> &'static str;

    /// Version of the attribute layout this handler writes
    fn schema_version(&self) -> u32 {
        0
    }

    async fn create(&self, config: &ResourceConfig) -> Result<ResourceState>;

    /// Refresh from the vendor; `None` means the resource no longer exists
    async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>>;

    async fn update(&self, prior: &ResourceState, config: &ResourceConfig)
    -> Result<ResourceState>;

    async fn delete(&self, state: &ResourceState) -> Result<()>;

    /// Bring a state written by an older provider up to `schema_version()`
    async fn upgrade_state(&self, state: ResourceState) -> Result<ResourceState> {
        crate::migrate::MigrationChain::new(self.schema_version())
            .run(state)
            .await
    }
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/project information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Desired configuration for a cloud resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type (e.g., "google_logging_project_sink")
    pub resource_type: String,

    /// Resource identifier
    pub id: String,

    /// Provider name
    pub provider: String,

    /// Resource-specific configuration, shaped like the vendor API body
    pub config: serde_json::Value,
}

impl ResourceConfig {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        provider: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            provider: provider.into(),
            config,
        }
    }

    /// Get the full resource key (type:id)
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource_type, self.id)
    }

    /// Get a configuration value as a specific type
    pub fn get_config<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Config body with the given keys removed, as an object
    pub fn body_without(&self, keys: &[&str]) -> serde_json::Map<String, serde_json::Value> {
        let mut body = self.config.as_object().cloned().unwrap_or_default();
        for key in keys {
            body.remove(*key);
        }
        body
    }
}

/// Stored state of a single resource
///
/// Attributes use the host's flat encoding: `a.b`, `list.#`, `list.0`,
/// `map.%`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider-specific resource ID
    pub id: String,

    pub resource_type: String,

    #[serde(default)]
    pub schema_version: u32,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            schema_version: 0,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Replace all attributes with the flat encoding of an API document
    pub fn with_document(mut self, document: &serde_json::Value) -> Self {
        self.attributes = flatten_attributes(document);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Flat string encoding of a JSON document
///
/// Objects produce `key.sub` entries plus `key.%`, arrays produce `key.N`
/// entries plus `key.#`. Nulls are omitted.
pub fn flatten_attributes(document: &serde_json::Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let serde_json::Value::Object(map) = document {
        for (key, value) in map {
            flatten_into(&mut out, key, value);
        }
    }
    out
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: &str, value: &serde_json::Value) {
    use serde_json::Value;
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Array(items) => {
            out.insert(format!("{}.#", prefix), items.len().to_string());
            for (i, item) in items.iter().enumerate() {
                flatten_into(out, &format!("{}.{}", prefix, i), item);
            }
        }
        Value::Object(map) => {
            out.insert(format!("{}.%", prefix), map.len().to_string());
            for (key, item) in map {
                flatten_into(out, &format!("{}.{}", prefix, key), item);
            }
        }
    }
}
