//! Provider configuration
//!
//! Credentials, endpoints and the user agent travel in an explicit
//! [`ProviderConfig`] that every client and poller is built from.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_PROJECT: &str = "GOOGLE_PROJECT";
pub const ENV_REGION: &str = "GOOGLE_REGION";
pub const ENV_ZONE: &str = "GOOGLE_ZONE";
pub const ENV_ACCESS_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(4 * 60);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shortest sleep between two status queries of one operation
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Vendor API families the provider talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Compute,
    CloudFunctions,
    Logging,
    ResourceManager,
}

/// Base URLs per service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub compute: String,
    pub cloudfunctions: String,
    pub logging: String,
    pub cloudresourcemanager: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            compute: "https://compute.googleapis.com/compute/v1".to_string(),
            cloudfunctions: "https://cloudfunctions.googleapis.com/v1".to_string(),
            logging: "https://logging.googleapis.com/v2".to_string(),
            cloudresourcemanager: "https://cloudresourcemanager.googleapis.com/v1".to_string(),
        }
    }
}

/// Explicit provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub project: String,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub zone: Option<String>,

    /// OAuth2 access token sent as a bearer credential
    #[serde(default)]
    pub access_token: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,

    #[serde(default)]
    pub endpoints: Endpoints,
}

fn default_user_agent() -> String {
    format!("stratus/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("project", &self.project)
            .field("region", &self.region)
            .field("zone", &self.zone)
            .field("access_token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("request_timeout", &self.request_timeout)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(project: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            region: None,
            zone: None,
            access_token: access_token.into(),
            user_agent: default_user_agent(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            endpoints: Endpoints::default(),
        }
    }

    /// Create ProviderConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let project = std::env::var(ENV_PROJECT)
            .map_err(|_| CloudError::InvalidConfig(format!("{} is not set", ENV_PROJECT)))?;
        let access_token = std::env::var(ENV_ACCESS_TOKEN)
            .map_err(|_| CloudError::InvalidConfig(format!("{} is not set", ENV_ACCESS_TOKEN)))?;

        let mut config = Self::new(project, access_token);
        config.region = std::env::var(ENV_REGION).ok();
        config.zone = std::env::var(ENV_ZONE).ok();
        Ok(config)
    }

    /// Build from the host's provider block, filling gaps from the environment
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let mut value = match value {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };
        if let Some(obj) = value.as_object_mut() {
            for (key, var) in [
                ("project", ENV_PROJECT),
                ("region", ENV_REGION),
                ("zone", ENV_ZONE),
                ("access_token", ENV_ACCESS_TOKEN),
            ] {
                let missing = obj
                    .get(key)
                    .is_none_or(|v| v.is_null() || v.as_str() == Some(""));
                if missing {
                    if let Ok(env_value) = std::env::var(var) {
                        obj.insert(key.to_string(), serde_json::Value::String(env_value));
                    }
                }
            }
        }

        let config: ProviderConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(CloudError::InvalidConfig("project must not be empty".into()));
        }
        if self.access_token.trim().is_empty() {
            return Err(CloudError::InvalidConfig(
                "access_token must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Base URL for a service, without a trailing slash
    pub fn endpoint(&self, service: Service) -> &str {
        let base = match service {
            Service::Compute => &self.endpoints.compute,
            Service::CloudFunctions => &self.endpoints.cloudfunctions,
            Service::Logging => &self.endpoints.logging,
            Service::ResourceManager => &self.endpoints.cloudresourcemanager,
        };
        base.trim_end_matches('/')
    }

    /// Region, or an error naming the resource that needs one
    pub fn require_region(&self, what: &str) -> Result<&str> {
        self.region
            .as_deref()
            .ok_or_else(|| CloudError::InvalidConfig(format!("{} requires a region", what)))
    }

    /// Zone, or an error naming the resource that needs one
    pub fn require_zone(&self, what: &str) -> Result<&str> {
        self.zone
            .as_deref()
            .ok_or_else(|| CloudError::InvalidConfig(format!("{} requires a zone", what)))
    }
}

/// Polling interval and deadline for long-running operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollConfig {
    /// `interval` is raised to [`MIN_POLL_INTERVAL`] if shorter
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(MIN_POLL_INTERVAL),
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
