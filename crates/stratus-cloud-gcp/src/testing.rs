//! Shared fixtures for tests that talk to a mock Google API

use crate::client::GcpClient;
use std::time::Duration;
use stratus_cloud::{Endpoints, PollConfig, ProviderConfig};
use wiremock::MockServer;

pub(crate) const TOKEN: &str = "test-token";

/// Client for project `p` in `us-central1` / `us-central1-a`, with every
/// service routed to `server`
pub(crate) fn client_for(server: &MockServer) -> GcpClient {
    let base = server.uri();
    let mut config = ProviderConfig::new("p", TOKEN);
    config.region = Some("us-central1".into());
    config.zone = Some("us-central1-a".into());
    config.endpoints = Endpoints {
        compute: format!("{}/compute/v1", base),
        cloudfunctions: format!("{}/functions/v1", base),
        logging: format!("{}/logging/v2", base),
        cloudresourcemanager: format!("{}/crm/v1", base),
    };
    GcpClient::new(config).unwrap()
}

pub(crate) fn fast_poll() -> PollConfig {
    PollConfig::new(Duration::from_millis(100), Duration::from_secs(5))
}

pub(crate) fn not_found() -> serde_json::Value {
    serde_json::json!({
        "error": { "code": 404, "message": "not found", "status": "NOT_FOUND" }
    })
}
