//! `google_compute_instance`
//!
//! Instances are created, updated and deleted through zonal Compute Engine
//! operations. Stored attributes use schema version 3: metadata as a flat
//! map, service account scopes as a hashed set, and disks split into
//! `boot_disk`, `scratch_disk` and `attached_disk`.

mod migrate;

pub use migrate::{
    DiskReconcile, MetadataListToMap, ServiceAccountScopesToSet, canonical_scope,
};

use crate::client::GcpClient;
use crate::operation::{compute_poller, handle_from_response};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use stratus_cloud::migrate::{MigrationChain, string_hash};
use stratus_cloud::{
    CloudError, OperationScope, PollConfig, ResourceConfig, ResourceLifecycle, ResourceState,
    Result, Service, flatten_attributes,
};

pub const RESOURCE_TYPE: &str = "google_compute_instance";
pub const SCHEMA_VERSION: u32 = 3;

const CREATE_TIMEOUT: Duration = Duration::from_secs(6 * 60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(6 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(6 * 60);

/// Disk attachment as reported by `instances.get`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveDisk {
    #[serde(default)]
    pub boot: bool,
    #[serde(rename = "type", default)]
    pub disk_type: String,
    pub source: Option<String>,
    #[serde(default)]
    pub device_name: String,
    pub interface: Option<String>,
    #[serde(default)]
    pub auto_delete: bool,
    pub disk_encryption_key: Option<DiskEncryptionKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiskEncryptionKey {
    pub sha256: Option<String>,
}

impl LiveDisk {
    pub fn is_scratch(&self) -> bool {
        self.disk_type == "SCRATCH"
    }

    pub fn sha256(&self) -> Option<&str> {
        self.disk_encryption_key.as_ref()?.sha256.as_deref()
    }

    /// Whether the source self-link points at the named disk
    pub fn has_disk_name(&self, name: &str) -> bool {
        self.source
            .as_deref()
            .is_some_and(|s| s.ends_with(&format!("/disks/{}", name)))
    }
}

/// Live view of an instance's disks, used to reconcile legacy state
#[async_trait]
pub trait InstanceLookup: Send + Sync {
    async fn instance_disks(&self, project: &str, zone: &str, name: &str)
    -> Result<Vec<LiveDisk>>;
}

#[async_trait]
impl InstanceLookup for GcpClient {
    async fn instance_disks(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Vec<LiveDisk>> {
        let url = self.url(Service::Compute, &instance_path(project, zone, name));
        let instance = self.get(&url).await?;
        let disks = instance.get("disks").cloned().unwrap_or(json!([]));
        Ok(serde_json::from_value(disks)?)
    }
}

fn instance_path(project: &str, zone: &str, name: &str) -> String {
    format!("projects/{}/zones/{}/instances/{}", project, zone, name)
}

/// Lifecycle handler for Compute Engine instances
pub struct ComputeInstance {
    client: GcpClient,
    poll: PollConfig,
    lookup: Arc<dyn InstanceLookup>,
}

impl ComputeInstance {
    pub fn new(client: GcpClient, poll: PollConfig) -> Self {
        let lookup = Arc::new(client.clone());
        Self {
            client,
            poll,
            lookup,
        }
    }

    /// Use a different source for the live disk listing during migration
    pub fn with_lookup(mut self, lookup: Arc<dyn InstanceLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    fn migrations(&self) -> MigrationChain {
        let config = self.client.config();
        MigrationChain::new(SCHEMA_VERSION)
            .step(MetadataListToMap)
            .step(ServiceAccountScopesToSet)
            .step(DiskReconcile::new(
                self.lookup.clone(),
                config.project.clone(),
                config.zone.clone(),
            ))
    }

    fn location_from_config(&self, config: &ResourceConfig) -> Result<(String, String)> {
        let project = config
            .get_config::<String>("project")
            .unwrap_or_else(|| self.client.project().to_string());
        let zone = match config.get_config::<String>("zone") {
            Some(zone) => zone,
            None => self.client.config().require_zone(RESOURCE_TYPE)?.to_string(),
        };
        Ok((project, zone))
    }

    fn location_from_state(&self, state: &ResourceState) -> Result<(String, String)> {
        let project = state
            .get("project")
            .unwrap_or(self.client.project())
            .to_string();
        let zone = match state.get("zone") {
            Some(zone) => zone.to_string(),
            None => self.client.config().require_zone(RESOURCE_TYPE)?.to_string(),
        };
        Ok((project, zone))
    }

    async fn fetch(&self, project: &str, zone: &str, name: &str) -> Result<Option<Value>> {
        let url = self
            .client
            .url(Service::Compute, &instance_path(project, zone, name));
        match self.client.get(&url).await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_at(&self, project: &str, zone: &str, name: &str) -> Result<Option<ResourceState>> {
        Ok(self.fetch(project, zone, name).await?.map(|doc| {
            let mut state =
                ResourceState::new(name, RESOURCE_TYPE).with_schema_version(SCHEMA_VERSION);
            state.attributes = instance_attributes(&doc, project, zone);
            state
        }))
    }

    /// POST a zonal instance method and wait for its operation
    async fn call_and_wait(
        &self,
        project: &str,
        zone: &str,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<()> {
        let response = self.client.post(url, body).await?;
        let handle = handle_from_response(
            &response,
            OperationScope::Zonal {
                project: project.to_string(),
                zone: zone.to_string(),
            },
        )?;
        compute_poller(&self.client, self.poll.with_timeout(timeout))
            .wait(&handle)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceLifecycle for ComputeInstance {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema_version(&self) -> u32 {
        SCHEMA_VERSION
    }

    async fn create(&self, config: &ResourceConfig) -> Result<ResourceState> {
        let (project, zone) = self.location_from_config(config)?;
        let mut body = config.body_without(&["project", "zone"]);
        body.insert("name".to_string(), Value::String(config.id.clone()));

        tracing::info!("Creating instance {} in {}", config.id, zone);
        let url = self.client.url(
            Service::Compute,
            &format!("projects/{}/zones/{}/instances", project, zone),
        );
        self.call_and_wait(&project, &zone, &url, &Value::Object(body), CREATE_TIMEOUT)
            .await?;

        self.read_at(&project, &zone, &config.id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("instance {}", config.id)))
    }

    async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>> {
        let (project, zone) = self.location_from_state(state)?;
        self.read_at(&project, &zone, &state.id).await
    }

    async fn update(
        &self,
        prior: &ResourceState,
        config: &ResourceConfig,
    ) -> Result<ResourceState> {
        let (project, zone) = self.location_from_state(prior)?;
        let live = self
            .fetch(&project, &zone, &prior.id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("instance {}", prior.id)))?;
        let base = instance_path(&project, &zone, &prior.id);

        if let Some(desired) = config.config.get("metadata") {
            let desired_items = desired.get("items").cloned().unwrap_or(json!([]));
            let live_items = live["metadata"].get("items").cloned().unwrap_or(json!([]));
            if desired_items != live_items {
                tracing::info!("Updating metadata of instance {}", prior.id);
                let body = json!({
                    "fingerprint": live["metadata"]["fingerprint"],
                    "items": desired_items,
                });
                let url = self
                    .client
                    .url(Service::Compute, &format!("{}/setMetadata", base));
                self.call_and_wait(&project, &zone, &url, &body, UPDATE_TIMEOUT)
                    .await?;
            }
        }

        if let Some(desired) = config.config.get("labels") {
            let live_labels = live.get("labels").cloned().unwrap_or(json!({}));
            if *desired != live_labels {
                tracing::info!("Updating labels of instance {}", prior.id);
                let body = json!({
                    "labels": desired,
                    "labelFingerprint": live["labelFingerprint"],
                });
                let url = self
                    .client
                    .url(Service::Compute, &format!("{}/setLabels", base));
                self.call_and_wait(&project, &zone, &url, &body, UPDATE_TIMEOUT)
                    .await?;
            }
        }

        self.read_at(&project, &zone, &prior.id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("instance {}", prior.id)))
    }

    async fn delete(&self, state: &ResourceState) -> Result<()> {
        let (project, zone) = self.location_from_state(state)?;
        let url = self
            .client
            .url(Service::Compute, &instance_path(&project, &zone, &state.id));

        tracing::info!("Deleting instance {}", state.id);
        let response = match self.client.delete(&url).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                tracing::debug!("Instance already gone: {}", state.id);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let handle = handle_from_response(&response, OperationScope::Zonal { project, zone })?;
        compute_poller(&self.client, self.poll.with_timeout(DELETE_TIMEOUT))
            .wait(&handle)
            .await?;
        Ok(())
    }

    async fn upgrade_state(&self, state: ResourceState) -> Result<ResourceState> {
        self.migrations().run(state).await
    }
}

/// Flat attributes for an `instances.get` document
pub(crate) fn instance_attributes(
    doc: &Value,
    project: &str,
    zone: &str,
) -> BTreeMap<String, String> {
    let mut rest = doc.as_object().cloned().unwrap_or_default();
    let metadata = rest.remove("metadata");
    let accounts = rest.remove("serviceAccounts");
    let disks = rest.remove("disks");
    rest.remove("zone");

    let mut attrs = flatten_attributes(&Value::Object(rest));
    attrs.insert("project".into(), project.to_string());
    attrs.insert("zone".into(), zone.to_string());

    let items = metadata
        .as_ref()
        .and_then(|m| m.get("items"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    attrs.insert("metadata.%".into(), items.len().to_string());
    for item in &items {
        if let (Some(key), Some(value)) = (item["key"].as_str(), item["value"].as_str()) {
            attrs.insert(format!("metadata.{}", key), value.to_string());
        }
    }
    if let Some(fingerprint) = metadata
        .as_ref()
        .and_then(|m| m.get("fingerprint"))
        .and_then(Value::as_str)
    {
        attrs.insert("metadata_fingerprint".into(), fingerprint.to_string());
    }

    let accounts = accounts
        .as_ref()
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    attrs.insert("service_account.#".into(), accounts.len().to_string());
    for (i, account) in accounts.iter().enumerate() {
        if let Some(email) = account["email"].as_str() {
            attrs.insert(format!("service_account.{}.email", i), email.to_string());
        }
        let scopes: Vec<&str> = account["scopes"]
            .as_array()
            .map(|s| s.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        write_scope_set(&mut attrs, &format!("service_account.{}.scopes", i), &scopes);
    }

    let disks: Vec<LiveDisk> = disks
        .and_then(|d| serde_json::from_value(d).ok())
        .unwrap_or_default();
    let mut scratch = 0;
    let mut attached = 0;
    for disk in &disks {
        if disk.boot {
            write_boot_disk(&mut attrs, disk, None);
        } else if disk.is_scratch() {
            write_scratch_disk(&mut attrs, scratch, disk);
            scratch += 1;
        } else {
            write_attached_disk(&mut attrs, attached, disk, None);
            attached += 1;
        }
    }
    attrs.insert("scratch_disk.#".into(), scratch.to_string());
    attrs.insert("attached_disk.#".into(), attached.to_string());

    attrs
}

/// Write `prefix.#` and `prefix.<hash>` entries for a scope set
pub(crate) fn write_scope_set(attrs: &mut BTreeMap<String, String>, prefix: &str, scopes: &[&str]) {
    let canonical: std::collections::BTreeSet<String> =
        scopes.iter().map(|s| canonical_scope(s)).collect();
    attrs.insert(format!("{}.#", prefix), canonical.len().to_string());
    for scope in canonical {
        attrs.insert(format!("{}.{}", prefix, string_hash(&scope)), scope);
    }
}

pub(crate) fn write_boot_disk(
    attrs: &mut BTreeMap<String, String>,
    disk: &LiveDisk,
    raw_key: Option<&str>,
) {
    attrs.insert("boot_disk.#".into(), "1".into());
    attrs.insert("boot_disk.0.auto_delete".into(), disk.auto_delete.to_string());
    attrs.insert("boot_disk.0.device_name".into(), disk.device_name.clone());
    if let Some(source) = &disk.source {
        attrs.insert("boot_disk.0.source".into(), source.clone());
    }
    if let Some(sha) = disk.sha256() {
        attrs.insert(
            "boot_disk.0.disk_encryption_key_sha256".into(),
            sha.to_string(),
        );
    }
    if let Some(raw) = raw_key {
        attrs.insert("boot_disk.0.disk_encryption_key_raw".into(), raw.to_string());
    }
}

pub(crate) fn write_scratch_disk(attrs: &mut BTreeMap<String, String>, index: usize, disk: &LiveDisk) {
    attrs.insert(
        format!("scratch_disk.{}.interface", index),
        disk.interface.clone().unwrap_or_else(|| "SCSI".to_string()),
    );
}

pub(crate) fn write_attached_disk(
    attrs: &mut BTreeMap<String, String>,
    index: usize,
    disk: &LiveDisk,
    raw_key: Option<&str>,
) {
    let prefix = format!("attached_disk.{}", index);
    if let Some(source) = &disk.source {
        attrs.insert(format!("{}.source", prefix), source.clone());
    }
    attrs.insert(format!("{}.device_name", prefix), disk.device_name.clone());
    if let Some(sha) = disk.sha256() {
        attrs.insert(
            format!("{}.disk_encryption_key_sha256", prefix),
            sha.to_string(),
        );
    }
    if let Some(raw) = raw_key {
        attrs.insert(
            format!("{}.disk_encryption_key_raw", prefix),
            raw.to_string(),
        );
    }
}
