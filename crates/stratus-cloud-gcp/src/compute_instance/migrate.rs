//! State migrations for `google_compute_instance`

use super::{
    InstanceLookup, LiveDisk, write_attached_disk, write_boot_disk, write_scope_set,
    write_scratch_disk,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_cloud::migrate::{StateMigration, list_len, remove_prefixed};
use stratus_cloud::{CloudError, ResourceState, Result};

const SCOPE_PREFIX: &str = "https://www.googleapis.com/auth/";

/// Expand a short scope alias to its full URL
pub fn canonical_scope(scope: &str) -> String {
    let suffix = match scope {
        "bigquery" => "bigquery",
        "cloud-platform" => "cloud-platform",
        "cloud-source-repos" => "source.full_control",
        "cloud-source-repos-ro" => "source.read_only",
        "compute-ro" => "compute.readonly",
        "compute-rw" => "compute",
        "datastore" => "datastore",
        "logging-write" => "logging.write",
        "monitoring" => "monitoring",
        "monitoring-write" => "monitoring.write",
        "pubsub" => "pubsub",
        "service-control" => "servicecontrol",
        "service-management" => "service.management.readonly",
        "sql" => "sqlservice",
        "sql-admin" => "sqlservice.admin",
        "storage-full" => "devstorage.full_control",
        "storage-ro" => "devstorage.read_only",
        "storage-rw" => "devstorage.read_write",
        "taskqueue" => "taskqueue",
        "trace" => "trace.append",
        "useraccounts-ro" => "cloud.useraccounts.readonly",
        "useraccounts-rw" => "cloud.useraccounts",
        "userinfo-email" => "userinfo.email",
        other => return other.to_string(),
    };
    format!("{}{}", SCOPE_PREFIX, suffix)
}

/// v0 → v1: `metadata` moves from a list of maps to a single map
pub struct MetadataListToMap;

#[async_trait]
impl StateMigration for MetadataListToMap {
    fn from_version(&self) -> u32 {
        0
    }

    async fn migrate(&self, mut state: ResourceState) -> Result<ResourceState> {
        state.attributes.remove("metadata.#");

        let old = remove_prefixed(&mut state.attributes, "metadata.");
        for (key, value) in old {
            // metadata.<N>.<key>
            let parts: Vec<&str> = key.splitn(3, '.').collect();
            let well_formed = parts.len() == 3 && parts[1].parse::<usize>().is_ok();
            if !well_formed {
                return Err(CloudError::StateError(format!(
                    "found metadata key in unexpected format: {}",
                    key
                )));
            }
            state
                .attributes
                .insert(format!("metadata.{}", parts[2]), value);
        }

        Ok(state)
    }
}

/// v1 → v2: service account scopes move from a list to a hashed set
pub struct ServiceAccountScopesToSet;

#[async_trait]
impl StateMigration for ServiceAccountScopesToSet {
    fn from_version(&self) -> u32 {
        1
    }

    async fn migrate(&self, mut state: ResourceState) -> Result<ResourceState> {
        let scope_keys: Vec<String> = state
            .attributes
            .keys()
            .filter(|k| {
                k.starts_with("service_account.") && k.split('.').nth(2) == Some("scopes")
            })
            .cloned()
            .collect();

        // account index -> (list index -> scope)
        let mut accounts: BTreeMap<usize, BTreeMap<usize, String>> = BTreeMap::new();
        for key in scope_keys {
            let Some(value) = state.attributes.remove(&key) else {
                continue;
            };
            // service_account.<i>.scopes.<j>
            let parts: Vec<&str> = key.split('.').collect();
            let account = parts
                .get(1)
                .and_then(|i| i.parse::<usize>().ok())
                .filter(|_| parts.len() == 4);
            let Some(account) = account else {
                return Err(scope_key_error(&key));
            };
            let entries = accounts.entry(account).or_default();
            if parts[3] == "#" {
                continue;
            }
            let index = parts[3]
                .parse::<usize>()
                .map_err(|_| scope_key_error(&key))?;
            entries.insert(index, value);
        }

        for (account, entries) in accounts {
            let scopes: Vec<&str> = entries.values().map(String::as_str).collect();
            write_scope_set(
                &mut state.attributes,
                &format!("service_account.{}.scopes", account),
                &scopes,
            );
        }

        Ok(state)
    }
}

fn scope_key_error(key: &str) -> CloudError {
    CloudError::StateError(format!(
        "found service account scope key in unexpected format: {}",
        key
    ))
}

/// Legacy `disk.N.*` entry
#[derive(Debug, Default)]
struct LegacyDisk {
    index: usize,
    disk: Option<String>,
    image: Option<String>,
    disk_type: Option<String>,
    size: Option<String>,
    scratch: bool,
    device_name: Option<String>,
    auto_delete: Option<String>,
    key_raw: Option<String>,
    key_sha256: Option<String>,
}

impl LegacyDisk {
    fn from_attributes(attrs: &BTreeMap<String, String>, index: usize) -> Self {
        let get = |field: &str| {
            attrs
                .get(&format!("disk.{}.{}", index, field))
                .filter(|v| !v.is_empty())
                .cloned()
        };
        Self {
            index,
            disk: get("disk"),
            image: get("image"),
            disk_type: get("type"),
            size: get("size").filter(|s| s != "0"),
            scratch: get("scratch").as_deref() == Some("true"),
            device_name: get("device_name"),
            auto_delete: get("auto_delete"),
            key_raw: get("disk_encryption_key_raw"),
            key_sha256: get("disk_encryption_key_sha256"),
        }
    }
}

/// v2 → v3: the legacy `disk` list is split into boot, scratch and attached
/// disks by matching each entry against the live instance
pub struct DiskReconcile {
    lookup: Arc<dyn InstanceLookup>,
    default_project: String,
    default_zone: Option<String>,
}

impl DiskReconcile {
    pub fn new(
        lookup: Arc<dyn InstanceLookup>,
        default_project: String,
        default_zone: Option<String>,
    ) -> Self {
        Self {
            lookup,
            default_project,
            default_zone,
        }
    }
}

#[async_trait]
impl StateMigration for DiskReconcile {
    fn from_version(&self) -> u32 {
        2
    }

    async fn migrate(&self, mut state: ResourceState) -> Result<ResourceState> {
        let count = list_len(&state.attributes, "disk");
        if count == 0 {
            state.attributes.remove("disk.#");
            return Ok(state);
        }

        let project = state
            .get("project")
            .unwrap_or(&self.default_project)
            .to_string();
        let zone = state
            .get("zone")
            .map(str::to_string)
            .or_else(|| self.default_zone.clone())
            .ok_or_else(|| {
                CloudError::StateError(format!("instance {} has no zone to look up disks", state.id))
            })?;

        let live = self.lookup.instance_disks(&project, &zone, &state.id).await?;
        let legacy = remove_prefixed(&mut state.attributes, "disk.");
        reconcile(&mut state.attributes, &legacy, count, &live)?;

        Ok(state)
    }
}

fn reconcile(
    attrs: &mut BTreeMap<String, String>,
    legacy: &BTreeMap<String, String>,
    count: usize,
    live: &[LiveDisk],
) -> Result<()> {
    let mut claimed = vec![false; live.len()];
    let mut boot_seen = false;
    let mut scratch = 0;
    let mut attached = 0;

    for index in 0..count {
        let old = LegacyDisk::from_attributes(legacy, index);

        if old.scratch {
            let found = live.iter().enumerate().position(|(i, d)| {
                !claimed[i]
                    && d.is_scratch()
                    && old
                        .device_name
                        .as_ref()
                        .is_none_or(|name| *name == d.device_name)
            });
            let i = found.ok_or_else(|| unmatched(&old, "no unclaimed scratch disk"))?;
            claimed[i] = true;
            write_scratch_disk(attrs, scratch, &live[i]);
            scratch += 1;
            continue;
        }

        if !boot_seen {
            boot_seen = true;
            let i = live
                .iter()
                .position(|d| d.boot)
                .ok_or_else(|| unmatched(&old, "instance has no boot disk"))?;
            claimed[i] = true;
            write_boot_disk(attrs, &live[i], old.key_raw.as_deref());
            if let Some(auto_delete) = &old.auto_delete {
                attrs.insert("boot_disk.0.auto_delete".into(), auto_delete.clone());
            }
            write_initialize_params(attrs, &old);
            continue;
        }

        let i = match &old.disk {
            Some(name) => live
                .iter()
                .enumerate()
                .position(|(i, d)| !claimed[i] && !d.is_scratch() && d.has_disk_name(name))
                .ok_or_else(|| unmatched(&old, &format!("no attached disk named {}", name)))?,
            None => disambiguate(&old, live, &claimed)?,
        };
        claimed[i] = true;
        write_attached_disk(attrs, attached, &live[i], old.key_raw.as_deref());
        attached += 1;
    }

    attrs.insert("scratch_disk.#".into(), scratch.to_string());
    attrs.insert("attached_disk.#".into(), attached.to_string());
    Ok(())
}

/// Pick the live disk for an image-created, non-boot legacy disk
fn disambiguate(old: &LegacyDisk, live: &[LiveDisk], claimed: &[bool]) -> Result<usize> {
    let candidates: Vec<usize> = live
        .iter()
        .enumerate()
        .filter(|(i, d)| !claimed[*i] && !d.boot && !d.is_scratch())
        .map(|(i, _)| i)
        .collect();

    if let Some(name) = &old.device_name {
        let by_name: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|i| live[*i].device_name == *name)
            .collect();
        if by_name.len() == 1 {
            return Ok(by_name[0]);
        }
    }

    if let Some(sha) = &old.key_sha256 {
        let by_key: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|i| live[*i].sha256() == Some(sha.as_str()))
            .collect();
        if by_key.len() == 1 {
            return Ok(by_key[0]);
        }
    }

    match candidates.as_slice() {
        [only] => {
            tracing::warn!(
                "disk.{} matched by elimination to {}",
                old.index,
                live[*only].device_name
            );
            Ok(*only)
        }
        [] => Err(unmatched(old, "no unclaimed persistent disk")),
        _ => Err(unmatched(
            old,
            &format!("{} candidate disks, cannot disambiguate", candidates.len()),
        )),
    }
}

fn write_initialize_params(attrs: &mut BTreeMap<String, String>, old: &LegacyDisk) {
    if old.image.is_none() && old.size.is_none() && old.disk_type.is_none() {
        return;
    }
    attrs.insert("boot_disk.0.initialize_params.#".into(), "1".into());
    for (field, value) in [
        ("image", &old.image),
        ("size", &old.size),
        ("type", &old.disk_type),
    ] {
        if let Some(value) = value {
            attrs.insert(
                format!("boot_disk.0.initialize_params.0.{}", field),
                value.clone(),
            );
        }
    }
}

fn unmatched(old: &LegacyDisk, reason: &str) -> CloudError {
    CloudError::StateError(format!(
        "cannot migrate disk.{} ({}): {}",
        old.index,
        old.device_name.as_deref().unwrap_or("no device name"),
        reason
    ))
}
