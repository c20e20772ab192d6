//! State schema migration
//!
//! A resource written by an older provider carries an older `schema_version`.
//! [`MigrationChain`] walks it forward one version at a time until it matches
//! the handler's current layout.

use crate::error::{CloudError, Result};
use crate::resource::ResourceState;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// One step from `from_version()` to `from_version() + 1`
#[async_trait]
pub trait StateMigration: Send + Sync {
    fn from_version(&self) -> u32;

    async fn migrate(&self, state: ResourceState) -> Result<ResourceState>;
}

/// Ordered set of migration steps ending at `target`
pub struct MigrationChain {
    target: u32,
    steps: Vec<Box<dyn StateMigration>>,
}

impl MigrationChain {
    pub fn new(target: u32) -> Self {
        Self {
            target,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: impl StateMigration + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// Apply steps until the state reaches the target version
    pub async fn run(&self, mut state: ResourceState) -> Result<ResourceState> {
        if state.schema_version > self.target {
            return Err(CloudError::StateError(format!(
                "{} {} has schema version {}, newer than supported version {}",
                state.resource_type, state.id, state.schema_version, self.target
            )));
        }

        while state.schema_version < self.target {
            let from = state.schema_version;
            let step = self
                .steps
                .iter()
                .find(|s| s.from_version() == from)
                .ok_or_else(|| {
                    CloudError::StateError(format!(
                        "no migration for {} from schema version {}",
                        state.resource_type, from
                    ))
                })?;

            tracing::info!(
                "Migrating {} {} state v{} -> v{}",
                state.resource_type,
                state.id,
                from,
                from + 1
            );
            state = step.migrate(state).await?;
            state.schema_version = from + 1;
        }

        Ok(state)
    }
}

/// Remove every attribute under `prefix`, returning the removed entries
pub fn remove_prefixed(
    attributes: &mut BTreeMap<String, String>,
    prefix: &str,
) -> BTreeMap<String, String> {
    let keys: Vec<String> = attributes
        .keys()
        .filter(|k| k.starts_with(prefix))
        .cloned()
        .collect();

    keys.into_iter()
        .filter_map(|k| attributes.remove(&k).map(|v| (k, v)))
        .collect()
}

/// Element count recorded under `key.#`; absent or malformed counts are 0
pub fn list_len(attributes: &BTreeMap<String, String>, key: &str) -> usize {
    attributes
        .get(&format!("{}.#", key))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Non-negative checksum used to key set elements in flat state
pub fn string_hash(value: &str) -> u32 {
    crc32c::crc32c(value.as_bytes()) & 0x7fff_ffff
}
