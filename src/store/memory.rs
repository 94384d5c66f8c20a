use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DefinitionRepository, ExecutionLog, InstanceRepository};
use crate::error::{FluxoError, Result};
use crate::process::{ProcessDefinition, ProcessInstance, StepEvent, validate_definition};

/// Full store contents; also the on-disk format of [`FileStore`](super::FileStore).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Every published version, in publish order.
    #[serde(default)]
    pub definitions: Vec<Arc<ProcessDefinition>>,
    #[serde(default)]
    pub instances: BTreeMap<Uuid, ProcessInstance>,
    #[serde(default)]
    pub events: Vec<StepEvent>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.clone()
    }

    pub(super) async fn replace(&self, snapshot: Snapshot) {
        *self.state.write().await = snapshot;
    }
}

#[async_trait]
impl DefinitionRepository for MemoryStore {
    async fn active(&self, key: &str) -> Result<Arc<ProcessDefinition>> {
        let state = self.state.read().await;
        state
            .definitions
            .iter()
            .filter(|d| d.key == key)
            .max_by_key(|d| d.version)
            .cloned()
            .ok_or_else(|| FluxoError::DefinitionNotFound {
                key: key.to_string(),
                version: None,
            })
    }

    async fn get(&self, key: &str, version: u32) -> Result<Arc<ProcessDefinition>> {
        let state = self.state.read().await;
        state
            .definitions
            .iter()
            .find(|d| d.key == key && d.version == version)
            .cloned()
            .ok_or_else(|| FluxoError::DefinitionNotFound {
                key: key.to_string(),
                version: Some(version),
            })
    }

    async fn publish(&self, mut definition: ProcessDefinition) -> Result<Arc<ProcessDefinition>> {
        let errors = validate_definition(&definition);
        if !errors.is_empty() {
            return Err(FluxoError::InvalidDefinition {
                key: definition.key,
                errors,
            });
        }

        let mut state = self.state.write().await;
        let latest = state
            .definitions
            .iter()
            .filter(|d| d.key == definition.key)
            .map(|d| d.version)
            .max()
            .unwrap_or(0);
        definition.version = latest + 1;
        definition.published_at = Some(Utc::now());

        let published = Arc::new(definition);
        state.definitions.push(Arc::clone(&published));
        tracing::debug!(key = %published.key, version = published.version, "definition published");
        Ok(published)
    }

    async fn list(&self) -> Result<Vec<Arc<ProcessDefinition>>> {
        let state = self.state.read().await;
        let mut active: BTreeMap<&str, &Arc<ProcessDefinition>> = BTreeMap::new();
        for def in &state.definitions {
            let slot = active.entry(def.key.as_str()).or_insert(def);
            if def.version > slot.version {
                *slot = def;
            }
        }
        Ok(active.into_values().cloned().collect())
    }
}

#[async_trait]
impl InstanceRepository for MemoryStore {
    async fn insert(&self, instance: &ProcessInstance) -> Result<()> {
        let mut state = self.state.write().await;
        state.instances.insert(instance.id, instance.clone());
        tracing::debug!(instance = %instance.id, "instance inserted");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<ProcessInstance> {
        let state = self.state.read().await;
        state
            .instances
            .get(&id)
            .cloned()
            .ok_or(FluxoError::InstanceNotFound { id })
    }

    async fn save(
        &self,
        instance: &ProcessInstance,
        expected_revision: u64,
    ) -> Result<ProcessInstance> {
        let mut state = self.state.write().await;
        let stored = state
            .instances
            .get_mut(&instance.id)
            .ok_or(FluxoError::InstanceNotFound { id: instance.id })?;
        if stored.revision != expected_revision {
            return Err(FluxoError::ConcurrentModification {
                instance_id: instance.id,
                expected: expected_revision,
                found: stored.revision,
            });
        }

        let mut next = instance.clone();
        next.revision = expected_revision + 1;
        *stored = next.clone();
        tracing::debug!(instance = %instance.id, revision = next.revision, "instance saved");
        Ok(next)
    }

    async fn list(&self) -> Result<Vec<ProcessInstance>> {
        let state = self.state.read().await;
        Ok(state.instances.values().cloned().collect())
    }
}

#[async_trait]
impl ExecutionLog for MemoryStore {
    async fn append(&self, events: &[StepEvent]) -> Result<()> {
        let mut state = self.state.write().await;
        state.events.extend_from_slice(events);
        Ok(())
    }

    async fn events(&self) -> Result<Vec<StepEvent>> {
        Ok(self.state.read().await.events.clone())
    }

    async fn events_for(&self, instance_id: Uuid) -> Result<Vec<StepEvent>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.instance_id == instance_id)
            .cloned()
            .collect())
    }
}
