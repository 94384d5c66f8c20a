//! Persistence seams for definitions, instances and the execution log.
//!
//! The executor and the analyzer only talk to these traits. [`MemoryStore`]
//! backs tests and the demo; [`FileStore`] keeps CLI state between runs.

mod file;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::process::{ProcessDefinition, ProcessInstance, StepEvent};

pub use file::FileStore;
pub use memory::{MemoryStore, Snapshot};

#[async_trait]
pub trait DefinitionRepository: Send + Sync {
    /// The highest published version for a workflow type.
    async fn active(&self, key: &str) -> Result<Arc<ProcessDefinition>>;

    async fn get(&self, key: &str, version: u32) -> Result<Arc<ProcessDefinition>>;

    /// Validate and publish as `latest + 1`. Earlier versions are untouched.
    async fn publish(&self, definition: ProcessDefinition) -> Result<Arc<ProcessDefinition>>;

    /// Active definitions, one per workflow type.
    async fn list(&self) -> Result<Vec<Arc<ProcessDefinition>>>;
}

#[async_trait]
pub trait InstanceRepository: Send + Sync {
    async fn insert(&self, instance: &ProcessInstance) -> Result<()>;

    async fn load(&self, id: Uuid) -> Result<ProcessInstance>;

    /// Write `instance` only if the stored revision still equals
    /// `expected_revision`. Returns the stored copy with its bumped revision.
    async fn save(&self, instance: &ProcessInstance, expected_revision: u64)
    -> Result<ProcessInstance>;

    async fn list(&self) -> Result<Vec<ProcessInstance>>;
}

#[async_trait]
pub trait ExecutionLog: Send + Sync {
    async fn append(&self, events: &[StepEvent]) -> Result<()>;

    /// Every event in append order.
    async fn events(&self) -> Result<Vec<StepEvent>>;

    async fn events_for(&self, instance_id: Uuid) -> Result<Vec<StepEvent>>;
}
