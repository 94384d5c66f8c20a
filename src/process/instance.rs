use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::definition::ProcessDefinition;

/// Lifecycle status of a process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Completed,
    Canceled,
    /// An automation failed. Waits for an admin `skip` or `cancel`.
    Errored,
}

impl InstanceStatus {
    /// Completed and canceled instances accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceStatus::Completed | InstanceStatus::Canceled)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Running => write!(f, "RUNNING"),
            InstanceStatus::Completed => write!(f, "COMPLETED"),
            InstanceStatus::Canceled => write!(f, "CANCELED"),
            InstanceStatus::Errored => write!(f, "ERRORED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Lead,
    Project,
    Client,
}

/// The business record that triggered the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLink {
    pub kind: EntityKind,
    pub id: String,
}

/// One execution of a published definition version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: Uuid,
    pub definition_key: String,
    pub definition_version: u32,
    pub status: InstanceStatus,
    /// `None` once the instance is completed or canceled.
    pub current_step_key: Option<String>,
    /// Ordered set of completed step keys, in first-completion order.
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub current_assignee: Option<String>,
    #[serde(default)]
    pub entity: Option<EntityLink>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by every successful save.
    #[serde(default)]
    pub revision: u64,
}

impl ProcessInstance {
    /// A fresh running instance positioned on the definition's start event.
    pub fn new(def: &ProcessDefinition, entity: Option<EntityLink>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition_key: def.key.clone(),
            definition_version: def.version,
            status: InstanceStatus::Running,
            current_step_key: def.start_step().map(|s| s.key.clone()),
            completed_steps: Vec::new(),
            current_assignee: None,
            entity,
            started_at: now,
            completed_at: None,
            revision: 0,
        }
    }

    pub fn is_current(&self, step_key: &str) -> bool {
        self.current_step_key.as_deref() == Some(step_key)
    }

    pub fn has_completed(&self, step_key: &str) -> bool {
        self.completed_steps.iter().any(|k| k == step_key)
    }

    /// Append to the ordered set; re-visits keep the first position.
    pub(crate) fn mark_completed(&mut self, step_key: &str) {
        if !self.has_completed(step_key) {
            self.completed_steps.push(step_key.to_string());
        }
    }
}
