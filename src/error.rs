use thiserror::Error;
use uuid::Uuid;

use crate::automation::AutomationError;
use crate::process::ValidationError;

pub type Result<T, E = FluxoError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum FluxoError {
    #[error("No active definition published for workflow `{key}`{}", version_suffix(.version))]
    DefinitionNotFound { key: String, version: Option<u32> },

    #[error("Definition `{key}` is invalid: {}", join_errors(.errors))]
    InvalidDefinition {
        key: String,
        errors: Vec<ValidationError>,
    },

    #[error("Process instance not found: {id}")]
    InstanceNotFound { id: Uuid },

    #[error("Cannot {action} step `{step_key}` on instance {instance_id}: {reason}")]
    InvalidTransition {
        instance_id: Uuid,
        step_key: String,
        action: &'static str,
        reason: String,
    },

    #[error("Actor `{actor}` is not allowed to {action} instance {instance_id}")]
    PermissionDenied {
        instance_id: Uuid,
        action: &'static str,
        actor: String,
    },

    #[error("Automation `{action}` failed for step `{step_key}` on instance {instance_id}: {source}")]
    AutomationFailed {
        instance_id: Uuid,
        step_key: String,
        action: String,
        #[source]
        source: AutomationError,
    },

    #[error("Instance {instance_id} was modified concurrently (expected revision {expected}, found {found})")]
    ConcurrentModification {
        instance_id: Uuid,
        expected: u64,
        found: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FluxoError {
    /// Whether the caller should reload the instance and retry once.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FluxoError::ConcurrentModification { .. })
    }
}

fn version_suffix(version: &Option<u32>) -> String {
    match version {
        Some(v) => format!(" (version {v})"),
        None => String::new(),
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
