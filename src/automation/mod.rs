pub mod error;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::process::EntityLink;

pub use error::AutomationError;
pub use webhook::WebhookInvoker;

/// What an automation gets to know about the step it runs for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationContext {
    pub instance_id: Uuid,
    pub definition_key: String,
    pub step_key: String,
    pub entity: Option<EntityLink>,
    pub actor: Option<String>,
}

/// Dispatches a service task's action. Retries, idempotency and side
/// effects belong to the implementation.
#[async_trait]
pub trait AutomationInvoker: Send + Sync {
    async fn invoke(&self, action: &str, ctx: &AutomationContext) -> Result<(), AutomationError>;
}

/// Logs the dispatch and succeeds. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInvoker;

#[async_trait]
impl AutomationInvoker for LoggingInvoker {
    async fn invoke(&self, action: &str, ctx: &AutomationContext) -> Result<(), AutomationError> {
        tracing::info!(
            action,
            instance = %ctx.instance_id,
            step = %ctx.step_key,
            "automation dispatched (no webhook configured)"
        );
        Ok(())
    }
}
