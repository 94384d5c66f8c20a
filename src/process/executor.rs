use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::definition::ProcessDefinition;
use super::instance::{EntityLink, ProcessInstance};
use super::log::StepEvent;
use super::machine::{Actor, Advance, StepMachine, TransitionContext};
use crate::automation::{AutomationContext, AutomationError, AutomationInvoker};
use crate::error::{FluxoError, Result};
use crate::store::{DefinitionRepository, ExecutionLog, InstanceRepository};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

const DEFAULT_AUTOMATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives process instances through the step state machine.
///
/// Transitions on one instance are serialized by a per-instance lock, and
/// every save is checked against the revision that was loaded. Service tasks
/// are dispatched inside the transition that reaches them, after the state
/// parked on them has been saved.
pub struct StepExecutor {
    definitions: Arc<dyn DefinitionRepository>,
    instances: Arc<dyn InstanceRepository>,
    log: Arc<dyn ExecutionLog>,
    automation: Arc<dyn AutomationInvoker>,
    clock: Arc<dyn Clock>,
    automation_timeout: Duration,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl StepExecutor {
    pub fn new(
        definitions: Arc<dyn DefinitionRepository>,
        instances: Arc<dyn InstanceRepository>,
        log: Arc<dyn ExecutionLog>,
        automation: Arc<dyn AutomationInvoker>,
    ) -> Self {
        Self {
            definitions,
            instances,
            log,
            automation,
            clock: Arc::new(SystemClock),
            automation_timeout: DEFAULT_AUTOMATION_TIMEOUT,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_automation_timeout(mut self, automation_timeout: Duration) -> Self {
        self.automation_timeout = automation_timeout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create an instance of the active definition, parked on its start event.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn start(
        &self,
        workflow: &str,
        entity: Option<EntityLink>,
        actor: &Actor,
    ) -> Result<ProcessInstance> {
        let def = self.definitions.active(workflow).await?;
        let ctx = TransitionContext {
            actor,
            now: self.clock.now(),
        };
        let inst = ProcessInstance::new(&def, entity, ctx.now);
        let mut events = Vec::new();
        StepMachine::begin(&def, &inst, &ctx, &mut events)?;

        self.instances.insert(&inst).await?;
        self.log.append(&events).await?;
        info!(instance = %inst.id, version = def.version, "instance started");
        Ok(inst)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn complete(
        &self,
        instance_id: Uuid,
        step_key: &str,
        actor: &Actor,
    ) -> Result<ProcessInstance> {
        self.transition(instance_id, actor, |def, inst, ctx, events| {
            StepMachine::complete(def, inst, step_key, ctx, events)
        })
        .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn gateway_decision(
        &self,
        instance_id: Uuid,
        step_key: &str,
        target: &str,
        actor: &Actor,
    ) -> Result<ProcessInstance> {
        self.transition(instance_id, actor, |def, inst, ctx, events| {
            StepMachine::gateway_decision(def, inst, step_key, target, ctx, events)
        })
        .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn skip(
        &self,
        instance_id: Uuid,
        step_key: &str,
        reason: Option<&str>,
        actor: &Actor,
    ) -> Result<ProcessInstance> {
        self.transition(instance_id, actor, |def, inst, ctx, events| {
            StepMachine::skip(def, inst, step_key, reason, ctx, events)
        })
        .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn cancel(
        &self,
        instance_id: Uuid,
        reason: Option<&str>,
        actor: &Actor,
    ) -> Result<ProcessInstance> {
        self.transition(instance_id, actor, |def, inst, ctx, events| {
            StepMachine::cancel(def, inst, reason, ctx, events).map(|()| Advance::Completed)
        })
        .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn assign(
        &self,
        instance_id: Uuid,
        step_key: &str,
        assignee: &str,
        actor: &Actor,
    ) -> Result<ProcessInstance> {
        self.transition(instance_id, actor, |def, inst, ctx, events| {
            StepMachine::assign(def, inst, step_key, assignee, ctx, events).map(|()| Advance::Waiting)
        })
        .await
    }

    pub async fn instance(&self, instance_id: Uuid) -> Result<ProcessInstance> {
        self.instances.load(instance_id).await
    }

    pub async fn instances(&self) -> Result<Vec<ProcessInstance>> {
        self.instances.list().await
    }

    /// The definition version an instance is pinned to.
    pub async fn definition_for(&self, inst: &ProcessInstance) -> Result<Arc<ProcessDefinition>> {
        self.definitions
            .get(&inst.definition_key, inst.definition_version)
            .await
    }

    async fn lock_for(&self, instance_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(instance_id).or_default())
    }

    // Drop the map entry once no other transition holds or awaits it.
    async fn release(&self, instance_id: Uuid, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        if let Some(entry) = locks.get(&instance_id)
            && Arc::ptr_eq(entry, &lock)
            && Arc::strong_count(&lock) == 2
        {
            locks.remove(&instance_id);
        }
    }

    async fn transition<F>(&self, instance_id: Uuid, actor: &Actor, rule: F) -> Result<ProcessInstance>
    where
        F: FnOnce(
            &ProcessDefinition,
            &mut ProcessInstance,
            &TransitionContext<'_>,
            &mut Vec<StepEvent>,
        ) -> Result<Advance>,
    {
        let lock = self.lock_for(instance_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.apply(instance_id, actor, rule).await
        };
        self.release(instance_id, lock).await;
        result
    }

    /// Load, apply `rule` to a copy and commit it against the loaded
    /// revision. A rejected rule writes nothing. When the instance parks on a
    /// service task, that state is committed before the automation is
    /// invoked, and each outcome is committed against the new revision.
    async fn apply<F>(&self, instance_id: Uuid, actor: &Actor, rule: F) -> Result<ProcessInstance>
    where
        F: FnOnce(
            &ProcessDefinition,
            &mut ProcessInstance,
            &TransitionContext<'_>,
            &mut Vec<StepEvent>,
        ) -> Result<Advance>,
    {
        let stored = self.instances.load(instance_id).await?;
        let def = self.definition_for(&stored).await?;
        let mut next = stored.clone();
        let mut events = Vec::new();

        let ctx = TransitionContext {
            actor,
            now: self.clock.now(),
        };
        let mut advance = rule(&def, &mut next, &ctx, &mut events).inspect_err(|e| {
            warn!(instance = %instance_id, error = %e, "transition rejected");
        })?;
        let mut saved = self.commit(&stored, &next, &events).await?;

        let system = Actor::system();
        while let Advance::Automation { step_key, action } = advance {
            let outcome = self.dispatch(&saved, &step_key, &action, actor).await;
            let mut next = saved.clone();
            let mut events = Vec::new();
            let ctx = TransitionContext {
                actor: &system,
                now: self.clock.now(),
            };
            match outcome {
                Ok(()) => {
                    info!(instance = %instance_id, step = %step_key, action = %action, "automation succeeded");
                    advance = StepMachine::finish_automation(&def, &mut next, &step_key, &ctx, &mut events)?;
                    saved = self.commit(&saved, &next, &events).await?;
                }
                Err(source) => {
                    warn!(instance = %instance_id, step = %step_key, action = %action, error = %source, "automation failed");
                    StepMachine::fail_automation(&def, &mut next, &step_key, &source.to_string(), &ctx, &mut events)?;
                    self.commit(&saved, &next, &events).await?;
                    return Err(FluxoError::AutomationFailed {
                        instance_id,
                        step_key,
                        action,
                        source,
                    });
                }
            }
        }
        Ok(saved)
    }

    /// Save `next` against the revision of `previous`, then append `events`.
    /// If the append fails, `previous` is written back so the stored instance
    /// never runs ahead of its log.
    async fn commit(
        &self,
        previous: &ProcessInstance,
        next: &ProcessInstance,
        events: &[StepEvent],
    ) -> Result<ProcessInstance> {
        let saved = self.instances.save(next, previous.revision).await?;
        if let Err(err) = self.log.append(events).await {
            warn!(instance = %saved.id, error = %err, "log append failed, restoring previous state");
            if let Err(restore) = self.instances.save(previous, saved.revision).await {
                error!(instance = %saved.id, error = %restore, "restore after failed append failed");
            }
            return Err(err);
        }
        info!(
            instance = %saved.id,
            status = %saved.status,
            current = saved.current_step_key.as_deref().unwrap_or("-"),
            revision = saved.revision,
            "transition applied"
        );
        Ok(saved)
    }

    async fn dispatch(
        &self,
        inst: &ProcessInstance,
        step_key: &str,
        action: &str,
        actor: &Actor,
    ) -> std::result::Result<(), AutomationError> {
        let request = AutomationContext {
            instance_id: inst.id,
            definition_key: inst.definition_key.clone(),
            step_key: step_key.to_string(),
            entity: inst.entity.clone(),
            actor: Some(actor.id.clone()),
        };
        match timeout(self.automation_timeout, self.automation.invoke(action, &request)).await {
            Ok(result) => result,
            Err(_) => Err(AutomationError::Timeout {
                after_ms: self.automation_timeout.as_millis() as u64,
            }),
        }
    }
}
