use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::definition::{ProcessDefinition, Step, StepKind};
use super::instance::{InstanceStatus, ProcessInstance};
use super::log::{ExitOutcome, StepEvent, StepEventKind};
use crate::error::{FluxoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Member,
    Admin,
    System,
}

/// Whoever triggers a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn member(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Member,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Admin,
        }
    }

    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            role: ActorRole::System,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

pub struct TransitionContext<'a> {
    pub actor: &'a Actor,
    pub now: DateTime<Utc>,
}

/// Where an instance stopped after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Parked on a step that needs an explicit user or external action.
    Waiting,
    /// Parked on a service task whose automation must run next.
    Automation { step_key: String, action: String },
    /// An end event was reached.
    Completed,
}

/// Transition rules of the step state machine.
///
/// Every operation validates before mutating: a rejected call leaves the
/// instance untouched and appends no events.
pub struct StepMachine;

impl StepMachine {
    /// Record entry into the start event of a fresh instance.
    pub fn begin(
        def: &ProcessDefinition,
        inst: &ProcessInstance,
        ctx: &TransitionContext<'_>,
        events: &mut Vec<StepEvent>,
    ) -> Result<()> {
        let start = def
            .start_step()
            .ok_or_else(|| FluxoError::DefinitionNotFound {
                key: def.key.clone(),
                version: Some(def.version),
            })?;
        events.push(event(inst, start, StepEventKind::Entered, ctx));
        Ok(())
    }

    /// Finish the current manual step and move to its first successor.
    pub fn complete(
        def: &ProcessDefinition,
        inst: &mut ProcessInstance,
        step_key: &str,
        ctx: &TransitionContext<'_>,
        events: &mut Vec<StepEvent>,
    ) -> Result<Advance> {
        let step = active_step(def, inst, step_key, "complete")?;
        if step.needs_decision() {
            return Err(rejected(
                inst,
                step_key,
                "complete",
                "gateway requires an explicit decision",
            ));
        }
        if let StepKind::ServiceTask { automation_action } = &step.kind {
            return Err(rejected(
                inst,
                step_key,
                "complete",
                format!("service task completes through automation `{automation_action}`"),
            ));
        }
        let next = successor_key(def, inst, step, "complete")?;

        leave(inst, step, ExitOutcome::Completed, ctx, events);
        enter(def, inst, &next, ctx, events)
    }

    /// Take one configured branch of the current gateway.
    pub fn gateway_decision(
        def: &ProcessDefinition,
        inst: &mut ProcessInstance,
        step_key: &str,
        target: &str,
        ctx: &TransitionContext<'_>,
        events: &mut Vec<StepEvent>,
    ) -> Result<Advance> {
        let step = active_step(def, inst, step_key, "decide")?;
        if !step.needs_decision() {
            return Err(rejected(
                inst,
                step_key,
                "decide",
                format!("step is a {} without conditions", step.kind),
            ));
        }
        let label = step.decision_label(target).ok_or_else(|| {
            rejected(
                inst,
                step_key,
                "decide",
                format!("`{target}` is not one of the gateway's conditions"),
            )
        })?;
        if def.step(target).is_none() {
            return Err(rejected(
                inst,
                step_key,
                "decide",
                format!("target `{target}` is not defined"),
            ));
        }

        events.push(event(
            inst,
            step,
            StepEventKind::GatewayDecision {
                label: label.to_string(),
                target: target.to_string(),
            },
            ctx,
        ));
        leave(inst, step, ExitOutcome::Decided, ctx, events);
        enter(def, inst, target, ctx, events)
    }

    /// Admin force-advance past the current step without running automation.
    /// Also the recovery path for errored instances. A decision gateway is
    /// left through its default target, or its first condition.
    pub fn skip(
        def: &ProcessDefinition,
        inst: &mut ProcessInstance,
        step_key: &str,
        reason: Option<&str>,
        ctx: &TransitionContext<'_>,
        events: &mut Vec<StepEvent>,
    ) -> Result<Advance> {
        require_admin(inst, ctx, "skip")?;
        if inst.status.is_terminal() {
            return Err(rejected(
                inst,
                step_key,
                "skip",
                format!("instance is {}", inst.status),
            ));
        }
        let step = current_step(def, inst, step_key, "skip")?;
        let next = match &step.kind {
            StepKind::Gateway {
                conditions,
                default_target,
            } if !conditions.is_empty() => default_target
                .clone()
                .unwrap_or_else(|| conditions[0].target.clone()),
            _ => successor_key(def, inst, step, "skip")?,
        };
        if def.step(&next).is_none() {
            return Err(rejected(
                inst,
                step_key,
                "skip",
                format!("successor `{next}` is not defined"),
            ));
        }

        inst.status = InstanceStatus::Running;
        events.push(event(
            inst,
            step,
            StepEventKind::Skipped {
                reason: reason.map(str::to_string),
            },
            ctx,
        ));
        leave(inst, step, ExitOutcome::Skipped, ctx, events);
        enter(def, inst, &next, ctx, events)
    }

    /// Admin cancel from any non-terminal state. Irreversible.
    pub fn cancel(
        def: &ProcessDefinition,
        inst: &mut ProcessInstance,
        reason: Option<&str>,
        ctx: &TransitionContext<'_>,
        events: &mut Vec<StepEvent>,
    ) -> Result<()> {
        let step_key = inst.current_step_key.clone().unwrap_or_else(|| "-".into());
        require_admin(inst, ctx, "cancel")?;
        if inst.status.is_terminal() {
            return Err(rejected(
                inst,
                &step_key,
                "cancel",
                format!("instance is already {}", inst.status),
            ));
        }

        if let Some(step) = def.step(&step_key) {
            events.push(event(
                inst,
                step,
                StepEventKind::Exited {
                    outcome: ExitOutcome::Canceled,
                },
                ctx,
            ));
            events.push(event(
                inst,
                step,
                StepEventKind::Canceled {
                    reason: reason.map(str::to_string),
                },
                ctx,
            ));
        }
        inst.status = InstanceStatus::Canceled;
        inst.current_step_key = None;
        inst.current_assignee = None;
        Ok(())
    }

    /// Record an assignee for the current step.
    pub fn assign(
        def: &ProcessDefinition,
        inst: &mut ProcessInstance,
        step_key: &str,
        assignee: &str,
        ctx: &TransitionContext<'_>,
        events: &mut Vec<StepEvent>,
    ) -> Result<()> {
        let step = active_step(def, inst, step_key, "assign")?;
        inst.current_assignee = Some(assignee.to_string());
        events.push(event(
            inst,
            step,
            StepEventKind::Assigned {
                assignee: assignee.to_string(),
            },
            ctx,
        ));
        Ok(())
    }

    /// The current service task's automation succeeded.
    pub fn finish_automation(
        def: &ProcessDefinition,
        inst: &mut ProcessInstance,
        step_key: &str,
        ctx: &TransitionContext<'_>,
        events: &mut Vec<StepEvent>,
    ) -> Result<Advance> {
        let step = active_step(def, inst, step_key, "automate")?;
        if step.automation_action().is_none() {
            return Err(rejected(
                inst,
                step_key,
                "automate",
                "step is not a service task",
            ));
        }
        let next = successor_key(def, inst, step, "automate")?;
        leave(inst, step, ExitOutcome::Automated, ctx, events);
        enter(def, inst, &next, ctx, events)
    }

    /// The current service task's automation failed; park as errored.
    pub fn fail_automation(
        def: &ProcessDefinition,
        inst: &mut ProcessInstance,
        step_key: &str,
        message: &str,
        ctx: &TransitionContext<'_>,
        events: &mut Vec<StepEvent>,
    ) -> Result<()> {
        let step = active_step(def, inst, step_key, "automate")?;
        let action = step.automation_action().unwrap_or_default().to_string();
        inst.status = InstanceStatus::Errored;
        events.push(event(
            inst,
            step,
            StepEventKind::AutomationFailed {
                action,
                message: message.to_string(),
            },
            ctx,
        ));
        Ok(())
    }
}

fn event(
    inst: &ProcessInstance,
    step: &Step,
    kind: StepEventKind,
    ctx: &TransitionContext<'_>,
) -> StepEvent {
    StepEvent {
        instance_id: inst.id,
        step_key: step.key.clone(),
        lane: step.lane.clone(),
        kind,
        actor: Some(ctx.actor.id.clone()),
        at: ctx.now,
    }
}

fn rejected(
    inst: &ProcessInstance,
    step_key: &str,
    action: &'static str,
    reason: impl Into<String>,
) -> FluxoError {
    FluxoError::InvalidTransition {
        instance_id: inst.id,
        step_key: step_key.to_string(),
        action,
        reason: reason.into(),
    }
}

fn require_admin(
    inst: &ProcessInstance,
    ctx: &TransitionContext<'_>,
    action: &'static str,
) -> Result<()> {
    if ctx.actor.is_admin() {
        Ok(())
    } else {
        Err(FluxoError::PermissionDenied {
            instance_id: inst.id,
            action,
            actor: ctx.actor.id.clone(),
        })
    }
}

/// The current step, which must match `step_key`. Status is not checked.
fn current_step<'d>(
    def: &'d ProcessDefinition,
    inst: &ProcessInstance,
    step_key: &str,
    action: &'static str,
) -> Result<&'d Step> {
    match inst.current_step_key.as_deref() {
        Some(current) if current == step_key => def.step(step_key).ok_or_else(|| {
            rejected(inst, step_key, action, "step is not part of the definition")
        }),
        Some(current) => Err(rejected(
            inst,
            step_key,
            action,
            format!("current step is `{current}`"),
        )),
        None => Err(rejected(
            inst,
            step_key,
            action,
            format!("instance is {}", inst.status),
        )),
    }
}

/// The current step of a running instance.
fn active_step<'d>(
    def: &'d ProcessDefinition,
    inst: &ProcessInstance,
    step_key: &str,
    action: &'static str,
) -> Result<&'d Step> {
    if inst.status != InstanceStatus::Running {
        return Err(rejected(
            inst,
            step_key,
            action,
            format!("instance is {}", inst.status),
        ));
    }
    current_step(def, inst, step_key, action)
}

fn successor_key(
    def: &ProcessDefinition,
    inst: &ProcessInstance,
    step: &Step,
    action: &'static str,
) -> Result<String> {
    match def.successor(step) {
        Some(next) => Ok(next.key.clone()),
        None => Err(rejected(
            inst,
            &step.key,
            action,
            "step has no resolvable successor",
        )),
    }
}

fn leave(
    inst: &mut ProcessInstance,
    step: &Step,
    outcome: ExitOutcome,
    ctx: &TransitionContext<'_>,
    events: &mut Vec<StepEvent>,
) {
    inst.mark_completed(&step.key);
    events.push(event(inst, step, StepEventKind::Exited { outcome }, ctx));
}

/// Enter `key`, passing through single-path gateways, and stop on the first
/// step that needs something from outside.
fn enter(
    def: &ProcessDefinition,
    inst: &mut ProcessInstance,
    key: &str,
    ctx: &TransitionContext<'_>,
    events: &mut Vec<StepEvent>,
) -> Result<Advance> {
    let mut key = key.to_string();
    // A validated graph cannot loop through conditionless gateways forever,
    // but an unvalidated one can.
    for _ in 0..=def.steps.len() {
        let step = def
            .step(&key)
            .ok_or_else(|| rejected(inst, &key, "enter", "step is not part of the definition"))?;
        inst.current_assignee = None;

        match &step.kind {
            StepKind::EndEvent => {
                events.push(event(inst, step, StepEventKind::ProcessCompleted, ctx));
                inst.status = InstanceStatus::Completed;
                inst.current_step_key = None;
                inst.completed_at = Some(ctx.now);
                return Ok(Advance::Completed);
            }
            StepKind::Gateway { conditions, .. } if conditions.is_empty() => {
                inst.current_step_key = Some(key.clone());
                events.push(event(inst, step, StepEventKind::Entered, ctx));
                let next = successor_key(def, inst, step, "enter")?;
                leave(inst, step, ExitOutcome::Decided, ctx, events);
                key = next;
            }
            StepKind::ServiceTask { automation_action } => {
                inst.current_step_key = Some(key.clone());
                events.push(event(inst, step, StepEventKind::Entered, ctx));
                return Ok(Advance::Automation {
                    step_key: key,
                    action: automation_action.clone(),
                });
            }
            _ => {
                inst.current_step_key = Some(key.clone());
                events.push(event(inst, step, StepEventKind::Entered, ctx));
                return Ok(Advance::Waiting);
            }
        }
    }
    Err(rejected(
        inst,
        &key,
        "enter",
        "conditionless gateways form a cycle",
    ))
}
