use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A participant grouping of steps (Client, Sales, ProjectManagement...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lane {
    pub key: String,
    #[serde(default)]
    pub title: String,
}

/// One labelled outgoing branch of a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCondition {
    pub label: String,
    pub target: String,
}

/// Configured timeliness limits for a step, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaThresholds {
    pub warning_minutes: f64,
    pub critical_minutes: f64,
}

/// The step type. Variant-specific data lives on the variant so that, for
/// example, only a gateway can carry branch conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    StartEvent,
    EndEvent,
    Task,
    UserTask,
    ServiceTask {
        automation_action: String,
    },
    Gateway {
        #[serde(default)]
        conditions: Vec<GatewayCondition>,
        #[serde(default)]
        default_target: Option<String>,
    },
    MessageEvent,
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::StartEvent => "start_event",
            StepKind::EndEvent => "end_event",
            StepKind::Task => "task",
            StepKind::UserTask => "user_task",
            StepKind::ServiceTask { .. } => "service_task",
            StepKind::Gateway { .. } => "gateway",
            StepKind::MessageEvent => "message_event",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub key: String,
    pub title: String,
    #[serde(flatten)]
    pub kind: StepKind,
    pub lane: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub estimated_minutes: u32,
    #[serde(default)]
    pub is_manual: bool,
    /// Team role required to work the step. `None` means anyone.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub sla: Option<SlaThresholds>,
}

impl Step {
    pub fn is_end(&self) -> bool {
        matches!(self.kind, StepKind::EndEvent)
    }

    /// The automation identifier for service tasks.
    pub fn automation_action(&self) -> Option<&str> {
        match &self.kind {
            StepKind::ServiceTask { automation_action } => Some(automation_action),
            _ => None,
        }
    }

    /// Conditions of a gateway; empty for every other kind.
    pub fn gateway_conditions(&self) -> &[GatewayCondition] {
        match &self.kind {
            StepKind::Gateway { conditions, .. } => conditions,
            _ => &[],
        }
    }

    /// A gateway requiring an explicit decision (it has conditions).
    pub fn needs_decision(&self) -> bool {
        !self.gateway_conditions().is_empty()
    }

    /// Resolve a decision target to its condition label. The default target
    /// resolves to the label of its condition, or `"default"`.
    pub fn decision_label(&self, target: &str) -> Option<&str> {
        let StepKind::Gateway {
            conditions,
            default_target,
        } = &self.kind
        else {
            return None;
        };
        conditions
            .iter()
            .find(|c| c.target == target)
            .map(|c| c.label.as_str())
            .or_else(|| {
                default_target
                    .as_deref()
                    .filter(|d| *d == target)
                    .map(|_| "default")
            })
    }
}

/// A versioned, immutable graph of steps arranged in lanes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    /// Workflow type, e.g. `agency_delivery`.
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub version: u32,
    pub lanes: Vec<Lane>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl ProcessDefinition {
    pub fn step(&self, key: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.key == key)
    }

    pub fn lane(&self, key: &str) -> Option<&Lane> {
        self.lanes.iter().find(|l| l.key == key)
    }

    /// The unique start event. Validation guarantees exactly one.
    pub fn start_step(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|s| matches!(s.kind, StepKind::StartEvent))
    }

    /// The fixed successor of a non-gateway step: its first `next_steps` entry.
    pub fn successor(&self, step: &Step) -> Option<&Step> {
        step.next_steps.first().and_then(|k| self.step(k))
    }

    pub fn steps_in_lane<'a>(&'a self, lane: &'a str) -> impl Iterator<Item = &'a Step> + 'a {
        self.steps.iter().filter(move |s| s.lane == lane)
    }

    /// Load a definition from a `.json` or `.toml` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        if is_toml {
            Ok(toml::from_str(&contents)?)
        } else {
            Ok(serde_json::from_str(&contents)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GATEWAY_JSON: &str = r#"{
        "key": "approval",
        "name": "Approval",
        "lanes": [{"key": "sales", "title": "Sales"}],
        "steps": [
            {"key": "start", "title": "Start", "type": "start_event", "lane": "sales", "next_steps": ["decide"]},
            {"key": "decide", "title": "Approved?", "type": "gateway", "lane": "sales",
             "next_steps": ["yes", "no"],
             "conditions": [{"label": "approved", "target": "yes"}, {"label": "rejected", "target": "no"}],
             "default_target": "no"},
            {"key": "yes", "title": "Notify", "type": "service_task", "automation_action": "email.notify",
             "lane": "sales", "next_steps": ["end"], "estimated_minutes": 5},
            {"key": "no", "title": "Archive", "type": "task", "lane": "sales", "next_steps": ["end"], "is_manual": true},
            {"key": "end", "title": "End", "type": "end_event", "lane": "sales"}
        ]
    }"#;

    #[test]
    fn deserializes_tagged_step_kinds() {
        let def: ProcessDefinition = serde_json::from_str(GATEWAY_JSON).unwrap();
        assert_eq!(def.version, 0);
        assert_eq!(def.start_step().unwrap().key, "start");

        let gateway = def.step("decide").unwrap();
        assert!(gateway.needs_decision());
        assert_eq!(gateway.gateway_conditions().len(), 2);
        assert_eq!(gateway.decision_label("yes"), Some("approved"));
        assert_eq!(gateway.decision_label("no"), Some("rejected"));
        assert_eq!(gateway.decision_label("elsewhere"), None);

        let notify = def.step("yes").unwrap();
        assert_eq!(notify.automation_action(), Some("email.notify"));
        assert_eq!(notify.kind.to_string(), "service_task");
        assert!(def.step("no").unwrap().is_manual);
    }

    #[test]
    fn successor_is_first_next_step() {
        let def: ProcessDefinition = serde_json::from_str(GATEWAY_JSON).unwrap();
        let start = def.start_step().unwrap();
        assert_eq!(def.successor(start).unwrap().key, "decide");
        assert!(def.successor(def.step("end").unwrap()).is_none());
    }

    #[test]
    fn loads_toml_definition_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mini.toml");
        std::fs::write(
            &path,
            r#"
                key = "mini"
                name = "Mini"

                [[lanes]]
                key = "ops"

                [[steps]]
                key = "start"
                title = "Start"
                type = "start_event"
                lane = "ops"
                next_steps = ["end"]

                [[steps]]
                key = "end"
                title = "End"
                type = "end_event"
                lane = "ops"

                [steps.sla]
                warning_minutes = 30.0
                critical_minutes = 60.0
            "#,
        )
        .unwrap();

        let def = ProcessDefinition::from_file(&path).unwrap();
        assert_eq!(def.key, "mini");
        assert_eq!(def.steps.len(), 2);
        assert!(def.step("end").unwrap().is_end());
        assert_eq!(
            def.step("end").unwrap().sla,
            Some(SlaThresholds {
                warning_minutes: 30.0,
                critical_minutes: 60.0
            })
        );
    }
}
