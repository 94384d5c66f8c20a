use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a step occurrence was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitOutcome {
    Completed,
    Decided,
    Automated,
    Skipped,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StepEventKind {
    Entered,
    Exited { outcome: ExitOutcome },
    GatewayDecision { label: String, target: String },
    AutomationFailed { action: String, message: String },
    Assigned { assignee: String },
    Skipped { reason: Option<String> },
    Canceled { reason: Option<String> },
    ProcessCompleted,
}

/// One append-only entry of the step execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    pub instance_id: Uuid,
    pub step_key: String,
    pub lane: String,
    #[serde(flatten)]
    pub kind: StepEventKind,
    #[serde(default)]
    pub actor: Option<String>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_flat_tag() {
        let event = StepEvent {
            instance_id: Uuid::nil(),
            step_key: "proposal_accepted".into(),
            lane: "client".into(),
            kind: StepEventKind::GatewayDecision {
                label: "accepted".into(),
                target: "issue_invoice".into(),
            },
            actor: Some("ana".into()),
            at: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "gateway_decision");
        assert_eq!(value["target"], "issue_invoice");

        let back: StepEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
