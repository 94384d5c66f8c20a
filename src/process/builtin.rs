//! The agency's own sales-to-delivery pipeline, shipped as a built-in
//! definition for `fluxo publish` and `fluxo demo`.

use super::definition::{GatewayCondition, Lane, ProcessDefinition, SlaThresholds, Step, StepKind};

pub const AGENCY_DELIVERY: &str = "agency_delivery";

fn lane(key: &str, title: &str) -> Lane {
    Lane {
        key: key.to_string(),
        title: title.to_string(),
    }
}

fn step(key: &str, title: &str, kind: StepKind, lane: &str, next: &[&str], minutes: u32) -> Step {
    let is_manual = !matches!(
        kind,
        StepKind::ServiceTask { .. }
            | StepKind::StartEvent
            | StepKind::EndEvent
            | StepKind::MessageEvent
    );
    Step {
        key: key.to_string(),
        title: title.to_string(),
        kind,
        lane: lane.to_string(),
        next_steps: next.iter().map(|s| s.to_string()).collect(),
        estimated_minutes: minutes,
        is_manual,
        role: None,
        skills: Vec::new(),
        sla: None,
    }
}

fn gateway(branches: &[(&str, &str)], default: Option<&str>) -> StepKind {
    StepKind::Gateway {
        conditions: branches
            .iter()
            .map(|(label, target)| GatewayCondition {
                label: label.to_string(),
                target: target.to_string(),
            })
            .collect(),
        default_target: default.map(str::to_string),
    }
}

fn service(action: &str) -> StepKind {
    StepKind::ServiceTask {
        automation_action: action.to_string(),
    }
}

fn with_role(mut step: Step, role: &str, skills: &[&str]) -> Step {
    step.role = Some(role.to_string());
    step.skills = skills.iter().map(|s| s.to_string()).collect();
    step
}

fn with_sla(mut step: Step, warning: f64, critical: f64) -> Step {
    step.sla = Some(SlaThresholds {
        warning_minutes: warning,
        critical_minutes: critical,
    });
    step
}

/// Lead intake through delivery, across client, sales, project management,
/// development, finance and system lanes.
pub fn agency_delivery() -> ProcessDefinition {
    ProcessDefinition {
        key: AGENCY_DELIVERY.to_string(),
        name: "Agency sales to delivery".to_string(),
        version: 0,
        lanes: vec![
            lane("client", "Client"),
            lane("sales", "Sales"),
            lane("project_management", "Project Management"),
            lane("development", "Development"),
            lane("finance", "Finance"),
            lane("system", "System"),
        ],
        steps: vec![
            step(
                "lead_received",
                "Lead received",
                StepKind::StartEvent,
                "client",
                &["qualify_lead"],
                0,
            ),
            with_sla(
                with_role(
                    step(
                        "qualify_lead",
                        "Qualify lead",
                        StepKind::UserTask,
                        "sales",
                        &["create_crm_record"],
                        30,
                    ),
                    "sales",
                    &["discovery"],
                ),
                60.0,
                240.0,
            ),
            step(
                "create_crm_record",
                "Create client record",
                service("crm.create_client"),
                "system",
                &["draft_proposal"],
                1,
            ),
            with_sla(
                with_role(
                    step(
                        "draft_proposal",
                        "Draft proposal",
                        StepKind::Task,
                        "sales",
                        &["send_proposal"],
                        180,
                    ),
                    "sales",
                    &["estimation", "writing"],
                ),
                480.0,
                1440.0,
            ),
            step(
                "send_proposal",
                "Send proposal",
                service("email.send_proposal"),
                "system",
                &["proposal_accepted"],
                1,
            ),
            step(
                "proposal_accepted",
                "Proposal accepted?",
                gateway(
                    &[("accepted", "issue_invoice"), ("declined", "lead_lost")],
                    Some("lead_lost"),
                ),
                "client",
                &["issue_invoice", "lead_lost"],
                2880,
            ),
            step(
                "lead_lost",
                "Lead lost",
                StepKind::EndEvent,
                "sales",
                &[],
                0,
            ),
            step(
                "issue_invoice",
                "Issue deposit invoice",
                service("finance.issue_invoice"),
                "finance",
                &["deposit_paid"],
                1,
            ),
            step(
                "deposit_paid",
                "Deposit paid",
                StepKind::MessageEvent,
                "finance",
                &["kickoff_meeting"],
                4320,
            ),
            with_role(
                step(
                    "kickoff_meeting",
                    "Kickoff meeting",
                    StepKind::UserTask,
                    "project_management",
                    &["build_project"],
                    60,
                ),
                "project_manager",
                &["planning"],
            ),
            with_role(
                step(
                    "build_project",
                    "Build project",
                    StepKind::Task,
                    "development",
                    &["client_review"],
                    4800,
                ),
                "developer",
                &["rust", "frontend"],
            ),
            step(
                "client_review",
                "Client review",
                gateway(
                    &[("approved", "deliver_project"), ("changes", "build_project")],
                    None,
                ),
                "client",
                &["deliver_project", "build_project"],
                1440,
            ),
            with_role(
                step(
                    "deliver_project",
                    "Deliver project",
                    StepKind::UserTask,
                    "project_management",
                    &["project_closed"],
                    120,
                ),
                "project_manager",
                &[],
            ),
            step(
                "project_closed",
                "Project closed",
                StepKind::EndEvent,
                "project_management",
                &[],
                0,
            ),
        ],
        published_at: None,
    }
}

/// `start -> A (yes->B, no->C) -> B/C -> end`.
#[cfg(test)]
pub(crate) fn branching() -> ProcessDefinition {
    ProcessDefinition {
        key: "branching".to_string(),
        name: "Branching".to_string(),
        version: 1,
        lanes: vec![lane("ops", "Operations")],
        steps: vec![
            step("start", "Start", StepKind::StartEvent, "ops", &["A"], 0),
            step(
                "A",
                "Decide",
                gateway(&[("yes", "B"), ("no", "C")], None),
                "ops",
                &["B", "C"],
                5,
            ),
            step("B", "Path B", StepKind::Task, "ops", &["end"], 30),
            step("C", "Path C", StepKind::Task, "ops", &["end"], 30),
            step("end", "End", StepKind::EndEvent, "ops", &[], 0),
        ],
        published_at: None,
    }
}

/// `start -> crm (service) -> pass (gateway, single path) -> review -> end`.
#[cfg(test)]
pub(crate) fn automated() -> ProcessDefinition {
    ProcessDefinition {
        key: "automated".to_string(),
        name: "Automated".to_string(),
        version: 1,
        lanes: vec![lane("ops", "Operations"), lane("system", "System")],
        steps: vec![
            step("start", "Start", StepKind::StartEvent, "ops", &["crm"], 0),
            step(
                "crm",
                "Create CRM record",
                service("crm.create_lead"),
                "system",
                &["pass"],
                1,
            ),
            step("pass", "Pass", gateway(&[], None), "system", &["review"], 0),
            step("review", "Review", StepKind::UserTask, "ops", &["end"], 15),
            step("end", "End", StepKind::EndEvent, "ops", &[], 0),
        ],
        published_at: None,
    }
}
