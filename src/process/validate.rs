use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Bfs;
use serde::{Deserialize, Serialize};

use super::definition::{ProcessDefinition, StepKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub rule: String,
    pub message: String,
}

impl ValidationError {
    fn new(rule: &str, message: String) -> Self {
        Self {
            rule: rule.to_string(),
            message,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

/// Check the graph rules of a definition. Returns every violation found.
pub fn validate_definition(def: &ProcessDefinition) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut lane_keys = HashSet::new();
    for lane in &def.lanes {
        if !lane_keys.insert(lane.key.as_str()) {
            errors.push(ValidationError::new(
                "unique_lane",
                format!("Duplicate lane key: {}", lane.key),
            ));
        }
    }

    let mut steps = HashMap::new();
    for step in &def.steps {
        if steps.insert(step.key.as_str(), step).is_some() {
            errors.push(ValidationError::new(
                "unique_step",
                format!("Duplicate step key: {}", step.key),
            ));
        }
        if !lane_keys.contains(step.lane.as_str()) {
            errors.push(ValidationError::new(
                "lane_ref",
                format!("Step {} references undeclared lane '{}'", step.key, step.lane),
            ));
        }
    }

    let starts: Vec<&str> = def
        .steps
        .iter()
        .filter(|s| matches!(s.kind, StepKind::StartEvent))
        .map(|s| s.key.as_str())
        .collect();
    if starts.len() != 1 {
        errors.push(ValidationError::new(
            "single_start",
            format!("Expected exactly one start_event, found {}", starts.len()),
        ));
    }
    if !def.steps.iter().any(|s| s.is_end()) {
        errors.push(ValidationError::new(
            "has_end",
            "No end_event found".to_string(),
        ));
    }

    for step in &def.steps {
        if step.is_end() {
            if !step.next_steps.is_empty() {
                errors.push(ValidationError::new(
                    "end_terminal",
                    format!("End event {} must not have next_steps", step.key),
                ));
            }
        } else if step.next_steps.is_empty() {
            errors.push(ValidationError::new(
                "has_successor",
                format!("Step {} has no next_steps", step.key),
            ));
        }

        for next in &step.next_steps {
            if !steps.contains_key(next.as_str()) {
                errors.push(ValidationError::new(
                    "next_ref",
                    format!("Step {} points to unknown step '{}'", step.key, next),
                ));
            }
        }

        match &step.kind {
            StepKind::Gateway {
                conditions,
                default_target,
            } => {
                if conditions.len() == 1 {
                    errors.push(ValidationError::new(
                        "gateway_conditions",
                        format!(
                            "Gateway {} must have at least two conditions or none",
                            step.key
                        ),
                    ));
                }
                if conditions.is_empty() && step.next_steps.len() != 1 {
                    errors.push(ValidationError::new(
                        "gateway_conditions",
                        format!(
                            "Gateway {} has no conditions but {} outgoing paths",
                            step.key,
                            step.next_steps.len()
                        ),
                    ));
                }
                let mut labels = HashSet::new();
                for condition in conditions {
                    if !labels.insert(condition.label.as_str()) {
                        errors.push(ValidationError::new(
                            "gateway_conditions",
                            format!(
                                "Gateway {} repeats condition label '{}'",
                                step.key, condition.label
                            ),
                        ));
                    }
                    if !step.next_steps.contains(&condition.target) {
                        errors.push(ValidationError::new(
                            "gateway_target",
                            format!(
                                "Gateway {} condition '{}' targets '{}' which is not in next_steps",
                                step.key, condition.label, condition.target
                            ),
                        ));
                    }
                }
                if let Some(default) = default_target
                    && !step.next_steps.contains(default)
                {
                    errors.push(ValidationError::new(
                        "gateway_target",
                        format!(
                            "Gateway {} default '{}' is not in next_steps",
                            step.key, default
                        ),
                    ));
                }
            }
            StepKind::ServiceTask { automation_action } if automation_action.trim().is_empty() => {
                errors.push(ValidationError::new(
                    "automation_action",
                    format!("Service task {} has an empty automation_action", step.key),
                ));
            }
            _ => {}
        }

        if let Some(sla) = &step.sla
            && (sla.critical_minutes <= 0.0 || sla.warning_minutes > sla.critical_minutes)
        {
            errors.push(ValidationError::new(
                "sla_thresholds",
                format!(
                    "Step {} needs 0 < warning ({}) <= critical ({})",
                    step.key, sla.warning_minutes, sla.critical_minutes
                ),
            ));
        }
    }

    if let [start] = starts.as_slice() {
        let graph = step_graph(def);
        let mut reached = HashSet::new();
        let mut bfs = Bfs::new(&graph, *start);
        while let Some(key) = bfs.next(&graph) {
            reached.insert(key);
        }
        for step in &def.steps {
            if !reached.contains(step.key.as_str()) {
                errors.push(ValidationError::new(
                    "reachable",
                    format!("Step {} is not reachable from start {}", step.key, start),
                ));
            }
        }
    }

    errors
}

/// Directed graph of step keys following `next_steps`. Dangling references
/// are left out.
pub fn step_graph(def: &ProcessDefinition) -> DiGraphMap<&str, ()> {
    let mut graph = DiGraphMap::new();
    for step in &def.steps {
        graph.add_node(step.key.as_str());
    }
    for step in &def.steps {
        for next in &step.next_steps {
            if graph.contains_node(next.as_str()) {
                graph.add_edge(step.key.as_str(), next.as_str(), ());
            }
        }
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::builtin;
    use crate::process::definition::{GatewayCondition, Lane, SlaThresholds, Step};

    fn step(key: &str, kind: StepKind, next: &[&str]) -> Step {
        Step {
            key: key.into(),
            title: key.into(),
            kind,
            lane: "ops".into(),
            next_steps: next.iter().map(|s| s.to_string()).collect(),
            estimated_minutes: 10,
            is_manual: true,
            role: None,
            skills: Vec::new(),
            sla: None,
        }
    }

    fn def(steps: Vec<Step>) -> ProcessDefinition {
        ProcessDefinition {
            key: "test".into(),
            name: "Test".into(),
            version: 0,
            lanes: vec![Lane {
                key: "ops".into(),
                title: "Ops".into(),
            }],
            steps,
            published_at: None,
        }
    }

    fn rules(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.rule.as_str()).collect()
    }

    #[test]
    fn builtin_definition_is_valid() {
        assert!(validate_definition(&builtin::agency_delivery()).is_empty());
    }

    #[test]
    fn linear_definition_is_valid() {
        let d = def(vec![
            step("start", StepKind::StartEvent, &["work"]),
            step("work", StepKind::Task, &["end"]),
            step("end", StepKind::EndEvent, &[]),
        ]);
        assert!(validate_definition(&d).is_empty());
    }

    #[test]
    fn missing_successor_and_unknown_reference() {
        let d = def(vec![
            step("start", StepKind::StartEvent, &["work"]),
            step("work", StepKind::Task, &[]),
            step("review", StepKind::Task, &["ghost"]),
            step("end", StepKind::EndEvent, &[]),
        ]);
        let errors = validate_definition(&d);
        let rules = rules(&errors);
        assert!(rules.contains(&"has_successor"));
        assert!(rules.contains(&"next_ref"));
        assert!(rules.contains(&"reachable"));
    }

    #[test]
    fn requires_exactly_one_start() {
        let d = def(vec![
            step("a", StepKind::StartEvent, &["end"]),
            step("b", StepKind::StartEvent, &["end"]),
            step("end", StepKind::EndEvent, &[]),
        ]);
        assert_eq!(rules(&validate_definition(&d)), vec!["single_start"]);
    }

    #[test]
    fn unreachable_step_is_reported() {
        let d = def(vec![
            step("start", StepKind::StartEvent, &["end"]),
            step("orphan", StepKind::Task, &["end"]),
            step("end", StepKind::EndEvent, &[]),
        ]);
        let errors = validate_definition(&d);
        assert_eq!(rules(&errors), vec!["reachable"]);
        assert!(errors[0].message.contains("orphan"));
    }

    #[test]
    fn gateway_with_single_condition_is_rejected() {
        let d = def(vec![
            step("start", StepKind::StartEvent, &["gate"]),
            step(
                "gate",
                StepKind::Gateway {
                    conditions: vec![GatewayCondition {
                        label: "only".into(),
                        target: "end".into(),
                    }],
                    default_target: None,
                },
                &["end"],
            ),
            step("end", StepKind::EndEvent, &[]),
        ]);
        assert_eq!(rules(&validate_definition(&d)), vec!["gateway_conditions"]);
    }

    #[test]
    fn gateway_without_conditions_needs_single_path() {
        let single = def(vec![
            step("start", StepKind::StartEvent, &["gate"]),
            step(
                "gate",
                StepKind::Gateway {
                    conditions: Vec::new(),
                    default_target: None,
                },
                &["end"],
            ),
            step("end", StepKind::EndEvent, &[]),
        ]);
        assert!(validate_definition(&single).is_empty());

        let ambiguous = def(vec![
            step("start", StepKind::StartEvent, &["gate"]),
            step(
                "gate",
                StepKind::Gateway {
                    conditions: Vec::new(),
                    default_target: None,
                },
                &["a", "end"],
            ),
            step("a", StepKind::Task, &["end"]),
            step("end", StepKind::EndEvent, &[]),
        ]);
        assert_eq!(
            rules(&validate_definition(&ambiguous)),
            vec!["gateway_conditions"]
        );
    }

    #[test]
    fn gateway_target_must_be_a_successor() {
        let d = def(vec![
            step("start", StepKind::StartEvent, &["gate"]),
            step(
                "gate",
                StepKind::Gateway {
                    conditions: vec![
                        GatewayCondition {
                            label: "yes".into(),
                            target: "a".into(),
                        },
                        GatewayCondition {
                            label: "no".into(),
                            target: "end".into(),
                        },
                    ],
                    default_target: Some("elsewhere".into()),
                },
                &["a"],
            ),
            step("a", StepKind::Task, &["end"]),
            step("end", StepKind::EndEvent, &[]),
        ]);
        let errors = validate_definition(&d);
        assert_eq!(rules(&errors), vec!["gateway_target", "gateway_target"]);
    }

    #[test]
    fn inverted_sla_thresholds_are_rejected() {
        let mut work = step("work", StepKind::Task, &["end"]);
        work.sla = Some(SlaThresholds {
            warning_minutes: 90.0,
            critical_minutes: 60.0,
        });
        let d = def(vec![
            step("start", StepKind::StartEvent, &["work"]),
            work,
            step("end", StepKind::EndEvent, &[]),
        ]);
        assert_eq!(rules(&validate_definition(&d)), vec!["sla_thresholds"]);
    }

    #[test]
    fn empty_automation_action_is_rejected() {
        let d = def(vec![
            step("start", StepKind::StartEvent, &["auto"]),
            step(
                "auto",
                StepKind::ServiceTask {
                    automation_action: " ".into(),
                },
                &["end"],
            ),
            step("end", StepKind::EndEvent, &[]),
        ]);
        assert_eq!(rules(&validate_definition(&d)), vec!["automation_action"]);
    }

    #[test]
    fn loops_back_are_allowed() {
        let d = def(vec![
            step("start", StepKind::StartEvent, &["build"]),
            step("build", StepKind::Task, &["review"]),
            step(
                "review",
                StepKind::Gateway {
                    conditions: vec![
                        GatewayCondition {
                            label: "approved".into(),
                            target: "end".into(),
                        },
                        GatewayCondition {
                            label: "changes".into(),
                            target: "build".into(),
                        },
                    ],
                    default_target: None,
                },
                &["end", "build"],
            ),
            step("end", StepKind::EndEvent, &[]),
        ]);
        assert!(validate_definition(&d).is_empty());
    }
}
