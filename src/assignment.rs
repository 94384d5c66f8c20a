use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::analytics::sla::occurrences;
use crate::process::{Step, StepEvent};

/// A person who can be assigned to steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    /// Concurrent steps the member can carry before counting as fully loaded.
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_capacity() -> u32 {
    5
}

/// Current and historical load of one member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub active_steps: u32,
    pub completed_steps: u32,
    /// Average closed duration on the step being assigned, if any history.
    pub average_completion_minutes: Option<f64>,
}

/// Scoring weights. Tunable policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentWeights {
    pub capacity_weight: f64,
    pub active_weight: f64,
    pub speed_weight: f64,
    pub skill_weight: f64,
    pub experience_weight: f64,
    /// Workload score at or above which a member counts as overloaded.
    pub overload_threshold: f64,
    pub overload_penalty: f64,
}

impl Default for AssignmentWeights {
    fn default() -> Self {
        Self {
            capacity_weight: 0.35,
            active_weight: 0.2,
            speed_weight: 0.2,
            skill_weight: 0.15,
            experience_weight: 0.1,
            overload_threshold: 80.0,
            overload_penalty: 25.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentCandidate {
    pub member_id: String,
    pub name: String,
    pub active_steps: u32,
    pub completed_steps: u32,
    /// 0–100 load indicator: active steps over capacity.
    pub workload_score: f64,
    pub average_completion_minutes: Option<f64>,
    pub skill_matches: usize,
    pub is_overloaded: bool,
    pub score: f64,
}

/// Ranks team members for a step by workload and fit.
pub struct AssignmentRecommender {
    weights: AssignmentWeights,
}

impl AssignmentRecommender {
    pub fn new(weights: AssignmentWeights) -> Self {
        Self { weights }
    }

    /// Candidates in rank order. Members lacking the step's role are left
    /// out; overloaded members are penalized, never dropped. Ties break on
    /// fewer active steps, then member id, so identical inputs always give
    /// the same order.
    pub fn rank(
        &self,
        step: &Step,
        members: &[TeamMember],
        workloads: &HashMap<String, Workload>,
    ) -> Vec<AssignmentCandidate> {
        let pool: Vec<&TeamMember> = members
            .iter()
            .filter(|m| match &step.role {
                Some(role) => m.roles.iter().any(|r| r == role),
                None => true,
            })
            .collect();

        let idle = Workload::default();
        let fastest = pool
            .iter()
            .filter_map(|m| workloads.get(&m.id)?.average_completion_minutes)
            .filter(|avg| *avg > 0.0)
            .fold(f64::INFINITY, f64::min);
        let most_experienced = pool
            .iter()
            .filter_map(|m| workloads.get(&m.id).map(|w| w.completed_steps))
            .max()
            .unwrap_or(0);

        let mut candidates: Vec<AssignmentCandidate> = pool
            .into_iter()
            .map(|m| {
                let load = workloads.get(&m.id).unwrap_or(&idle);
                self.score(step, m, load, fastest, most_experienced)
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.active_steps.cmp(&b.active_steps))
                .then_with(|| a.member_id.cmp(&b.member_id))
        });
        candidates
    }

    /// The rank-1 candidate.
    pub fn pick(
        &self,
        step: &Step,
        members: &[TeamMember],
        workloads: &HashMap<String, Workload>,
    ) -> Option<AssignmentCandidate> {
        self.rank(step, members, workloads).into_iter().next()
    }

    fn score(
        &self,
        step: &Step,
        member: &TeamMember,
        load: &Workload,
        fastest: f64,
        most_experienced: u32,
    ) -> AssignmentCandidate {
        let w = &self.weights;
        let capacity = member.capacity.max(1) as f64;
        let workload_score = (load.active_steps as f64 / capacity * 100.0).min(100.0);
        let is_overloaded = workload_score >= w.overload_threshold;

        let free_capacity = 100.0 - workload_score;
        let inverse_active = 100.0 / (1.0 + load.active_steps as f64);
        // Without history a member sits at the midpoint.
        let speed = match load.average_completion_minutes {
            Some(avg) if avg > 0.0 && fastest.is_finite() => fastest / avg * 100.0,
            _ => 50.0,
        };
        let skill_matches = step
            .skills
            .iter()
            .filter(|s| member.skills.contains(s))
            .count();
        let skill = if step.skills.is_empty() {
            0.0
        } else {
            skill_matches as f64 / step.skills.len() as f64 * 100.0
        };
        let experience = if most_experienced > 0 {
            load.completed_steps as f64 / most_experienced as f64 * 100.0
        } else {
            0.0
        };

        let mut score = w.capacity_weight * free_capacity
            + w.active_weight * inverse_active
            + w.speed_weight * speed
            + w.skill_weight * skill
            + w.experience_weight * experience;
        if is_overloaded {
            score -= w.overload_penalty;
        }

        AssignmentCandidate {
            member_id: member.id.clone(),
            name: member.name.clone(),
            active_steps: load.active_steps,
            completed_steps: load.completed_steps,
            workload_score,
            average_completion_minutes: load.average_completion_minutes,
            skill_matches,
            is_overloaded,
            score,
        }
    }
}

/// Derive each assignee's workload from the log. Averages only cover
/// closed occurrences of `step_key`.
pub fn workloads_from_log(events: &[StepEvent], step_key: &str) -> HashMap<String, Workload> {
    let mut workloads: HashMap<String, Workload> = HashMap::new();
    let mut durations: HashMap<String, Vec<f64>> = HashMap::new();

    for occ in occurrences(events) {
        let Some(assignee) = occ.assignee.clone() else {
            continue;
        };
        let entry = workloads.entry(assignee.clone()).or_default();
        match occ.exited_at {
            None => entry.active_steps += 1,
            Some(exited) => {
                entry.completed_steps += 1;
                if occ.step_key == step_key {
                    let minutes = (exited - occ.entered_at).num_milliseconds().max(0) as f64 / 60_000.0;
                    durations.entry(assignee).or_default().push(minutes);
                }
            }
        }
    }
    for (assignee, samples) in durations {
        if let Some(w) = workloads.get_mut(&assignee) {
            w.average_completion_minutes = Some(samples.iter().sum::<f64>() / samples.len() as f64);
        }
    }
    workloads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ExitOutcome, StepEventKind, builtin};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn member(id: &str, roles: &[&str], skills: &[&str]) -> TeamMember {
        TeamMember {
            id: id.into(),
            name: id.to_uppercase(),
            roles: roles.iter().map(|s| s.to_string()).collect(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            capacity: 5,
        }
    }

    fn load(active: u32, completed: u32, avg: Option<f64>) -> Workload {
        Workload {
            active_steps: active,
            completed_steps: completed,
            average_completion_minutes: avg,
        }
    }

    fn team() -> Vec<TeamMember> {
        vec![
            member("ana", &["sales"], &["discovery"]),
            member("bruno", &["sales"], &[]),
            member("caio", &["developer"], &["rust"]),
        ]
    }

    #[test]
    fn pool_is_limited_to_required_role() {
        let def = builtin::agency_delivery();
        let step = def.step("qualify_lead").unwrap();
        let ranked = AssignmentRecommender::new(AssignmentWeights::default()).rank(
            step,
            &team(),
            &HashMap::new(),
        );
        let ids: Vec<&str> = ranked.iter().map(|c| c.member_id.as_str()).collect();
        assert_eq!(ids, vec!["ana", "bruno"]);
        // ana matches the discovery skill.
        assert_eq!(ranked[0].skill_matches, 1);
    }

    #[test]
    fn step_without_role_considers_everyone() {
        let def = builtin::agency_delivery();
        let step = def.step("lead_received").unwrap();
        let ranked = AssignmentRecommender::new(AssignmentWeights::default()).rank(
            step,
            &team(),
            &HashMap::new(),
        );
        // Identical inputs, so id order decides.
        let ids: Vec<&str> = ranked.iter().map(|c| c.member_id.as_str()).collect();
        assert_eq!(ids, vec!["ana", "bruno", "caio"]);
    }

    #[test]
    fn lighter_workload_wins() {
        let def = builtin::agency_delivery();
        let step = def.step("draft_proposal").unwrap();
        let workloads = HashMap::from([
            ("ana".to_string(), load(3, 10, Some(200.0))),
            ("bruno".to_string(), load(0, 10, Some(200.0))),
        ]);
        let pick = AssignmentRecommender::new(AssignmentWeights::default())
            .pick(step, &team(), &workloads)
            .unwrap();
        assert_eq!(pick.member_id, "bruno");
        assert_eq!(pick.workload_score, 0.0);
    }

    #[test]
    fn overloaded_members_are_penalized_not_excluded() {
        let def = builtin::agency_delivery();
        let step = def.step("qualify_lead").unwrap();
        let workloads = HashMap::from([("ana".to_string(), load(5, 40, Some(20.0)))]);
        let ranked = AssignmentRecommender::new(AssignmentWeights::default()).rank(
            step,
            &team(),
            &workloads,
        );
        assert_eq!(ranked.len(), 2);
        let ana = ranked.iter().find(|c| c.member_id == "ana").unwrap();
        assert!(ana.is_overloaded);
        assert_eq!(ana.workload_score, 100.0);
        assert_eq!(ranked[0].member_id, "bruno");
    }

    #[test]
    fn ranking_is_deterministic() {
        let def = builtin::agency_delivery();
        let step = def.step("build_project").unwrap();
        let members = vec![
            member("zoe", &["developer"], &["rust"]),
            member("caio", &["developer"], &["rust", "frontend"]),
            member("duda", &["developer"], &["frontend"]),
        ];
        let workloads = HashMap::from([
            ("zoe".to_string(), load(1, 4, Some(4000.0))),
            ("duda".to_string(), load(1, 4, Some(4000.0))),
        ]);
        let recommender = AssignmentRecommender::new(AssignmentWeights::default());
        let first = recommender.rank(step, &members, &workloads);
        let second = recommender.rank(step, &members, &workloads);
        assert_eq!(first, second);
        assert_eq!(
            recommender.pick(step, &members, &workloads),
            recommender.pick(step, &members, &workloads)
        );
        // zoe and duda tie on every input but the id.
        let zoe = first.iter().position(|c| c.member_id == "zoe").unwrap();
        let duda = first.iter().position(|c| c.member_id == "duda").unwrap();
        assert!(duda < zoe);
    }

    #[test]
    fn workloads_come_from_assigned_occurrences() {
        let t0 = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let ev = |id, step: &str, kind, minutes| StepEvent {
            instance_id: id,
            step_key: step.into(),
            lane: "sales".into(),
            kind,
            actor: None,
            at: t0 + Duration::minutes(minutes),
        };
        let events = vec![
            ev(a, "qualify_lead", StepEventKind::Entered, 0),
            ev(a, "qualify_lead", StepEventKind::Assigned { assignee: "ana".into() }, 0),
            ev(
                a,
                "qualify_lead",
                StepEventKind::Exited {
                    outcome: ExitOutcome::Completed,
                },
                40,
            ),
            ev(b, "qualify_lead", StepEventKind::Entered, 0),
            ev(b, "qualify_lead", StepEventKind::Assigned { assignee: "ana".into() }, 5),
            ev(b, "draft_proposal", StepEventKind::Entered, 0),
        ];
        let workloads = workloads_from_log(&events, "qualify_lead");
        assert_eq!(workloads.len(), 1);
        let ana = &workloads["ana"];
        assert_eq!(ana.active_steps, 1);
        assert_eq!(ana.completed_steps, 1);
        assert_eq!(ana.average_completion_minutes, Some(40.0));
    }
}
