use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sla::{SlaPolicy, SlaReading, SlaStatus, StepOccurrence};
use crate::process::ProcessDefinition;

/// Weights of the bottleneck composite. Tunable policy, not a fixed formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BottleneckWeights {
    pub breach_rate_weight: f64,
    pub duration_weight: f64,
    pub queue_weight: f64,
}

impl Default for BottleneckWeights {
    fn default() -> Self {
        Self {
            breach_rate_weight: 0.5,
            duration_weight: 0.3,
            queue_weight: 0.2,
        }
    }
}

impl BottleneckWeights {
    /// Weighted mean of the three inputs (each in `0..=1`), scaled to 0–100.
    pub fn score(&self, breach_rate: f64, relative_duration: f64, relative_queue: f64) -> f64 {
        let total = self.breach_rate_weight + self.duration_weight + self.queue_weight;
        if total <= 0.0 {
            return 0.0;
        }
        let weighted = self.breach_rate_weight * breach_rate
            + self.duration_weight * relative_duration
            + self.queue_weight * relative_queue;
        weighted / total * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub count: usize,
    pub average: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl DurationStats {
    pub fn from_minutes(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_by(f64::total_cmp);
        let count = samples.len();
        let mid = count / 2;
        let median = if count % 2 == 0 {
            (samples[mid - 1] + samples[mid]) / 2.0
        } else {
            samples[mid]
        };
        Self {
            count,
            average: Some(samples.iter().sum::<f64>() / count as f64),
            median: Some(median),
            min: samples.first().copied(),
            max: samples.last().copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub step_key: String,
    pub title: String,
    pub lane: String,
    pub is_manual: bool,
    pub estimated_minutes: u32,
    pub occurrences: usize,
    pub active: usize,
    /// Distinct instances that entered the step.
    pub instances: usize,
    pub breached_instances: usize,
    /// `breached_instances / instances`.
    pub sla_breach_rate: f64,
    /// Closed occurrences only.
    pub duration: DurationStats,
    pub bottleneck_score: f64,
}

/// Lane-level or resource-level aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupMetrics {
    pub key: String,
    pub occurrences: usize,
    pub active: usize,
    pub completed: usize,
    pub breached: usize,
    /// `breached / occurrences`.
    pub sla_breach_rate: f64,
    pub duration: DurationStats,
    pub bottleneck_score: f64,
}

/// Occurrence paired with its SLA reading, when the step has thresholds.
struct Classified<'a> {
    occurrence: &'a StepOccurrence,
    reading: Option<SlaReading>,
}

impl Classified<'_> {
    fn breached(&self) -> bool {
        self.reading
            .as_ref()
            .is_some_and(|r| r.status == SlaStatus::Breached)
    }
}

fn classify_all<'a>(
    def: &ProcessDefinition,
    occurrences: &'a [StepOccurrence],
    policy: &SlaPolicy,
    now: DateTime<Utc>,
) -> Vec<Classified<'a>> {
    occurrences
        .iter()
        .filter_map(|o| {
            let step = def.step(&o.step_key)?;
            if step.is_end() {
                return None;
            }
            let reading = policy
                .thresholds_for(step)
                .map(|t| SlaReading::of(o, &t, now));
            Some(Classified {
                occurrence: o,
                reading,
            })
        })
        .collect()
}

fn closed_minutes<'a>(items: impl Iterator<Item = &'a Classified<'a>>, now: DateTime<Utc>) -> Vec<f64> {
    items
        .filter(|c| !c.occurrence.is_active())
        .map(|c| c.occurrence.elapsed_minutes(now))
        .collect()
}

fn ratio(value: f64, max: f64) -> f64 {
    if max > 0.0 { value / max } else { 0.0 }
}

/// Per-step metrics in definition order, for every step that has been visited.
pub fn step_metrics(
    def: &ProcessDefinition,
    occurrences: &[StepOccurrence],
    policy: &SlaPolicy,
    weights: &BottleneckWeights,
    now: DateTime<Utc>,
) -> Vec<StepMetrics> {
    let classified = classify_all(def, occurrences, policy, now);

    let mut metrics: Vec<StepMetrics> = def
        .steps
        .iter()
        .filter_map(|step| {
            let visits: Vec<&Classified> = classified
                .iter()
                .filter(|c| c.occurrence.step_key == step.key)
                .collect();
            if visits.is_empty() {
                return None;
            }
            let instances: HashSet<Uuid> = visits.iter().map(|c| c.occurrence.instance_id).collect();
            let breached: HashSet<Uuid> = visits
                .iter()
                .filter(|c| c.breached())
                .map(|c| c.occurrence.instance_id)
                .collect();
            Some(StepMetrics {
                step_key: step.key.clone(),
                title: step.title.clone(),
                lane: step.lane.clone(),
                is_manual: step.is_manual,
                estimated_minutes: step.estimated_minutes,
                occurrences: visits.len(),
                active: visits.iter().filter(|c| c.occurrence.is_active()).count(),
                instances: instances.len(),
                breached_instances: breached.len(),
                sla_breach_rate: ratio(breached.len() as f64, instances.len() as f64),
                duration: DurationStats::from_minutes(closed_minutes(visits.into_iter(), now)),
                bottleneck_score: 0.0,
            })
        })
        .collect();

    let slowest = metrics
        .iter()
        .filter_map(|m| m.duration.average)
        .fold(0.0, f64::max);
    let busiest = metrics.iter().map(|m| m.active).max().unwrap_or(0) as f64;
    for m in &mut metrics {
        m.bottleneck_score = weights.score(
            m.sla_breach_rate,
            ratio(m.duration.average.unwrap_or(0.0), slowest),
            ratio(m.active as f64, busiest),
        );
    }
    metrics
}

fn rollup<F>(
    def: &ProcessDefinition,
    occurrences: &[StepOccurrence],
    policy: &SlaPolicy,
    weights: &BottleneckWeights,
    now: DateTime<Utc>,
    group: F,
) -> Vec<RollupMetrics>
where
    F: Fn(&StepOccurrence) -> Option<String>,
{
    let classified = classify_all(def, occurrences, policy, now);
    let mut groups: BTreeMap<String, Vec<&Classified>> = BTreeMap::new();
    for c in &classified {
        if let Some(key) = group(c.occurrence) {
            groups.entry(key).or_default().push(c);
        }
    }

    let mut rollups: Vec<RollupMetrics> = groups
        .into_iter()
        .map(|(key, items)| {
            let breached = items.iter().filter(|c| c.breached()).count();
            let active = items.iter().filter(|c| c.occurrence.is_active()).count();
            RollupMetrics {
                key,
                occurrences: items.len(),
                active,
                completed: items.len() - active,
                breached,
                sla_breach_rate: ratio(breached as f64, items.len() as f64),
                duration: DurationStats::from_minutes(closed_minutes(items.into_iter(), now)),
                bottleneck_score: 0.0,
            }
        })
        .collect();

    let slowest = rollups
        .iter()
        .filter_map(|r| r.duration.average)
        .fold(0.0, f64::max);
    let busiest = rollups.iter().map(|r| r.active).max().unwrap_or(0) as f64;
    for r in &mut rollups {
        r.bottleneck_score = weights.score(
            r.sla_breach_rate,
            ratio(r.duration.average.unwrap_or(0.0), slowest),
            ratio(r.active as f64, busiest),
        );
    }
    rollups
}

pub fn lane_metrics(
    def: &ProcessDefinition,
    occurrences: &[StepOccurrence],
    policy: &SlaPolicy,
    weights: &BottleneckWeights,
    now: DateTime<Utc>,
) -> Vec<RollupMetrics> {
    rollup(def, occurrences, policy, weights, now, |o| Some(o.lane.clone()))
}

/// Grouped by assignee; unassigned occurrences are left out.
pub fn resource_metrics(
    def: &ProcessDefinition,
    occurrences: &[StepOccurrence],
    policy: &SlaPolicy,
    weights: &BottleneckWeights,
    now: DateTime<Utc>,
) -> Vec<RollupMetrics> {
    rollup(def, occurrences, policy, weights, now, |o| o.assignee.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ExitOutcome, builtin};
    use chrono::Duration;

    fn visit(
        instance: Uuid,
        step: &str,
        lane: &str,
        assignee: Option<&str>,
        start: DateTime<Utc>,
        minutes: Option<i64>,
    ) -> StepOccurrence {
        StepOccurrence {
            instance_id: instance,
            step_key: step.into(),
            lane: lane.into(),
            assignee: assignee.map(str::to_string),
            entered_at: start,
            exited_at: minutes.map(|m| start + Duration::minutes(m)),
            outcome: minutes.map(|_| ExitOutcome::Completed),
        }
    }

    #[test]
    fn duration_stats_even_and_odd() {
        let odd = DurationStats::from_minutes(vec![30.0, 10.0, 20.0]);
        assert_eq!(odd.count, 3);
        assert_eq!(odd.median, Some(20.0));
        assert_eq!(odd.average, Some(20.0));
        assert_eq!(odd.min, Some(10.0));
        assert_eq!(odd.max, Some(30.0));

        let even = DurationStats::from_minutes(vec![10.0, 40.0, 20.0, 30.0]);
        assert_eq!(even.median, Some(25.0));
        assert_eq!(DurationStats::from_minutes(Vec::new()), DurationStats::default());
    }

    #[test]
    fn weights_normalize_to_hundred() {
        let w = BottleneckWeights::default();
        assert_eq!(w.score(1.0, 1.0, 1.0), 100.0);
        assert_eq!(w.score(0.0, 0.0, 0.0), 0.0);
        let breach_only = BottleneckWeights {
            breach_rate_weight: 1.0,
            duration_weight: 0.0,
            queue_weight: 0.0,
        };
        assert_eq!(breach_only.score(0.4, 1.0, 1.0), 40.0);
    }

    #[test]
    fn step_metrics_compute_breach_rate_and_bottleneck() {
        let def = builtin::agency_delivery();
        let t0 = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        // qualify_lead: explicit SLA 60/240. kickoff_meeting: derived 60/120.
        let occ = vec![
            visit(a, "qualify_lead", "sales", Some("ana"), t0, Some(300)),
            visit(b, "qualify_lead", "sales", Some("ana"), t0, Some(100)),
            visit(a, "kickoff_meeting", "project_management", Some("caio"), t0, Some(30)),
            visit(b, "kickoff_meeting", "project_management", None, t0, None),
        ];
        let now = t0 + Duration::minutes(50);
        let metrics = step_metrics(&def, &occ, &SlaPolicy::default(), &BottleneckWeights::default(), now);
        assert_eq!(metrics.len(), 2);

        let qualify = &metrics[0];
        assert_eq!(qualify.step_key, "qualify_lead");
        assert_eq!(qualify.instances, 2);
        assert_eq!(qualify.breached_instances, 1);
        assert_eq!(qualify.sla_breach_rate, 0.5);
        assert_eq!(qualify.duration.average, Some(200.0));
        assert_eq!(qualify.active, 0);
        // breach 0.5, slowest average, no queue: (0.25 + 0.3) / 1.0 * 100
        assert!((qualify.bottleneck_score - 55.0).abs() < 1e-9);

        let kickoff = &metrics[1];
        assert_eq!(kickoff.active, 1);
        assert_eq!(kickoff.breached_instances, 0);
        assert_eq!(kickoff.duration.count, 1);
        // no breach, 30/200 of the slowest, busiest queue
        assert!((kickoff.bottleneck_score - (0.3 * 0.15 + 0.2) * 100.0).abs() < 1e-9);
    }

    #[test]
    fn rollups_group_by_lane_and_assignee() {
        let def = builtin::agency_delivery();
        let t0 = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let occ = vec![
            visit(a, "qualify_lead", "sales", Some("ana"), t0, Some(300)),
            visit(b, "draft_proposal", "sales", Some("ana"), t0, None),
            visit(a, "kickoff_meeting", "project_management", Some("caio"), t0, Some(30)),
            visit(b, "kickoff_meeting", "project_management", None, t0, Some(40)),
        ];
        let now = t0 + Duration::minutes(10);
        let policy = SlaPolicy::default();
        let weights = BottleneckWeights::default();

        let lanes = lane_metrics(&def, &occ, &policy, &weights, now);
        let keys: Vec<&str> = lanes.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["project_management", "sales"]);
        assert_eq!(lanes[1].occurrences, 2);
        assert_eq!(lanes[1].active, 1);
        assert_eq!(lanes[1].breached, 1);
        assert_eq!(lanes[0].duration.average, Some(35.0));

        let people = resource_metrics(&def, &occ, &policy, &weights, now);
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].key, "ana");
        assert_eq!(people[0].active, 1);
        assert_eq!(people[0].completed, 1);
        assert_eq!(people[1].key, "caio");
    }
}
