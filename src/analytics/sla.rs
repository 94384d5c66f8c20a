use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::process::{ExitOutcome, ProcessDefinition, SlaThresholds, Step, StepEvent, StepEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaStatus {
    OnTrack,
    Warning,
    Breached,
}

impl fmt::Display for SlaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlaStatus::OnTrack => write!(f, "on_track"),
            SlaStatus::Warning => write!(f, "warning"),
            SlaStatus::Breached => write!(f, "breached"),
        }
    }
}

/// Classify an elapsed duration against a step's thresholds.
pub fn classify(elapsed_minutes: f64, thresholds: &SlaThresholds) -> SlaStatus {
    if elapsed_minutes >= thresholds.critical_minutes {
        SlaStatus::Breached
    } else if elapsed_minutes >= thresholds.warning_minutes {
        SlaStatus::Warning
    } else {
        SlaStatus::OnTrack
    }
}

/// Share of the critical threshold used, in percent.
pub fn percent_used(elapsed_minutes: f64, thresholds: &SlaThresholds) -> f64 {
    if thresholds.critical_minutes <= 0.0 {
        return 0.0;
    }
    elapsed_minutes / thresholds.critical_minutes * 100.0
}

/// One visit of an instance to a step, rebuilt from the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOccurrence {
    pub instance_id: Uuid,
    pub step_key: String,
    pub lane: String,
    pub assignee: Option<String>,
    pub entered_at: DateTime<Utc>,
    pub exited_at: Option<DateTime<Utc>>,
    pub outcome: Option<ExitOutcome>,
}

impl StepOccurrence {
    pub fn is_active(&self) -> bool {
        self.exited_at.is_none()
    }

    /// `exited - entered` when closed, `now - entered` while active.
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> f64 {
        let end = self.exited_at.unwrap_or(now);
        (end - self.entered_at).num_milliseconds().max(0) as f64 / 60_000.0
    }
}

/// Pair `entered`/`exited` events per instance and step, in log order. The
/// assignee is the last `assigned` event seen while the occurrence was open.
pub fn occurrences(events: &[StepEvent]) -> Vec<StepOccurrence> {
    let mut out: Vec<StepOccurrence> = Vec::new();
    let mut open: HashMap<(Uuid, &str), usize> = HashMap::new();

    for event in events {
        let key = (event.instance_id, event.step_key.as_str());
        match &event.kind {
            StepEventKind::Entered => {
                open.insert(key, out.len());
                out.push(StepOccurrence {
                    instance_id: event.instance_id,
                    step_key: event.step_key.clone(),
                    lane: event.lane.clone(),
                    assignee: None,
                    entered_at: event.at,
                    exited_at: None,
                    outcome: None,
                });
            }
            StepEventKind::Exited { outcome } => {
                if let Some(idx) = open.remove(&key) {
                    out[idx].exited_at = Some(event.at);
                    out[idx].outcome = Some(*outcome);
                }
            }
            StepEventKind::Assigned { assignee } => {
                if let Some(&idx) = open.get(&key) {
                    out[idx].assignee = Some(assignee.clone());
                }
            }
            _ => {}
        }
    }
    out
}

/// How thresholds are derived for steps without explicit ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaPolicy {
    pub warning_factor: f64,
    pub critical_factor: f64,
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self {
            warning_factor: 1.0,
            critical_factor: 2.0,
        }
    }
}

impl SlaPolicy {
    /// Explicit step thresholds, else `estimated_minutes` times the factors.
    /// Steps with no estimate carry no SLA.
    pub fn thresholds_for(&self, step: &Step) -> Option<SlaThresholds> {
        if let Some(sla) = step.sla {
            return Some(sla);
        }
        if step.estimated_minutes == 0 {
            return None;
        }
        let estimate = f64::from(step.estimated_minutes);
        Some(SlaThresholds {
            warning_minutes: estimate * self.warning_factor,
            critical_minutes: estimate * self.critical_factor,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaReading {
    pub instance_id: Uuid,
    pub step_key: String,
    pub lane: String,
    pub assignee: Option<String>,
    pub elapsed_minutes: f64,
    pub percent_used: f64,
    pub status: SlaStatus,
    pub active: bool,
}

impl SlaReading {
    pub fn of(
        occurrence: &StepOccurrence,
        thresholds: &SlaThresholds,
        now: DateTime<Utc>,
    ) -> Self {
        let elapsed = occurrence.elapsed_minutes(now);
        Self {
            instance_id: occurrence.instance_id,
            step_key: occurrence.step_key.clone(),
            lane: occurrence.lane.clone(),
            assignee: occurrence.assignee.clone(),
            elapsed_minutes: elapsed,
            percent_used: percent_used(elapsed, thresholds),
            status: classify(elapsed, thresholds),
            active: occurrence.is_active(),
        }
    }
}

/// Readings for every occurrence that is still open, most urgent first.
pub fn current_readings(
    def: &ProcessDefinition,
    occurrences: &[StepOccurrence],
    policy: &SlaPolicy,
    now: DateTime<Utc>,
) -> Vec<SlaReading> {
    let mut readings: Vec<SlaReading> = occurrences
        .iter()
        .filter(|o| o.is_active())
        .filter_map(|o| {
            let step = def.step(&o.step_key)?;
            let thresholds = policy.thresholds_for(step)?;
            Some(SlaReading::of(o, &thresholds, now))
        })
        .collect();
    readings.sort_by(|a, b| {
        b.percent_used
            .total_cmp(&a.percent_used)
            .then_with(|| a.instance_id.cmp(&b.instance_id))
    });
    readings
}
