//! SLA, bottleneck and recommendation analytics over the step execution log.
//!
//! Everything here is a pure function of a definition, a slice of log events
//! and `now`. Nothing is stored; reports are recomputed on request.

pub mod bottleneck;
pub mod recommend;
pub mod sla;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::process::{ProcessDefinition, ProcessInstance, StepEvent};

pub use bottleneck::{BottleneckWeights, DurationStats, RollupMetrics, StepMetrics};
pub use recommend::{Recommendation, RecommendationKind, RecommendationMetric, RecommendationRule};
pub use sla::{SlaPolicy, SlaReading, SlaStatus, StepOccurrence};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub definition_key: String,
    pub generated_at: DateTime<Utc>,
    pub active: Vec<SlaReading>,
    pub steps: Vec<StepMetrics>,
    pub lanes: Vec<RollupMetrics>,
    pub resources: Vec<RollupMetrics>,
    pub recommendations: Vec<Recommendation>,
}

/// Bundles the tunable analytics policy.
#[derive(Debug, Clone)]
pub struct Analyzer {
    pub sla: SlaPolicy,
    pub weights: BottleneckWeights,
    pub rules: Vec<RecommendationRule>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self {
            sla: SlaPolicy::default(),
            weights: BottleneckWeights::default(),
            rules: recommend::default_rules(),
        }
    }
}

impl Analyzer {
    pub fn report(
        &self,
        def: &ProcessDefinition,
        events: &[StepEvent],
        now: DateTime<Utc>,
    ) -> AnalyticsReport {
        let occ = sla::occurrences(events);
        let steps = bottleneck::step_metrics(def, &occ, &self.sla, &self.weights, now);
        AnalyticsReport {
            definition_key: def.key.clone(),
            generated_at: now,
            active: sla::current_readings(def, &occ, &self.sla, now),
            lanes: bottleneck::lane_metrics(def, &occ, &self.sla, &self.weights, now),
            resources: bottleneck::resource_metrics(def, &occ, &self.sla, &self.weights, now),
            recommendations: recommend::recommend(&steps, &self.rules),
            steps,
        }
    }
}

/// Events belonging to instances of workflow `key`, any version.
pub fn events_for_workflow(
    events: Vec<StepEvent>,
    instances: &[ProcessInstance],
    key: &str,
) -> Vec<StepEvent> {
    let ids: HashSet<Uuid> = instances
        .iter()
        .filter(|i| i.definition_key == key)
        .map(|i| i.id)
        .collect();
    events
        .into_iter()
        .filter(|e| ids.contains(&e.instance_id))
        .collect()
}
