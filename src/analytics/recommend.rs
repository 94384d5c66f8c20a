use std::fmt;

use serde::{Deserialize, Serialize};

use super::bottleneck::StepMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationMetric {
    BottleneckScore,
    BreachRate,
    /// Average duration divided by the step's estimate.
    EstimateOverrun,
    ActiveCount,
}

impl RecommendationMetric {
    fn value(self, m: &StepMetrics) -> Option<f64> {
        match self {
            RecommendationMetric::BottleneckScore => Some(m.bottleneck_score),
            RecommendationMetric::BreachRate => Some(m.sla_breach_rate),
            RecommendationMetric::EstimateOverrun => {
                let average = m.duration.average?;
                (m.estimated_minutes > 0).then(|| average / f64::from(m.estimated_minutes))
            }
            RecommendationMetric::ActiveCount => Some(m.active as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    AutomationCandidate,
    AddCapacity,
    RevisitEstimate,
    ReviewSla,
}

impl fmt::Display for RecommendationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendationKind::AutomationCandidate => write!(f, "automation candidate"),
            RecommendationKind::AddCapacity => write!(f, "add capacity"),
            RecommendationKind::RevisitEstimate => write!(f, "revisit estimate"),
            RecommendationKind::ReviewSla => write!(f, "review SLA"),
        }
    }
}

/// `metric > threshold` on a step triggers `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRule {
    pub metric: RecommendationMetric,
    pub threshold: f64,
    pub kind: RecommendationKind,
    #[serde(default)]
    pub manual_only: bool,
}

pub fn default_rules() -> Vec<RecommendationRule> {
    vec![
        RecommendationRule {
            metric: RecommendationMetric::BottleneckScore,
            threshold: 80.0,
            kind: RecommendationKind::AutomationCandidate,
            manual_only: true,
        },
        RecommendationRule {
            metric: RecommendationMetric::BreachRate,
            threshold: 0.5,
            kind: RecommendationKind::ReviewSla,
            manual_only: false,
        },
        RecommendationRule {
            metric: RecommendationMetric::EstimateOverrun,
            threshold: 1.5,
            kind: RecommendationKind::RevisitEstimate,
            manual_only: false,
        },
        RecommendationRule {
            metric: RecommendationMetric::ActiveCount,
            threshold: 5.0,
            kind: RecommendationKind::AddCapacity,
            manual_only: false,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub step_key: String,
    pub kind: RecommendationKind,
    pub metric: RecommendationMetric,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

/// Evaluate the rule table, step by step in the given order, rules in table order.
pub fn recommend(metrics: &[StepMetrics], rules: &[RecommendationRule]) -> Vec<Recommendation> {
    let mut out = Vec::new();
    for m in metrics {
        for rule in rules {
            if rule.manual_only && !m.is_manual {
                continue;
            }
            let Some(value) = rule.metric.value(m) else {
                continue;
            };
            if value > rule.threshold {
                out.push(Recommendation {
                    step_key: m.step_key.clone(),
                    kind: rule.kind,
                    metric: rule.metric,
                    value,
                    threshold: rule.threshold,
                    message: message(rule.kind, m, value),
                });
            }
        }
    }
    out
}

fn message(kind: RecommendationKind, m: &StepMetrics, value: f64) -> String {
    match kind {
        RecommendationKind::AutomationCandidate => format!(
            "'{}' scores {value:.0} as a bottleneck; consider automating it",
            m.title
        ),
        RecommendationKind::AddCapacity => format!(
            "'{}' has {} instances waiting; add people to the {} lane",
            m.title, m.active, m.lane
        ),
        RecommendationKind::RevisitEstimate => format!(
            "'{}' takes {value:.1}x its {} minute estimate",
            m.title, m.estimated_minutes
        ),
        RecommendationKind::ReviewSla => format!(
            "'{}' breaches its SLA in {:.0}% of instances",
            m.title,
            value * 100.0
        ),
    }
}
