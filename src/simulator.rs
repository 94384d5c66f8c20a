//! Demo walk and swimlane layout of a definition. Presentation only: the
//! executor never consults anything here.

use std::collections::HashMap;

use petgraph::algo::dijkstra;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::process::{ProcessDefinition, ProcessInstance, StepKind, step_graph};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedVisit {
    pub step_key: String,
    pub title: String,
    /// Title of the step's lane, or its key when the lane is undeclared.
    pub lane: String,
    pub kind: String,
    /// Simulated minutes elapsed when the step was entered.
    pub entered_at_minute: u64,
    pub estimated_minutes: u32,
    /// Label of the gateway branch taken on leaving this step.
    pub branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    pub definition_key: String,
    pub seed: u64,
    pub visits: Vec<SimulatedVisit>,
    pub total_minutes: u64,
    pub reached_end: bool,
}

/// Walk from the start event, taking `next_steps[0]` everywhere except at
/// gateways with conditions, where a branch is drawn from an RNG seeded with
/// `seed`. Stops at an end event, a dead end, or after `max_steps` visits.
pub fn simulate(def: &ProcessDefinition, seed: u64, max_steps: usize) -> Simulation {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut visits = Vec::new();
    let mut elapsed: u64 = 0;
    let mut reached_end = false;
    let mut current = def.start_step();

    while let Some(step) = current {
        if visits.len() >= max_steps {
            break;
        }
        let mut visit = SimulatedVisit {
            step_key: step.key.clone(),
            title: step.title.clone(),
            lane: def
                .lane(&step.lane)
                .map_or_else(|| step.lane.clone(), |l| l.title.clone()),
            kind: step.kind.name().to_string(),
            entered_at_minute: elapsed,
            estimated_minutes: step.estimated_minutes,
            branch: None,
        };
        elapsed += u64::from(step.estimated_minutes);

        if step.is_end() {
            reached_end = true;
            visits.push(visit);
            break;
        }

        current = match &step.kind {
            StepKind::Gateway { conditions, .. } if !conditions.is_empty() => {
                let pick = &conditions[rng.gen_range(0..conditions.len())];
                visit.branch = Some(pick.label.clone());
                def.step(&pick.target)
            }
            _ => def.successor(step),
        };
        visits.push(visit);
    }

    Simulation {
        definition_key: def.key.clone(),
        seed,
        visits,
        total_minutes: elapsed,
        reached_end,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Completed,
    Active,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwimlaneCell {
    pub step_key: String,
    pub title: String,
    pub kind: String,
    pub column: usize,
    pub state: CellState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwimlaneRow {
    pub lane_key: String,
    pub title: String,
    /// Ordered by column, then definition order.
    pub cells: Vec<SwimlaneCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swimlane {
    pub definition_key: String,
    pub columns: usize,
    pub rows: Vec<SwimlaneRow>,
}

/// Lay the definition out as lanes by columns, a step's column being its
/// BFS depth from the start event. Steps the start cannot reach go in a
/// trailing column. With an instance, cells carry its progress.
pub fn swimlane(def: &ProcessDefinition, instance: Option<&ProcessInstance>) -> Swimlane {
    let graph = step_graph(def);
    let depths: HashMap<&str, usize> = match def.start_step() {
        Some(start) => dijkstra(&graph, start.key.as_str(), None, |_| 1usize),
        None => HashMap::new(),
    };
    let trailing = depths.values().max().map_or(0, |d| d + 1);

    let state_of = |key: &str| match instance {
        Some(i) if i.is_current(key) => CellState::Active,
        Some(i) if i.has_completed(key) => CellState::Completed,
        _ => CellState::Pending,
    };

    let mut columns = 0;
    let rows = def
        .lanes
        .iter()
        .map(|lane| {
            let mut cells: Vec<SwimlaneCell> = def
                .steps_in_lane(&lane.key)
                .map(|step| {
                    let column = depths.get(step.key.as_str()).copied().unwrap_or(trailing);
                    columns = columns.max(column + 1);
                    SwimlaneCell {
                        step_key: step.key.clone(),
                        title: step.title.clone(),
                        kind: step.kind.name().to_string(),
                        column,
                        state: state_of(&step.key),
                    }
                })
                .collect();
            cells.sort_by_key(|c| c.column);
            SwimlaneRow {
                lane_key: lane.key.clone(),
                title: lane.title.clone(),
                cells,
            }
        })
        .collect();

    Swimlane {
        definition_key: def.key.clone(),
        columns,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::builtin;
    use chrono::Utc;

    #[test]
    fn branching_walk_always_reaches_end() {
        let def = builtin::branching();
        for seed in 0..20 {
            let sim = simulate(&def, seed, 50);
            assert!(sim.reached_end);
            let keys: Vec<&str> = sim.visits.iter().map(|v| v.step_key.as_str()).collect();
            assert_eq!(keys.len(), 4);
            assert_eq!(keys[0], "start");
            assert_eq!(keys[3], "end");
            let label = sim.visits[1].branch.as_deref().unwrap();
            let expected = if label == "yes" { "B" } else { "C" };
            assert_eq!(keys[2], expected);
            assert_eq!(sim.total_minutes, 35);
            assert_eq!(sim.visits[2].entered_at_minute, 5);
            assert!(sim.visits.iter().all(|v| v.lane == "Operations"));
        }
    }

    #[test]
    fn same_seed_same_walk() {
        let def = builtin::agency_delivery();
        assert_eq!(simulate(&def, 42, 100), simulate(&def, 42, 100));
    }

    #[test]
    fn walk_is_bounded_by_max_steps() {
        let sim = simulate(&builtin::agency_delivery(), 7, 3);
        assert_eq!(sim.visits.len(), 3);
        assert!(!sim.reached_end);
        assert_eq!(sim.total_minutes, 31);
    }

    #[test]
    fn swimlane_columns_follow_bfs_depth() {
        let def = builtin::agency_delivery();
        let grid = swimlane(&def, None);
        assert_eq!(grid.rows.len(), def.lanes.len());
        assert_eq!(grid.columns, 13);

        let column = |key: &str| {
            grid.rows
                .iter()
                .flat_map(|r| r.cells.iter())
                .find(|c| c.step_key == key)
                .map(|c| c.column)
                .unwrap()
        };
        assert_eq!(column("lead_received"), 0);
        assert_eq!(column("proposal_accepted"), 5);
        assert_eq!(column("lead_lost"), 6);
        assert_eq!(column("issue_invoice"), 6);
        assert_eq!(column("project_closed"), 12);
        assert!(
            grid.rows
                .iter()
                .flat_map(|r| r.cells.iter())
                .all(|c| c.state == CellState::Pending)
        );
    }

    #[test]
    fn swimlane_overlays_instance_progress() {
        let def = builtin::branching();
        let mut instance = ProcessInstance::new(&def, None, Utc::now());
        instance.mark_completed("start");
        instance.current_step_key = Some("A".into());

        let grid = swimlane(&def, Some(&instance));
        let cells = &grid.rows[0].cells;
        let state = |key: &str| cells.iter().find(|c| c.step_key == key).unwrap().state;
        assert_eq!(state("start"), CellState::Completed);
        assert_eq!(state("A"), CellState::Active);
        assert_eq!(state("B"), CellState::Pending);
        assert_eq!(cells[0].step_key, "start");
        assert_eq!(cells.last().unwrap().step_key, "end");
    }
}
