//! Interface de terminal do FLUXO: spinners e saída colorida.
//!
//! Usa `indicatif` para o spinner das transições (que podem aguardar uma
//! automação) e `console` para estilizar instâncias, a grade de raias,
//! o relatório de SLA e a simulação.

use console::{Style, truncate_str};
use indicatif::{ProgressBar, ProgressStyle};

use crate::analytics::sla::SlaStatus;
use crate::analytics::{AnalyticsReport, RollupMetrics};
use crate::assignment::AssignmentCandidate;
use crate::process::{InstanceStatus, ProcessDefinition, ProcessInstance, ValidationError};
use crate::simulator::{CellState, Simulation, Swimlane};

// Largura de cada coluna da grade de raias.
const CELL_WIDTH: usize = 18;
// Largura do rótulo da raia.
const LANE_WIDTH: usize = 20;

/// Spinner exibido enquanto uma transição é aplicada.
pub struct TransitionProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl TransitionProgress {
    /// Inicia o spinner com a descrição da transição.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(description.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    /// Finaliza o spinner com sucesso.
    pub fn success(&self, message: &str) {
        self.pb.finish_and_clear();
        println!("  {} {message}", self.green.apply_to("✓"));
    }

    /// Finaliza o spinner com falha.
    pub fn failure(&self, message: &str) {
        self.pb.finish_and_clear();
        println!("  {} {message}", self.red.apply_to("✗"));
    }
}

/// Estilos compartilhados pela saída do terminal.
pub struct Console {
    green: Style,
    red: Style,
    yellow: Style,
    cyan: Style,
    dim: Style,
    bold: Style,
}

impl Default for Console {
    fn default() -> Self {
        Self {
            green: Style::new().green(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow().bold(),
            cyan: Style::new().cyan(),
            dim: Style::new().dim(),
            bold: Style::new().bold(),
        }
    }
}

impl Console {
    fn status_style(&self, status: InstanceStatus) -> &Style {
        match status {
            InstanceStatus::Running => &self.cyan,
            InstanceStatus::Completed => &self.green,
            InstanceStatus::Canceled => &self.dim,
            InstanceStatus::Errored => &self.red,
        }
    }

    fn sla_style(&self, status: SlaStatus) -> &Style {
        match status {
            SlaStatus::OnTrack => &self.green,
            SlaStatus::Warning => &self.yellow,
            SlaStatus::Breached => &self.red,
        }
    }

    pub fn heading(&self, title: &str) {
        println!();
        println!("{}", self.bold.apply_to(format!("─── {title} ───")));
    }

    /// Detalhe de uma instância, com títulos de passo quando a definição é conhecida.
    pub fn instance(&self, inst: &ProcessInstance, def: Option<&ProcessDefinition>) {
        let title_of = |key: &str| {
            def.and_then(|d| d.step(key))
                .map(|s| format!("{key} ({})", s.title))
                .unwrap_or_else(|| key.to_string())
        };
        println!(
            "{} {} v{}  {}",
            self.bold.apply_to(inst.id),
            inst.definition_key,
            inst.definition_version,
            self.status_style(inst.status).apply_to(inst.status)
        );
        if let Some(entity) = &inst.entity {
            println!("  entity:    {:?} {}", entity.kind, entity.id);
        }
        match &inst.current_step_key {
            Some(key) => println!("  current:   {}", self.yellow.apply_to(title_of(key))),
            None => println!("  current:   {}", self.dim.apply_to("-")),
        }
        if let Some(assignee) = &inst.current_assignee {
            println!("  assignee:  {assignee}");
        }
        println!("  completed: {}", inst.completed_steps.join(" → "));
        println!("  started:   {}", inst.started_at.format("%Y-%m-%d %H:%M"));
        if let Some(done) = inst.completed_at {
            println!("  finished:  {}", done.format("%Y-%m-%d %H:%M"));
        }
    }

    pub fn instances(&self, list: &[ProcessInstance]) {
        if list.is_empty() {
            println!("{}", self.dim.apply_to("No instances."));
            return;
        }
        for inst in list {
            println!(
                "{}  {:<18} v{:<3} {} {}",
                inst.id,
                inst.definition_key,
                inst.definition_version,
                self.status_style(inst.status)
                    .apply_to(format!("{:<10}", inst.status.to_string())),
                inst.current_step_key.as_deref().unwrap_or("-")
            );
        }
    }

    /// Grade de raias × colunas, colorida pelo estado de cada passo.
    pub fn swimlane(&self, grid: &Swimlane) {
        for row in &grid.rows {
            let mut line = format!("{:<LANE_WIDTH$}", truncate_str(&row.title, LANE_WIDTH - 1, "…"));
            for column in 0..grid.columns {
                let keys: Vec<&str> = row
                    .cells
                    .iter()
                    .filter(|c| c.column == column)
                    .map(|c| c.step_key.as_str())
                    .collect();
                let text = format!("{:<CELL_WIDTH$}", truncate_str(&keys.join("/"), CELL_WIDTH - 1, "…"));
                // Uma célula com vários passos assume o estado mais avançado.
                let state = row
                    .cells
                    .iter()
                    .filter(|c| c.column == column)
                    .map(|c| c.state)
                    .min_by_key(|s| match s {
                        CellState::Active => 0,
                        CellState::Completed => 1,
                        CellState::Pending => 2,
                    });
                let styled = match state {
                    Some(CellState::Active) => self.yellow.apply_to(text),
                    Some(CellState::Completed) => self.green.apply_to(text),
                    _ => self.dim.apply_to(text),
                };
                line.push_str(&styled.to_string());
            }
            println!("{}", line.trim_end());
        }
    }

    pub fn validation(&self, key: &str, errors: &[ValidationError]) {
        if errors.is_empty() {
            println!("  {} {key} is valid", self.green.apply_to("✓"));
            return;
        }
        println!(
            "  {} {key}: {} problem(s)",
            self.red.apply_to("✗"),
            errors.len()
        );
        for error in errors {
            println!("    {error}");
        }
    }

    pub fn candidates(&self, step_key: &str, candidates: &[AssignmentCandidate]) {
        self.heading(&format!("Candidates for {step_key}"));
        if candidates.is_empty() {
            println!("{}", self.dim.apply_to("No team member holds the required role."));
            return;
        }
        for (rank, c) in candidates.iter().enumerate() {
            let load = format!("{:>3.0}%", c.workload_score);
            println!(
                "{:>2}. {:<12} score {:>6.1}  load {}  active {}  skills {}",
                rank + 1,
                c.member_id,
                c.score,
                if c.is_overloaded {
                    self.red.apply_to(load)
                } else {
                    self.green.apply_to(load)
                },
                c.active_steps,
                c.skill_matches
            );
        }
    }

    /// Relatório completo: passos ativos, métricas, raias, recursos e recomendações.
    pub fn report(&self, report: &AnalyticsReport) {
        self.heading(&format!("SLA · {}", report.definition_key));
        if report.active.is_empty() {
            println!("{}", self.dim.apply_to("No active steps with an SLA."));
        }
        for r in &report.active {
            println!(
                "{}  {:<20} {:>8.0} min {:>5.0}%  {}  {}",
                r.instance_id,
                r.step_key,
                r.elapsed_minutes,
                r.percent_used,
                self.sla_style(r.status)
                    .apply_to(format!("{:<9}", r.status.to_string())),
                r.assignee.as_deref().unwrap_or("-")
            );
        }

        self.heading("Steps");
        println!(
            "{}",
            self.dim.apply_to(format!(
                "{:<20} {:>5} {:>6} {:>7} {:>9} {:>6}",
                "step", "occ", "active", "breach", "avg min", "score"
            ))
        );
        for m in &report.steps {
            let score = format!("{:>6.1}", m.bottleneck_score);
            println!(
                "{:<20} {:>5} {:>6} {:>6.0}% {:>9} {}",
                m.step_key,
                m.occurrences,
                m.active,
                m.sla_breach_rate * 100.0,
                m.duration
                    .average
                    .map_or_else(|| "-".to_string(), |a| format!("{a:.1}")),
                if m.bottleneck_score > 50.0 {
                    self.red.apply_to(score)
                } else {
                    self.green.apply_to(score)
                }
            );
        }

        self.heading("Lanes");
        self.rollups(&report.lanes);
        self.heading("Resources");
        self.rollups(&report.resources);

        self.heading("Recommendations");
        if report.recommendations.is_empty() {
            println!("{}", self.dim.apply_to("Nothing to recommend."));
        }
        for rec in &report.recommendations {
            println!("  {} [{}] {}", self.yellow.apply_to("!"), rec.kind, rec.message);
        }
    }

    fn rollups(&self, rows: &[RollupMetrics]) {
        if rows.is_empty() {
            println!("{}", self.dim.apply_to("-"));
        }
        for r in rows {
            println!(
                "{:<20} occ {:>4}  active {:>3}  breach {:>4.0}%  score {:>5.1}",
                r.key,
                r.occurrences,
                r.active,
                r.sla_breach_rate * 100.0,
                r.bottleneck_score
            );
        }
    }

    pub fn simulation(&self, sim: &Simulation) {
        self.heading(&format!("Simulation · {} · seed {}", sim.definition_key, sim.seed));
        for visit in &sim.visits {
            let branch = visit
                .branch
                .as_deref()
                .map(|b| format!(" → {b}"))
                .unwrap_or_default();
            println!(
                "{:>7} min  {:<14} {:<22}{}",
                visit.entered_at_minute,
                self.dim.apply_to(&visit.lane),
                visit.title,
                self.cyan.apply_to(branch)
            );
        }
        let outcome = if sim.reached_end {
            self.green.apply_to("reached end")
        } else {
            self.yellow.apply_to("stopped early")
        };
        println!(
            "{} after {} steps, {} estimated minutes",
            outcome,
            sim.visits.len(),
            sim.total_minutes
        );
    }
}
