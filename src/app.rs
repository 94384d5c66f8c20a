use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analytics::events_for_workflow;
use crate::assignment::{AssignmentRecommender, TeamMember, workloads_from_log};
use crate::automation::{AutomationInvoker, LoggingInvoker, WebhookInvoker};
use crate::cli::Command;
use crate::config::FluxoConfig;
use crate::process::{
    Actor, EntityKind, EntityLink, ProcessDefinition, ProcessInstance, StepExecutor, builtin,
    validate_definition,
};
use crate::simulator::{simulate, swimlane};
use crate::store::{DefinitionRepository, ExecutionLog, FileStore, InstanceRepository, MemoryStore};
use crate::ui::{Console, TransitionProgress};

/// Command handlers over one store, executor and console.
pub struct App {
    config: FluxoConfig,
    definitions: Arc<dyn DefinitionRepository>,
    instances: Arc<dyn InstanceRepository>,
    log: Arc<dyn ExecutionLog>,
    executor: StepExecutor,
    console: Console,
}

impl App {
    /// Backed by the JSON snapshot at `config.state_path`.
    pub async fn open(config: FluxoConfig) -> anyhow::Result<Self> {
        let store = FileStore::open(&config.state_path)
            .await
            .with_context(|| format!("opening state file {}", config.state_path.display()))?;
        debug!(path = %store.path().display(), "state loaded");
        Self::with_store(config, Arc::new(store))
    }

    /// Backed by a throwaway in-memory store.
    pub fn in_memory(config: FluxoConfig) -> anyhow::Result<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    fn with_store<S>(config: FluxoConfig, store: Arc<S>) -> anyhow::Result<Self>
    where
        S: DefinitionRepository + InstanceRepository + ExecutionLog + 'static,
    {
        let executor = StepExecutor::new(
            store.clone(),
            store.clone(),
            store.clone(),
            invoker(&config)?,
        )
        .with_automation_timeout(config.automation_timeout());
        Ok(Self {
            config,
            definitions: store.clone(),
            instances: store.clone(),
            log: store,
            executor,
            console: Console::default(),
        })
    }

    pub fn executor(&self) -> &StepExecutor {
        &self.executor
    }

    pub async fn run(&self, command: Command, actor: &Actor) -> anyhow::Result<()> {
        match command {
            Command::Validate { file } => self.validate(&file),
            Command::Publish { file } => self.publish(file.as_deref()).await,
            Command::Start { workflow, entity } => {
                let inst = self.executor.start(&workflow, entity.link(), actor).await?;
                self.show(&inst).await;
                Ok(())
            }
            Command::Complete { instance, step } => {
                let inst = self
                    .transition(
                        format!("Completing {step}"),
                        self.executor.complete(instance, &step, actor),
                    )
                    .await?;
                self.show(&inst).await;
                Ok(())
            }
            Command::Decide {
                instance,
                step,
                target,
            } => {
                let inst = self
                    .transition(
                        format!("Deciding {step} → {target}"),
                        self.executor.gateway_decision(instance, &step, &target, actor),
                    )
                    .await?;
                self.show(&inst).await;
                Ok(())
            }
            Command::Skip {
                instance,
                step,
                reason,
            } => {
                let inst = self
                    .transition(
                        format!("Skipping {step}"),
                        self.executor.skip(instance, &step, Some(&reason), actor),
                    )
                    .await?;
                self.show(&inst).await;
                Ok(())
            }
            Command::Cancel { instance, reason } => {
                let inst = self.executor.cancel(instance, Some(&reason), actor).await?;
                self.show(&inst).await;
                Ok(())
            }
            Command::Assign {
                instance,
                step,
                member,
            } => {
                let inst = self.assign(instance, &step, member, actor).await?;
                self.show(&inst).await;
                Ok(())
            }
            Command::Status { instance: Some(id) } => {
                let inst = self.executor.instance(id).await?;
                self.show(&inst).await;
                if let Ok(def) = self.executor.definition_for(&inst).await {
                    self.console.heading("Swimlane");
                    self.console.swimlane(&swimlane(&def, Some(&inst)));
                }
                Ok(())
            }
            Command::Status { instance: None } => {
                self.console.instances(&self.executor.instances().await?);
                Ok(())
            }
            Command::Sla { workflow } => self.sla(workflow.as_deref()).await,
            Command::Simulate {
                file,
                seed,
                max_steps,
            } => {
                let def = match file {
                    Some(path) => ProcessDefinition::from_file(&path)?,
                    None => builtin::agency_delivery(),
                };
                self.console.heading(&def.name);
                self.console.swimlane(&swimlane(&def, None));
                self.console.simulation(&simulate(&def, seed, max_steps));
                Ok(())
            }
            Command::Demo => self.demo(actor).await,
        }
    }

    fn validate(&self, path: &Path) -> anyhow::Result<()> {
        let def = ProcessDefinition::from_file(path)?;
        let errors = validate_definition(&def);
        self.console.validation(&def.key, &errors);
        if !errors.is_empty() {
            bail!("{} failed validation", path.display());
        }
        Ok(())
    }

    async fn publish(&self, path: Option<&Path>) -> anyhow::Result<()> {
        let def = match path {
            Some(path) => ProcessDefinition::from_file(path)?,
            None => builtin::agency_delivery(),
        };
        let published = self.definitions.publish(def).await?;
        info!(key = %published.key, version = published.version, "definition published");
        println!("Published {} v{}", published.key, published.version);
        Ok(())
    }

    /// Assign `member`, or the recommender's first pick from the configured team.
    async fn assign(
        &self,
        instance_id: Uuid,
        step_key: &str,
        member: Option<String>,
        actor: &Actor,
    ) -> anyhow::Result<ProcessInstance> {
        let assignee = match member {
            Some(member) => member,
            None => {
                let inst = self.executor.instance(instance_id).await?;
                let def = self.executor.definition_for(&inst).await?;
                let step = def
                    .step(step_key)
                    .with_context(|| format!("step `{step_key}` is not part of {}", def.key))?;
                let workloads = workloads_from_log(&self.log.events().await?, step_key);
                let team = self.team();
                let ranked = AssignmentRecommender::new(self.config.assignment)
                    .rank(step, &team, &workloads);
                self.console.candidates(step_key, &ranked);
                match ranked.into_iter().next() {
                    Some(pick) => pick.member_id,
                    None => bail!("no team member can take `{step_key}`"),
                }
            }
        };
        Ok(self
            .executor
            .assign(instance_id, step_key, &assignee, actor)
            .await?)
    }

    async fn sla(&self, workflow: Option<&str>) -> anyhow::Result<()> {
        let keys: BTreeSet<String> = match workflow {
            Some(key) => BTreeSet::from([key.to_string()]),
            None => self
                .definitions
                .list()
                .await?
                .iter()
                .map(|d| d.key.clone())
                .collect(),
        };
        let events = self.log.events().await?;
        let instances = self.instances.list().await?;
        let analyzer = self.config.analyzer();
        for key in keys {
            let def = self.definitions.active(&key).await?;
            let scoped = events_for_workflow(events.clone(), &instances, &key);
            self.console.report(&analyzer.report(&def, &scoped, Utc::now()));
        }
        Ok(())
    }

    /// Walk the built-in pipeline end to end in memory: one delivered project,
    /// one lost lead and one lead still waiting on qualification.
    async fn demo(&self, actor: &Actor) -> anyhow::Result<()> {
        self.publish(None).await?;
        let flow = builtin::AGENCY_DELIVERY;
        let lead = |id: &str| {
            Some(EntityLink {
                kind: EntityKind::Lead,
                id: id.to_string(),
            })
        };

        let won = self.executor.start(flow, lead("L-1001"), actor).await?;
        let id = won.id;
        self.step(self.executor.complete(id, "lead_received", actor)).await?;
        self.assign(id, "qualify_lead", None, actor).await?;
        self.step(self.executor.complete(id, "qualify_lead", actor)).await?;
        self.assign(id, "draft_proposal", None, actor).await?;
        self.step(self.executor.complete(id, "draft_proposal", actor)).await?;
        self.step(
            self.executor
                .gateway_decision(id, "proposal_accepted", "issue_invoice", actor),
        )
        .await?;
        self.step(self.executor.complete(id, "deposit_paid", actor)).await?;
        self.assign(id, "kickoff_meeting", None, actor).await?;
        self.step(self.executor.complete(id, "kickoff_meeting", actor)).await?;
        self.assign(id, "build_project", None, actor).await?;
        self.step(self.executor.complete(id, "build_project", actor)).await?;
        self.step(
            self.executor
                .gateway_decision(id, "client_review", "build_project", actor),
        )
        .await?;
        self.step(self.executor.complete(id, "build_project", actor)).await?;
        self.step(
            self.executor
                .gateway_decision(id, "client_review", "deliver_project", actor),
        )
        .await?;
        let won = self
            .step(self.executor.complete(id, "deliver_project", actor))
            .await?;
        self.show(&won).await;

        let lost = self.executor.start(flow, lead("L-1002"), actor).await?;
        self.step(self.executor.complete(lost.id, "lead_received", actor))
            .await?;
        self.step(self.executor.complete(lost.id, "qualify_lead", actor))
            .await?;
        self.step(self.executor.complete(lost.id, "draft_proposal", actor))
            .await?;
        let lost = self
            .step(
                self.executor
                    .gateway_decision(lost.id, "proposal_accepted", "lead_lost", actor),
            )
            .await?;
        self.show(&lost).await;

        let waiting = self.executor.start(flow, lead("L-1003"), actor).await?;
        self.step(self.executor.complete(waiting.id, "lead_received", actor))
            .await?;
        let waiting = self
            .assign(waiting.id, "qualify_lead", None, actor)
            .await?;
        self.show(&waiting).await;

        self.sla(Some(flow)).await
    }

    async fn step(
        &self,
        fut: impl Future<Output = crate::error::Result<ProcessInstance>>,
    ) -> anyhow::Result<ProcessInstance> {
        let inst = fut.await?;
        debug!(instance = %inst.id, current = ?inst.current_step_key, "demo step");
        Ok(inst)
    }

    async fn transition(
        &self,
        label: String,
        fut: impl Future<Output = crate::error::Result<ProcessInstance>>,
    ) -> anyhow::Result<ProcessInstance> {
        let progress = TransitionProgress::start(&label);
        match fut.await {
            Ok(inst) => {
                progress.success(&format!("{label}: {}", inst.status));
                Ok(inst)
            }
            Err(e) => {
                progress.failure(&e.to_string());
                Err(e.into())
            }
        }
    }

    async fn show(&self, inst: &ProcessInstance) {
        let def = self.executor.definition_for(inst).await.ok();
        self.console.instance(inst, def.as_deref());
    }

    fn team(&self) -> Vec<TeamMember> {
        if self.config.team.is_empty() {
            demo_team()
        } else {
            self.config.team.clone()
        }
    }
}

fn invoker(config: &FluxoConfig) -> anyhow::Result<Arc<dyn AutomationInvoker>> {
    match &config.automation.webhook_url {
        Some(url) => {
            let webhook = WebhookInvoker::new(
                url.clone(),
                config.automation.auth_token.clone(),
                config.automation_timeout(),
            )?;
            Ok(Arc::new(webhook))
        }
        None => Ok(Arc::new(LoggingInvoker)),
    }
}

/// Used when `fluxo.toml` declares no `[[team]]`.
fn demo_team() -> Vec<TeamMember> {
    let member = |id: &str, name: &str, roles: &[&str], skills: &[&str], capacity| TeamMember {
        id: id.to_string(),
        name: name.to_string(),
        roles: roles.iter().map(|s| s.to_string()).collect(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        capacity,
    };
    vec![
        member("ana", "Ana", &["sales"], &["discovery", "writing"], 4),
        member("bruno", "Bruno", &["sales"], &["estimation"], 4),
        member("carla", "Carla", &["project_manager"], &["planning"], 3),
        member("diego", "Diego", &["developer"], &["rust", "frontend"], 2),
        member("elisa", "Elisa", &["developer", "project_manager"], &["frontend"], 3),
    ]
}
