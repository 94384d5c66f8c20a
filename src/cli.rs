//! Interface de linha de comando do FLUXO baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (validate, publish,
//! start, complete, decide, skip, cancel, assign, status, sla, simulate,
//! demo) e flags globais (--actor, --admin, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::process::{Actor, EntityKind, EntityLink};

/// FLUXO: motor de processos da agência, do lead à entrega.
#[derive(Debug, Parser)]
#[command(name = "fluxo", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Identificador de quem executa a ação.
    #[arg(long, global = true, default_value = "operator")]
    pub actor: String,

    /// Executa como administrador (necessário para skip e cancel).
    #[arg(long, global = true, default_value_t = false)]
    pub admin: bool,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    pub fn actor(&self) -> Actor {
        if self.admin {
            Actor::admin(self.actor.clone())
        } else {
            Actor::member(self.actor.clone())
        }
    }
}

/// Entidade de negócio opcional vinculada a uma nova instância.
#[derive(Debug, Clone, Default, Args)]
#[group(multiple = false)]
pub struct EntityArgs {
    #[arg(long)]
    pub lead: Option<String>,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long)]
    pub client: Option<String>,
}

impl EntityArgs {
    pub fn link(&self) -> Option<EntityLink> {
        let (kind, id) = match (&self.lead, &self.project, &self.client) {
            (Some(id), _, _) => (EntityKind::Lead, id),
            (_, Some(id), _) => (EntityKind::Project, id),
            (_, _, Some(id)) => (EntityKind::Client, id),
            _ => return None,
        };
        Some(EntityLink {
            kind,
            id: id.clone(),
        })
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Valida um arquivo de definição (JSON ou TOML) sem publicá-lo.
    Validate {
        file: PathBuf,
    },

    /// Publica uma definição; sem arquivo, publica a definição embutida.
    Publish {
        file: Option<PathBuf>,
    },

    /// Inicia uma instância da versão ativa de um workflow.
    Start {
        workflow: String,

        #[command(flatten)]
        entity: EntityArgs,
    },

    /// Conclui o passo atual.
    Complete {
        instance: Uuid,
        step: String,
    },

    /// Escolhe o ramo de um gateway.
    Decide {
        instance: Uuid,
        step: String,
        target: String,
    },

    /// Pula o passo atual (somente admin).
    Skip {
        instance: Uuid,
        step: String,

        #[arg(long, default_value = "skipped by operator")]
        reason: String,
    },

    /// Cancela a instância (somente admin).
    Cancel {
        instance: Uuid,

        #[arg(long, default_value = "canceled by operator")]
        reason: String,
    },

    /// Atribui o passo atual; sem --member, usa o recomendador.
    Assign {
        instance: Uuid,
        step: String,

        #[arg(long)]
        member: Option<String>,
    },

    /// Mostra uma instância, ou lista todas.
    Status {
        instance: Option<Uuid>,
    },

    /// Relatório de SLA e gargalos; sem workflow, cobre todos os publicados.
    Sla {
        workflow: Option<String>,
    },

    /// Percorre uma definição com ramos sorteados a partir de uma semente.
    Simulate {
        file: Option<PathBuf>,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        #[arg(long, default_value_t = 50)]
        max_steps: usize,
    },

    /// Executa a demonstração embutida em memória.
    Demo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_start_with_entity() {
        let cli = Cli::parse_from(["fluxo", "start", "agency_delivery", "--lead", "L-42"]);
        match cli.command {
            Command::Start { workflow, entity } => {
                assert_eq!(workflow, "agency_delivery");
                assert_eq!(
                    entity.link(),
                    Some(EntityLink {
                        kind: EntityKind::Lead,
                        id: "L-42".into()
                    })
                );
            }
            _ => panic!("expected Start command"),
        }
    }

    #[test]
    fn cli_rejects_two_entities() {
        let parsed = Cli::try_parse_from([
            "fluxo",
            "start",
            "agency_delivery",
            "--lead",
            "L-1",
            "--client",
            "C-1",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn cli_parses_decide_with_uuid() {
        let id = Uuid::new_v4();
        let id_arg = id.to_string();
        let cli = Cli::parse_from([
            "fluxo",
            "decide",
            id_arg.as_str(),
            "proposal_accepted",
            "issue_invoice",
        ]);
        match cli.command {
            Command::Decide {
                instance,
                step,
                target,
            } => {
                assert_eq!(instance, id);
                assert_eq!(step, "proposal_accepted");
                assert_eq!(target, "issue_invoice");
            }
            _ => panic!("expected Decide command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["fluxo", "--actor", "ana", "--admin", "--verbose", "demo"]);
        assert!(cli.verbose);
        let actor = cli.actor();
        assert_eq!(actor.id, "ana");
        assert!(actor.is_admin());
    }

    #[test]
    fn cli_defaults_to_member_actor() {
        let cli = Cli::parse_from(["fluxo", "simulate", "--seed", "9"]);
        assert!(!cli.actor().is_admin());
        match cli.command {
            Command::Simulate {
                file,
                seed,
                max_steps,
            } => {
                assert!(file.is_none());
                assert_eq!(seed, 9);
                assert_eq!(max_steps, 50);
            }
            _ => panic!("expected Simulate command"),
        }
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
