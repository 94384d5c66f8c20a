//! Configuração do FLUXO carregada a partir de `fluxo.toml`.
//!
//! A struct [`FluxoConfig`] contém o caminho do estado, o webhook de
//! automação e as políticas ajustáveis de SLA, gargalo, atribuição e
//! recomendações. Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis `FLUXO_AUTOMATION_URL` e `FLUXO_AUTOMATION_TOKEN` têm
//! precedência sobre o arquivo.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analytics::recommend::default_rules;
use crate::analytics::{Analyzer, BottleneckWeights, RecommendationRule, SlaPolicy};
use crate::assignment::{AssignmentWeights, TeamMember};

pub const CONFIG_FILE: &str = "fluxo.toml";

/// Configuração de nível superior carregada de `fluxo.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct FluxoConfig {
    /// Arquivo JSON com definições, instâncias e o log de execução.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    #[serde(default)]
    pub automation: AutomationConfig,

    /// Fatores aplicados a `estimated_minutes` quando o passo não tem SLA próprio.
    #[serde(default)]
    pub sla: SlaPolicy,

    #[serde(default)]
    pub bottleneck: BottleneckWeights,

    #[serde(default)]
    pub assignment: AssignmentWeights,

    /// Tabela de regras avaliada sobre as métricas por passo.
    #[serde(default = "default_rules")]
    pub recommendations: Vec<RecommendationRule>,

    /// Membros da equipe considerados na atribuição.
    #[serde(default)]
    pub team: Vec<TeamMember>,
}

/// Destino das tarefas de serviço.
#[derive(Debug, Clone, Deserialize)]
pub struct AutomationConfig {
    /// URL base do webhook. Sem ela as automações são apenas registradas no log.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Token enviado como `Authorization: Bearer`.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Tempo máximo de uma automação antes de marcar a instância como errada.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

// Valor padrão para o caminho do estado: ".fluxo/state.json".
fn default_state_path() -> PathBuf {
    PathBuf::from(".fluxo/state.json")
}

// Valor padrão para o timeout de automação: 10000ms.
fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            auth_token: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for FluxoConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            automation: AutomationConfig::default(),
            sla: SlaPolicy::default(),
            bottleneck: BottleneckWeights::default(),
            assignment: AssignmentWeights::default(),
            recommendations: default_rules(),
            team: Vec::new(),
        }
    }
}

impl FluxoConfig {
    /// Carrega a configuração de `fluxo.toml` no diretório atual.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de `path`.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<FluxoConfig>(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    // Variáveis de ambiente têm precedência sobre o arquivo para o webhook.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("FLUXO_AUTOMATION_URL")
            && !url.is_empty()
        {
            self.automation.webhook_url = Some(url);
        }
        if let Some(token) = var("FLUXO_AUTOMATION_TOKEN")
            && !token.is_empty()
        {
            self.automation.auth_token = Some(token);
        }
    }

    pub fn automation_timeout(&self) -> Duration {
        Duration::from_millis(self.automation.timeout_ms)
    }

    pub fn analyzer(&self) -> Analyzer {
        Analyzer {
            sla: self.sla,
            weights: self.bottleneck,
            rules: self.recommendations.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = FluxoConfig::default();
        assert_eq!(config.state_path, PathBuf::from(".fluxo/state.json"));
        assert_eq!(config.automation.timeout_ms, 10_000);
        assert!(config.automation.webhook_url.is_none());
        assert_eq!(config.sla.critical_factor, 2.0);
        assert_eq!(config.recommendations.len(), 4);
        assert!(config.team.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            state_path = "/tmp/agency.json"

            [automation]
            webhook_url = "https://hooks.example.com"

            [sla]
            critical_factor = 3.0

            [bottleneck]
            queue_weight = 0.0

            [[team]]
            id = "ana"
            name = "Ana"
            roles = ["sales"]
            skills = ["discovery"]
        "#;
        let config: FluxoConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.state_path, PathBuf::from("/tmp/agency.json"));
        assert_eq!(
            config.automation.webhook_url.as_deref(),
            Some("https://hooks.example.com")
        );
        assert_eq!(config.automation.timeout_ms, 10_000);
        assert_eq!(config.sla.warning_factor, 1.0);
        assert_eq!(config.sla.critical_factor, 3.0);
        assert_eq!(config.bottleneck.breach_rate_weight, 0.5);
        assert_eq!(config.bottleneck.queue_weight, 0.0);
        assert_eq!(config.team[0].capacity, 5);
        assert_eq!(config.recommendations.len(), 4);
    }

    #[test]
    fn recommendation_table_replaces_defaults() {
        let toml_str = r#"
            [[recommendations]]
            metric = "active_count"
            threshold = 2.0
            kind = "add_capacity"
        "#;
        let config: FluxoConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.recommendations.len(), 1);
        assert_eq!(config.analyzer().rules, config.recommendations);
    }

    #[test]
    fn env_takes_precedence_over_file() {
        let mut config: FluxoConfig = toml::from_str(
            r#"
                [automation]
                webhook_url = "https://file.example.com"
                auth_token = "from-file"
            "#,
        )
        .unwrap();
        config.apply_env(|name| match name {
            "FLUXO_AUTOMATION_URL" => Some("https://env.example.com".to_string()),
            "FLUXO_AUTOMATION_TOKEN" => Some(String::new()),
            _ => None,
        });
        assert_eq!(
            config.automation.webhook_url.as_deref(),
            Some("https://env.example.com")
        );
        // Valor vazio não sobrescreve o arquivo.
        assert_eq!(config.automation.auth_token.as_deref(), Some("from-file"));
    }

    #[test]
    fn load_reads_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[automation]\ntimeout_ms = 250\n").unwrap();
        let config = FluxoConfig::load_from(&path).unwrap();
        assert_eq!(config.automation_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FluxoConfig::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.automation.timeout_ms, 10_000);
    }
}
