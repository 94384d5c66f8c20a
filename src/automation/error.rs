//! Tipos de erro do colaborador de automação.
//!
//! Define [`AutomationError`] com variantes para rejeição pelo serviço,
//! falha de transporte e timeout. O executor não faz retentativas: qualquer
//! variante leva a instância ao estado `errored`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    /// O serviço respondeu com status não-2xx.
    #[error("automation rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A chamada não terminou dentro do limite configurado.
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// O serviço não tem handler para a ação (HTTP 404).
    #[error("unknown automation action `{0}`")]
    UnknownAction(String),
}
