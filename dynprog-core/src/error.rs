//! # Erros do Hipergrafo
//!
//! Taxonomia dos erros do motor de inferência. Cada erro pertence a uma
//! [`ErrorCategory`]:
//!
//! | Categoria        | Quando ocorre                                              |
//! |------------------|------------------------------------------------------------|
//! | `Structural`     | construção ou finalização (ciclo, nó órfão, duplicata...)  |
//! | `Numeric`        | passagens de score (posterior > 1, logZ infinito...)       |
//! | `CallerContract` | pesos inválidos ou tabelas mal formadas vindas do chamador |
//! | `Config`         | leitura de [`HypergraphOptions`](crate::config::HypergraphOptions) |
//!
//! Nenhum erro é corrigido silenciosamente: o chamador decide se pula o
//! exemplo de treino ou interrompe o processo.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{EdgeId, NodeId};
use crate::InferenceMode;

/// Alias de resultado usado por todo o crate.
pub type Result<T> = std::result::Result<T, HypergraphError>;

/// Agrupamento dos erros para relatórios e políticas de skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Structural,
    Numeric,
    CallerContract,
    Config,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Structural => write!(f, "structural"),
            ErrorCategory::Numeric => write!(f, "numeric"),
            ErrorCategory::CallerContract => write!(f, "caller_contract"),
            ErrorCategory::Config => write!(f, "config"),
        }
    }
}

#[derive(Error, Debug)]
pub enum HypergraphError {
    // Estruturais
    #[error("node {key} already present as {id}")]
    NodeAlreadyPresent { key: String, id: NodeId },

    #[error("node {0} is not registered (add nodes before edges that reference them)")]
    UnknownNode(NodeId),

    #[error("edge {0} is not part of this graph")]
    UnknownEdge(EdgeId),

    #[error("edge from {0} points back to itself")]
    SelfLoop(NodeId),

    #[error("edges cannot start at {0}")]
    InvalidSource(NodeId),

    #[error("cycle detected: {0} reached again while still on the traversal stack")]
    Cycle(NodeId),

    #[error("{count} node(s) unreachable from start (first: {first})")]
    Unreachable { count: usize, first: NodeId },

    #[error("{count} node(s) have no outgoing edges (first: {first})")]
    EmptyNodes { count: usize, first: NodeId },

    #[error("graph is finalized; call reset() before mutating it")]
    GraphFinalized,

    #[error("too many {0} for 32-bit handles")]
    CapacityExceeded(&'static str),

    // Numéricos
    #[error("edge {edge} has invalid posterior probability {probability}")]
    InvalidPosterior { edge: EdgeId, probability: f64 },

    #[error("start score is {score} in {mode:?} mode (no finite-weight path to end)")]
    NonFiniteStartScore { mode: InferenceMode, score: f64 },

    #[error("{0} queried before its computation pass")]
    NotComputed(&'static str),

    /// Com score de START finito todo nó sum visitado tem uma aresta
    /// finita; este erro só aparece com scores corrompidos.
    #[error("unable to choose an edge at {node} from scores {scores:?}")]
    NoViableEdge { node: NodeId, scores: Vec<f64> },

    // Contrato do chamador
    #[error("invalid edge weight: {0}")]
    InvalidWeight(String),

    #[error("malformed lattice: {0}")]
    LatticeShape(String),

    // Configuração
    #[error("failed to read options: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse options: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("invalid option {field}: {reason}")]
    ConfigInvalid { field: &'static str, reason: String },
}

impl HypergraphError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            HypergraphError::NodeAlreadyPresent { .. }
            | HypergraphError::UnknownNode(_)
            | HypergraphError::UnknownEdge(_)
            | HypergraphError::SelfLoop(_)
            | HypergraphError::InvalidSource(_)
            | HypergraphError::Cycle(_)
            | HypergraphError::Unreachable { .. }
            | HypergraphError::EmptyNodes { .. }
            | HypergraphError::GraphFinalized
            | HypergraphError::CapacityExceeded(_) => ErrorCategory::Structural,
            HypergraphError::InvalidPosterior { .. }
            | HypergraphError::NonFiniteStartScore { .. }
            | HypergraphError::NotComputed(_)
            | HypergraphError::NoViableEdge { .. } => ErrorCategory::Numeric,
            HypergraphError::InvalidWeight(_) | HypergraphError::LatticeShape(_) => {
                ErrorCategory::CallerContract
            }
            HypergraphError::ConfigIo(_)
            | HypergraphError::ConfigParse(_)
            | HypergraphError::ConfigInvalid { .. } => ErrorCategory::Config,
        }
    }
}
