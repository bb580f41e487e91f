//! # Pontuação em Lote
//!
//! Um hipergrafo não é compartilhado entre threads. Para pontuar muitos
//! exemplos em paralelo, cada tarefa do Rayon constrói, pontua e descarta
//! a sua própria instância:
//!
//! ```text
//! items ──par_iter──► build(item) ──► compute_posteriors(mode) ──► InferenceSummary
//! ```
//!
//! Falhas não interrompem o lote: cada item devolve seu próprio `Result`,
//! e quem chama decide se pula o exemplo ou aborta.

use std::fmt::Debug;
use std::hash::Hash;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ErrorCategory, Result};
use crate::graph::Hypergraph;
use crate::inside_outside::InferenceMode;

/// Resultado da inferência de um exemplo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSummary {
    pub mode: InferenceMode,
    pub log_z: f64,
    pub e_log_z: f64,
    pub entropy: f64,
    pub num_nodes: usize,
    pub num_edges: usize,
}

impl InferenceSummary {
    /// Roda `compute_posteriors(mode)` e coleta as estatísticas do grafo.
    pub fn compute<W, K>(graph: &mut Hypergraph<'_, W, K>, mode: InferenceMode) -> Result<Self>
    where
        K: Hash + Eq + Clone + Debug,
    {
        graph.compute_posteriors(mode)?;
        Ok(Self {
            mode,
            log_z: graph.log_z()?,
            e_log_z: graph.e_log_z()?,
            entropy: graph.entropy()?,
            num_nodes: graph.num_nodes(),
            num_edges: graph.num_edges(),
        })
    }
}

/// Pontua cada item numa instância própria, em paralelo. A ordem da saída
/// é a ordem de `items`.
pub fn summarize_batch<T, W, K, F>(
    items: &[T],
    mode: InferenceMode,
    build: F,
) -> Vec<Result<InferenceSummary>>
where
    T: Sync,
    K: Hash + Eq + Clone + Debug,
    F: Fn(&T) -> Result<Hypergraph<'_, W, K>> + Sync,
{
    let results: Vec<Result<InferenceSummary>> = items
        .par_iter()
        .map(|item| {
            let mut graph = build(item)?;
            InferenceSummary::compute(&mut graph, mode)
        })
        .collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    debug!(items = items.len(), failed, ?mode, "batch scored");
    results
}

/// Agregado de um lote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub items: usize,
    pub succeeded: usize,
    /// Falhas por categoria, na ordem `[structural, numeric, caller_contract, config]`.
    pub failed_by_category: [usize; 4],
    /// Soma de `log_z` dos itens que deram certo (log-verossimilhança do lote).
    pub total_log_z: f64,
    pub mean_entropy: f64,
}

impl BatchReport {
    pub fn from_results(results: &[Result<InferenceSummary>]) -> Self {
        let mut report = BatchReport {
            items: results.len(),
            ..Default::default()
        };
        let mut entropy = 0.0;
        for (i, result) in results.iter().enumerate() {
            match result {
                Ok(summary) => {
                    report.succeeded += 1;
                    report.total_log_z += summary.log_z;
                    entropy += summary.entropy;
                }
                Err(err) => {
                    warn!(item = i, category = %err.category(), error = %err, "item failed");
                    let slot = match err.category() {
                        ErrorCategory::Structural => 0,
                        ErrorCategory::Numeric => 1,
                        ErrorCategory::CallerContract => 2,
                        ErrorCategory::Config => 3,
                    };
                    report.failed_by_category[slot] += 1;
                }
            }
        }
        if report.succeeded > 0 {
            report.mean_entropy = entropy / report.succeeded as f64;
        }
        report
    }

    pub fn failed(&self) -> usize {
        self.failed_by_category.iter().sum()
    }
}
