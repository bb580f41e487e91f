//! # Posteriores e Estatísticas
//!
//! A partir de inside/outside, a probabilidade marginal de uma aresta é:
//!
//! ```text
//! aresta de nó sum:  p(e) = exp( outside(pai) + w(e) + inside(d1) + inside(d2) - logZ )
//! aresta de nó prod: p(e) = exp( outside(pai) + inside(pai) - logZ )
//! ```
//!
//! (num nó prod todas as arestas são tomadas, então a aresta ocorre
//! exatamente quando o nó ocorre).
//!
//! Se `p(e)` passa de `1 + tolerância`, alguma subestrutura foi contada duas
//! vezes: os filhos de uma aresta (ou de um nó prod) não eram disjuntos.
//! Isso é reportado como erro, nunca "corrigido" com clamp.
//!
//! ## Estatísticas da posterior `q(z|x)`
//!
//! ```text
//! E_q[log w]  = Σ_sum-edges p(e)·w(e) + Σ_prod-edges p(nó)·w(e)
//! H(q)        = -Σ_sum-edges p(e)·ln( p(e) / p(nó) )
//! ```
//!
//! No modo best-path a posterior é um ponto: `E_q[log w] = logZ` e `H = 0`.

use std::fmt::Debug;
use std::hash::Hash;

use serde::Serialize;
use tracing::warn;

use crate::error::{HypergraphError, Result};
use crate::graph::{EdgeId, Hypergraph, NodeId, NodeKind};
use crate::inside_outside::{InferenceMode, Scores};

/// Resultado de `compute_statistics` para um modo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct Statistics {
    pub(crate) mode: InferenceMode,
    pub(crate) e_log_z: f64,
    pub(crate) entropy: f64,
}

impl<'a, W, K> Hypergraph<'a, W, K>
where
    K: Hash + Eq + Clone + Debug,
{
    /// Peso esperado das arestas sob a posterior.
    pub fn e_log_z(&self) -> Result<f64> {
        self.cache
            .statistics
            .map(|s| s.e_log_z)
            .ok_or(HypergraphError::NotComputed("e_log_z"))
    }

    /// Entropia da posterior sobre estruturas.
    pub fn entropy(&self) -> Result<f64> {
        self.cache
            .statistics
            .map(|s| s.entropy)
            .ok_or(HypergraphError::NotComputed("entropy"))
    }

    /// Probabilidade marginal de uma aresta (requer a passagem marginal).
    pub fn edge_posterior(&self, edge: EdgeId) -> Result<f64> {
        if edge.index() >= self.edges.len() {
            return Err(HypergraphError::UnknownEdge(edge));
        }
        let scores = self.marginal_scores()?;
        Ok(self.edge_probability(scores, edge))
    }

    /// Probabilidade de um nó fazer parte da estrutura (requer a passagem marginal).
    pub fn node_posterior(&self, node: NodeId) -> Result<f64> {
        let scores = self.marginal_scores()?;
        if node.index() >= self.nodes.len() {
            return Err(HypergraphError::UnknownNode(node));
        }
        Ok(Self::node_probability(scores, node))
    }

    /// Entrega posteriores às decisões.
    ///
    /// - `Marginal`: toda aresta recebe `set_posterior(p(e))`, em ordem
    ///   topológica. As probabilidades são validadas antes da primeira
    ///   entrega, então um erro não deixa entregas pela metade.
    /// - `BestPath`: só as arestas do melhor caminho recebem `set_posterior(1.0)`.
    ///
    /// Os scores necessários são calculados se ainda não existirem.
    pub fn fetch_posteriors(&mut self, mode: InferenceMode) -> Result<()> {
        self.ensure_scores(mode)?;
        match mode {
            InferenceMode::Marginal => self.fetch_marginal_posteriors(),
            InferenceMode::BestPath => self.stamp_best_hyperpath(),
        }
    }

    fn fetch_marginal_posteriors(&self) -> Result<()> {
        let scores = self.marginal_scores()?;
        let tolerance = self.options.posterior_tolerance;
        let mut deliveries = Vec::with_capacity(self.edges.len());

        for &node in self.order()? {
            for &edge in &self.nodes[node.index()].edges {
                let probability = self.edge_probability(scores, edge);
                if !(probability >= 0.0 && probability <= 1.0 + tolerance) {
                    warn!(%edge, probability, source = %self.describe(node), "invalid posterior");
                    return Err(HypergraphError::InvalidPosterior { edge, probability });
                }
                deliveries.push((edge, probability));
            }
        }

        for (edge, probability) in deliveries {
            self.edges[edge.index()].decision.set_posterior(probability);
        }
        Ok(())
    }

    pub(crate) fn compute_statistics(&self, mode: InferenceMode, log_z: f64) -> Result<Statistics> {
        if mode == InferenceMode::BestPath {
            return Ok(Statistics {
                mode,
                e_log_z: log_z,
                entropy: 0.0,
            });
        }

        let scores = self.marginal_scores()?;
        let mut e_log_z = 0.0;
        let mut entropy = 0.0;
        for &node in self.order()? {
            let node_prob = Self::node_probability(scores, node);
            if node_prob == 0.0 {
                continue;
            }
            let n = &self.nodes[node.index()];
            match n.kind {
                NodeKind::Sum => {
                    for &edge in &n.edges {
                        let edge_prob = self.edge_probability(scores, edge);
                        if edge_prob == 0.0 {
                            continue;
                        }
                        e_log_z += edge_prob * self.edges[edge.index()].log_weight;
                        entropy -= edge_prob * (edge_prob / node_prob).ln();
                    }
                }
                // sem incerteza num nó prod: nenhuma contribuição para a entropia
                NodeKind::Prod => {
                    for &edge in &n.edges {
                        e_log_z += node_prob * self.edges[edge.index()].log_weight;
                    }
                }
            }
        }

        Ok(Statistics {
            mode,
            e_log_z,
            entropy,
        })
    }

    fn edge_probability(&self, scores: &Scores, edge: EdgeId) -> f64 {
        let e = &self.edges[edge.index()];
        let source = e.source.index();
        let z = scores.inside[NodeId::START.index()];
        let log_prob = match self.nodes[source].kind {
            NodeKind::Sum => scores.outside[source] + self.edge_score(edge, &scores.inside),
            NodeKind::Prod => scores.outside[source] + scores.inside[source],
        };
        (log_prob - z).exp()
    }

    fn node_probability(scores: &Scores, node: NodeId) -> f64 {
        let z = scores.inside[NodeId::START.index()];
        (scores.outside[node.index()] + scores.inside[node.index()] - z).exp()
    }
}
