//! # Inside-Outside: Scores em Log-Space
//!
//! Generalização do forward-backward (e do Viterbi) para hipergrafos.
//!
//! ## Inside (filhos antes dos pais)
//!
//! ```text
//! inside(END)  = 0
//! inside(sum)  = logsumexp_e [ w(e) + inside(d1) + inside(d2) ]   (marginal)
//!              =       max_e [ w(e) + max(d1)    + max(d2)    ]   (best-path)
//! inside(prod) =       Σ_e   [ w(e) + inside(d1) + inside(d2) ]   (ambos os modos)
//! ```
//!
//! ## Outside (pais antes dos filhos, só no modo marginal)
//!
//! ```text
//! outside(START) = 0, demais = -inf
//! pai sum:  outside(d1) ⊕= outside(pai) + w(e) + inside(d2)
//! pai prod: outside(d1) ⊕= outside(pai) + inside(pai) - inside(d1)
//! ```
//!
//! Nós com inside `-inf` (becos sem peso) não propagam outside.
//! `logZ` é o score de START no modo pedido.

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HypergraphError, Result};
use crate::graph::{EdgeId, Hypergraph, NodeId, NodeKind};
use crate::numeric::log_add_exp;

/// Semântica da inferência.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    /// Sum-product: partição, marginais e amostragem.
    #[default]
    Marginal,
    /// Max-product (Viterbi): a melhor estrutura.
    BestPath,
}

/// Scores do modo marginal, indexados por `NodeId`.
pub(crate) struct Scores {
    pub(crate) inside: Vec<f64>,
    pub(crate) outside: Vec<f64>,
}

impl<'a, W, K> Hypergraph<'a, W, K>
where
    K: Hash + Eq + Clone + Debug,
{
    /// Ordena o grafo (se preciso), roda a passagem do modo e calcula
    /// `log_z`, `e_log_z` e `entropy`.
    ///
    /// Cada modo é calculado no máximo uma vez por revisão do grafo;
    /// chamadas repetidas só reapontam `log_z` para o modo pedido.
    pub fn compute_posteriors(&mut self, mode: InferenceMode) -> Result<()> {
        self.ensure_scores(mode)?;
        let log_z = self.start_score(mode)?;
        let statistics = self.compute_statistics(mode, log_z)?;
        self.cache.log_z = Some(log_z);
        self.cache.statistics = Some(statistics);
        debug!(?mode, log_z, "posteriors computed");
        Ok(())
    }

    /// Log da função de partição (ou o score da melhor estrutura em best-path).
    pub fn log_z(&self) -> Result<f64> {
        self.cache.log_z.ok_or(HypergraphError::NotComputed("log_z"))
    }

    /// Score inside de um nó (modo marginal).
    pub fn inside_score(&self, node: NodeId) -> Result<f64> {
        let scores = self.marginal_scores()?;
        Self::lookup(&scores.inside, node)
    }

    /// Score outside de um nó (modo marginal).
    pub fn outside_score(&self, node: NodeId) -> Result<f64> {
        let scores = self.marginal_scores()?;
        Self::lookup(&scores.outside, node)
    }

    /// Score max-product de um nó (modo best-path).
    pub fn max_score(&self, node: NodeId) -> Result<f64> {
        let max = self
            .cache
            .viterbi
            .as_deref()
            .ok_or(HypergraphError::NotComputed("max scores"))?;
        Self::lookup(max, node)
    }

    pub(crate) fn ensure_scores(&mut self, mode: InferenceMode) -> Result<()> {
        self.finalize()?;
        match mode {
            InferenceMode::Marginal if self.cache.marginal.is_none() => {
                let inside = self.inside_pass(mode)?;
                let outside = self.outside_pass(&inside)?;
                self.cache.marginal = Some(Scores { inside, outside });
            }
            InferenceMode::BestPath if self.cache.viterbi.is_none() => {
                let max = self.inside_pass(mode)?;
                self.cache.viterbi = Some(max);
            }
            _ => {}
        }
        Ok(())
    }

    /// Scores "de baixo para cima" do modo: inside ou max.
    pub(crate) fn bottom_up_scores(&self, mode: InferenceMode) -> Result<&[f64]> {
        match mode {
            InferenceMode::Marginal => Ok(&self.marginal_scores()?.inside),
            InferenceMode::BestPath => self
                .cache
                .viterbi
                .as_deref()
                .ok_or(HypergraphError::NotComputed("max scores")),
        }
    }

    pub(crate) fn marginal_scores(&self) -> Result<&Scores> {
        self.cache
            .marginal
            .as_ref()
            .ok_or(HypergraphError::NotComputed("inside/outside scores"))
    }

    /// `w(e) + s(d1) + s(d2)`.
    pub(crate) fn edge_score(&self, edge: EdgeId, scores: &[f64]) -> f64 {
        let e = &self.edges[edge.index()];
        e.log_weight + scores[e.dest1.index()] + scores[e.dest2.index()]
    }

    fn start_score(&self, mode: InferenceMode) -> Result<f64> {
        Ok(self.bottom_up_scores(mode)?[NodeId::START.index()])
    }

    fn inside_pass(&self, mode: InferenceMode) -> Result<Vec<f64>> {
        let order = self.order()?;
        let mut scores = vec![f64::NAN; self.nodes.len()];

        for &node in order.iter().rev() {
            if node == NodeId::END {
                scores[node.index()] = 0.0;
                continue;
            }
            let n = &self.nodes[node.index()];
            let edge_scores = n.edges.iter().map(|&e| self.edge_score(e, &scores));
            let value = match (n.kind, mode) {
                (NodeKind::Sum, InferenceMode::Marginal) => {
                    edge_scores.fold(f64::NEG_INFINITY, log_add_exp)
                }
                (NodeKind::Sum, InferenceMode::BestPath) => {
                    edge_scores.fold(f64::NEG_INFINITY, f64::max)
                }
                (NodeKind::Prod, _) => edge_scores.sum(),
            };
            scores[node.index()] = value;
        }

        let start = scores[NodeId::START.index()];
        if !start.is_finite() {
            return Err(HypergraphError::NonFiniteStartScore { mode, score: start });
        }
        Ok(scores)
    }

    fn outside_pass(&self, inside: &[f64]) -> Result<Vec<f64>> {
        let order = self.order()?;
        let mut outside = vec![f64::NEG_INFINITY; self.nodes.len()];
        outside[NodeId::START.index()] = 0.0;

        for &node in order {
            let node_inside = inside[node.index()];
            if node_inside == f64::NEG_INFINITY {
                continue;
            }
            let node_outside = outside[node.index()];
            let n = &self.nodes[node.index()];
            for &edge in &n.edges {
                let e = &self.edges[edge.index()];
                let (in1, in2) = (inside[e.dest1.index()], inside[e.dest2.index()]);
                let (to1, to2) = match n.kind {
                    NodeKind::Sum => (
                        node_outside + e.log_weight + in2,
                        node_outside + e.log_weight + in1,
                    ),
                    NodeKind::Prod => (
                        node_outside + node_inside - in1,
                        node_outside + node_inside - in2,
                    ),
                };
                if e.dest1 != NodeId::END {
                    let slot = &mut outside[e.dest1.index()];
                    *slot = log_add_exp(*slot, to1);
                }
                if e.dest2 != NodeId::END {
                    let slot = &mut outside[e.dest2.index()];
                    *slot = log_add_exp(*slot, to2);
                }
            }
        }
        Ok(outside)
    }

    fn lookup(scores: &[f64], node: NodeId) -> Result<f64> {
        scores
            .get(node.index())
            .copied()
            .ok_or(HypergraphError::UnknownNode(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{EdgeInfo, NullDecision};
    use crate::numeric::log_sum_exp;

    type Graph<'a> = Hypergraph<'a, (), &'static str>;

    /// START(sum) → {a(prod) → END, b(prod) → END}, com pesos nas arestas de START.
    fn diamond(w1: f64, w2: f64) -> Graph<'static> {
        let mut g = Graph::new();
        let a = g.add_prod_node("a").unwrap();
        let b = g.add_prod_node("b").unwrap();
        g.add_edge_to(NodeId::START, a, EdgeInfo::weighted(w1, NullDecision))
            .unwrap();
        g.add_edge_to(NodeId::START, b, EdgeInfo::weighted(w2, NullDecision))
            .unwrap();
        g.add_edge(a, EdgeInfo::weighted(0.5, NullDecision)).unwrap();
        g.add_edge(b, EdgeInfo::null()).unwrap();
        g
    }

    #[test]
    fn test_parallel_edges_log_z() {
        let mut g = Graph::new();
        g.add_edge(NodeId::START, EdgeInfo::weighted(0.3, NullDecision))
            .unwrap();
        g.add_edge(NodeId::START, EdgeInfo::weighted(-1.2, NullDecision))
            .unwrap();
        g.compute_posteriors(InferenceMode::Marginal).unwrap();
        let expected = (0.3f64.exp() + (-1.2f64).exp()).ln();
        assert!((g.log_z().unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_best_path_takes_max() {
        let mut g = diamond(1.0, 2.0);
        g.compute_posteriors(InferenceMode::BestPath).unwrap();
        // caminho por a: 1.0 + 0.5; por b: 2.0
        assert!((g.log_z().unwrap() - 2.0).abs() < 1e-12);

        g.compute_posteriors(InferenceMode::Marginal).unwrap();
        assert!((g.log_z().unwrap() - log_sum_exp(&[1.5, 2.0])).abs() < 1e-12);
    }

    #[test]
    fn test_outside_times_inside_is_constant_on_cut() {
        let mut g = diamond(0.2, -0.7);
        g.compute_posteriors(InferenceMode::Marginal).unwrap();
        let z = g.log_z().unwrap();
        let a = g.node(&"a").unwrap();
        let b = g.node(&"b").unwrap();
        let pa = (g.outside_score(a).unwrap() + g.inside_score(a).unwrap() - z).exp();
        let pb = (g.outside_score(b).unwrap() + g.inside_score(b).unwrap() - z).exp();
        assert!((pa + pb - 1.0).abs() < 1e-12);
        assert_eq!(g.outside_score(NodeId::START).unwrap(), 0.0);
    }

    #[test]
    fn test_prod_node_sums_children() {
        let mut g = Graph::new();
        g.prod_start_node().unwrap();
        let left = g.add_sum_node("left").unwrap();
        let right = g.add_sum_node("right").unwrap();
        g.add_edge_to_pair(NodeId::START, left, right, EdgeInfo::null()).unwrap();
        g.add_edge(left, EdgeInfo::weighted(0.0, NullDecision)).unwrap();
        g.add_edge(left, EdgeInfo::weighted(1.0, NullDecision)).unwrap();
        g.add_edge(right, EdgeInfo::weighted(2.0, NullDecision)).unwrap();
        g.compute_posteriors(InferenceMode::Marginal).unwrap();
        let expected = log_sum_exp(&[0.0, 1.0]) + 2.0;
        assert!((g.log_z().unwrap() - expected).abs() < 1e-12);

        // o outside de cada filho "remove" a contribuição dele do produto
        let out_left = g.outside_score(left).unwrap();
        assert!((out_left - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_probability_start_is_error() {
        let mut g = Graph::new();
        g.add_edge(NodeId::START, EdgeInfo::probability(0.0, NullDecision))
            .unwrap();
        let err = g.compute_posteriors(InferenceMode::Marginal).unwrap_err();
        assert!(matches!(err, HypergraphError::NonFiniteStartScore { .. }));
        assert!(matches!(g.log_z(), Err(HypergraphError::NotComputed(_))));
    }

    #[test]
    fn test_queries_before_compute_fail() {
        let g = diamond(0.0, 0.0);
        assert!(g.log_z().is_err());
        assert!(g.inside_score(NodeId::START).is_err());
        assert!(g.max_score(NodeId::START).is_err());
    }

    #[test]
    fn test_dead_end_node_contributes_nothing() {
        let mut g = Graph::new();
        let dead = g.add_sum_node("dead").unwrap();
        let live = g.add_sum_node("live").unwrap();
        g.add_edge_to(NodeId::START, dead, EdgeInfo::null()).unwrap();
        g.add_edge_to(NodeId::START, live, EdgeInfo::null()).unwrap();
        g.add_edge(dead, EdgeInfo::probability(0.0, NullDecision))
            .unwrap();
        g.add_edge(live, EdgeInfo::null()).unwrap();
        g.compute_posteriors(InferenceMode::Marginal).unwrap();
        assert_eq!(g.inside_score(dead).unwrap(), f64::NEG_INFINITY);
        assert!((g.log_z().unwrap() - 0.0).abs() < 1e-12);
    }
}
