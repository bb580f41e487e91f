//! # Escolha de Hipercaminhos
//!
//! Desce de START escolhendo uma aresta por nó sum e tomando todas as
//! arestas dos nós prod:
//!
//! | Operação                 | Scores usados     | Escolha no nó sum            |
//! |--------------------------|-------------------|------------------------------|
//! | `fetch_best_hyperpath`   | max (Viterbi)     | primeiro máximo              |
//! | `fetch_sample_hyperpath` | inside (marginal) | sorteio ∝ `exp(score)`       |
//! | `fetch_posteriors(BestPath)` | max           | primeiro máximo, sem widget  |
//!
//! As arestas tomadas saem em pré-ordem: a aresta antes dos filhos `d1` e
//! `d2`, nessa ordem. O widget passa por `choose` de cada uma nessa mesma
//! sequência, e o log-peso do caminho é a soma dos pesos delas.
//!
//! A descida usa uma pilha explícita de tarefas, então grafos profundos
//! (cadeias longas) não estouram a pilha de chamadas.

use std::fmt::Debug;
use std::hash::Hash;

use rand::Rng;
use serde::Serialize;

use crate::error::{HypergraphError, Result};
use crate::graph::{EdgeId, Hypergraph, NodeId, NodeKind};
use crate::inside_outside::InferenceMode;
use crate::numeric::{exp_normalize, first_max_index, sample_multinomial};

/// Widget final e soma dos log-pesos das arestas tomadas.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HyperpathResult<W> {
    pub widget: W,
    pub log_weight: f64,
}

enum Task {
    Visit(NodeId),
    Take(EdgeId),
}

impl<'a, W, K> Hypergraph<'a, W, K>
where
    K: Hash + Eq + Clone + Debug,
{
    /// Melhor estrutura: `log_weight` é igual a `log_z` no modo best-path.
    pub fn fetch_best_hyperpath(&mut self, widget: W) -> Result<HyperpathResult<W>> {
        self.ensure_scores(InferenceMode::BestPath)?;
        let scores = self.bottom_up_scores(InferenceMode::BestPath)?;
        let path = self.traverse(scores, first_max_index)?;
        Ok(self.thread_widget(&path, widget))
    }

    /// Estrutura sorteada com probabilidade proporcional ao seu peso.
    ///
    /// Toda a aleatoriedade vem de `rng`: a mesma semente reproduz o mesmo caminho.
    pub fn fetch_sample_hyperpath<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        widget: W,
    ) -> Result<HyperpathResult<W>> {
        self.ensure_scores(InferenceMode::Marginal)?;
        let scores = self.bottom_up_scores(InferenceMode::Marginal)?;
        let pick = |edge_scores: &[f64]| {
            let mut probs = edge_scores.to_vec();
            if !exp_normalize(&mut probs) {
                return None;
            }
            sample_multinomial(rng, &probs)
        };
        let path = self.traverse(scores, pick)?;
        Ok(self.thread_widget(&path, widget))
    }

    /// Entrega `set_posterior(1.0)` às arestas do melhor caminho.
    pub(crate) fn stamp_best_hyperpath(&self) -> Result<()> {
        let scores = self.bottom_up_scores(InferenceMode::BestPath)?;
        for edge in self.traverse(scores, first_max_index)? {
            self.edges[edge.index()].decision.set_posterior(1.0);
        }
        Ok(())
    }

    fn thread_widget(&self, path: &[EdgeId], widget: W) -> HyperpathResult<W> {
        let mut log_weight = 0.0;
        let widget = path.iter().fold(widget, |w, &edge| {
            let e = &self.edges[edge.index()];
            log_weight += e.log_weight;
            e.decision.choose(w)
        });
        HyperpathResult { widget, log_weight }
    }

    /// Arestas tomadas, na ordem em que uma descida recursiva as tomaria.
    ///
    /// Com score de START finito, `pick` sempre acha uma aresta finita; o
    /// `NoViableEdge` cobre scores corrompidos (NaN).
    fn traverse<F>(&self, scores: &[f64], mut pick: F) -> Result<Vec<EdgeId>>
    where
        F: FnMut(&[f64]) -> Option<usize>,
    {
        let mut path = Vec::new();
        let mut edge_scores = Vec::new();
        let mut tasks = vec![Task::Visit(NodeId::START)];

        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(node) if node == NodeId::END => {}
                Task::Visit(node) => {
                    let n = &self.nodes[node.index()];
                    match n.kind {
                        NodeKind::Sum => {
                            edge_scores.clear();
                            edge_scores.extend(n.edges.iter().map(|&e| self.edge_score(e, scores)));
                            let chosen = pick(edge_scores.as_slice()).ok_or_else(|| {
                                HypergraphError::NoViableEdge {
                                    node,
                                    scores: edge_scores.clone(),
                                }
                            })?;
                            self.schedule(&mut tasks, n.edges[chosen]);
                        }
                        NodeKind::Prod => {
                            for &edge in n.edges.iter().rev() {
                                self.schedule(&mut tasks, edge);
                            }
                        }
                    }
                }
                Task::Take(edge) => path.push(edge),
            }
        }
        Ok(path)
    }

    // A pilha é LIFO: empilha na ordem inversa da execução.
    fn schedule(&self, tasks: &mut Vec<Task>, edge: EdgeId) {
        let e = &self.edges[edge.index()];
        tasks.push(Task::Visit(e.dest2));
        tasks.push(Task::Visit(e.dest1));
        tasks.push(Task::Take(edge));
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::config::HypergraphOptions;
    use crate::decision::{ChooseWith, EdgeInfo, NullDecision, PosteriorTally};
    use crate::error::HypergraphError;
    use crate::graph::{Hypergraph, NodeId};
    use crate::inside_outside::InferenceMode;
    use crate::numeric::first_max_index;

    type Trace = Vec<&'static str>;

    fn push(label: &'static str) -> ChooseWith<impl Fn(Trace) -> Trace> {
        ChooseWith(move |mut w: Trace| {
            w.push(label);
            w
        })
    }

    #[test]
    fn test_best_path_matches_log_z() {
        let mut g: Hypergraph<'_, Trace, &str> = Hypergraph::new();
        let a = g.add_sum_node("a").unwrap();
        g.add_edge_to(NodeId::START, a, EdgeInfo::weighted(0.5, push("s->a"))).unwrap();
        g.add_edge(NodeId::START, EdgeInfo::weighted(0.2, push("s->end"))).unwrap();
        g.add_edge(a, EdgeInfo::weighted(-1.0, push("a1"))).unwrap();
        g.add_edge(a, EdgeInfo::weighted(0.1, push("a2"))).unwrap();

        let result = g.fetch_best_hyperpath(Vec::new()).unwrap();
        assert_eq!(result.widget, vec!["s->a", "a2"]);
        assert!((result.log_weight - 0.6).abs() < 1e-12);

        g.compute_posteriors(InferenceMode::BestPath).unwrap();
        assert!((g.log_z().unwrap() - result.log_weight).abs() < 1e-12);
    }

    #[test]
    fn test_ties_go_to_first_edge() {
        let mut g: Hypergraph<'_, Trace, &str> = Hypergraph::new();
        g.add_edge(NodeId::START, EdgeInfo::weighted(1.0, push("first"))).unwrap();
        g.add_edge(NodeId::START, EdgeInfo::weighted(1.0, push("second"))).unwrap();
        for _ in 0..3 {
            let result = g.fetch_best_hyperpath(Vec::new()).unwrap();
            assert_eq!(result.widget, vec!["first"]);
        }
    }

    #[test]
    fn test_prod_children_visited_in_preorder() {
        let mut g: Hypergraph<'_, Trace, &str> = Hypergraph::new();
        g.prod_start_node().unwrap();
        let left = g.add_sum_node("left").unwrap();
        let right = g.add_sum_node("right").unwrap();
        g.add_edge_to_pair(NodeId::START, left, right, EdgeInfo::weighted(0.0, push("root")))
            .unwrap();
        g.add_edge(NodeId::START, EdgeInfo::weighted(0.0, push("root2"))).unwrap();
        g.add_edge(left, EdgeInfo::weighted(0.0, push("left"))).unwrap();
        g.add_edge(right, EdgeInfo::weighted(0.0, push("right"))).unwrap();

        let result = g.fetch_best_hyperpath(Vec::new()).unwrap();
        assert_eq!(result.widget, vec!["root", "left", "right", "root2"]);
    }

    #[test]
    fn test_sample_is_reproducible_with_seed() {
        let build = || {
            let mut g: Hypergraph<'_, Trace, &str> = Hypergraph::new();
            g.add_edge(NodeId::START, EdgeInfo::weighted(0.0, push("x"))).unwrap();
            g.add_edge(NodeId::START, EdgeInfo::weighted(0.3, push("y"))).unwrap();
            g.add_edge(NodeId::START, EdgeInfo::weighted(-0.4, push("z"))).unwrap();
            g
        };
        let mut first = build();
        let mut second = build();
        let mut rng1 = StdRng::seed_from_u64(7);
        let mut rng2 = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let a = first.fetch_sample_hyperpath(&mut rng1, Vec::new()).unwrap();
            let b = second.fetch_sample_hyperpath(&mut rng2, Vec::new()).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_zero_weight_edge_is_never_sampled() {
        let mut g: Hypergraph<'_, Trace, &str> = Hypergraph::new();
        g.add_edge(NodeId::START, EdgeInfo::probability(0.0, push("never"))).unwrap();
        g.add_edge(NodeId::START, EdgeInfo::probability(1.0, push("always"))).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let result = g.fetch_sample_hyperpath(&mut rng, Vec::new()).unwrap();
            assert_eq!(result.widget, vec!["always"]);
        }
    }

    #[test]
    fn test_empty_sum_node_leaves_start_without_mass() {
        let mut g: Hypergraph<'_, (), &str> =
            Hypergraph::with_options(HypergraphOptions::default().allow_empty_nodes(true));
        let p = g.add_prod_node("p").unwrap();
        let empty = g.add_sum_node("empty").unwrap();
        g.add_edge_to(NodeId::START, p, EdgeInfo::null()).unwrap();
        g.add_edge_to(p, empty, EdgeInfo::null()).unwrap();
        // inside(empty) = -inf deixa START sem massa
        assert!(matches!(
            g.fetch_best_hyperpath(()),
            Err(HypergraphError::NonFiniteStartScore { .. })
        ));
    }

    #[test]
    fn test_corrupted_scores_report_no_viable_edge() {
        let mut g: Hypergraph<'_, (), &str> = Hypergraph::new();
        let a = g.add_sum_node("a").unwrap();
        let b = g.add_prod_node("b").unwrap();
        g.add_edge_to_pair(NodeId::START, a, b, EdgeInfo::null()).unwrap();
        g.add_edge(a, EdgeInfo::weighted(0.0, NullDecision)).unwrap();
        g.add_edge(a, EdgeInfo::weighted(1.0, NullDecision)).unwrap();
        g.add_edge(b, EdgeInfo::null()).unwrap();
        g.topological_order().unwrap();

        // a aresta de START não toca END, então só as de `a` viram NaN
        let mut scores = vec![0.0; g.num_nodes()];
        scores[NodeId::END.index()] = f64::NAN;
        match g.traverse(&scores, first_max_index) {
            Err(HypergraphError::NoViableEdge { node, scores }) => {
                assert_eq!(node, a);
                assert_eq!(scores.len(), 2);
                assert!(scores.iter().all(|s| s.is_nan()));
            }
            other => panic!("expected NoViableEdge, got {other:?}"),
        }
    }

    #[test]
    fn test_stamp_reaches_every_prod_edge() {
        let a = PosteriorTally::new();
        let b = PosteriorTally::new();
        let mut g: Hypergraph<'_, (), &str> = Hypergraph::new();
        g.prod_start_node().unwrap();
        g.add_edge(NodeId::START, EdgeInfo::weighted(-3.0, &a)).unwrap();
        g.add_edge(NodeId::START, EdgeInfo::weighted(2.0, &b)).unwrap();
        g.fetch_posteriors(InferenceMode::BestPath).unwrap();
        assert_eq!((a.hits(), b.hits()), (1, 1));

        let result = g.fetch_best_hyperpath(()).unwrap();
        assert!((result.log_weight + 1.0).abs() < 1e-12);
    }
}
