//! # Ordenação Topológica
//!
//! As passagens de score precisam visitar os filhos antes dos pais
//! (inside) e os pais antes dos filhos (outside). A ordem é calculada uma
//! única vez por revisão do grafo, a partir de START:
//!
//! ```text
//! pós-ordem DFS a partir de START  →  inverte  →  order[0] = START, ..., END
//! ```
//!
//! A busca usa uma pilha explícita (nó, cursor do próximo filho), então a
//! profundidade depende só da memória e não da pilha de chamadas. Um nó
//! reencontrado enquanto ainda está na pilha denuncia um ciclo.

use std::fmt::Debug;
use std::hash::Hash;

use tracing::{debug, trace};

use crate::error::{HypergraphError, Result};
use crate::graph::{Hypergraph, NodeId};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl<'a, W, K> Hypergraph<'a, W, K>
where
    K: Hash + Eq + Clone + Debug,
{
    /// Ordem topológica (START primeiro), finalizando o grafo se necessário.
    pub fn topological_order(&mut self) -> Result<&[NodeId]> {
        self.finalize()?;
        self.order()
    }

    /// Valida a estrutura e fixa a ordem. Chamadas repetidas não fazem nada.
    pub(crate) fn finalize(&mut self) -> Result<()> {
        if self.cache.order.is_some() {
            return Ok(());
        }
        self.options.validate()?;
        self.check_empty_nodes()?;
        let order = self.compute_order()?;

        debug!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "hypergraph finalized"
        );
        if self.options.debug {
            for (i, &node) in order.iter().enumerate() {
                trace!(
                    position = i,
                    node = %self.describe(node),
                    edges = self.nodes[node.index()].edges.len(),
                    "topological order"
                );
            }
        }
        self.cache.order = Some(order);
        Ok(())
    }

    pub(crate) fn order(&self) -> Result<&[NodeId]> {
        self.cache
            .order
            .as_deref()
            .ok_or(HypergraphError::NotComputed("topological order"))
    }

    fn check_empty_nodes(&self) -> Result<()> {
        if self.options.allow_empty_nodes {
            return Ok(());
        }
        let mut empty = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, n)| *i != NodeId::END.index() && n.edges.is_empty())
            .map(|(i, _)| i);
        if let Some(first) = empty.next() {
            let count = 1 + empty.count();
            return Err(HypergraphError::EmptyNodes {
                count,
                first: NodeId::from_index(first),
            });
        }
        Ok(())
    }

    fn compute_order(&self) -> Result<Vec<NodeId>> {
        let mut mark = vec![Mark::Unvisited; self.nodes.len()];
        let mut post_order = Vec::with_capacity(self.nodes.len());
        // (nó, cursor): o cursor percorre dest1/dest2 de cada aresta, em ordem
        let mut stack: Vec<(NodeId, usize)> = vec![(NodeId::START, 0)];
        mark[NodeId::START.index()] = Mark::OnStack;

        while let Some(frame) = stack.last_mut() {
            let (node, cursor) = *frame;
            let edges = &self.nodes[node.index()].edges;
            if cursor < 2 * edges.len() {
                frame.1 += 1;
                let edge = &self.edges[edges[cursor / 2].index()];
                let child = if cursor % 2 == 0 { edge.dest1 } else { edge.dest2 };
                match mark[child.index()] {
                    Mark::Unvisited => {
                        mark[child.index()] = Mark::OnStack;
                        stack.push((child, 0));
                    }
                    Mark::OnStack => return Err(HypergraphError::Cycle(child)),
                    Mark::Done => {}
                }
            } else {
                mark[node.index()] = Mark::Done;
                post_order.push(node);
                stack.pop();
            }
        }

        if post_order.len() != self.nodes.len() {
            let mut unreached = mark
                .iter()
                .enumerate()
                .filter(|(_, m)| **m == Mark::Unvisited)
                .map(|(i, _)| i);
            if let Some(first) = unreached.next() {
                return Err(HypergraphError::Unreachable {
                    count: 1 + unreached.count(),
                    first: NodeId::from_index(first),
                });
            }
        }

        post_order.reverse();
        Ok(post_order)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::HypergraphOptions;
    use crate::decision::EdgeInfo;
    use crate::error::{ErrorCategory, HypergraphError};
    use crate::graph::{Hypergraph, NodeId};

    type Graph<'a> = Hypergraph<'a, (), u32>;

    fn position(order: &[NodeId], node: NodeId) -> usize {
        order.iter().position(|&n| n == node).unwrap()
    }

    #[test]
    fn test_children_follow_parents() {
        let mut g = Graph::new();
        let a = g.add_prod_node(1).unwrap();
        let b = g.add_sum_node(2).unwrap();
        let c = g.add_sum_node(3).unwrap();
        g.add_edge_to(NodeId::START, a, EdgeInfo::null()).unwrap();
        g.add_edge_to_pair(a, b, c, EdgeInfo::null()).unwrap();
        g.add_edge_to(b, c, EdgeInfo::null()).unwrap();
        g.add_edge(c, EdgeInfo::null()).unwrap();

        let order = g.topological_order().unwrap().to_vec();
        assert_eq!(order.len(), 5);
        assert_eq!(order[0], NodeId::START);
        assert_eq!(*order.last().unwrap(), NodeId::END);
        assert!(position(&order, a) < position(&order, b));
        assert!(position(&order, b) < position(&order, c));
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut g = Graph::new();
        let a = g.add_sum_node(1).unwrap();
        let b = g.add_sum_node(2).unwrap();
        g.add_edge_to(NodeId::START, a, EdgeInfo::null()).unwrap();
        g.add_edge_to(a, b, EdgeInfo::null()).unwrap();
        g.add_edge_to(b, a, EdgeInfo::null()).unwrap();
        assert!(matches!(g.topological_order(), Err(HypergraphError::Cycle(_))));
        assert!(!g.is_finalized());
    }

    #[test]
    fn test_unreachable_node_is_error() {
        let mut g = Graph::new();
        let orphan = g.add_sum_node(9).unwrap();
        g.add_edge(orphan, EdgeInfo::null()).unwrap();
        g.add_edge(NodeId::START, EdgeInfo::null()).unwrap();
        match g.topological_order() {
            Err(HypergraphError::Unreachable { count, first }) => {
                assert_eq!(count, 1);
                assert_eq!(first, orphan);
            }
            other => panic!("expected Unreachable, got {:?}", other.map(|o| o.len())),
        }
    }

    #[test]
    fn test_empty_nodes_rejected_unless_allowed() {
        let mut g = Graph::new();
        let a = g.add_sum_node(1).unwrap();
        g.add_edge_to(NodeId::START, a, EdgeInfo::null()).unwrap();
        g.add_edge(NodeId::START, EdgeInfo::null()).unwrap();
        assert!(matches!(
            g.topological_order(),
            Err(HypergraphError::EmptyNodes { count: 1, .. })
        ));

        let mut relaxed = Graph::with_options(HypergraphOptions::default().allow_empty_nodes(true));
        let a = relaxed.add_sum_node(1).unwrap();
        relaxed.add_edge_to(NodeId::START, a, EdgeInfo::null()).unwrap();
        relaxed.add_edge(NodeId::START, EdgeInfo::null()).unwrap();
        assert_eq!(relaxed.topological_order().unwrap().len(), 3);
    }

    #[test]
    fn test_finalized_graph_rejects_mutation_until_reset() {
        let mut g = Graph::new();
        g.add_edge(NodeId::START, EdgeInfo::null()).unwrap();
        g.topological_order().unwrap();
        assert!(matches!(g.add_sum_node(1), Err(HypergraphError::GraphFinalized)));
        assert!(matches!(
            g.add_edge(NodeId::START, EdgeInfo::null()),
            Err(HypergraphError::GraphFinalized)
        ));

        g.reset();
        let a = g.add_sum_node(1).unwrap();
        g.add_edge(a, EdgeInfo::null()).unwrap();
        g.add_edge_to(NodeId::START, a, EdgeInfo::null()).unwrap();
        assert_eq!(g.topological_order().unwrap().len(), 3);
    }

    #[test]
    fn test_options_built_in_code_are_validated() {
        for tolerance in [f64::NAN, -1e-6] {
            let options = HypergraphOptions {
                posterior_tolerance: tolerance,
                ..Default::default()
            };
            let mut g = Graph::with_options(options);
            g.add_edge(NodeId::START, EdgeInfo::null()).unwrap();
            let err = g.topological_order().unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Config);
            assert!(!g.is_finalized());
        }
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let mut g = Graph::new();
        let n = 200_000u32;
        let ids: Vec<NodeId> = (0..n).map(|i| g.add_sum_node(i).unwrap()).collect();
        g.add_edge_to(NodeId::START, ids[0], EdgeInfo::null()).unwrap();
        for w in ids.windows(2) {
            g.add_edge_to(w[0], w[1], EdgeInfo::null()).unwrap();
        }
        g.add_edge(ids[ids.len() - 1], EdgeInfo::null()).unwrap();
        assert_eq!(g.topological_order().unwrap().len(), n as usize + 2);
    }
}
