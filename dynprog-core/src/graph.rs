//! # Construção do Hipergrafo
//!
//! Um hipergrafo codifica de forma compacta um espaço exponencial de
//! estruturas discretas (sequências de tags, árvores). Ele tem dois tipos
//! de nó:
//!
//! - **Sum** (escolhe-um): exatamente uma aresta de saída faz parte da estrutura;
//! - **Prod** (escolhe-todas): todas as arestas de saída fazem parte.
//!
//! Cada hiperaresta aponta para até dois filhos ordenados (o que falta vira
//! END) e carrega uma [`Decision`] com um log-peso fixo.
//!
//! ```text
//!            START (sum)
//!           /           \
//!       w=0.2          w=-1.0
//!         |               |
//!      A (prod)        B (prod)
//!      /     \            |
//!    END     END         END
//! ```
//!
//! ## Identidade dos nós
//!
//! O chamador registra nós por uma chave própria `K` (ex: `(posição, tag)`);
//! o builder devolve um [`NodeId`] opaco (índice em arena). START, END e
//! INVALID são handles reservados.
//!
//! ## Ciclo de vida
//!
//! 1. Construção: `add_*_node`, `add_edge*`.
//! 2. Finalização implícita na primeira inferência (ordenação topológica).
//! 3. Consultas: `log_z`, posteriores, melhor caminho, amostras.
//!
//! Depois de finalizado, qualquer mutação falha com
//! [`HypergraphError::GraphFinalized`] até que [`Hypergraph::reset`] seja
//! chamado.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HypergraphOptions;
use crate::decision::{Decision, EdgeInfo};
use crate::error::{HypergraphError, Result};
use crate::inside_outside::Scores;
use crate::posterior::Statistics;

/// Handle opaco de um nó, emitido pelo builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Raiz de todas as estruturas.
    pub const START: NodeId = NodeId(0);
    /// Sumidouro terminal; score interno 0 (log 1).
    pub const END: NodeId = NodeId(1);
    /// Sentinela: arestas para este nó são descartadas sem erro.
    pub const INVALID: NodeId = NodeId(u32::MAX);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Para índices já emitidos pelo builder.
    pub(crate) fn from_index(index: usize) -> Self {
        NodeId(index as u32)
    }

    /// Handle para um nó novo; `u32::MAX` é reservado para INVALID.
    pub(crate) fn try_from_index(index: usize) -> Result<Self> {
        match u32::try_from(index) {
            Ok(raw) if raw != u32::MAX => Ok(NodeId(raw)),
            _ => Err(HypergraphError::CapacityExceeded("nodes")),
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            NodeId::START => write!(f, "START"),
            NodeId::END => write!(f, "END"),
            NodeId::INVALID => write!(f, "INVALID"),
            NodeId(i) => write!(f, "#{i}"),
        }
    }
}

/// Handle de uma hiperaresta, na ordem de inserção.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(u32);

impl EdgeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn try_from_index(index: usize) -> Result<Self> {
        u32::try_from(index)
            .map(EdgeId)
            .map_err(|_| HypergraphError::CapacityExceeded("edges"))
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Tipo de um nó.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Escolhe exatamente uma aresta (disjunção).
    Sum,
    /// Toma todas as arestas (conjunção).
    Prod,
}

pub(crate) struct Node<K> {
    pub(crate) key: Option<K>,
    pub(crate) kind: NodeKind,
    pub(crate) edges: Vec<EdgeId>,
}

pub(crate) struct Hyperedge<'a, W> {
    pub(crate) source: NodeId,
    pub(crate) dest1: NodeId,
    pub(crate) dest2: NodeId,
    pub(crate) log_weight: f64,
    pub(crate) decision: Box<dyn Decision<W> + 'a>,
}

/// Estado derivado de uma revisão finalizada do grafo.
#[derive(Default)]
pub(crate) struct Cache {
    pub(crate) order: Option<Vec<NodeId>>,
    pub(crate) marginal: Option<Scores>,
    pub(crate) viterbi: Option<Vec<f64>>,
    pub(crate) log_z: Option<f64>,
    pub(crate) statistics: Option<Statistics>,
}

/// Hipergrafo com widget `W` e chaves de nó `K`.
///
/// `'a` é o tempo de vida das decisões emprestadas do chamador.
pub struct Hypergraph<'a, W, K = String> {
    pub(crate) options: HypergraphOptions,
    pub(crate) nodes: Vec<Node<K>>,
    pub(crate) edges: Vec<Hyperedge<'a, W>>,
    keys: HashMap<K, NodeId>,
    pub(crate) cache: Cache,
}

impl<'a, W, K> Hypergraph<'a, W, K>
where
    K: Hash + Eq + Clone + Debug,
{
    pub fn new() -> Self {
        Self::with_options(HypergraphOptions::default())
    }

    pub fn with_options(options: HypergraphOptions) -> Self {
        let start = Node {
            key: None,
            kind: NodeKind::Sum,
            edges: Vec::new(),
        };
        let end = Node {
            key: None,
            kind: NodeKind::Sum,
            edges: Vec::new(),
        };
        Self {
            options,
            nodes: vec![start, end],
            edges: Vec::new(),
            keys: HashMap::new(),
            cache: Cache::default(),
        }
    }

    pub fn options(&self) -> &HypergraphOptions {
        &self.options
    }

    /// Registra um nó Sum. Falha com `NodeAlreadyPresent` se a chave já existe.
    pub fn add_sum_node(&mut self, key: K) -> Result<NodeId> {
        self.add_node(key, NodeKind::Sum)
    }

    /// Registra um nó Prod. Falha com `NodeAlreadyPresent` se a chave já existe.
    pub fn add_prod_node(&mut self, key: K) -> Result<NodeId> {
        self.add_node(key, NodeKind::Prod)
    }

    fn add_node(&mut self, key: K, kind: NodeKind) -> Result<NodeId> {
        self.ensure_mutable()?;
        if let Some(&id) = self.keys.get(&key) {
            return Err(HypergraphError::NodeAlreadyPresent {
                key: format!("{key:?}"),
                id,
            });
        }
        let id = NodeId::try_from_index(self.nodes.len())?;
        self.keys.insert(key.clone(), id);
        self.nodes.push(Node {
            key: Some(key),
            kind,
            edges: Vec::new(),
        });
        Ok(id)
    }

    /// Torna START um nó Sum (o padrão) e devolve seu handle.
    pub fn sum_start_node(&mut self) -> Result<NodeId> {
        self.ensure_mutable()?;
        self.nodes[NodeId::START.index()].kind = NodeKind::Sum;
        Ok(NodeId::START)
    }

    /// Torna START um nó Prod e devolve seu handle.
    pub fn prod_start_node(&mut self) -> Result<NodeId> {
        self.ensure_mutable()?;
        self.nodes[NodeId::START.index()].kind = NodeKind::Prod;
        Ok(NodeId::START)
    }

    /// Aresta folha: os dois filhos são END.
    pub fn add_edge(&mut self, source: NodeId, info: EdgeInfo<'a, W>) -> Result<Option<EdgeId>> {
        self.add_edge_to_pair(source, NodeId::END, NodeId::END, info)
    }

    /// Aresta com um filho; o segundo é END.
    pub fn add_edge_to(
        &mut self,
        source: NodeId,
        dest: NodeId,
        info: EdgeInfo<'a, W>,
    ) -> Result<Option<EdgeId>> {
        self.add_edge_to_pair(source, dest, NodeId::END, info)
    }

    /// Aresta com dois filhos ordenados.
    ///
    /// Retorna `Ok(None)` sem adicionar nada quando algum destino é
    /// [`NodeId::INVALID`]; isso permite montar transições condicionalmente
    /// válidas sem testes no chamador.
    pub fn add_edge_to_pair(
        &mut self,
        source: NodeId,
        dest1: NodeId,
        dest2: NodeId,
        info: EdgeInfo<'a, W>,
    ) -> Result<Option<EdgeId>> {
        self.ensure_mutable()?;
        if source == NodeId::INVALID || source == NodeId::END {
            return Err(HypergraphError::InvalidSource(source));
        }
        if dest1 == NodeId::INVALID || dest2 == NodeId::INVALID {
            return Ok(None);
        }
        for node in [source, dest1, dest2] {
            self.check_registered(node)?;
        }
        if source == dest1 || source == dest2 {
            return Err(HypergraphError::SelfLoop(source));
        }
        let log_weight = info.weight.log_weight()?;

        let id = EdgeId::try_from_index(self.edges.len())?;
        self.edges.push(Hyperedge {
            source,
            dest1,
            dest2,
            log_weight,
            decision: info.decision,
        });
        self.nodes[source.index()].edges.push(id);
        Ok(Some(id))
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Número de arestas de saída de um nó.
    pub fn num_edges_of(&self, node: NodeId) -> Result<usize> {
        self.check_registered(node)?;
        Ok(self.nodes[node.index()].edges.len())
    }

    /// Arestas de saída de um nó, na ordem de inserção.
    pub fn edges_of(&self, node: NodeId) -> Result<&[EdgeId]> {
        self.check_registered(node)?;
        Ok(&self.nodes[node.index()].edges)
    }

    /// Falha com `EmptyNodes` se o nó não tem arestas de saída.
    pub fn assert_non_empty(&self, node: NodeId) -> Result<()> {
        if self.num_edges_of(node)? == 0 {
            return Err(HypergraphError::EmptyNodes {
                count: 1,
                first: node,
            });
        }
        Ok(())
    }

    /// Handle associado a uma chave do chamador.
    pub fn node(&self, key: &K) -> Option<NodeId> {
        self.keys.get(key).copied()
    }

    pub fn key_of(&self, node: NodeId) -> Option<&K> {
        self.nodes.get(node.index()).and_then(|n| n.key.as_ref())
    }

    pub fn kind(&self, node: NodeId) -> Result<NodeKind> {
        self.check_registered(node)?;
        Ok(self.nodes[node.index()].kind)
    }

    /// Filhos e log-peso de uma aresta.
    pub fn edge(&self, edge: EdgeId) -> Result<(NodeId, NodeId, f64)> {
        let e = self
            .edges
            .get(edge.index())
            .ok_or(HypergraphError::UnknownEdge(edge))?;
        Ok((e.dest1, e.dest2, e.log_weight))
    }

    /// Rótulo legível para logs: `START`, `END` ou a chave do chamador.
    pub fn describe(&self, node: NodeId) -> String {
        match self.key_of(node) {
            Some(key) => format!("{node} {key:?}"),
            None => node.to_string(),
        }
    }

    /// `true` depois que a primeira inferência ordenou o grafo.
    pub fn is_finalized(&self) -> bool {
        self.cache.order.is_some()
    }

    /// Descarta a ordenação e todos os scores, reabrindo o grafo para mutação.
    ///
    /// É a única forma de invalidar resultados: nada é recalculado implicitamente.
    pub fn reset(&mut self) {
        if self.is_finalized() {
            debug!(nodes = self.nodes.len(), edges = self.edges.len(), "hypergraph reset");
        }
        self.cache = Cache::default();
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_finalized() {
            return Err(HypergraphError::GraphFinalized);
        }
        Ok(())
    }

    fn check_registered(&self, node: NodeId) -> Result<()> {
        if node.index() >= self.nodes.len() {
            return Err(HypergraphError::UnknownNode(node));
        }
        Ok(())
    }
}

impl<'a, W, K> Default for Hypergraph<'a, W, K>
where
    K: Hash + Eq + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
