//! # Lattice de Tags: HMM/CRF de Primeira Ordem como Hipergrafo
//!
//! O consumidor mais comum do motor: um tagger de sequência com `n`
//! posições e `T` tags. Cada par `(posição, tag)` vira um nó Sum; as
//! arestas carregam emissão + transição:
//!
//! ```text
//! START ──start[t]+e[0][t]──► (0,t) ──trans[t][u]+e[1][u]──► (1,u) ··· (n-1,v) ──end[v]──► END
//! ```
//!
//! Com esse formato:
//!
//! - `log_z` é o forward do CRF (ou `log p(x)` do HMM);
//! - o melhor hipercaminho é o Viterbi;
//! - a posterior de `(i, t)` é a soma das posteriores das arestas que
//!   entram no nó, acumulada num [`PosteriorTally`] por célula.
//!
//! ## Transições esparsas
//!
//! Com `sparse_transitions`, transições `-inf` (ex: `O → I-PER` no BIO)
//! não viram arestas: o destino é trocado por [`NodeId::INVALID`] e o
//! builder descarta a aresta. Nós que ficam sem entrada ou sem saída
//! também não são criados.

use tracing::debug;

use crate::config::HypergraphOptions;
use crate::decision::{Decision, EdgeInfo, NullDecision, PosteriorTally};
use crate::error::{HypergraphError, Result};
use crate::graph::{Hypergraph, NodeId};

/// Hipergrafo produzido por [`TagLattice::build`]: widget é a sequência de
/// tags escolhida, chave é `(posição, tag)`.
pub type LatticeGraph<'t> = Hypergraph<'t, Vec<usize>, (usize, usize)>;

/// Decisão "posição i recebe a tag t".
struct TagDecision<'t> {
    tag: usize,
    tally: &'t PosteriorTally,
}

impl Decision<Vec<usize>> for TagDecision<'_> {
    fn choose(&self, mut widget: Vec<usize>) -> Vec<usize> {
        widget.push(self.tag);
        widget
    }

    fn set_posterior(&self, probability: f64) {
        <PosteriorTally as Decision<Vec<usize>>>::set_posterior(self.tally, probability);
    }
}

/// Tabelas de log-scores de um tagger de primeira ordem.
pub struct TagLattice {
    emissions: Vec<Vec<f64>>,
    transitions: Vec<Vec<f64>>,
    start: Option<Vec<f64>>,
    end: Option<Vec<f64>>,
    sparse_transitions: bool,
    marginals: Vec<Vec<PosteriorTally>>,
}

impl TagLattice {
    /// `emissions[i][t]`: score da tag `t` na posição `i`;
    /// `transitions[a][b]`: score de `a → b`.
    pub fn new(emissions: Vec<Vec<f64>>, transitions: Vec<Vec<f64>>) -> Self {
        let marginals = emissions
            .iter()
            .map(|row| row.iter().map(|_| PosteriorTally::new()).collect())
            .collect();
        Self {
            emissions,
            transitions,
            start: None,
            end: None,
            sparse_transitions: false,
            marginals,
        }
    }

    pub fn with_start(mut self, start: Vec<f64>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: Vec<f64>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn sparse_transitions(mut self, sparse: bool) -> Self {
        self.sparse_transitions = sparse;
        self
    }

    /// Número de posições.
    pub fn len(&self) -> usize {
        self.emissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emissions.is_empty()
    }

    pub fn num_tags(&self) -> usize {
        self.transitions.len()
    }

    /// Confere que todas as tabelas têm `T` colunas.
    pub fn validate(&self) -> Result<()> {
        let t = self.num_tags();
        if t == 0 && !self.is_empty() {
            return Err(HypergraphError::LatticeShape(
                "transition table is empty but the sequence is not".into(),
            ));
        }
        if let Some((a, row)) = self.transitions.iter().enumerate().find(|(_, r)| r.len() != t) {
            return Err(HypergraphError::LatticeShape(format!(
                "transitions[{a}] has {} columns, expected {t}",
                row.len()
            )));
        }
        if let Some((i, row)) = self.emissions.iter().enumerate().find(|(_, r)| r.len() != t) {
            return Err(HypergraphError::LatticeShape(format!(
                "emissions[{i}] has {} columns, expected {t}",
                row.len()
            )));
        }
        for (name, table) in [("start", &self.start), ("end", &self.end)] {
            if let Some(row) = table {
                if row.len() != t {
                    return Err(HypergraphError::LatticeShape(format!(
                        "{name} has {} entries, expected {t}",
                        row.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Log-peso de uma sequência de tags completa.
    pub fn score(&self, tags: &[usize]) -> Result<f64> {
        self.validate()?;
        if tags.len() != self.len() {
            return Err(HypergraphError::LatticeShape(format!(
                "{} tags for {} positions",
                tags.len(),
                self.len()
            )));
        }
        if let Some(&bad) = tags.iter().find(|&&tag| tag >= self.num_tags()) {
            return Err(HypergraphError::LatticeShape(format!("tag {bad} out of range")));
        }
        let mut total = 0.0;
        for (i, &tag) in tags.iter().enumerate() {
            total += self.emissions[i][tag];
            total += if i == 0 {
                self.start_score(tag)
            } else {
                self.transitions[tags[i - 1]][tag]
            };
        }
        if let Some(&last) = tags.last() {
            total += self.end_score(last);
        }
        Ok(total)
    }

    /// Monta o hipergrafo. As decisões emprestam os acumuladores de
    /// marginais deste lattice, então o grafo não pode sobreviver a ele.
    pub fn build(&self, options: HypergraphOptions) -> Result<LatticeGraph<'_>> {
        self.validate()?;
        let mut graph = LatticeGraph::with_options(options);
        let n = self.len();
        if n == 0 {
            graph.add_edge(NodeId::START, EdgeInfo::null())?;
            return Ok(graph);
        }

        let keep = self.surviving_nodes();
        let t = self.num_tags();
        let mut ids = vec![vec![NodeId::INVALID; t]; n];
        for (i, row) in keep.iter().enumerate() {
            for (tag, &alive) in row.iter().enumerate() {
                if alive {
                    ids[i][tag] = graph.add_sum_node((i, tag))?;
                }
            }
        }

        for tag in 0..t {
            if !keep[0][tag] {
                continue;
            }
            let weight = self.start_score(tag) + self.emissions[0][tag];
            graph.add_edge_to(NodeId::START, ids[0][tag], self.tag_edge(0, tag, weight))?;
        }
        for i in 1..n {
            for prev in (0..t).filter(|&prev| keep[i - 1][prev]) {
                for tag in 0..t {
                    let dest = if self.allowed(prev, tag) {
                        ids[i][tag]
                    } else {
                        NodeId::INVALID
                    };
                    let weight = self.transitions[prev][tag] + self.emissions[i][tag];
                    graph.add_edge_to(ids[i - 1][prev], dest, self.tag_edge(i, tag, weight))?;
                }
            }
        }
        for tag in (0..t).filter(|&tag| keep[n - 1][tag]) {
            let info = EdgeInfo::weighted(self.end_score(tag), NullDecision);
            graph.add_edge(ids[n - 1][tag], info)?;
        }

        debug!(
            positions = n,
            tags = t,
            nodes = graph.num_nodes(),
            edges = graph.num_edges(),
            "tag lattice built"
        );
        Ok(graph)
    }

    /// `marginals[i][t]`: soma das posteriores entregues à célula `(i, t)`.
    pub fn tag_marginals(&self) -> Vec<Vec<f64>> {
        self.marginals
            .iter()
            .map(|row| row.iter().map(PosteriorTally::value).collect())
            .collect()
    }

    /// Zera os acumuladores (ex: entre épocas do EM).
    pub fn reset_marginals(&self) {
        self.marginals.iter().flatten().for_each(PosteriorTally::reset);
    }

    fn tag_edge(&self, position: usize, tag: usize, weight: f64) -> EdgeInfo<'_, Vec<usize>> {
        EdgeInfo::weighted(
            weight,
            TagDecision {
                tag,
                tally: &self.marginals[position][tag],
            },
        )
    }

    fn start_score(&self, tag: usize) -> f64 {
        self.start.as_ref().map_or(0.0, |s| s[tag])
    }

    fn end_score(&self, tag: usize) -> f64 {
        self.end.as_ref().map_or(0.0, |e| e[tag])
    }

    fn allowed(&self, prev: usize, tag: usize) -> bool {
        !self.sparse_transitions || self.transitions[prev][tag] != f64::NEG_INFINITY
    }

    /// Células alcançáveis de START e que ainda alcançam END pelas
    /// transições permitidas. Sem esparsidade, todas.
    fn surviving_nodes(&self) -> Vec<Vec<bool>> {
        let (n, t) = (self.len(), self.num_tags());
        let mut forward = vec![vec![true; t]; n];
        for i in 1..n {
            for tag in 0..t {
                forward[i][tag] =
                    (0..t).any(|prev| forward[i - 1][prev] && self.allowed(prev, tag));
            }
        }
        let mut backward = vec![vec![true; t]; n];
        for i in (0..n.saturating_sub(1)).rev() {
            for tag in 0..t {
                backward[i][tag] =
                    (0..t).any(|next| backward[i + 1][next] && self.allowed(tag, next));
            }
        }
        forward
            .into_iter()
            .zip(backward)
            .map(|(f, b)| f.into_iter().zip(b).map(|(f, b)| f && b).collect())
            .collect()
    }
}
