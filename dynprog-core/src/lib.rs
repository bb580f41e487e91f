//! # dynprog-core: Inferência em Hipergrafos Soma/Produto
//!
//! Este crate implementa um motor genérico de programação dinâmica. O
//! chamador descreve um espaço exponencial de estruturas discretas
//! (sequências de tags, árvores de parsing) como um DAG de nós **sum**
//! (escolhe-uma) e **prod** (escolhe-todas), e o motor responde:
//!
//! - o log da função de partição (`log_z`);
//! - a melhor estrutura (Viterbi generalizado);
//! - uma estrutura amostrada proporcionalmente ao seu peso;
//! - a probabilidade marginal de cada decisão (passo E do EM).
//!
//! ## Ciclo de uma instância
//!
//! 1.  **Construção** ([`graph`]): nós registrados por chave, hiperarestas com
//!     até dois filhos e uma [`Decision`] do chamador.
//! 2.  **Ordenação** ([`topo`]): DFS iterativo a partir de START, detecta ciclos
//!     e nós inalcançáveis.
//! 3.  **Scores** ([`inside_outside`]): inside/outside em log-space, ou max-product.
//! 4.  **Consultas** ([`posterior`], [`hyperpath`]): posteriores, entropia,
//!     melhor caminho e amostras.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use dynprog_core::{EdgeInfo, Hypergraph, InferenceMode, NodeId, NullDecision};
//!
//! // START escolhe entre duas arestas terminais
//! let mut graph: Hypergraph<'_, (), &str> = Hypergraph::new();
//! graph.add_edge(NodeId::START, EdgeInfo::weighted(0.0, NullDecision)).unwrap();
//! graph.add_edge(NodeId::START, EdgeInfo::weighted(0.0, NullDecision)).unwrap();
//!
//! graph.compute_posteriors(InferenceMode::Marginal).unwrap();
//! assert!((graph.log_z().unwrap() - 2f64.ln()).abs() < 1e-12);
//! ```
//!
//! Para taggers de sequência, [`TagLattice`] monta o hipergrafo a partir das
//! tabelas de emissão e transição.
//!
//! ## Módulos Principais
//!
//! - [`graph`]: builder e handles ([`NodeId`], [`EdgeId`]).
//! - [`decision`]: pesos e a interface [`Decision`].
//! - [`lattice`]: lattice de tags de primeira ordem.
//! - [`batch`]: pontuação paralela de muitos exemplos com Rayon.
//! - [`numeric`]: primitivas estáveis em log-space.

pub mod batch;
pub mod config;
pub mod decision;
pub mod error;
pub mod graph;
pub mod hyperpath;
pub mod inside_outside;
pub mod lattice;
pub mod numeric;
pub mod posterior;
pub mod topo;

pub use batch::{summarize_batch, BatchReport, InferenceSummary};
pub use config::HypergraphOptions;
pub use decision::{ChooseWith, Decision, EdgeInfo, EdgeWeight, NullDecision, PosteriorTally};
pub use error::{ErrorCategory, HypergraphError, Result};
pub use graph::{EdgeId, Hypergraph, NodeId, NodeKind};
pub use hyperpath::HyperpathResult;
pub use inside_outside::InferenceMode;
pub use lattice::{LatticeGraph, TagLattice};
