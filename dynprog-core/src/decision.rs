//! # Decisões: o que cada hiperaresta representa
//!
//! Cada hiperaresta codifica uma decisão discreta do modelo (ex: "token 3
//! recebe a tag B-PER"). O motor não sabe nada sobre o significado da
//! decisão; ele só:
//!
//! 1. lê o peso uma única vez, na construção da aresta ([`EdgeWeight`]);
//! 2. repassa o widget do chamador por [`Decision::choose`] quando a aresta
//!    faz parte do caminho escolhido;
//! 3. entrega a probabilidade marginal por [`Decision::set_posterior`].
//!
//! As decisões pertencem ao chamador: uma aresta guarda apenas uma
//! referência (ou um `Rc`) para elas durante a vida da instância.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{HypergraphError, Result};

/// Fonte do peso de uma aresta, resolvida para um único log-peso na construção.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeWeight {
    /// Log-peso direto (ex: score de um CRF).
    LogWeight(f64),
    /// Probabilidade crua em `[0, 1]` (ex: parâmetro de um HMM); o log é tomado na construção.
    Probability(f64),
}

impl EdgeWeight {
    /// Resolve o log-peso, rejeitando NaN, `+inf` e probabilidades fora de `[0, 1]`.
    ///
    /// `-inf` (probabilidade zero) é aceito: a aresta existe mas nunca é escolhida.
    pub fn log_weight(self) -> Result<f64> {
        match self {
            EdgeWeight::LogWeight(w) => {
                if w.is_nan() || w == f64::INFINITY {
                    return Err(HypergraphError::InvalidWeight(format!("log-weight {w}")));
                }
                Ok(w)
            }
            EdgeWeight::Probability(p) => {
                if !(0.0..=1.0).contains(&p) {
                    return Err(HypergraphError::InvalidWeight(format!("probability {p}")));
                }
                Ok(p.ln())
            }
        }
    }

    /// Escala o log-peso por `factor` (temperatura de annealing, peso do exemplo).
    ///
    /// Em probabilidade isso equivale a `p^factor`.
    pub fn scaled(self, factor: f64) -> Self {
        match self {
            EdgeWeight::LogWeight(w) => EdgeWeight::LogWeight(w * factor),
            EdgeWeight::Probability(p) => EdgeWeight::LogWeight(p.ln() * factor),
        }
    }
}

/// Interface que o chamador implementa para cada decisão do modelo.
///
/// Ambos os métodos recebem `&self`: decisões são compartilhadas por
/// referência, então quem precisa acumular estado usa `Cell`/`RefCell`
/// (como [`PosteriorTally`]).
pub trait Decision<W> {
    /// Acrescenta a contribuição desta decisão ao widget e o devolve.
    fn choose(&self, widget: W) -> W {
        widget
    }

    /// Recebe a probabilidade marginal (ou `1.0` no caminho de Viterbi).
    fn set_posterior(&self, _probability: f64) {}
}

impl<W, D: Decision<W> + ?Sized> Decision<W> for &D {
    fn choose(&self, widget: W) -> W {
        (**self).choose(widget)
    }

    fn set_posterior(&self, probability: f64) {
        (**self).set_posterior(probability)
    }
}

impl<W, D: Decision<W> + ?Sized> Decision<W> for Rc<D> {
    fn choose(&self, widget: W) -> W {
        (**self).choose(widget)
    }

    fn set_posterior(&self, probability: f64) {
        (**self).set_posterior(probability)
    }
}

/// Decisão vazia: não altera o widget e ignora posteriores.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDecision;

impl<W> Decision<W> for NullDecision {}

/// Adapta uma closure `Fn(W) -> W` como decisão que só participa do widget.
pub struct ChooseWith<F>(pub F);

impl<W, F: Fn(W) -> W> Decision<W> for ChooseWith<F> {
    fn choose(&self, widget: W) -> W {
        (self.0)(widget)
    }
}

/// Acumulador de posteriores: soma tudo o que recebe.
///
/// É o formato típico de "contagens esperadas" no passo E do EM: várias
/// arestas podem apontar para o mesmo tally.
#[derive(Debug, Default)]
pub struct PosteriorTally {
    total: Cell<f64>,
    hits: Cell<usize>,
}

impl PosteriorTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Soma das probabilidades recebidas.
    pub fn value(&self) -> f64 {
        self.total.get()
    }

    /// Quantas vezes `set_posterior` foi chamado.
    pub fn hits(&self) -> usize {
        self.hits.get()
    }

    pub fn reset(&self) {
        self.total.set(0.0);
        self.hits.set(0);
    }
}

impl<W> Decision<W> for PosteriorTally {
    fn set_posterior(&self, probability: f64) {
        self.total.set(self.total.get() + probability);
        self.hits.set(self.hits.get() + 1);
    }
}

/// Peso + decisão de uma nova aresta.
pub struct EdgeInfo<'a, W> {
    pub(crate) weight: EdgeWeight,
    pub(crate) decision: Box<dyn Decision<W> + 'a>,
}

impl<'a, W> EdgeInfo<'a, W> {
    pub fn new<D: Decision<W> + 'a>(weight: EdgeWeight, decision: D) -> Self {
        Self {
            weight,
            decision: Box::new(decision),
        }
    }

    /// Aresta sem efeito: log-peso 0 (probabilidade 1) e decisão nula.
    pub fn null() -> Self {
        Self {
            weight: EdgeWeight::LogWeight(0.0),
            decision: Box::new(NullDecision),
        }
    }

    pub fn weighted<D: Decision<W> + 'a>(log_weight: f64, decision: D) -> Self {
        Self::new(EdgeWeight::LogWeight(log_weight), decision)
    }

    pub fn probability<D: Decision<W> + 'a>(probability: f64, decision: D) -> Self {
        Self::new(EdgeWeight::Probability(probability), decision)
    }

    /// Aresta sem decisão, apenas com peso.
    pub fn weight_only(weight: EdgeWeight) -> Self {
        Self {
            weight,
            decision: Box::new(NullDecision),
        }
    }

    pub fn weight(&self) -> EdgeWeight {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_resolves_to_log() {
        let w = EdgeWeight::Probability(0.25).log_weight().unwrap();
        assert!((w - 0.25f64.ln()).abs() < 1e-12);
        assert_eq!(EdgeWeight::Probability(0.0).log_weight().unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        assert!(EdgeWeight::Probability(1.5).log_weight().is_err());
        assert!(EdgeWeight::Probability(f64::NAN).log_weight().is_err());
        assert!(EdgeWeight::LogWeight(f64::NAN).log_weight().is_err());
        assert!(EdgeWeight::LogWeight(f64::INFINITY).log_weight().is_err());
    }

    #[test]
    fn test_scaled_is_power_in_probability_space() {
        let w = EdgeWeight::Probability(0.5).scaled(2.0).log_weight().unwrap();
        assert!((w.exp() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_tally_accumulates_through_reference() {
        let tally = PosteriorTally::new();
        let by_ref: &PosteriorTally = &tally;
        Decision::<()>::set_posterior(&by_ref, 0.25);
        Decision::<()>::set_posterior(&tally, 0.5);
        assert!((tally.value() - 0.75).abs() < 1e-12);
        assert_eq!(tally.hits(), 2);
        tally.reset();
        assert_eq!(tally.value(), 0.0);
    }

    #[test]
    fn test_choose_with_closure() {
        let push_seven = ChooseWith(|mut v: Vec<u32>| {
            v.push(7);
            v
        });
        assert_eq!(push_seven.choose(vec![1]), vec![1, 7]);
    }
}
