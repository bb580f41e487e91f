//! # Primitivas Numéricas em Log-Space
//!
//! Todas as passagens do hipergrafo trabalham com log-pesos: multiplicar
//! probabilidades vira somar logaritmos, e somar probabilidades vira
//! `log_add_exp`. Sem isso, o produto de centenas de pesos pequenos
//! sofreria underflow para zero.
//!
//! ```text
//! log(a · b) = log(a) + log(b)
//! log(a + b) = max(la, lb) + ln(1 + exp(-|la - lb|))
//! ```

use rand::Rng;

/// Soma estável em log-space: `ln(exp(a) + exp(b))`.
///
/// `-inf` é o elemento neutro (log 0). NaN se propaga.
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    if a == f64::INFINITY || b == f64::INFINITY {
        return f64::INFINITY;
    }
    let m = a.max(b);
    m + (-(a - b).abs()).exp().ln_1p()
}

/// `ln(Σ exp(v_i))` estável. Retorna `-inf` para slice vazio.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    if values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max.is_infinite() {
        return max;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Converte log-scores em uma distribuição normalizada, in-place (softmax).
///
/// Retorna `false` quando não há massa (todos `-inf`) ou algum score é NaN;
/// nesse caso o conteúdo do slice fica indefinido.
pub fn exp_normalize(scores: &mut [f64]) -> bool {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() || scores.iter().any(|s| s.is_nan()) {
        return false;
    }
    let mut sum = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    for s in scores.iter_mut() {
        *s /= sum;
    }
    true
}

/// Índice do primeiro máximo. Empates ficam com o menor índice.
///
/// `None` para slice vazio ou quando nenhum valor é comparável (todos NaN).
pub fn first_max_index(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

/// Sorteia um índice de uma distribuição já normalizada usando o gerador do chamador.
///
/// Nunca usa um gerador global: a reprodutibilidade depende só da semente
/// de `rng`.
pub fn sample_multinomial<R: Rng + ?Sized>(rng: &mut R, probs: &[f64]) -> Option<usize> {
    if probs.is_empty() || probs.iter().any(|p| p.is_nan() || *p < 0.0) {
        return None;
    }
    let u: f64 = rng.random();
    let mut cumulative = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumulative += p;
        if u < cumulative {
            return Some(i);
        }
    }
    // Arredondamento: u caiu na sobra entre a soma acumulada e 1.0
    probs.iter().rposition(|&p| p > 0.0)
}
