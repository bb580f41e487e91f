//! # Opções do Hipergrafo
//!
//! Parâmetros que afetam a validação e o diagnóstico de uma instância.
//! Podem ser montados em código ou lidos de JSON:
//!
//! ```json
//! { "allow_empty_nodes": false, "posterior_tolerance": 1e-6, "debug": true }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HypergraphError, Result};

/// Maior folga aceita: acima disso uma dupla contagem (p ≈ 2) passaria.
pub const MAX_POSTERIOR_TOLERANCE: f64 = 1e-3;

/// Opções de uma instância de [`Hypergraph`](crate::graph::Hypergraph).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypergraphOptions {
    /// Permite nós (exceto END) sem arestas de saída.
    pub allow_empty_nodes: bool,
    /// Folga acima de 1.0 tolerada nas posteriores antes de acusar dupla contagem.
    pub posterior_tolerance: f64,
    /// Emite a ordenação topológica em `trace` ao finalizar.
    pub debug: bool,
}

impl Default for HypergraphOptions {
    fn default() -> Self {
        Self {
            allow_empty_nodes: false,
            posterior_tolerance: 1e-6,
            debug: false,
        }
    }
}

impl HypergraphOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Verifica que a tolerância está em `[0, MAX_POSTERIOR_TOLERANCE]`.
    ///
    /// Também roda ao finalizar o grafo, então opções montadas em código
    /// passam pela mesma checagem que as lidas de JSON.
    pub fn validate(&self) -> Result<()> {
        let tolerance = self.posterior_tolerance;
        if !(0.0..=MAX_POSTERIOR_TOLERANCE).contains(&tolerance) {
            return Err(HypergraphError::ConfigInvalid {
                field: "posterior_tolerance",
                reason: format!("must be in [0, {MAX_POSTERIOR_TOLERANCE}], got {tolerance}"),
            });
        }
        Ok(())
    }

    pub fn allow_empty_nodes(mut self, allow: bool) -> Self {
        self.allow_empty_nodes = allow;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use std::io::Write;

    #[test]
    fn test_partial_json_uses_defaults() {
        let opts = HypergraphOptions::from_json_str(r#"{"allow_empty_nodes": true}"#).unwrap();
        assert!(opts.allow_empty_nodes);
        assert!((opts.posterior_tolerance - 1e-6).abs() < 1e-15);
        assert!(!opts.debug);
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let err = HypergraphOptions::from_json_str(r#"{"posterior_tolerance": -1.0}"#).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_tolerance_bounds() {
        for bad in [f64::NAN, f64::INFINITY, 1e9, MAX_POSTERIOR_TOLERANCE * 2.0] {
            let opts = HypergraphOptions {
                posterior_tolerance: bad,
                ..Default::default()
            };
            assert!(opts.validate().is_err(), "{bad} accepted");
        }
        let opts = HypergraphOptions {
            posterior_tolerance: 0.0,
            ..Default::default()
        };
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"debug": true}}"#).unwrap();
        let opts = HypergraphOptions::from_path(file.path()).unwrap();
        assert!(opts.debug);

        let missing = HypergraphOptions::from_path("/nonexistent/options.json");
        assert!(matches!(missing, Err(HypergraphError::ConfigIo(_))));
    }
}
