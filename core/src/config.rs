use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Top-level engine configuration. Every section falls back to its defaults
/// when missing from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tokenizer: TokenizerConfig,
    pub scoring: ScoringConfig,
    pub persistence: PersistenceConfig,
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Apply NFKC normalization before lowercasing.
    pub unicode_normalize: bool,
    pub remove_stopwords: bool,
    /// English Snowball stemming.
    pub stem: bool,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self { unicode_normalize: true, remove_stopwords: false, stem: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Penalty per bit of entropy difference in the standard score.
    pub entropy_weight: f64,
    /// Weight of |imaginary part| subtracted in the quantum score.
    pub imag_weight: f64,
    /// Weight of the biorthogonal score added to the quantum score.
    pub biorthogonal_weight: f64,
    /// Idle time (days) after which the phase decay reaches one half.
    pub decay_horizon_days: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            entropy_weight: 0.1,
            imag_weight: 0.2,
            biorthogonal_weight: 0.2,
            decay_horizon_days: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Initial reversibility (eta) of a freshly indexed document.
    pub default_reversibility: f64,
    /// Fragility (alpha) assigned to new documents.
    pub fragility: f64,
    /// Entropy pressure (Q) accumulated per idle day.
    pub pressure_per_day: f64,
    /// Lower bound applied to buffering capacity (T).
    pub min_buffering: f64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            default_reversibility: 0.5,
            fragility: 0.2,
            pressure_per_day: 0.05,
            min_buffering: 1e-3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"scoring": {"entropy_weight": 0.3}}"#).unwrap();
        assert_eq!(cfg.scoring.entropy_weight, 0.3);
        assert_eq!(cfg.scoring.decay_horizon_days, 30.0);
        assert!(cfg.tokenizer.unicode_normalize);
        assert_eq!(cfg.persistence.fragility, 0.2);
    }
}
