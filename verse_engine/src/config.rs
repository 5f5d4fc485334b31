// Tunable engine parameters.
//
// Every number the engine uses lives in `EngineConfig`, grouped per stage:
// corpus/vocabulary, kernel embedding, value estimator and line search.
// Each group has a `Default` carrying the reference values and derives
// serde, so a JSON file can override any subset of fields
// (`#[serde(default)]` fills in the rest). `validate` rejects values the
// engine cannot run with (zero sizes, non-finite rates); both
// `from_json` and `VerseEngine::new` call it.
//
// The config feeds directly into deterministic generation: two engines with
// the same config, corpus and seed produce the same poems.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Kernel PCA parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Polynomial kernel degree `d` in `(x·y + 1)^d`.
    pub degree: u32,
    /// Requested number of components `k`.
    pub n_components: usize,
    /// Upper bound on the support set. The most frequent tokens are used.
    pub max_support: usize,
    /// Power-iteration cap per component.
    pub iterations: usize,
    /// Scale projections by `1/sqrt(|eigenvalue| + eps)`.
    pub normalized: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            degree: 2,
            n_components: 8,
            max_support: 300,
            iterations: 50,
            normalized: false,
        }
    }
}

/// TD(λ) hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueConfig {
    /// Step size α.
    pub alpha: f64,
    /// Discount γ.
    pub gamma: f64,
    /// Trace decay λ.
    pub lambda: f64,
    /// Feature vector length F.
    pub feature_dim: usize,
}

impl Default for ValueConfig {
    fn default() -> Self {
        ValueConfig {
            alpha: 0.05,
            gamma: 0.9,
            lambda: 0.8,
            feature_dim: 16,
        }
    }
}

/// Weights of the three heuristic terms in the search score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicWeights {
    pub meter: f64,
    pub rhyme: f64,
    pub aesthetic: f64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        HeuristicWeights {
            meter: 0.3,
            rhyme: 0.3,
            aesthetic: 0.4,
        }
    }
}

/// Line/poem search parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Candidates kept after scoring.
    pub beam_width: usize,
    /// Syllables per line.
    pub target_syllables: usize,
    /// Step cap per line, counting rolled-back steps.
    pub max_iterations: usize,
    /// Candidates proposed per step, nearest first.
    pub candidate_pool: usize,
    /// Token length bounds in characters (inclusive).
    pub min_token_len: usize,
    pub max_token_len: usize,
    /// Rhyme bonus and grammar closing apply within this many syllables of
    /// the target.
    pub rhyme_window: usize,
    /// Allowed overshoot of the syllable target.
    pub syllable_tolerance: usize,
    /// Tokens inspected by the repetition detector.
    pub max_lookback: usize,
    /// Emotional vectors kept in a PoeticState trajectory.
    pub trajectory_len: usize,
    pub weights: HeuristicWeights,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            beam_width: 5,
            target_syllables: 10,
            max_iterations: 64,
            candidate_pool: 40,
            min_token_len: 1,
            max_token_len: 14,
            rhyme_window: 2,
            syllable_tolerance: 2,
            max_lookback: 20,
            trajectory_len: 10,
            weights: HeuristicWeights::default(),
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Vocabulary cap by frequency rank.
    pub max_vocab: usize,
    /// Raw co-occurrence vector length.
    pub embedding_dims: usize,
    /// Neighbours on each side counted as co-occurring.
    pub cooccurrence_window: usize,
    /// Corpus lines replayed per pre-training epoch.
    pub pretrain_lines: usize,
    pub kernel: KernelConfig,
    pub value: ValueConfig,
    pub search: SearchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_vocab: 2500,
            embedding_dims: 64,
            cooccurrence_window: 2,
            pretrain_lines: 500,
            kernel: KernelConfig::default(),
            value: ValueConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) config from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make training or search meaningless or
    /// panic: zero sizes, non-finite rates, discounts outside [0, 1].
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_vocab", self.max_vocab),
            ("embedding_dims", self.embedding_dims),
            ("kernel.n_components", self.kernel.n_components),
            ("kernel.max_support", self.kernel.max_support),
            ("kernel.iterations", self.kernel.iterations),
            ("value.feature_dim", self.value.feature_dim),
            ("search.target_syllables", self.search.target_syllables),
            ("search.max_iterations", self.search.max_iterations),
            ("search.candidate_pool", self.search.candidate_pool),
            ("search.trajectory_len", self.search.trajectory_len),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(invalid(format!("{name} must be at least 1")));
        }
        if self.kernel.degree == 0 {
            return Err(invalid("kernel.degree must be at least 1".into()));
        }
        if self.search.min_token_len > self.search.max_token_len {
            return Err(invalid(format!(
                "search.min_token_len {} exceeds max_token_len {}",
                self.search.min_token_len, self.search.max_token_len
            )));
        }

        let v = &self.value;
        if !(v.alpha.is_finite() && v.alpha > 0.0) {
            return Err(invalid(format!("value.alpha must be positive, got {}", v.alpha)));
        }
        for (name, x) in [("value.gamma", v.gamma), ("value.lambda", v.lambda)] {
            if !(0.0..=1.0).contains(&x) {
                return Err(invalid(format!("{name} must lie in [0, 1], got {x}")));
            }
        }
        let w = &self.search.weights;
        for (name, x) in [
            ("weights.meter", w.meter),
            ("weights.rhyme", w.rhyme),
            ("weights.aesthetic", w.aesthetic),
        ] {
            if !x.is_finite() {
                return Err(invalid(format!("search.{name} must be finite, got {x}")));
            }
        }
        Ok(())
    }
}

fn invalid(reason: String) -> EngineError {
    EngineError::InvalidConfig(reason)
}
