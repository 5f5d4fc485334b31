// Error taxonomy for the engine.
//
// Three families reach callers:
// - precondition failures (generation before training, transform before
//   fit, fitting on nothing) fail fast with no partial output;
// - format failures (checkpoint records, grammar JSON, config values)
//   reject the whole input and leave the engine untouched;
// - registration failures (constraint rules that reference undeclared facts).
//
// Numerical edge cases never surface here: zero-norm vectors, flat stress
// patterns and empty parses are guarded locally and return safe defaults.
// Search dead ends end the current line early and are not errors either.

use verse_lang::GrammarError;

/// Errors returned by the verse engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `generate_*` called before any successful `train` or checkpoint load.
    #[error("engine is not trained; call train() or load_checkpoint() first")]
    NotTrained,

    /// `KernelModel::transform` called before `fit`.
    #[error("kernel model has not been fitted")]
    NotFitted,

    /// An operation received an empty input it cannot work with.
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// A config value the engine cannot run with.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Input vector length does not match what the model was fitted with.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Checkpoint carries no version tag, or one this build does not know.
    #[error("unsupported checkpoint version: {0:?}")]
    UnsupportedCheckpoint(Option<u32>),

    /// Checkpoint fields are internally inconsistent.
    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    /// Constraint rule rejected at registration.
    #[error("invalid constraint rule {name:?}: {reason}")]
    InvalidRule { name: String, reason: String },

    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
