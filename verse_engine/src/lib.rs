// Verse Engine
//
// A seeded verse generator that combines classical numeric and symbolic
// algorithms into one scoring-and-search pipeline. Corpus co-occurrence
// vectors are embedded nonlinearly, lines are searched token by token under
// meter, rhyme, grammar and repetition pressure, and a TD(λ) value estimator
// learns from every finished poem.
//
// Architecture:
// - vocab.rs: tokenization, corpus fingerprint, capped vocabulary snapshots
// - cooccurrence.rs: sliding-window co-occurrence vectors (hashed buckets)
// - kernel.rs: polynomial kernel PCA (power iteration + deflation)
// - state.rs: PoeticState, emotional space, vector helpers
// - value.rs: linear TD(λ) value estimator with eligibility traces
// - spectral.rs: radix-2 FFT meter score for stress patterns
// - repetition.rs: Floyd-style cycle detection over token history
// - cyk.rs: CYK membership test for CNF grammars
// - constraints.rs: forward-chaining rule checks over typed facts
// - search.rs: beam search for lines and poems (the orchestrator)
// - checkpoint.rs: versioned, lenient JSON snapshot record
// - engine.rs: VerseEngine facade (train, generate, save/load)
// - config.rs, error.rs: tunables and the error type
//
// Phonetic analysis, the function-word lexicon and the grammar type live in
// verse_lang; the PRNG in verse_prng. Generation is deterministic given the
// corpus, config and seed.

pub mod checkpoint;
pub mod config;
pub mod constraints;
pub mod cooccurrence;
pub mod cyk;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod repetition;
pub mod search;
pub mod spectral;
pub mod state;
pub mod value;
pub mod vocab;

pub use checkpoint::Checkpoint;
pub use config::EngineConfig;
pub use engine::{TrainReport, VerseEngine};
pub use error::{EngineError, Result};
pub use search::{Line, Poem};
