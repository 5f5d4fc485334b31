// The engine facade: training, generation and checkpoints.
//
// `VerseEngine` owns every long-lived piece of state: vocabulary, raw
// embeddings, kernel model, emotional space, value estimator, PRNG, and the
// derived per-token phonetics and grammar validator. Methods that change
// state take `&mut self`; nothing is shared or global.
//
// Training pipeline:
//   corpus -> Vocabulary + CoOccurrenceEmbedding -> KernelModel::fit on the
//   most frequent `max_support` tokens -> transform the whole vocabulary ->
//   rescale into [-1, 1] -> EmotionalSpace
// followed by `epochs` of TD pre-training over corpus lines. A corpus whose
// fingerprint matches the last non-incremental build skips straight to
// pre-training. Incremental training merges counts and vectors into the
// existing snapshots, then refits.
//
// Loading a checkpoint validates the whole record first and only then swaps
// it in, so a failed load leaves the engine exactly as it was.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use verse_lang::{Grammar, Lexicon, PhoneticAnalysis, analyze, line_grammar};
use verse_prng::VerseRng;

use crate::checkpoint::{
    CHECKPOINT_VERSION, Checkpoint, KernelRecord, TokenVector, ValueRecord, VocabEntry,
};
use crate::config::{EngineConfig, ValueConfig};
use crate::constraints::{ConstraintEngine, ConstraintRule, verse_rules};
use crate::cooccurrence::{CoOccurrenceEmbedding, l2_normalized};
use crate::cyk::GrammarValidator;
use crate::error::{EngineError, Result};
use crate::kernel::KernelModel;
use crate::search::{GenerationOrchestrator, LineSlot, Poem};
use crate::state::{EmotionalSpace, mean};
use crate::value::ValueEstimator;
use crate::vocab::{Vocabulary, extend_fingerprint, fingerprint, tokenize};

/// Components at or below this magnitude are left unscaled.
const RESCALE_FLOOR: f64 = 1e-12;

/// What a `train` call did.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainReport {
    pub vocabulary: usize,
    /// Kernel components in use.
    pub components: usize,
    /// False when the fitted model was reused.
    pub refitted: bool,
    /// Mean |δ| of each pre-training epoch.
    pub epoch_errors: Vec<f64>,
}

pub struct VerseEngine {
    config: EngineConfig,
    lexicon: Lexicon,
    custom_grammar: Option<Grammar>,
    rng: VerseRng,
    vocab: Vocabulary,
    embeddings: CoOccurrenceEmbedding,
    kernel: KernelModel,
    space: EmotionalSpace,
    phonetics: BTreeMap<String, PhoneticAnalysis>,
    validator: Option<GrammarValidator>,
    constraints: ConstraintEngine,
    value: ValueEstimator,
    fingerprint: Option<u64>,
    trained: bool,
}

impl VerseEngine {
    pub fn new(config: EngineConfig, lexicon: Lexicon, rng: VerseRng) -> Result<Self> {
        config.validate()?;
        let mut constraints = ConstraintEngine::new();
        for rule in verse_rules(config.search.syllable_tolerance) {
            constraints.register(rule)?;
        }
        Ok(Self {
            kernel: KernelModel::new(config.kernel.degree, config.kernel.n_components),
            embeddings: CoOccurrenceEmbedding::default(),
            value: ValueEstimator::new(&config.value),
            config,
            lexicon,
            custom_grammar: None,
            rng,
            vocab: Vocabulary::default(),
            space: EmotionalSpace::new(),
            phonetics: BTreeMap::new(),
            validator: None,
            constraints,
            fingerprint: None,
            trained: false,
        })
    }

    /// Validate lines against `grammar` instead of the default line grammar.
    /// Takes effect at the next refit or checkpoint load.
    pub fn with_grammar(mut self, grammar: Grammar) -> Self {
        self.custom_grammar = Some(grammar);
        self
    }

    /// Add a constraint rule next to the built-in ones.
    pub fn register_rule(&mut self, rule: ConstraintRule) -> Result<()> {
        self.constraints.register(rule)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn emotional_space(&self) -> &EmotionalSpace {
        &self.space
    }

    pub fn kernel(&self) -> &KernelModel {
        &self.kernel
    }

    pub fn corpus_fingerprint(&self) -> Option<u64> {
        self.fingerprint
    }

    /// Current value-estimator weights.
    pub fn weights(&self) -> &[f64] {
        self.value.weights()
    }

    /// Build (or reuse, or extend) the model from `corpus`, then run
    /// `epochs` of value pre-training over its lines.
    pub fn train(
        &mut self,
        corpus: &[String],
        epochs: usize,
        incremental: bool,
    ) -> Result<TrainReport> {
        if corpus.iter().all(|line| tokenize(line).is_empty()) {
            return Err(EngineError::EmptyInput("corpus"));
        }
        let corpus_fp = fingerprint(corpus);

        let refitted = if !incremental && self.trained && self.fingerprint == Some(corpus_fp) {
            info!(fingerprint = corpus_fp, "corpus unchanged; reusing fitted model");
            false
        } else {
            let fresh_vocab = Vocabulary::build(corpus, self.config.max_vocab);
            let fresh_embeddings = CoOccurrenceEmbedding::build(
                corpus,
                &fresh_vocab,
                self.config.embedding_dims,
                self.config.cooccurrence_window,
            );
            let (vocab, embeddings, fp) = match (incremental && self.trained, self.fingerprint) {
                (true, Some(previous)) => {
                    let vocab = self.vocab.merged(&fresh_vocab, self.config.max_vocab);
                    let embeddings = self
                        .embeddings
                        .merged(&fresh_embeddings)
                        .restricted_to(&vocab);
                    (vocab, embeddings, extend_fingerprint(previous, corpus))
                }
                _ => (fresh_vocab, fresh_embeddings, corpus_fp),
            };
            self.rebuild(vocab, embeddings)?;
            if !incremental {
                self.value = ValueEstimator::new(&self.config.value);
            }
            self.fingerprint = Some(fp);
            true
        };
        self.trained = true;

        let epoch_errors = (0..epochs)
            .map(|epoch| {
                let error = self.pretrain_epoch(corpus)?;
                debug!(epoch, mean_error = error, "pre-training epoch");
                Ok(error)
            })
            .collect::<Result<Vec<f64>>>()?;

        let report = TrainReport {
            vocabulary: self.vocab.len(),
            components: self.kernel.k(),
            refitted,
            epoch_errors,
        };
        info!(
            vocabulary = report.vocabulary,
            components = report.components,
            refitted,
            epochs,
            "training finished"
        );
        Ok(report)
    }

    /// Generate a poem of `num_lines` lines. Theme words that are in the
    /// vocabulary steer theme coherence; with none, the whole space does.
    pub fn generate_poem(&mut self, num_lines: usize, theme: &[&str]) -> Result<Poem> {
        if !self.trained {
            return Err(EngineError::NotTrained);
        }
        let Some(validator) = self.validator.as_ref() else {
            return Err(EngineError::NotTrained);
        };

        let theme_vectors: Vec<Vec<f64>> = theme
            .iter()
            .filter_map(|w| self.space.get(&w.to_lowercase()).cloned())
            .collect();
        if theme_vectors.is_empty() && !theme.is_empty() {
            warn!(?theme, "no theme word is in the vocabulary; using the whole space");
        }
        let centroid = mean(&theme_vectors)
            .or_else(|| mean(&self.space.values().cloned().collect::<Vec<_>>()))
            .unwrap_or_default();

        let orchestrator = GenerationOrchestrator::new(
            &self.config.search,
            &self.vocab,
            &self.space,
            &self.phonetics,
            validator,
            &self.constraints,
            centroid,
        );
        let poem = orchestrator.generate_poem(num_lines, &mut self.value, &mut self.rng);
        info!(
            lines = poem.lines.len(),
            accepted = poem.lines.iter().filter(|l| l.accepted).count(),
            "poem generated"
        );
        Ok(poem)
    }

    /// Snapshot of everything `load_checkpoint` needs.
    pub fn save_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            version: Some(CHECKPOINT_VERSION),
            vocabulary: self
                .vocab
                .iter()
                .map(|(token, count)| VocabEntry {
                    token: token.to_string(),
                    count,
                })
                .collect(),
            embedding_dims: self.embeddings.dims(),
            embeddings: token_vectors(self.embeddings.iter()),
            emotional_space: token_vectors(
                self.space.iter().map(|(t, v)| (t.as_str(), v.as_slice())),
            ),
            kernel: KernelRecord {
                x_fit: self.kernel.x_fit().to_vec(),
                eigenvectors: self.kernel.eigenvectors().to_vec(),
                eigenvalues: self.kernel.eigenvalues().to_vec(),
                degree: self.kernel.degree(),
                n_components: self.kernel.n_components(),
            },
            value: ValueRecord {
                weights: self.value.weights().to_vec(),
                eligibility: self.value.eligibility().to_vec(),
                alpha: self.value.alpha(),
                gamma: self.value.gamma(),
                lambda: self.value.lambda(),
            },
            rng_state: self.rng.state(),
            fingerprint: self.fingerprint,
            trained: self.trained,
        }
    }

    /// Replace all learned state with `checkpoint`, or fail and change
    /// nothing.
    pub fn load_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<()> {
        checkpoint.check_version()?;

        let counts: BTreeMap<String, u64> = checkpoint
            .vocabulary
            .iter()
            .map(|e| (e.token.clone(), e.count))
            .collect();
        if counts.len() != checkpoint.vocabulary.len() {
            return Err(EngineError::InvalidCheckpoint("duplicate vocabulary tokens".into()));
        }
        let vocab = Vocabulary::from_counts(counts, usize::MAX);

        let dims = checkpoint.embedding_dims;
        let embeddings = token_map(&checkpoint.embeddings, &vocab, "embeddings")?;
        if let Some((token, v)) = embeddings.iter().find(|(_, v)| v.len() != dims) {
            return Err(EngineError::InvalidCheckpoint(format!(
                "embedding for {token:?} has {} dims, expected {dims}",
                v.len()
            )));
        }
        let embeddings = CoOccurrenceEmbedding::from_vectors(dims, embeddings);

        let k = checkpoint.kernel;
        let kernel = KernelModel::from_parts(
            k.x_fit,
            k.eigenvectors,
            k.eigenvalues,
            k.degree,
            k.n_components,
        )?;
        if let Some(x) = kernel.x_fit().first().filter(|x| x.len() != dims) {
            return Err(EngineError::InvalidCheckpoint(format!(
                "kernel support vectors have {} dims, embeddings {dims}",
                x.len()
            )));
        }

        let space = token_map(&checkpoint.emotional_space, &vocab, "emotional space")?;
        if let Some((token, v)) = space.iter().find(|(_, v)| v.len() != kernel.k()) {
            return Err(EngineError::InvalidCheckpoint(format!(
                "emotional vector for {token:?} has {} components, kernel has {}",
                v.len(),
                kernel.k()
            )));
        }

        let v = checkpoint.value;
        if v.weights.len() != v.eligibility.len() || v.weights.is_empty() {
            return Err(EngineError::InvalidCheckpoint(format!(
                "value model has {} weights and {} traces",
                v.weights.len(),
                v.eligibility.len()
            )));
        }
        let value_config = ValueConfig {
            alpha: v.alpha,
            gamma: v.gamma,
            lambda: v.lambda,
            feature_dim: v.weights.len(),
        };
        let value = ValueEstimator::from_parts(v.weights, v.eligibility, &value_config);

        let rng = VerseRng::from_state(checkpoint.rng_state)
            .ok_or_else(|| EngineError::InvalidCheckpoint("all-zero PRNG state".into()))?;

        if checkpoint.trained && (vocab.is_empty() || !kernel.is_fitted()) {
            return Err(EngineError::InvalidCheckpoint(
                "marked trained but has no fitted model".into(),
            ));
        }
        let (phonetics, validator) = if vocab.is_empty() {
            (BTreeMap::new(), None)
        } else {
            let (p, v) = self.derive_lexical(&vocab)?;
            (p, Some(v))
        };

        self.vocab = vocab;
        self.embeddings = embeddings;
        self.kernel = kernel;
        self.space = space;
        self.value = value;
        self.rng = rng;
        self.phonetics = phonetics;
        self.validator = validator;
        self.fingerprint = checkpoint.fingerprint;
        self.trained = checkpoint.trained;
        info!(
            vocabulary = self.vocab.len(),
            components = self.kernel.k(),
            trained = self.trained,
            "checkpoint loaded"
        );
        Ok(())
    }

    /// Refit the kernel on `vocab`/`embeddings` and swap in the results.
    fn rebuild(&mut self, vocab: Vocabulary, embeddings: CoOccurrenceEmbedding) -> Result<()> {
        let support: Vec<Vec<f64>> = vocab
            .by_frequency()
            .into_iter()
            .take(self.config.kernel.max_support)
            .filter_map(|(t, _)| embeddings.get(t).map(l2_normalized))
            .collect();
        let mut kernel = KernelModel::new(self.config.kernel.degree, self.config.kernel.n_components);
        kernel.fit(&support, self.config.kernel.iterations, &mut self.rng)?;

        let tokens: Vec<&str> = vocab.tokens().collect();
        let inputs: Vec<Vec<f64>> = tokens
            .iter()
            .map(|t| embeddings.get(t).map(l2_normalized).unwrap_or_default())
            .collect();
        let projected = if self.config.kernel.normalized {
            kernel.transform_normalized(&inputs)?
        } else {
            kernel.transform(&inputs)?
        };
        let scale = projected
            .iter()
            .flatten()
            .fold(0.0_f64, |m, x| m.max(x.abs()));
        let space: EmotionalSpace = tokens
            .iter()
            .zip(projected)
            .map(|(t, mut v)| {
                if scale > RESCALE_FLOOR {
                    v.iter_mut().for_each(|x| *x /= scale);
                }
                (t.to_string(), v)
            })
            .collect();

        let (phonetics, validator) = self.derive_lexical(&vocab)?;
        info!(
            vocabulary = vocab.len(),
            support = support.len(),
            components = kernel.k(),
            "kernel refitted"
        );

        self.vocab = vocab;
        self.embeddings = embeddings;
        self.kernel = kernel;
        self.space = space;
        self.phonetics = phonetics;
        self.validator = Some(validator);
        Ok(())
    }

    /// Per-token phonetics and the grammar validator for `vocab`.
    fn derive_lexical(
        &self,
        vocab: &Vocabulary,
    ) -> Result<(BTreeMap<String, PhoneticAnalysis>, GrammarValidator)> {
        let phonetics = vocab
            .tokens()
            .map(|t| (t.to_string(), analyze(&self.lexicon, t)))
            .collect();
        let grammar = match &self.custom_grammar {
            Some(g) => g.clone(),
            None => line_grammar(&self.lexicon, vocab.tokens())?,
        };
        Ok((phonetics, GrammarValidator::new(grammar)))
    }

    /// One TD pass over up to `pretrain_lines` corpus lines. Each token
    /// prefix is a state; only the full line earns its line reward.
    fn pretrain_epoch(&mut self, corpus: &[String]) -> Result<f64> {
        let Some(validator) = self.validator.as_ref() else {
            return Err(EngineError::NotTrained);
        };
        let centroid = mean(&self.space.values().cloned().collect::<Vec<_>>()).unwrap_or_default();
        let orchestrator = GenerationOrchestrator::new(
            &self.config.search,
            &self.vocab,
            &self.space,
            &self.phonetics,
            validator,
            &self.constraints,
            centroid,
        );

        let mut total = 0.0;
        let mut updates = 0usize;
        for line in corpus.iter().take(self.config.pretrain_lines) {
            let tokens: Vec<String> = tokenize(line)
                .into_iter()
                .filter(|t| self.vocab.contains(t))
                .collect();
            if tokens.is_empty() {
                continue;
            }
            let slot = LineSlot {
                history: &[],
                rhyme_target: None,
                index: 0,
                of: 1,
            };
            let states: Vec<_> = (1..=tokens.len())
                .map(|n| orchestrator.line_state(&slot, &tokens[..n]))
                .collect();
            for (i, state) in states.iter().enumerate() {
                let next = states.get(i + 1);
                let done = next.is_none();
                let reward = if done { state.line_reward() } else { 0.0 };
                total += self.value.update(Some(state), reward, next, done).abs();
                updates += 1;
            }
        }
        Ok(if updates == 0 {
            0.0
        } else {
            total / updates as f64
        })
    }
}

fn token_vectors<'a>(pairs: impl Iterator<Item = (&'a str, &'a [f64])>) -> Vec<TokenVector> {
    pairs
        .map(|(token, v)| TokenVector {
            token: token.to_string(),
            vector: v.to_vec(),
        })
        .collect()
}

/// Token -> vector map for a checkpoint section, which must cover exactly
/// the vocabulary.
fn token_map(
    entries: &[TokenVector],
    vocab: &Vocabulary,
    section: &str,
) -> Result<BTreeMap<String, Vec<f64>>> {
    let map: BTreeMap<String, Vec<f64>> = entries
        .iter()
        .map(|e| (e.token.clone(), e.vector.clone()))
        .collect();
    if map.len() != entries.len() {
        return Err(EngineError::InvalidCheckpoint(format!(
            "duplicate tokens in {section}"
        )));
    }
    if map.len() != vocab.len() || !map.keys().all(|t| vocab.contains(t)) {
        return Err(EngineError::InvalidCheckpoint(format!(
            "{section} tokens do not match the vocabulary"
        )));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use verse_lang::default_lexicon;

    fn corpus() -> Vec<String> {
        [
            "the silver moon is rising over the quiet sea",
            "a gentle wind is singing to the sleeping trees",
            "and all the stars are burning in the velvet night",
            "my heart is dreaming softly of the morning light",
            "the river carries shadows down to distant shores",
            "we wander through the meadow where the thunder roars",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn engine(seed: u64) -> VerseEngine {
        VerseEngine::new(EngineConfig::default(), default_lexicon(), VerseRng::new(seed)).unwrap()
    }

    #[test]
    fn test_generate_before_train_fails() {
        let mut e = engine(1);
        assert!(matches!(
            e.generate_poem(2, &[]),
            Err(EngineError::NotTrained)
        ));
    }

    #[test]
    fn test_empty_corpus_rejected() {
        let mut e = engine(1);
        let blank = vec!["   ".to_string(), "123 ...".to_string()];
        assert!(matches!(
            e.train(&blank, 1, false),
            Err(EngineError::EmptyInput(_))
        ));
        assert!(!e.is_trained());
    }

    #[test]
    fn test_train_builds_bounded_space() {
        let mut e = engine(2);
        let report = e.train(&corpus(), 2, false).unwrap();
        assert!(report.refitted);
        assert_eq!(report.epoch_errors.len(), 2);
        assert_eq!(report.vocabulary, e.vocabulary().len());
        assert_eq!(e.emotional_space().len(), e.vocabulary().len());
        let max = e
            .emotional_space()
            .values()
            .flatten()
            .fold(0.0_f64, |m, x| m.max(x.abs()));
        assert!((max - 1.0).abs() < 1e-9, "max component {max}");
        assert!(e.emotional_space().values().all(|v| v.len() == report.components));
        assert!(e.weights().iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_same_corpus_reuses_model() {
        let mut e = engine(3);
        e.train(&corpus(), 0, false).unwrap();
        let kernel = e.kernel().clone();
        let report = e.train(&corpus(), 0, false).unwrap();
        assert!(!report.refitted);
        assert_eq!(e.kernel(), &kernel);

        let mut changed = corpus();
        changed.push("a lonely owl is calling".to_string());
        assert!(e.train(&changed, 0, false).unwrap().refitted);
        assert!(e.vocabulary().contains("owl"));
    }

    #[test]
    fn test_incremental_merges_counts() {
        let mut e = engine(4);
        e.train(&corpus(), 0, false).unwrap();
        let before = e.vocabulary().count("the").unwrap();
        let extra = vec!["the owl and the moon".to_string()];
        let report = e.train(&extra, 0, true).unwrap();
        assert!(report.refitted);
        assert_eq!(e.vocabulary().count("the"), Some(before + 2));
        assert!(e.vocabulary().contains("owl"));
        assert!(e.vocabulary().contains("river"));
        let mut joined = corpus();
        joined.extend(extra);
        assert_eq!(e.corpus_fingerprint(), Some(fingerprint(&joined)));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let mut e = engine(5);
        e.train(&corpus(), 1, false).unwrap();
        let saved = e.save_checkpoint();

        let mut restored = engine(99);
        restored.load_checkpoint(saved.clone()).unwrap();
        assert_eq!(restored.save_checkpoint(), saved);

        let json = saved.to_json().unwrap();
        let mut from_json = engine(100);
        from_json
            .load_checkpoint(Checkpoint::from_json(&json).unwrap())
            .unwrap();
        assert_eq!(from_json.save_checkpoint(), saved);

        let a = e.generate_poem(2, &["moon"]).unwrap();
        let b = from_json.generate_poem(2, &["moon"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_failed_load_changes_nothing() {
        let mut e = engine(6);
        e.train(&corpus(), 0, false).unwrap();
        let before = e.save_checkpoint();

        let mut bad = before.clone();
        bad.emotional_space.pop();
        assert!(matches!(
            e.load_checkpoint(bad),
            Err(EngineError::InvalidCheckpoint(_))
        ));

        let mut bad = before.clone();
        bad.kernel.eigenvalues.push(1.0);
        assert!(matches!(
            e.load_checkpoint(bad),
            Err(EngineError::InvalidCheckpoint(_))
        ));

        let mut bad = before.clone();
        bad.rng_state = [0; 4];
        assert!(e.load_checkpoint(bad).is_err());

        let mut bad = before.clone();
        bad.version = None;
        assert!(matches!(
            e.load_checkpoint(bad),
            Err(EngineError::UnsupportedCheckpoint(None))
        ));

        assert_eq!(e.save_checkpoint(), before);
    }

    #[test]
    fn test_custom_grammar_is_used() {
        let grammar = Grammar::from_json(
            r#"{"start": "S", "rules": {"S": [["A", "B"]], "A": [["the"]], "B": [["moon"], ["sea"]]}}"#,
        )
        .unwrap();
        let mut e = engine(7).with_grammar(grammar);
        e.train(&corpus(), 0, false).unwrap();
        let poem = e.generate_poem(2, &[]).unwrap();
        assert_eq!(poem.lines.len(), 2);
        for line in &poem.lines {
            assert!(line.accepted, "{:?}", line.tokens);
            assert_eq!(line.tokens.len(), 2);
            assert_eq!(line.tokens[0], "the");
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.embedding_dims = 0;
        assert!(matches!(
            VerseEngine::new(config, default_lexicon(), VerseRng::new(1)),
            Err(EngineError::InvalidConfig(_))
        ));

        let mut config = EngineConfig::default();
        config.value.feature_dim = 0;
        assert!(matches!(
            VerseEngine::new(config, default_lexicon(), VerseRng::new(1)),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_function_word_corpus_ends_lines_without_error() {
        let mut e = engine(8);
        let corpus = vec!["the and of to".to_string(), "a the in".to_string()];
        e.train(&corpus, 1, false).unwrap();
        let poem = e.generate_poem(2, &[]).unwrap();
        assert_eq!(poem.lines.len(), 2);
        for line in &poem.lines {
            assert!(!line.accepted);
            assert!(!line.tokens.is_empty());
            assert!(line.tokens.iter().all(|t| e.vocabulary().contains(t)));
        }
        let tokens: Vec<&str> = poem.tokens().collect();
        assert!(tokens.windows(2).all(|w| w[0] != w[1]));
    }
}
