// Beam search over vocabulary tokens: the generation orchestrator.
//
// A line is built one token at a time until it reaches the syllable target,
// runs out of candidates, or hits the iteration cap. Each step:
//
// 1. Propose candidates: vocabulary tokens within the length bounds whose
//    syllables fit the remaining budget (plus tolerance), minus the tokens
//    already rejected at this position. Tokens that leave the line a viable
//    grammar prefix are preferred; when none do, a line that already parses
//    is finished, and any other line falls back to every token. Survivors
//    are ranked by distance in emotional space to the last emitted token
//    (ties broken by a random u64) and cut to `candidate_pool`. Candidates
//    that would bring the line within `rhyme_window` syllables of the
//    target must leave a line the grammar accepts, unless none do.
// 2. Score each candidate as path cost plus heuristic, lower is better:
//    g = -ln(u + 0.01) for a uniform u, and
//    H = β₁(1 - meter + cyclePenalty) + β₂(1 - rhymeBonus)
//        + β₃·max(0, 2 - aesthetic).
// 3. Keep the best `beam_width` and pick uniformly between the top two.
// 4. Append it and run the constraint rules; on any violation the token is
//    rolled back and excluded for this position.
//
// When the loop ends, trailing tokens are dropped until the grammar accepts
// what is left. A line with no grammatical prefix keeps every committed
// token and comes back with `accepted = false`; dead ends are not errors.
//
// Poems chain lines through a shared token history. Odd lines take the
// previous line's final token as their rhyme target. After the last line,
// every line state feeds one TD update toward the next line's state.
//
// Depends on spectral.rs (meter), repetition.rs (cycle penalty and facts),
// cyk.rs (grammar), constraints.rs (rollback) and value.rs (aesthetic).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use verse_lang::PhoneticAnalysis;
use verse_prng::VerseRng;

use crate::config::SearchConfig;
use crate::constraints::{ConstraintEngine, FactKey, FactValue, Facts};
use crate::cyk::GrammarValidator;
use crate::repetition::{self, CycleReport};
use crate::spectral::analyze_stress_pattern;
use crate::state::{EmotionalSpace, PoeticState, euclidean, theme_coherence};
use crate::value::ValueEstimator;
use crate::vocab::Vocabulary;

/// Offset inside the path-cost logarithm.
const PATH_COST_EPS: f64 = 0.01;
/// The aesthetic heuristic stops paying once the estimate reaches this.
const AESTHETIC_CEILING: f64 = 2.0;
/// Final pick is uniform over this many of the best candidates.
const TOP_PICK: usize = 2;

/// One generated line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub tokens: Vec<String>,
    pub text: String,
    pub syllables: usize,
    pub state: PoeticState,
    /// Whether the grammar accepts `tokens`.
    pub accepted: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Poem {
    pub lines: Vec<Line>,
}

impl Poem {
    /// Lines joined with newlines.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every token of the poem in order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .flat_map(|l| l.tokens.iter().map(String::as_str))
    }
}

/// Where a line sits in its poem.
#[derive(Clone, Copy, Debug)]
pub struct LineSlot<'g> {
    /// Tokens of every earlier line.
    pub history: &'g [String],
    pub rhyme_target: Option<&'g str>,
    pub index: usize,
    pub of: usize,
}

/// Read-only view of a trained engine, plus the theme centroid.
pub struct GenerationOrchestrator<'a> {
    config: &'a SearchConfig,
    vocab: &'a Vocabulary,
    space: &'a EmotionalSpace,
    phonetics: &'a BTreeMap<String, PhoneticAnalysis>,
    validator: &'a GrammarValidator,
    constraints: &'a ConstraintEngine,
    centroid: Vec<f64>,
}

impl<'a> GenerationOrchestrator<'a> {
    pub fn new(
        config: &'a SearchConfig,
        vocab: &'a Vocabulary,
        space: &'a EmotionalSpace,
        phonetics: &'a BTreeMap<String, PhoneticAnalysis>,
        validator: &'a GrammarValidator,
        constraints: &'a ConstraintEngine,
        centroid: Vec<f64>,
    ) -> Self {
        Self {
            config,
            vocab,
            space,
            phonetics,
            validator,
            constraints,
            centroid,
        }
    }

    /// Generate `num_lines` lines, then train `value` on the finished poem.
    pub fn generate_poem(
        &self,
        num_lines: usize,
        value: &mut ValueEstimator,
        rng: &mut VerseRng,
    ) -> Poem {
        let mut lines: Vec<Line> = Vec::with_capacity(num_lines);
        let mut history: Vec<String> = Vec::new();
        for index in 0..num_lines {
            let rhyme_target = if index % 2 == 1 {
                lines
                    .last()
                    .and_then(|l| l.tokens.last())
                    .map(String::as_str)
            } else {
                None
            };
            let slot = LineSlot {
                history: &history,
                rhyme_target,
                index,
                of: num_lines,
            };
            let line = self.generate_line(&slot, value, rng);
            debug!(index, text = %line.text, accepted = line.accepted, "line generated");
            history.extend(line.tokens.iter().cloned());
            lines.push(line);
        }
        learn_from_lines(&lines, value);
        Poem { lines }
    }

    pub fn generate_line(
        &self,
        slot: &LineSlot<'_>,
        value: &ValueEstimator,
        rng: &mut VerseRng,
    ) -> Line {
        let target = self.config.target_syllables;
        let rhyme = slot.rhyme_target.and_then(|t| self.phonetics.get(t));
        let mut tokens: Vec<String> = Vec::new();
        let mut syllables = 0;
        let mut rejected: BTreeSet<String> = BTreeSet::new();
        let mut iterations = 0;

        while syllables < target && iterations < self.config.max_iterations {
            iterations += 1;
            let pool = self.candidates(slot, &tokens, syllables, &rejected, rng);
            if pool.is_empty() {
                debug!(line = slot.index, syllables, "no candidates left");
                break;
            }

            let mut beam: Vec<(f64, &str)> = pool
                .into_iter()
                .map(|c| (self.score(slot, rhyme, &tokens, c, value, rng), c))
                .collect();
            beam.sort_by(|a, b| a.0.total_cmp(&b.0));
            beam.truncate(self.config.beam_width.max(1));
            let pick = rng.range_usize(0, beam.len().min(TOP_PICK));
            let token = beam[pick].1.to_string();

            let cost = self.syllables_of(&token);
            tokens.push(token);
            syllables += cost;

            let violations = self
                .constraints
                .check(&self.facts(slot.history, &tokens, syllables));
            if violations.is_empty() {
                rejected.clear();
            } else if let Some(token) = tokens.pop() {
                syllables -= cost;
                debug!(line = slot.index, %token, ?violations, "rolled back");
                rejected.insert(token);
            }
        }

        let committed = tokens.clone();
        let mut accepted = false;
        while !tokens.is_empty() {
            if self.validator.validate(&tokens) {
                accepted = true;
                break;
            }
            tokens.pop();
        }
        if !accepted {
            debug!(line = slot.index, "no grammatical prefix; keeping committed tokens");
            tokens = committed;
        }

        let syllables = tokens.iter().map(|t| self.syllables_of(t)).sum();
        let state = self.state_for(slot, rhyme, &tokens);
        Line {
            text: tokens.join(" "),
            tokens,
            syllables,
            state,
            accepted,
        }
    }

    /// State of `line` in `slot`, scored against the slot's rhyme target.
    pub fn line_state<S: AsRef<str>>(&self, slot: &LineSlot<'_>, line: &[S]) -> PoeticState {
        let rhyme = slot.rhyme_target.and_then(|t| self.phonetics.get(t));
        self.state_for(slot, rhyme, line)
    }

    fn syllables_of(&self, token: &str) -> usize {
        self.phonetics.get(token).map_or(1, |p| p.syllable_count)
    }

    /// Ranked candidate tokens for the next position.
    fn candidates(
        &self,
        slot: &LineSlot<'_>,
        tokens: &[String],
        syllables: usize,
        rejected: &BTreeSet<String>,
        rng: &mut VerseRng,
    ) -> Vec<&'a str> {
        let vocab: &'a Vocabulary = self.vocab;
        let target = self.config.target_syllables;
        let ceiling = target.saturating_sub(syllables) + self.config.syllable_tolerance;
        let anchor = tokens
            .last()
            .or(slot.history.last())
            .and_then(|t| self.space.get(t));

        let eligible: Vec<&'a str> = vocab
            .tokens()
            .filter(|t| {
                let len = t.chars().count();
                len >= self.config.min_token_len && len <= self.config.max_token_len
            })
            .filter(|t| !rejected.contains(*t) && self.syllables_of(t) <= ceiling)
            .collect();

        let mut line: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let viable: Vec<&'a str> = eligible
            .iter()
            .copied()
            .filter(|&c| {
                line.push(c);
                let ok = self.validator.is_viable_prefix(&line);
                line.pop();
                ok
            })
            .collect();
        let eligible = if !viable.is_empty() {
            viable
        } else if !line.is_empty() && self.validator.validate(&line) {
            return Vec::new();
        } else {
            eligible
        };

        let mut ranked: Vec<(f64, u64, &'a str)> = eligible
            .into_iter()
            .map(|t| {
                let distance = match (anchor, self.space.get(t)) {
                    (Some(a), Some(v)) => euclidean(a, v),
                    _ => 0.0,
                };
                (distance, rng.next_u64(), t)
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked.truncate(self.config.candidate_pool);
        let pool: Vec<&'a str> = ranked.into_iter().map(|(_, _, t)| t).collect();

        let closing_ok: Vec<&'a str> = pool
            .iter()
            .copied()
            .filter(|&c| {
                if syllables + self.syllables_of(c) + self.config.rhyme_window < target {
                    return true;
                }
                line.push(c);
                let ok = self.validator.validate(&line);
                line.pop();
                ok
            })
            .collect();
        if closing_ok.is_empty() { pool } else { closing_ok }
    }

    fn score(
        &self,
        slot: &LineSlot<'_>,
        rhyme: Option<&PhoneticAnalysis>,
        tokens: &[String],
        candidate: &str,
        value: &ValueEstimator,
        rng: &mut VerseRng,
    ) -> f64 {
        let g = -(rng.next_f64() + PATH_COST_EPS).ln();

        let mut line: Vec<&str> = tokens.iter().map(String::as_str).collect();
        line.push(candidate);
        let state = self.state_for(slot, rhyme, &line);
        let cycle = self.cycle_report(slot.history, &line);
        let cycle_penalty = if cycle.detected {
            1.0 / cycle.length.max(1) as f64
        } else {
            0.0
        };
        let aesthetic = value.estimate(Some(&state));

        let w = &self.config.weights;
        let h = w.meter * (1.0 - state.meter_score + cycle_penalty)
            + w.rhyme * (1.0 - state.rhyme_consistency)
            + w.aesthetic * (AESTHETIC_CEILING - aesthetic).max(0.0);
        g + h
    }

    fn cycle_report<S: AsRef<str>>(&self, history: &[String], line: &[S]) -> CycleReport {
        let context: Vec<&str> = history
            .iter()
            .map(String::as_str)
            .chain(line.iter().map(|t| t.as_ref()))
            .collect();
        repetition::detect(&context, self.config.max_lookback)
    }

    fn facts(&self, history: &[String], tokens: &[String], syllables: usize) -> Facts {
        let mut facts = Facts::new()
            .with(FactKey::LineSyllables, FactValue::Number(syllables as f64))
            .with(
                FactKey::TargetSyllables,
                FactValue::Number(self.config.target_syllables as f64),
            )
            .with(FactKey::LineTokens, FactValue::Number(tokens.len() as f64));

        let mut recent = history.iter().chain(tokens).rev();
        if let Some(last) = recent.next() {
            facts.insert(FactKey::LastToken, FactValue::Text(last.clone()));
        }
        if let Some(previous) = recent.next() {
            facts.insert(FactKey::PreviousToken, FactValue::Text(previous.clone()));
        }

        let cycle = self.cycle_report(history, tokens);
        facts.insert(FactKey::CycleDetected, FactValue::Flag(cycle.detected));
        facts.insert(FactKey::CycleLength, FactValue::Number(cycle.length as f64));
        facts
    }

    fn state_for<S: AsRef<str>>(
        &self,
        slot: &LineSlot<'_>,
        rhyme: Option<&PhoneticAnalysis>,
        line: &[S],
    ) -> PoeticState {
        let mut state = PoeticState::default();
        let cap = self.config.trajectory_len;
        let recent: Vec<&str> = slot
            .history
            .iter()
            .map(String::as_str)
            .chain(line.iter().map(|t| t.as_ref()))
            .collect();
        for token in &recent[recent.len().saturating_sub(cap)..] {
            if let Some(v) = self.space.get(*token) {
                state.push_vector(v.clone(), cap);
            }
        }

        let stresses: Vec<u8> = line
            .iter()
            .filter_map(|t| self.phonetics.get(t.as_ref()))
            .flat_map(|p| p.stress_pattern.iter().copied())
            .collect();
        state.meter_score = analyze_stress_pattern(&stresses);

        let syllables: usize = line.iter().map(|t| self.syllables_of(t.as_ref())).sum();
        let rhymes = match (rhyme, line.last().and_then(|t| self.phonetics.get(t.as_ref()))) {
            (Some(target), Some(last)) => {
                syllables.abs_diff(self.config.target_syllables) <= self.config.rhyme_window
                    && last.rhymes_with(target)
            }
            _ => false,
        };
        state.rhyme_consistency = if rhymes { 1.0 } else { 0.0 };

        let mut seen: BTreeSet<&str> = slot.history.iter().map(String::as_str).collect();
        let fresh = line.iter().filter(|t| seen.insert((*t).as_ref())).count();
        state.novelty = if line.is_empty() {
            0.0
        } else {
            fresh as f64 / line.len() as f64
        };

        state.line_progress = slot.index as f64 / slot.of.max(1) as f64;
        state.theme_coherence = theme_coherence(state.trajectory_mean().as_deref(), &self.centroid);
        state
    }
}

/// Batch TD(λ) pass over a finished poem: line i moves to line i+1 with the
/// line reward; the last line ends the episode. Returns the mean |δ|.
pub fn learn_from_lines(lines: &[Line], value: &mut ValueEstimator) -> f64 {
    if lines.is_empty() {
        return 0.0;
    }
    let mut total = 0.0;
    for (i, line) in lines.iter().enumerate() {
        let next = lines.get(i + 1).map(|l| &l.state);
        let done = next.is_none();
        total += value
            .update(Some(&line.state), line.state.line_reward(), next, done)
            .abs();
    }
    let mean_error = total / lines.len() as f64;
    debug!(lines = lines.len(), mean_error, "value estimator updated from poem");
    mean_error
}
