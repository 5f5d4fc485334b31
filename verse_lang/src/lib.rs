// Linguistic resources for the verse engine.
//
// This crate is the engine's linguistic collaborator: it answers "how many
// syllables, where is the stress, what does it rhyme with" for any word, and
// supplies the CNF grammar the line validator parses against. It holds no
// mutable state; everything here is a pure function of its inputs.
//
// Architecture:
// - `types.rs`: `WordClass`, `LexEntry`, `PhoneticAnalysis`
// - `phonetics.rs`: orthographic syllable/stress/rhyme analysis
// - `grammar.rs`: `Grammar` (CNF rules) and the default `line_grammar`
// - `lib.rs` (this file): `Lexicon` of closed-class function words
//
// The lexicon is loaded from `data/function_words.json` via
// `Lexicon::from_json()`; `default_lexicon()` embeds that file with
// `include_str!`.

pub mod grammar;
pub mod phonetics;
pub mod types;

pub use grammar::{Grammar, GrammarError, Rhs, line_grammar};
pub use phonetics::analyze;
pub use types::{LexEntry, PhoneticAnalysis, WordClass};

use std::collections::BTreeMap;

/// The top-level JSON structure for the lexicon file.
#[derive(Debug, serde::Deserialize)]
struct LexiconFile {
    words: Vec<LexEntry>,
}

/// Closed-class function words keyed by lowercase surface form.
///
/// Words absent from the lexicon are content words.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    entries: BTreeMap<String, WordClass>,
}

impl Lexicon {
    /// Parse a lexicon from a JSON string. Later duplicates win.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: LexiconFile = serde_json::from_str(json)?;
        let entries = file
            .words
            .into_iter()
            .map(|e| (e.word.to_lowercase(), e.class))
            .collect();
        Ok(Lexicon { entries })
    }

    /// Class of a function word, or `None` for content words.
    pub fn class_of(&self, word: &str) -> Option<WordClass> {
        self.entries.get(&word.to_lowercase()).copied()
    }

    pub fn is_function_word(&self, word: &str) -> bool {
        self.class_of(word).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Load the default lexicon embedded at compile time.
///
/// Panics if the embedded JSON is malformed (should never happen in a
/// released build).
pub fn default_lexicon() -> Lexicon {
    let json = include_str!("../../data/function_words.json");
    Lexicon::from_json(json).expect("embedded function_words.json is malformed")
}
