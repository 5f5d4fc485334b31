// Core linguistic types: closed-class word categories, lexicon entries, and
// the per-word phonetic analysis record.
//
// `WordClass` and `LexEntry` describe the function-word lexicon loaded from
// `data/function_words.json`. Anything not in that lexicon is treated as a
// content word by both the phonetic analyzer (monosyllabic content words
// carry stress) and the default line grammar (a line must end on one).
//
// `PhoneticAnalysis` is the record handed to the engine for syllable
// counting, stress patterns, and rhyme-part comparison.

use serde::{Deserialize, Serialize};

/// Closed-class category of a function word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordClass {
    Determiner,
    Preposition,
    Conjunction,
    Pronoun,
    Auxiliary,
    Particle,
}

/// A JSON-loadable function-word entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexEntry {
    /// Lowercase surface form.
    pub word: String,
    /// Closed-class category.
    pub class: WordClass,
}

/// Phonetic breakdown of one word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneticAnalysis {
    /// Orthographic approximation of the phoneme sequence: alternating
    /// consonant and vowel clusters, e.g. `night` -> `["n", "i", "ght"]`.
    pub phonemes: Vec<String>,
    /// Number of syllables. Zero only for words without letters.
    pub syllable_count: usize,
    /// One entry per syllable: 1 = stressed, 0 = unstressed.
    pub stress_pattern: Vec<u8>,
    /// Suffix from the last sounded vowel group to the end of the word.
    pub rhyme_part: String,
}

impl PhoneticAnalysis {
    /// Whether two analyses share a non-empty rhyme part.
    pub fn rhymes_with(&self, other: &PhoneticAnalysis) -> bool {
        !self.rhyme_part.is_empty() && self.rhyme_part == other.rhyme_part
    }
}
