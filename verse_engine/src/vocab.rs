// Corpus tokenization, fingerprinting and the capped vocabulary.
//
// Tokens are lowercase alphabetic runs; apostrophes are kept inside a word
// ("don't", "o'er") and stripped at its edges. Everything else separates
// tokens.
//
// The corpus fingerprint is a polynomial rolling hash over the raw line
// bytes with a separator between lines. It is only used to decide whether
// a `train` call can reuse the fitted model, so speed matters more than
// collision resistance.
//
// `Vocabulary` is a snapshot: building, capping and merging all return a new
// value, which keeps the incremental-vs-rebuild contract in `engine.rs`
// explicit. Token order is BTreeMap order, so iteration is deterministic.

use std::collections::BTreeMap;

const FINGERPRINT_SEED: u64 = 0xcbf2_9ce4_8422_2325;
const FINGERPRINT_BASE: u64 = 0x0000_0100_0000_01b3;
const LINE_SEPARATOR: u64 = 0x0a;

/// Split a line into lowercase word tokens.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split(|c: char| !(c.is_alphabetic() || c == '\''))
        .map(|raw| raw.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Rolling hash of a corpus, sensitive to line order and line breaks.
pub fn fingerprint(lines: &[String]) -> u64 {
    extend_fingerprint(FINGERPRINT_SEED, lines)
}

/// Continue a fingerprint with more lines. Extending the fingerprint of `a`
/// with `b` gives the fingerprint of `a` followed by `b`.
pub fn extend_fingerprint(previous: u64, lines: &[String]) -> u64 {
    let mut h = previous;
    for line in lines {
        for &b in line.as_bytes() {
            h = h.wrapping_mul(FINGERPRINT_BASE).wrapping_add(u64::from(b));
        }
        h = h.wrapping_mul(FINGERPRINT_BASE).wrapping_add(LINE_SEPARATOR);
    }
    h
}

/// Token occurrence counts, capped by frequency rank.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Vocabulary {
    counts: BTreeMap<String, u64>,
}

impl Vocabulary {
    /// Count the tokens of `lines` and keep the `cap` most frequent.
    pub fn build(lines: &[String], cap: usize) -> Self {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for line in lines {
            for token in tokenize(line) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }
        Self::from_counts(counts, cap)
    }

    /// Wrap existing counts, keeping the `cap` most frequent. Ties on count
    /// are broken by token order so the cut is deterministic.
    pub fn from_counts(counts: BTreeMap<String, u64>, cap: usize) -> Self {
        if counts.len() <= cap {
            return Self { counts };
        }
        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(cap);
        Self {
            counts: ranked.into_iter().collect(),
        }
    }

    /// A new vocabulary holding the summed counts of both, re-capped.
    pub fn merged(&self, other: &Vocabulary, cap: usize) -> Vocabulary {
        let mut counts = self.counts.clone();
        for (token, &n) in &other.counts {
            *counts.entry(token.clone()).or_insert(0) += n;
        }
        Self::from_counts(counts, cap)
    }

    pub fn count(&self, token: &str) -> Option<u64> {
        self.counts.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.counts.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Tokens in lexicographic order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    /// `(token, count)` pairs in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(t, &n)| (t.as_str(), n))
    }

    /// Tokens by descending count, ties in lexicographic order.
    pub fn by_frequency(&self) -> Vec<(&str, u64)> {
        let mut ranked: Vec<(&str, u64)> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}
