// CYK membership test for Chomsky-Normal-Form grammars.
//
// For a token sequence of length n the parser fills an n×n upper-triangular
// chart whose cell (i, j) holds every non-terminal deriving tokens i..=j.
// The diagonal comes from terminal productions; longer spans are built in
// order of increasing length by trying every split point k and every binary
// rule `A -> B C` with B in (i, k) and C in (k+1, j). The sequence is
// accepted iff the start symbol lands in (0, n-1).
//
// Running time is Θ(n³·|binary rules|); the full rule list is scanned at
// every split. Empty input is rejected.
//
// Non-terminals are interned to indices once, at construction, so a chart
// cell is a fixed-size bit row rather than a set of strings. Terminal
// productions are indexed by terminal for the same reason: line grammars
// carry one production per vocabulary word.
//
// `is_viable_prefix` answers the search's question "can this partial line
// still become a sentence?". Over the same chart it computes, for each
// suffix start i, the symbols deriving tokens i.. followed by any
// continuation: an exact chart entry, `A -> B C` with B exact on i..=k and
// C open at k+1, or `A -> B C` with B open at i and C productive (deriving
// at least one terminal string).

use std::collections::{BTreeMap, BTreeSet};

use verse_lang::{Grammar, Rhs};

/// A grammar prepared for repeated CYK parses.
#[derive(Clone, Debug)]
pub struct GrammarValidator {
    grammar: Grammar,
    symbols: Vec<String>,
    terminals: BTreeMap<String, Vec<usize>>,
    binary: Vec<(usize, usize, usize)>,
    productive: Vec<bool>,
    start: usize,
}

impl GrammarValidator {
    pub fn new(grammar: Grammar) -> Self {
        let mut symbols: Vec<String> = Vec::new();
        let mut index: BTreeMap<String, usize> = BTreeMap::new();
        let mut intern = |s: &str| -> usize {
            if let Some(&i) = index.get(s) {
                return i;
            }
            let i = symbols.len();
            symbols.push(s.to_string());
            index.insert(s.to_string(), i);
            i
        };

        let start = intern(grammar.start());
        let mut terminals: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (lhs, rhss) in grammar.rules() {
            let a = intern(lhs);
            for rhs in rhss {
                if let Rhs::Terminal(t) = rhs {
                    terminals.entry(t.clone()).or_default().push(a);
                }
            }
        }
        let binary: Vec<(usize, usize, usize)> = grammar
            .binary_rules()
            .map(|(a, b, c)| (intern(a), intern(b), intern(c)))
            .collect();

        let mut productive = vec![false; symbols.len()];
        for &a in terminals.values().flatten() {
            productive[a] = true;
        }
        loop {
            let mut changed = false;
            for &(a, b, c) in &binary {
                if !productive[a] && productive[b] && productive[c] {
                    productive[a] = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        Self {
            grammar,
            symbols,
            terminals,
            binary,
            productive,
            start,
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Whether the grammar derives `tokens` from its start symbol.
    pub fn validate<S: AsRef<str>>(&self, tokens: &[S]) -> bool {
        match self.fill(tokens) {
            Some(chart) => chart[0][tokens.len() - 1][self.start],
            None => false,
        }
    }

    /// Whether some sentence of the grammar begins with `tokens`. The empty
    /// prefix is viable when the start symbol derives anything at all.
    pub fn is_viable_prefix<S: AsRef<str>>(&self, tokens: &[S]) -> bool {
        let Some(chart) = self.fill(tokens) else {
            return self.productive[self.start];
        };
        let n = tokens.len();
        let mut open = vec![vec![false; self.symbols.len()]; n];
        for i in (0..n).rev() {
            open[i].clone_from(&chart[i][n - 1]);
            loop {
                let mut changed = false;
                for &(a, b, c) in &self.binary {
                    if open[i][a] {
                        continue;
                    }
                    let fires = (open[i][b] && self.productive[c])
                        || (i..n - 1).any(|k| chart[i][k][b] && open[k + 1][c]);
                    if fires {
                        open[i][a] = true;
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }
        }
        open[0][self.start]
    }

    /// The filled chart as symbol sets, `chart[i][j]` for `i <= j`.
    /// Cells below the diagonal are empty. Empty input gives an empty chart.
    pub fn chart<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<Vec<BTreeSet<String>>> {
        let Some(chart) = self.fill(tokens) else {
            return Vec::new();
        };
        chart
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| {
                        cell.iter()
                            .enumerate()
                            .filter(|&(_, &present)| present)
                            .map(|(i, _)| self.symbols[i].clone())
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }

    fn fill<S: AsRef<str>>(&self, tokens: &[S]) -> Option<Vec<Vec<Vec<bool>>>> {
        let n = tokens.len();
        if n == 0 {
            return None;
        }
        let m = self.symbols.len();
        let mut chart = vec![vec![vec![false; m]; n]; n];

        for (i, token) in tokens.iter().enumerate() {
            for &a in self.terminals.get(token.as_ref()).into_iter().flatten() {
                chart[i][i][a] = true;
            }
        }

        for span in 2..=n {
            for i in 0..=(n - span) {
                let j = i + span - 1;
                for k in i..j {
                    for &(a, b, c) in &self.binary {
                        if chart[i][k][b] && chart[k + 1][j][c] {
                            chart[i][j][a] = true;
                        }
                    }
                }
            }
        }
        Some(chart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verse_lang::{default_lexicon, line_grammar};

    const CAT_GRAMMAR: &str = r#"{
        "start": "S",
        "rules": {
            "S": [["NP", "VP"]],
            "NP": [["Det", "N"]],
            "VP": [["V", "NP"]],
            "Det": [["the"]],
            "N": [["cat"]],
            "V": [["chased"]]
        }
    }"#;

    fn cat_validator() -> GrammarValidator {
        GrammarValidator::new(Grammar::from_json(CAT_GRAMMAR).unwrap())
    }

    #[test]
    fn test_accepts_sentence() {
        let v = cat_validator();
        assert!(v.validate(&["the", "cat", "chased", "the", "cat"]));
    }

    #[test]
    fn test_rejects_without_vp_rule() {
        let grammar = Grammar::from_json(CAT_GRAMMAR).unwrap().without("VP");
        let v = GrammarValidator::new(grammar);
        assert!(!v.validate(&["the", "cat", "chased", "the", "cat"]));
    }

    #[test]
    fn test_rejects_empty_and_fragments() {
        let v = cat_validator();
        assert!(!v.validate::<&str>(&[]));
        assert!(!v.validate(&["the", "cat"]));
        assert!(!v.validate(&["cat", "the", "chased", "the", "cat"]));
        assert!(!v.validate(&["the", "dog", "chased", "the", "cat"]));
    }

    #[test]
    fn test_chart_cells() {
        let v = cat_validator();
        let chart = v.chart(&["the", "cat", "chased", "the", "cat"]);
        assert!(chart[0][0].contains("Det"));
        assert!(chart[0][1].contains("NP"));
        assert!(chart[2][4].contains("VP"));
        assert!(chart[0][4].contains("S"));
        assert!(chart[1][2].is_empty());
        assert!(v.chart::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_viable_prefixes() {
        let v = cat_validator();
        assert!(v.is_viable_prefix::<&str>(&[]));
        assert!(v.is_viable_prefix(&["the"]));
        assert!(v.is_viable_prefix(&["the", "cat", "chased"]));
        assert!(v.is_viable_prefix(&["the", "cat", "chased", "the", "cat"]));
        assert!(!v.is_viable_prefix(&["cat"]));
        assert!(!v.is_viable_prefix(&["the", "chased"]));
        assert!(!v.is_viable_prefix(&["the", "cat", "chased", "the", "cat", "the"]));
    }

    #[test]
    fn test_unproductive_start_has_no_viable_prefix() {
        // Without VP the start symbol derives nothing.
        let grammar = Grammar::from_json(CAT_GRAMMAR).unwrap().without("VP");
        let v = GrammarValidator::new(grammar);
        assert!(!v.is_viable_prefix::<&str>(&[]));
        assert!(!v.is_viable_prefix(&["the", "cat"]));
    }

    #[test]
    fn test_line_grammar_prefixes_stay_open() {
        let lex = default_lexicon();
        let v = GrammarValidator::new(line_grammar(&lex, ["the", "moon", "and"]).unwrap());
        assert!(v.is_viable_prefix(&["the", "and"]));
        assert!(v.is_viable_prefix(&["moon", "the"]));
        assert!(!v.is_viable_prefix(&["the", "stranger"]));

        let only_function = GrammarValidator::new(line_grammar(&lex, ["the", "and"]).unwrap());
        assert!(!only_function.is_viable_prefix(&["the"]));
    }

    #[test]
    fn test_line_grammar_requires_content_ending() {
        let lex = default_lexicon();
        let words = ["the", "moon", "over", "silver", "sea", "and"];
        let v = GrammarValidator::new(line_grammar(&lex, words).unwrap());
        assert!(v.validate(&["the", "moon", "over", "the", "silver", "sea"]));
        assert!(v.validate(&["moon"]));
        assert!(!v.validate(&["the", "moon", "and"]));
        assert!(!v.validate(&["the"]));
        assert!(!v.validate(&["the", "unknown"]));
    }
}
