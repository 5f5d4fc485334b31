// Chomsky-Normal-Form grammars for the line validator.
//
// A `Grammar` maps each non-terminal to an ordered list of right-hand sides.
// The `Rhs` enum makes the CNF shape structural: a production is either a
// single terminal or exactly two non-terminals, so a malformed rule cannot
// be represented once the grammar exists. `from_json` is the boundary where
// arbitrary rule lists come in; it rejects anything that is not CNF.
//
// JSON form (the shape the engine's grammar collaborator hands over):
//
//     {"start": "S", "rules": {"S": [["NP", "VP"]], "Det": [["the"]]}}
//
// A one-element RHS is a terminal, a two-element RHS is a non-terminal pair.
//
// `line_grammar` builds the default verse-line grammar used by the engine:
// any run of words that ends on a content word.
//
//     S -> F S | C S
//     S -> c            (every content word)
//     F -> f            (every function word)
//     C -> c            (every content word)
//
// Non-terminals referenced by a pair need not have productions of their own;
// such a pair simply never fires in the parser.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::Lexicon;

/// Non-terminal for a whole line in the default grammar.
pub const LINE_SYMBOL: &str = "S";
/// Non-terminal for a function word.
pub const FUNCTION_SYMBOL: &str = "F";
/// Non-terminal for a content word.
pub const CONTENT_SYMBOL: &str = "C";

/// One CNF right-hand side.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rhs {
    Terminal(String),
    Pair(String, String),
}

/// Errors raised when building a grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("start symbol is empty")]
    EmptyStart,
    #[error("start symbol {0:?} has no productions")]
    MissingStart(String),
    #[error("production for {lhs:?} has an empty symbol")]
    EmptySymbol { lhs: String },
    #[error("production for {lhs:?} has {len} symbols; CNF allows 1 or 2")]
    NotCnf { lhs: String, len: usize },
    #[error("grammar JSON is malformed: {0}")]
    Json(String),
}

/// A CNF grammar with a designated start symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    start: String,
    rules: BTreeMap<String, Vec<Rhs>>,
}

#[derive(Deserialize)]
struct GrammarFile {
    start: String,
    rules: BTreeMap<String, Vec<Vec<String>>>,
}

impl Grammar {
    /// Build a grammar, checking that every symbol is non-empty and that the
    /// start symbol has at least one production. Duplicate right-hand sides
    /// for the same non-terminal are collapsed, keeping first-seen order.
    pub fn new(
        start: impl Into<String>,
        rules: BTreeMap<String, Vec<Rhs>>,
    ) -> Result<Self, GrammarError> {
        let start = start.into();
        if start.is_empty() {
            return Err(GrammarError::EmptyStart);
        }
        let mut cleaned = BTreeMap::new();
        for (lhs, rhss) in rules {
            let mut kept: Vec<Rhs> = Vec::with_capacity(rhss.len());
            for rhs in rhss {
                let empty = match &rhs {
                    Rhs::Terminal(t) => t.is_empty(),
                    Rhs::Pair(b, c) => b.is_empty() || c.is_empty(),
                };
                if lhs.is_empty() || empty {
                    return Err(GrammarError::EmptySymbol { lhs });
                }
                if !kept.contains(&rhs) {
                    kept.push(rhs);
                }
            }
            cleaned.insert(lhs, kept);
        }
        if cleaned.get(&start).is_none_or(|r| r.is_empty()) {
            return Err(GrammarError::MissingStart(start));
        }
        Ok(Self {
            start,
            rules: cleaned,
        })
    }

    /// Parse the JSON form described in the module header.
    pub fn from_json(json: &str) -> Result<Self, GrammarError> {
        let file: GrammarFile =
            serde_json::from_str(json).map_err(|e| GrammarError::Json(e.to_string()))?;
        let mut rules = BTreeMap::new();
        for (lhs, rhss) in file.rules {
            let mut converted = Vec::with_capacity(rhss.len());
            for mut symbols in rhss {
                let rhs = match symbols.len() {
                    1 => Rhs::Terminal(symbols.remove(0)),
                    2 => {
                        let c = symbols.remove(1);
                        let b = symbols.remove(0);
                        Rhs::Pair(b, c)
                    }
                    len => return Err(GrammarError::NotCnf { lhs, len }),
                };
                converted.push(rhs);
            }
            rules.insert(lhs, converted);
        }
        Self::new(file.start, rules)
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    /// All productions, keyed by left-hand side.
    pub fn rules(&self) -> &BTreeMap<String, Vec<Rhs>> {
        &self.rules
    }

    /// Every binary production as `(lhs, left, right)`.
    pub fn binary_rules(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.rules.iter().flat_map(|(lhs, rhss)| {
            rhss.iter().filter_map(move |r| match r {
                Rhs::Pair(b, c) => Some((lhs.as_str(), b.as_str(), c.as_str())),
                Rhs::Terminal(_) => None,
            })
        })
    }

    /// Return a copy without any productions for `lhs`.
    pub fn without(&self, lhs: &str) -> Self {
        let mut rules = self.rules.clone();
        rules.remove(lhs);
        Self {
            start: self.start.clone(),
            rules,
        }
    }
}

/// Build the default verse-line grammar over `words`.
///
/// Function words (per the lexicon) become `F` terminals; all other words
/// become `C` terminals and may also close a line on their own.
pub fn line_grammar<'a>(
    lexicon: &Lexicon,
    words: impl IntoIterator<Item = &'a str>,
) -> Result<Grammar, GrammarError> {
    let mut line = vec![
        Rhs::Pair(FUNCTION_SYMBOL.to_string(), LINE_SYMBOL.to_string()),
        Rhs::Pair(CONTENT_SYMBOL.to_string(), LINE_SYMBOL.to_string()),
    ];
    let mut function = Vec::new();
    let mut content = Vec::new();
    for word in words {
        if lexicon.is_function_word(word) {
            function.push(Rhs::Terminal(word.to_string()));
        } else {
            content.push(Rhs::Terminal(word.to_string()));
            line.push(Rhs::Terminal(word.to_string()));
        }
    }

    let mut rules = BTreeMap::new();
    rules.insert(LINE_SYMBOL.to_string(), line);
    rules.insert(FUNCTION_SYMBOL.to_string(), function);
    rules.insert(CONTENT_SYMBOL.to_string(), content);
    Grammar::new(LINE_SYMBOL, rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_lexicon;

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

    #[test]
    fn test_from_json() {
        let g = Grammar::from_json(CAT_GRAMMAR).unwrap();
        assert_eq!(g.start(), "S");
        assert_eq!(g.rules().len(), 6);
        assert_eq!(g.rules()["N"], vec![Rhs::Terminal("cat".into())]);
        assert_eq!(g.binary_rules().count(), 3);
    }

    #[test]
    fn test_rejects_non_cnf() {
        let json = r#"{"start": "S", "rules": {"S": [["A", "B", "C"]]}}"#;
        assert_eq!(
            Grammar::from_json(json),
            Err(GrammarError::NotCnf {
                lhs: "S".into(),
                len: 3
            })
        );
        let json = r#"{"start": "S", "rules": {"S": [[]]}}"#;
        assert!(matches!(
            Grammar::from_json(json),
            Err(GrammarError::NotCnf { len: 0, .. })
        ));
    }

    #[test]
    fn test_rejects_missing_start() {
        let json = r#"{"start": "S", "rules": {"N": [["cat"]]}}"#;
        assert_eq!(
            Grammar::from_json(json),
            Err(GrammarError::MissingStart("S".into()))
        );
    }

    #[test]
    fn test_rejects_empty_symbol() {
        let json = r#"{"start": "S", "rules": {"S": [[""]]}}"#;
        assert!(matches!(
            Grammar::from_json(json),
            Err(GrammarError::EmptySymbol { .. })
        ));
    }

    #[test]
    fn test_without_drops_rule() {
        let g = Grammar::from_json(CAT_GRAMMAR).unwrap().without("VP");
        assert!(!g.rules().contains_key("VP"));
        assert_eq!(g.binary_rules().count(), 2);
    }

    #[test]
    fn test_line_grammar_classes() {
        let lex = default_lexicon();
        let g = line_grammar(&lex, ["the", "moon", "and", "sea"]).unwrap();
        let moon = Rhs::Terminal("moon".into());
        let the = Rhs::Terminal("the".into());
        assert!(g.rules()[FUNCTION_SYMBOL].contains(&the));
        assert!(!g.rules()[CONTENT_SYMBOL].contains(&the));
        assert!(g.rules()[CONTENT_SYMBOL].contains(&moon));
        assert!(g.rules()[LINE_SYMBOL].contains(&moon));
        assert!(!g.rules()[LINE_SYMBOL].contains(&the));
    }
}
