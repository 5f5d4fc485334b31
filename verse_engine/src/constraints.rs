// Forward-chaining constraint checks over a small, typed fact set.
//
// A rule has a name, ordered conditions and an action. Each condition names
// one `FactKey` and a predicate over its value; a rule is *applicable* when
// every condition holds, and a missing fact fails its condition. The action
// is the requirement an applicable rule enforces: the search rolls back its
// last token whenever an applicable rule's action returns false.
//
// Facts use a closed key enum instead of free-form records. Registration
// checks each rule once (unique non-empty name, at least one condition, no
// key tested twice, and every key the action reads is also a condition key)
// so evaluation never meets an undeclared or absent fact.
//
// There are no alpha/beta memories: every `evaluate` call re-tests every
// rule from scratch. Fact sets describe one decision point and stay small.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{EngineError, Result};

/// The facts a verse decision point can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FactKey {
    /// Token just appended.
    LastToken,
    /// Token before it in the poem history.
    PreviousToken,
    /// Syllables in the current line, including the last token.
    LineSyllables,
    /// Syllable target for the line.
    TargetSyllables,
    /// Tokens in the current line.
    LineTokens,
    /// Whether the repetition detector fired on the history.
    CycleDetected,
    /// Its reported cycle length (0 when not detected).
    CycleLength,
}

/// A fact value.
#[derive(Clone, Debug, PartialEq)]
pub enum FactValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl FactValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FactValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FactValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FactValue::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

/// Keyed fact set for one decision point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Facts {
    values: BTreeMap<FactKey, FactValue>,
}

impl Facts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: FactKey, value: FactValue) -> Self {
        self.values.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: FactKey, value: FactValue) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: FactKey) -> Option<&FactValue> {
        self.values.get(&key)
    }

    pub fn text(&self, key: FactKey) -> Option<&str> {
        self.get(key).and_then(FactValue::as_text)
    }

    pub fn number(&self, key: FactKey) -> Option<f64> {
        self.get(key).and_then(FactValue::as_number)
    }

    pub fn flag(&self, key: FactKey) -> Option<bool> {
        self.get(key).and_then(FactValue::as_flag)
    }
}

type Predicate = Box<dyn Fn(&FactValue) -> bool + Send + Sync>;
type Action = Box<dyn Fn(&Facts) -> bool + Send + Sync>;

struct Condition {
    key: FactKey,
    predicate: Predicate,
}

/// A registered rule. Build with `ConstraintRule::builder`.
pub struct ConstraintRule {
    name: String,
    conditions: Vec<Condition>,
    reads: Vec<FactKey>,
    action: Action,
}

impl fmt::Debug for ConstraintRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintRule")
            .field("name", &self.name)
            .field(
                "conditions",
                &self.conditions.iter().map(|c| c.key).collect::<Vec<_>>(),
            )
            .field("reads", &self.reads)
            .finish()
    }
}

impl ConstraintRule {
    pub fn builder(name: impl Into<String>) -> RuleBuilder {
        RuleBuilder {
            name: name.into(),
            conditions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Condition keys in declaration order.
    pub fn condition_keys(&self) -> impl Iterator<Item = FactKey> + '_ {
        self.conditions.iter().map(|c| c.key)
    }

    /// Whether every condition holds. Missing facts fail.
    pub fn applies(&self, facts: &Facts) -> bool {
        self.conditions
            .iter()
            .all(|c| facts.get(c.key).is_some_and(|v| (c.predicate)(v)))
    }

    /// Run the action predicate.
    pub fn holds(&self, facts: &Facts) -> bool {
        (self.action)(facts)
    }
}

/// Accumulates conditions, then takes the action to produce a rule.
pub struct RuleBuilder {
    name: String,
    conditions: Vec<Condition>,
}

impl RuleBuilder {
    pub fn when(
        mut self,
        key: FactKey,
        predicate: impl Fn(&FactValue) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.conditions.push(Condition {
            key,
            predicate: Box::new(predicate),
        });
        self
    }

    /// Finish the rule. `reads` lists the keys the action looks at.
    pub fn then(
        self,
        reads: &[FactKey],
        action: impl Fn(&Facts) -> bool + Send + Sync + 'static,
    ) -> ConstraintRule {
        ConstraintRule {
            name: self.name,
            conditions: self.conditions,
            reads: reads.to_vec(),
            action: Box::new(action),
        }
    }
}

/// Ordered set of registered rules.
#[derive(Debug, Default)]
pub struct ConstraintEngine {
    rules: Vec<ConstraintRule>,
}

impl ConstraintEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a rule.
    pub fn register(&mut self, rule: ConstraintRule) -> Result<()> {
        let invalid = |reason: &str| EngineError::InvalidRule {
            name: rule.name.clone(),
            reason: reason.to_string(),
        };
        if rule.name.trim().is_empty() {
            return Err(invalid("empty name"));
        }
        if self.rules.iter().any(|r| r.name == rule.name) {
            return Err(invalid("name already registered"));
        }
        if rule.conditions.is_empty() {
            return Err(invalid("no conditions"));
        }
        let mut seen = Vec::with_capacity(rule.conditions.len());
        for key in rule.condition_keys() {
            if seen.contains(&key) {
                return Err(invalid(&format!("{key:?} tested twice")));
            }
            seen.push(key);
        }
        if let Some(key) = rule.reads.iter().find(|k| !seen.contains(k)) {
            return Err(invalid(&format!("action reads undeclared fact {key:?}")));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn rules(&self) -> &[ConstraintRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every rule whose conditions all hold, in registration order.
    pub fn evaluate(&self, facts: &Facts) -> Vec<&ConstraintRule> {
        self.rules.iter().filter(|r| r.applies(facts)).collect()
    }

    /// Names of applicable rules whose action fails.
    pub fn check(&self, facts: &Facts) -> Vec<String> {
        self.evaluate(facts)
            .into_iter()
            .filter(|r| !r.holds(facts))
            .map(|r| r.name.clone())
            .collect()
    }
}

/// The rules the line search registers on every engine.
pub fn verse_rules(syllable_tolerance: usize) -> Vec<ConstraintRule> {
    let tolerance = syllable_tolerance as f64;
    vec![
        ConstraintRule::builder("no-adjacent-repeat")
            .when(FactKey::LastToken, |v| v.as_text().is_some())
            .when(FactKey::PreviousToken, |v| v.as_text().is_some())
            .then(&[FactKey::LastToken, FactKey::PreviousToken], |f| {
                f.text(FactKey::LastToken) != f.text(FactKey::PreviousToken)
            }),
        ConstraintRule::builder("syllable-ceiling")
            .when(FactKey::LineSyllables, |v| v.as_number().is_some())
            .when(FactKey::TargetSyllables, |v| v.as_number().is_some())
            .then(&[FactKey::LineSyllables, FactKey::TargetSyllables], move |f| {
                match (
                    f.number(FactKey::LineSyllables),
                    f.number(FactKey::TargetSyllables),
                ) {
                    (Some(line), Some(target)) => line <= target + tolerance,
                    _ => true,
                }
            }),
        ConstraintRule::builder("no-unit-cycle")
            .when(FactKey::CycleDetected, |v| v.as_flag() == Some(true))
            .when(FactKey::CycleLength, |v| v.as_number().is_some())
            .then(&[FactKey::CycleLength], |f| {
                f.number(FactKey::CycleLength).is_some_and(|n| n >= 2.0)
            }),
    ]
}
