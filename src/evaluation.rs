//! Evaluations: facts known (or optimistically assumed) to hold.
//!
//! Each fact is tagged with the result that produced it; untagged facts belong
//! to the initial state. Function heads carry a numeric value the same way.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::fact::Fact;
use crate::stream::{ResultId, StreamRegistry};

/// Value of a function head.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FunctionValue {
    /// Numeric value.
    pub value: f64,
    /// Result that computed it, if any.
    pub result: Option<ResultId>,
}

/// A set of evaluations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluations {
    facts: BTreeMap<Fact, Option<ResultId>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    functions: BTreeMap<Fact, FunctionValue>,
}

impl Evaluations {
    /// Create an empty evaluation set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluations holding `facts` as the initial state.
    #[must_use]
    pub fn from_init(facts: impl IntoIterator<Item = Fact>) -> Self {
        Self {
            facts: facts.into_iter().map(|f| (f, None)).collect(),
            functions: BTreeMap::new(),
        }
    }

    /// Add a fact. An existing entry keeps its original achiever.
    pub fn insert(&mut self, fact: Fact, achiever: Option<ResultId>) {
        self.facts.entry(fact).or_insert(achiever);
    }

    /// Set the value of a function head. An existing entry is kept.
    pub fn set_function(&mut self, head: Fact, value: f64, result: Option<ResultId>) {
        self.functions
            .entry(head)
            .or_insert(FunctionValue { value, result });
    }

    /// Whether `fact` is known.
    #[must_use]
    pub fn contains(&self, fact: &Fact) -> bool {
        self.facts.contains_key(fact)
    }

    /// Achiever of a fact: `Some(None)` for an initial fact, `None` if unknown.
    #[must_use]
    pub fn achiever(&self, fact: &Fact) -> Option<Option<ResultId>> {
        self.facts.get(fact).copied()
    }

    /// Known value of a function head.
    #[must_use]
    pub fn function(&self, head: &Fact) -> Option<FunctionValue> {
        self.functions.get(head).copied()
    }

    /// All facts in order.
    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts.keys()
    }

    /// All facts with their achievers.
    pub fn iter(&self) -> impl Iterator<Item = (&Fact, Option<ResultId>)> {
        self.facts.iter().map(|(f, r)| (f, *r))
    }

    /// All function values.
    pub fn functions(&self) -> impl Iterator<Item = (&Fact, &FunctionValue)> {
        self.functions.iter()
    }

    /// Number of known facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Whether no fact is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Fact set without achiever tags.
    #[must_use]
    pub fn fact_set(&self) -> BTreeSet<Fact> {
        self.facts.keys().cloned().collect()
    }

    /// Distinct results that achieved some evaluation, in fact order.
    #[must_use]
    pub fn achieved_results(&self) -> Vec<ResultId> {
        let mut seen = BTreeSet::new();
        self.facts
            .values()
            .chain(self.functions.values().map(|v| &v.result))
            .filter_map(|r| *r)
            .filter(|r| seen.insert(*r))
            .collect()
    }

    /// Only the evaluations that are not produced by a result.
    #[must_use]
    pub fn initial_only(&self) -> Self {
        Self {
            facts: self
                .facts
                .iter()
                .filter(|(_, r)| r.is_none())
                .map(|(f, _)| (f.clone(), None))
                .collect(),
            functions: self
                .functions
                .iter()
                .filter(|(_, v)| v.result.is_none())
                .map(|(h, v)| (h.clone(), *v))
                .collect(),
        }
    }

    /// Copy of these evaluations extended with everything `results` certify.
    #[must_use]
    pub fn with_results(&self, registry: &StreamRegistry, results: &[ResultId]) -> Self {
        let mut extended = self.clone();
        for &result in results {
            extended.apply_result(registry, result);
        }
        extended
    }

    /// Add the facts (or function value) certified by `result`.
    pub fn apply_result(&mut self, registry: &StreamRegistry, result: ResultId) {
        if let (Some(head), Some(value)) = (registry.function_head(result), registry[result].value) {
            self.set_function(head, value, Some(result));
            return;
        }
        for fact in registry.certified(result) {
            self.insert(fact, Some(result));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::Object;
    use crate::stream::Sampler;

    #[test]
    fn initial_facts_have_no_achiever() {
        let evaluations = Evaluations::from_init([Fact::ground("on", &["a", "table"])]);
        assert_eq!(
            evaluations.achiever(&Fact::ground("on", &["a", "table"])),
            Some(None)
        );
        assert_eq!(evaluations.achiever(&Fact::ground("on", &["b", "table"])), None);
    }

    #[test]
    fn applying_results_tags_certified_facts() {
        let mut registry = StreamRegistry::new();
        let s = registry.add_sampler(
            Sampler::stream("move")
                .inputs(&["?x"])
                .certified(Fact::new(
                    "on",
                    vec![Object::variable("?x"), Object::constant("table")],
                ))
                .build()
                .unwrap(),
        );
        let inst = registry.get_instance(s, vec![Object::constant("b")], vec![]).unwrap();
        let r = registry.add_result(inst, None, 0).unwrap();

        let init = Evaluations::from_init([Fact::ground("on", &["a", "table"])]);
        let opt = init.with_results(&registry, &[r]);
        assert_eq!(opt.achiever(&Fact::ground("on", &["b", "table"])), Some(Some(r)));
        assert_eq!(opt.achieved_results(), vec![r]);
        assert_eq!(opt.initial_only(), init);
    }

    #[test]
    fn existing_achiever_is_kept() {
        let mut evaluations = Evaluations::new();
        let fact = Fact::ground("p", &["x"]);
        evaluations.insert(fact.clone(), None);
        evaluations.insert(fact.clone(), Some(ResultId::from_index(4)));
        assert_eq!(evaluations.achiever(&fact), Some(None));
    }
}
