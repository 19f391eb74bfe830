//! Grounded planning task produced by a grounder.
//!
//! Operators live in an arena and are addressed by [`OperatorId`]. Rewrites
//! during recovery push a modified copy and swap the handle in the plan; the
//! grounder's original operator is never mutated after search.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::RecoveryError;
use crate::fact::{Fact, Literal, Object};

/// Handle to a grounded operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorId(usize);

impl OperatorId {
    /// Handle of the operator at `index`.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// An instantiated action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundedOperator {
    /// Unique operator name.
    pub name: String,
    /// Name of the schema it was grounded from (`None` for synthetic operators).
    pub schema: Option<String>,
    /// Schema parameter names in order.
    pub parameters: Vec<String>,
    /// Leading parameters reported in plans.
    pub num_external_parameters: usize,
    /// Parameter bindings.
    pub bindings: BTreeMap<String, Object>,
    /// Preconditions.
    pub preconditions: Vec<Literal>,
    /// Add effects.
    pub add_effects: Vec<Fact>,
    /// Delete effects.
    pub del_effects: Vec<Fact>,
    /// Scaled integer cost.
    pub cost: i64,
    /// Grounded cost function head, if the cost came from a function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_function: Option<Fact>,
}

impl GroundedOperator {
    /// Pseudo-operator whose preconditions are the goal.
    #[must_use]
    pub fn goal(goal: &[Literal]) -> Self {
        Self {
            name: "@goal".to_string(),
            schema: None,
            parameters: Vec::new(),
            num_external_parameters: 0,
            bindings: BTreeMap::new(),
            preconditions: goal.to_vec(),
            add_effects: Vec::new(),
            del_effects: Vec::new(),
            cost: 0,
            cost_function: None,
        }
    }

    /// Objects bound to the external parameters.
    pub fn external_args(&self) -> Result<Vec<Object>, RecoveryError> {
        self.parameters
            .iter()
            .take(self.num_external_parameters)
            .map(|p| {
                self.bindings
                    .get(p)
                    .cloned()
                    .ok_or_else(|| RecoveryError::MissingBinding {
                        name: self.name.clone(),
                        parameter: p.clone(),
                    })
            })
            .collect()
    }

    /// True if every precondition holds in `state`.
    #[must_use]
    pub fn applicable(&self, state: &BTreeSet<Fact>) -> bool {
        self.preconditions.iter().all(|l| literal_holds(state, l))
    }

    /// Applies deletes, then adds.
    pub fn apply(&self, state: &mut BTreeSet<Fact>) {
        for fact in &self.del_effects {
            state.remove(fact);
        }
        for fact in &self.add_effects {
            state.insert(fact.clone());
        }
    }
}

/// An instantiated derived-predicate rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundedAxiom {
    /// Rule name.
    pub name: String,
    /// Condition literals.
    pub condition: Vec<Literal>,
    /// Derived atom.
    pub effect: Fact,
}

/// Output of a grounder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundedTask {
    /// Initial state.
    pub init: BTreeSet<Fact>,
    /// Goal.
    pub goal: Vec<Literal>,
    /// Operator arena.
    pub operators: Vec<GroundedOperator>,
    /// Derived-predicate rules.
    pub axioms: Vec<GroundedAxiom>,
    /// Atoms the task may mention.
    pub atoms: BTreeSet<Fact>,
    /// Whether operator costs are meaningful.
    pub use_metric: bool,
}

impl GroundedTask {
    /// Appends an operator and returns its handle.
    pub fn push_operator(&mut self, operator: GroundedOperator) -> OperatorId {
        let id = OperatorId::from_index(self.operators.len());
        self.operators.push(operator);
        id
    }

    /// Predicates defined by the task's rules.
    #[must_use]
    pub fn derived_predicates(&self) -> BTreeSet<String> {
        self.axioms.iter().map(|a| a.effect.predicate.clone()).collect()
    }

    /// Closes `state` under the task's rules.
    ///
    /// Negative conditions are evaluated against the closure built so far,
    /// which is exact for stratified rule sets whose negations only mention
    /// basic predicates.
    #[must_use]
    pub fn derive(&self, state: &BTreeSet<Fact>) -> BTreeSet<Fact> {
        let mut closed = state.clone();
        loop {
            let mut changed = false;
            for axiom in &self.axioms {
                if !closed.contains(&axiom.effect)
                    && axiom.condition.iter().all(|l| literal_holds(&closed, l))
                {
                    closed.insert(axiom.effect.clone());
                    changed = true;
                }
            }
            if !changed {
                return closed;
            }
        }
    }
}

impl Index<OperatorId> for GroundedTask {
    type Output = GroundedOperator;

    fn index(&self, id: OperatorId) -> &GroundedOperator {
        &self.operators[id.index()]
    }
}

/// Closed-world truth of `literal` in `state`.
#[must_use]
pub fn literal_holds(state: &BTreeSet<Fact>, literal: &Literal) -> bool {
    literal.holds_in(|f| state.contains(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(name: &str, pre: Vec<Literal>, add: Vec<Fact>, del: Vec<Fact>) -> GroundedOperator {
        GroundedOperator {
            name: name.to_string(),
            schema: Some(name.to_string()),
            parameters: Vec::new(),
            num_external_parameters: 0,
            bindings: BTreeMap::new(),
            preconditions: pre,
            add_effects: add,
            del_effects: del,
            cost: 1,
            cost_function: None,
        }
    }

    #[test]
    fn apply_deletes_before_adding() {
        let p = Fact::ground("p", &["a"]);
        let toggle = op("toggle", vec![], vec![p.clone()], vec![p.clone()]);
        let mut state = BTreeSet::new();
        toggle.apply(&mut state);
        assert!(state.contains(&p));
    }

    #[test]
    fn derive_reaches_fixed_point() {
        let mut task = GroundedTask::default();
        task.axioms.push(GroundedAxiom {
            name: "r1".to_string(),
            condition: vec![Fact::ground("p", &["a"]).positive()],
            effect: Fact::ground("q", &["a"]),
        });
        task.axioms.push(GroundedAxiom {
            name: "r2".to_string(),
            condition: vec![
                Fact::ground("q", &["a"]).positive(),
                Fact::ground("blocked", &["a"]).negative(),
            ],
            effect: Fact::ground("r", &["a"]),
        });
        let state: BTreeSet<Fact> = [Fact::ground("p", &["a"])].into_iter().collect();
        let closed = task.derive(&state);
        assert!(closed.contains(&Fact::ground("r", &["a"])));
        assert_eq!(task.derived_predicates().len(), 2);
    }

    #[test]
    fn external_args_follow_parameter_order() {
        let mut o = op("move", vec![], vec![], vec![]);
        o.parameters = vec!["?x".to_string(), "?t".to_string()];
        o.num_external_parameters = 1;
        o.bindings.insert("?x".to_string(), Object::constant("b"));
        o.bindings.insert("?t".to_string(), Object::constant("t0"));
        assert_eq!(o.external_args().unwrap(), vec![Object::constant("b")]);

        o.bindings.remove("?x");
        assert!(o.external_args().is_err());
    }
}
