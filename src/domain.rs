//! Abstract planning domain and problem handed to the grounder.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::evaluation::Evaluations;
use crate::fact::{Fact, Literal, Object};

/// How an action's cost is determined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ActionCost {
    /// Fixed cost.
    Constant(f64),
    /// Value of a function head over the action's parameters.
    Function(Fact),
}

impl Default for ActionCost {
    fn default() -> Self {
        Self::Constant(1.0)
    }
}

/// Lifted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSchema {
    /// Action name.
    pub name: String,
    /// Parameters (variables).
    pub parameters: Vec<Object>,
    /// Leading parameters reported in the final plan.
    pub num_external_parameters: usize,
    /// Preconditions.
    pub preconditions: Vec<Literal>,
    /// Add effects.
    pub add_effects: Vec<Fact>,
    /// Delete effects.
    pub del_effects: Vec<Fact>,
    /// Cost.
    #[serde(default)]
    pub cost: ActionCost,
}

impl ActionSchema {
    /// Creates an action with the given parameter names and no conditions.
    #[must_use]
    pub fn new<S: AsRef<str>>(name: impl Into<String>, parameters: &[S]) -> Self {
        let parameters: Vec<Object> = parameters
            .iter()
            .map(|p| Object::variable(p.as_ref()))
            .collect();
        Self {
            name: name.into(),
            num_external_parameters: parameters.len(),
            parameters,
            preconditions: Vec::new(),
            add_effects: Vec::new(),
            del_effects: Vec::new(),
            cost: ActionCost::default(),
        }
    }

    /// Add a precondition.
    #[must_use]
    pub fn precondition(mut self, literal: Literal) -> Self {
        self.preconditions.push(literal);
        self
    }

    /// Add an add effect.
    #[must_use]
    pub fn add(mut self, fact: Fact) -> Self {
        self.add_effects.push(fact);
        self
    }

    /// Add a delete effect.
    #[must_use]
    pub fn delete(mut self, fact: Fact) -> Self {
        self.del_effects.push(fact);
        self
    }

    /// Set how the action is priced.
    #[must_use]
    pub fn cost(mut self, cost: ActionCost) -> Self {
        self.cost = cost;
        self
    }

    /// Restrict the parameters reported in plans to the first `n`.
    #[must_use]
    pub fn external_parameters(mut self, n: usize) -> Self {
        self.num_external_parameters = n.min(self.parameters.len());
        self
    }
}

/// Lifted derived-predicate rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxiomSchema {
    /// Rule name.
    pub name: String,
    /// Parameters (variables).
    pub parameters: Vec<Object>,
    /// Condition literals.
    pub condition: Vec<Literal>,
    /// Derived atom.
    pub derived: Fact,
}

impl AxiomSchema {
    /// Creates a rule `condition -> derived`.
    #[must_use]
    pub fn new<S: AsRef<str>>(
        name: impl Into<String>,
        parameters: &[S],
        condition: Vec<Literal>,
        derived: Fact,
    ) -> Self {
        Self {
            name: name.into(),
            parameters: parameters
                .iter()
                .map(|p| Object::variable(p.as_ref()))
                .collect(),
            condition,
            derived,
        }
    }
}

/// A planning domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    /// Domain name.
    pub name: String,
    /// Action schemas.
    pub actions: Vec<ActionSchema>,
    /// Derived-predicate rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub axioms: Vec<AxiomSchema>,
    /// Constants usable by every problem.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constants: Vec<Object>,
}

impl Domain {
    /// Creates an empty domain.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add an action schema.
    #[must_use]
    pub fn with_action(mut self, action: ActionSchema) -> Self {
        self.actions.push(action);
        self
    }

    /// Add a derived-predicate rule.
    #[must_use]
    pub fn with_axiom(mut self, axiom: AxiomSchema) -> Self {
        self.axioms.push(axiom);
        self
    }

    /// Predicates defined by rules.
    #[must_use]
    pub fn derived_predicates(&self) -> BTreeSet<String> {
        self.axioms.iter().map(|a| a.derived.predicate.clone()).collect()
    }
}

/// A planning problem over a domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    /// Initial facts.
    pub init: BTreeSet<Fact>,
    /// Initial function values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub function_values: BTreeMap<Fact, f64>,
    /// Goal literals.
    pub goal: Vec<Literal>,
    /// Use action costs; otherwise every action costs one.
    pub use_metric: bool,
}

impl Problem {
    /// Problem whose initial state is the given evaluations.
    #[must_use]
    pub fn from_evaluations(evaluations: &Evaluations, goal: Vec<Literal>, unit_costs: bool) -> Self {
        Self {
            init: evaluations.fact_set(),
            function_values: evaluations
                .functions()
                .map(|(head, v)| (head.clone(), v.value))
                .collect(),
            goal,
            use_metric: !unit_costs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_builder_collects_conditions() {
        let action = ActionSchema::new("pick", &["?o", "?g"])
            .precondition(Fact::new("grasp", vec![Object::variable("?o"), Object::variable("?g")]).positive())
            .add(Fact::new("holding", vec![Object::variable("?o")]))
            .delete(Fact::new("handempty", vec![]))
            .external_parameters(1);
        assert_eq!(action.parameters.len(), 2);
        assert_eq!(action.num_external_parameters, 1);
        assert_eq!(action.cost, ActionCost::Constant(1.0));
    }

    #[test]
    fn problem_from_evaluations_uses_metric_unless_unit() {
        let mut evaluations = Evaluations::from_init([Fact::ground("at", &["r", "l1"])]);
        evaluations.set_function(Fact::ground("dist", &["l1", "l2"]), 3.0, None);
        let problem = Problem::from_evaluations(&evaluations, vec![], false);
        assert!(problem.use_metric);
        assert_eq!(problem.function_values.len(), 1);
        assert!(!Problem::from_evaluations(&evaluations, vec![], true).use_metric);
    }
}
