//! Optimizer groups and the global constraints they induce.
//!
//! An optimizer jointly constrains the outputs of several samplers. When one
//! of its constraint streams is exhausted, every combination of outputs it was
//! asked about is known to be infeasible; the scheduler encodes that as a
//! [`GlobalConstraint`] which is lowered to a derived-predicate rule deriving
//! the `unsatisfiable` sentinel.

use serde::{Deserialize, Serialize};

use crate::fact::{Fact, Literal, Placeholder};
use crate::task::GroundedAxiom;

use super::{InstanceId, OptimizerId};

/// A constraint stream of an optimizer: one instance whose outputs range over
/// the outputs of other (variable) instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintStream {
    /// The optimizer's own instance; its exhaustion state drives blocking.
    pub instance: InstanceId,
    /// Output slots of the variable instances this stream binds.
    pub outputs: Vec<Placeholder>,
    /// Constraint facts over `outputs`.
    pub constraints: Vec<Fact>,
}

/// A group of samplers subject to shared global constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Optimizer {
    /// Optimizer handle.
    pub id: OptimizerId,
    /// Optimizer name.
    pub name: String,
    /// Constraint streams.
    pub constraint_streams: Vec<ConstraintStream>,
}

/// Hard global constraints injected into a step-local grounded search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GlobalConstraint {
    /// The conjunction `condition` must never hold.
    BlockBindings {
        /// Optimizer that proved the bindings infeasible.
        optimizer: OptimizerId,
        /// Literals describing the blocked bindings.
        condition: Vec<Literal>,
    },
}

impl GlobalConstraint {
    /// Lowers the constraint to a rule deriving `unsatisfiable()`.
    #[must_use]
    pub fn to_axiom(&self) -> GroundedAxiom {
        match self {
            Self::BlockBindings {
                optimizer,
                condition,
            } => GroundedAxiom {
                name: format!("block-{optimizer}"),
                condition: condition.clone(),
                effect: Fact::unsatisfiable(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_bindings_derives_sentinel() {
        let constraint = GlobalConstraint::BlockBindings {
            optimizer: OptimizerId::from_index(2),
            condition: vec![Fact::ground("cfree", &["p1", "p2"]).positive()],
        };
        let axiom = constraint.to_axiom();
        assert_eq!(axiom.effect, Fact::unsatisfiable());
        assert_eq!(axiom.name, "block-o2");
        assert_eq!(axiom.condition.len(), 1);
    }
}
