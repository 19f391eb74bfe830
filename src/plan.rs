//! Combined plan: stream invocations interleaved with actions.

use serde::{Deserialize, Serialize};

use crate::fact::{Fact, Object};
use crate::stream::{ResultId, StreamRegistry};

/// One step of a combined plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanStep {
    /// Invoke a sampler instance.
    Stream {
        /// Result this step realizes.
        result: ResultId,
        /// Sampler name.
        sampler: String,
        /// Instance inputs.
        inputs: Vec<Object>,
        /// Outputs the step binds, placeholders until sampled.
        outputs: Vec<Object>,
        /// State facts a fluent instance was bound to.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fluent_facts: Vec<Fact>,
    },
    /// Evaluate a function or a negated test.
    Function {
        /// Result this step evaluates.
        result: ResultId,
        /// Sampler name.
        sampler: String,
        /// Instance inputs.
        inputs: Vec<Object>,
        /// Function value; absent for negated tests.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<f64>,
    },
    /// Execute a domain action.
    Action {
        /// Action schema name.
        name: String,
        /// Values of the external parameters.
        args: Vec<Object>,
    },
}

impl PlanStep {
    /// Step that runs `result`'s instance.
    #[must_use]
    pub fn from_result(registry: &StreamRegistry, result: ResultId) -> Self {
        let res = &registry[result];
        let instance = &registry[res.instance];
        let sampler = &registry[instance.sampler];
        if sampler.is_function() || sampler.is_negated() {
            Self::Function {
                result,
                sampler: sampler.name.clone(),
                inputs: instance.inputs.clone(),
                value: res.value,
            }
        } else {
            Self::Stream {
                result,
                sampler: sampler.name.clone(),
                inputs: instance.inputs.clone(),
                outputs: res.outputs.clone(),
                fluent_facts: instance.fluent_facts.clone(),
            }
        }
    }

    /// Action step.
    #[must_use]
    pub fn action(name: impl Into<String>, args: Vec<Object>) -> Self {
        Self::Action {
            name: name.into(),
            args,
        }
    }

    /// Whether this is a domain action.
    #[must_use]
    pub const fn is_action(&self) -> bool {
        matches!(self, Self::Action { .. })
    }

    /// Result behind a stream or function step.
    #[must_use]
    pub const fn result(&self) -> Option<ResultId> {
        match self {
            Self::Stream { result, .. } | Self::Function { result, .. } => Some(*result),
            Self::Action { .. } => None,
        }
    }
}

/// Ordered sampler invocations and actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedPlan {
    /// Steps in execution order.
    pub steps: Vec<PlanStep>,
}

impl CombinedPlan {
    /// Empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn push(&mut self, step: PlanStep) {
        self.steps.push(step);
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter()
    }

    /// Action steps in order.
    pub fn actions(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(|s| s.is_action())
    }

    /// Results in the order they are scheduled.
    #[must_use]
    pub fn results(&self) -> Vec<ResultId> {
        self.steps.iter().filter_map(PlanStep::result).collect()
    }

    /// Pretty-printed JSON for inspection.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
