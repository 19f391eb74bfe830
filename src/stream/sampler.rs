//! Sampler declarations.
//!
//! A sampler is only described here: its input/output schema, the facts its
//! instances require (domain) and certify, and the hints the scheduler uses
//! (effort, simultaneity, fluent predicates, optimizer membership). How it
//! actually samples is someone else's problem.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::fact::{Fact, Object};

use super::OptimizerId;

/// What a sampler produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SamplerKind {
    /// Produces output objects and certified facts.
    Stream,
    /// Produces a numeric value for a function head (used as an action cost).
    Function {
        /// Head template over the input parameters.
        head: Fact,
    },
    /// A test whose certified predicate may only appear negated in preconditions.
    Negated,
}

/// Scheduling hints for a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerInfo {
    /// Results must be interleaved with actions instead of applied up front.
    pub simultaneous: bool,
    /// Estimated cost of one invocation.
    pub effort: f64,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            simultaneous: false,
            effort: 1.0,
        }
    }
}

/// Membership of a sampler in an optimizer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerMembership {
    /// Owning optimizer.
    pub optimizer: OptimizerId,
    /// Fact template (over inputs and outputs) asserting that a result takes
    /// part in the optimizer's joint constraints.
    pub stream_fact: Fact,
}

/// A declared sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sampler {
    /// Sampler name.
    pub name: String,
    /// Kind of output.
    pub kind: SamplerKind,
    /// Input parameters (variables).
    pub inputs: Vec<Object>,
    /// Output parameters (variables).
    pub outputs: Vec<Object>,
    /// Facts an instance requires, over the inputs.
    pub domain: Vec<Fact>,
    /// Facts a result certifies, over inputs and outputs.
    pub certified: Vec<Fact>,
    /// Predicates whose current truth the sampler depends on.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub fluents: BTreeSet<String>,
    /// Scheduling hints.
    #[serde(default)]
    pub info: SamplerInfo,
    /// Optimizer membership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<OptimizerMembership>,
}

impl Sampler {
    /// Starts a builder for an output-producing sampler.
    #[must_use]
    pub fn stream(name: impl Into<String>) -> SamplerBuilder {
        SamplerBuilder::new(name, SamplerKind::Stream)
    }

    /// Starts a builder for a cost function sampler.
    #[must_use]
    pub fn function(name: impl Into<String>, head: Fact) -> SamplerBuilder {
        SamplerBuilder::new(name, SamplerKind::Function { head })
    }

    /// Starts a builder for a negated test sampler.
    #[must_use]
    pub fn negated(name: impl Into<String>) -> SamplerBuilder {
        SamplerBuilder::new(name, SamplerKind::Negated)
    }

    /// True if the sampler depends on the world state at execution time.
    #[must_use]
    pub fn is_fluent(&self) -> bool {
        !self.fluents.is_empty()
    }

    /// Whether the sampler computes a cost function.
    pub const fn is_function(&self) -> bool {
        matches!(self.kind, SamplerKind::Function { .. })
    }

    /// Whether the sampler tests a negated predicate.
    pub const fn is_negated(&self) -> bool {
        matches!(self.kind, SamplerKind::Negated)
    }

    /// Predicate a negated sampler tests.
    #[must_use]
    pub fn negated_predicate(&self) -> Option<&str> {
        if self.is_negated() {
            self.certified.first().map(|f| f.predicate.as_str())
        } else {
            None
        }
    }
}

/// Builder for [`Sampler`].
#[derive(Debug, Clone)]
pub struct SamplerBuilder {
    name: String,
    kind: SamplerKind,
    inputs: Vec<Object>,
    outputs: Vec<Object>,
    domain: Vec<Fact>,
    certified: Vec<Fact>,
    fluents: BTreeSet<String>,
    info: SamplerInfo,
    optimizer: Option<OptimizerMembership>,
}

impl SamplerBuilder {
    fn new(name: impl Into<String>, kind: SamplerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            domain: Vec::new(),
            certified: Vec::new(),
            fluents: BTreeSet::new(),
            info: SamplerInfo::default(),
            optimizer: None,
        }
    }

    /// Set input parameter names (e.g. `?x`).
    #[must_use]
    pub fn inputs<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.inputs = names.iter().map(|n| Object::variable(n.as_ref())).collect();
        self
    }

    /// Set output parameter names.
    #[must_use]
    pub fn outputs<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.outputs = names.iter().map(|n| Object::variable(n.as_ref())).collect();
        self
    }

    /// Add a domain fact template.
    #[must_use]
    pub fn domain(mut self, fact: Fact) -> Self {
        self.domain.push(fact);
        self
    }

    /// Add a certified fact template.
    #[must_use]
    pub fn certified(mut self, fact: Fact) -> Self {
        self.certified.push(fact);
        self
    }

    /// Add a fluent predicate.
    #[must_use]
    pub fn fluent(mut self, predicate: impl Into<String>) -> Self {
        self.fluents.insert(predicate.into());
        self
    }

    /// Set the sampling effort.
    #[must_use]
    pub fn effort(mut self, effort: f64) -> Self {
        self.info.effort = effort;
        self
    }

    /// Defer results of this sampler to stream actions.
    #[must_use]
    pub fn simultaneous(mut self, simultaneous: bool) -> Self {
        self.info.simultaneous = simultaneous;
        self
    }

    /// Attach the sampler to an optimizer group.
    #[must_use]
    pub fn optimizer(mut self, optimizer: OptimizerId, stream_fact: Fact) -> Self {
        self.optimizer = Some(OptimizerMembership {
            optimizer,
            stream_fact,
        });
        self
    }

    /// Build the sampler, checking that templates only mention declared parameters.
    pub fn build(self) -> Result<Sampler, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "name".to_string(),
            });
        }
        if !self.info.effort.is_finite() || self.info.effort < 0.0 {
            return Err(ValidationError::InvalidField {
                field: "effort".to_string(),
                reason: format!("must be finite and non-negative, got {}", self.info.effort),
            });
        }

        let inputs: BTreeSet<&Object> = self.inputs.iter().collect();
        let scope: BTreeSet<&Object> = self.inputs.iter().chain(&self.outputs).collect();
        check_scope("domain", &self.domain, &inputs)?;
        check_scope("certified", &self.certified, &scope)?;

        match &self.kind {
            SamplerKind::Stream => {}
            SamplerKind::Function { head } => {
                if !self.outputs.is_empty() {
                    return Err(ValidationError::InvalidField {
                        field: "outputs".to_string(),
                        reason: "function samplers have no outputs".to_string(),
                    });
                }
                check_scope("head", std::slice::from_ref(head), &inputs)?;
            }
            SamplerKind::Negated => {
                if !self.outputs.is_empty() || self.certified.len() != 1 {
                    return Err(ValidationError::InvalidField {
                        field: "certified".to_string(),
                        reason: "negated samplers certify exactly one fact and have no outputs"
                            .to_string(),
                    });
                }
            }
        }

        if let Some(membership) = &self.optimizer {
            check_scope(
                "stream_fact",
                std::slice::from_ref(&membership.stream_fact),
                &scope,
            )?;
        }

        Ok(Sampler {
            name: self.name,
            kind: self.kind,
            inputs: self.inputs,
            outputs: self.outputs,
            domain: self.domain,
            certified: self.certified,
            fluents: self.fluents,
            info: self.info,
            optimizer: self.optimizer,
        })
    }
}

fn check_scope(
    field: &str,
    facts: &[Fact],
    scope: &BTreeSet<&Object>,
) -> Result<(), ValidationError> {
    for fact in facts {
        if let Some(arg) = fact
            .args
            .iter()
            .find(|a| a.is_variable() && !scope.contains(a))
        {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
                reason: format!("{fact} mentions undeclared parameter {arg}"),
            });
        }
    }
    Ok(())
}
