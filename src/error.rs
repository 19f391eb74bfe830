//! Error types for kyroplan.
//!
//! Errors are strongly typed using thiserror and split along the lines that
//! matter to a caller: bad input, an internally inconsistent recovery, a known
//! unsupported configuration, or a failing collaborator. An unsolvable problem
//! is not an error; it is reported as a `ScheduleOutcome` with no plan.

use thiserror::Error;

use crate::fact::{Fact, Literal};
use crate::stream::{InstanceId, ResultId, SamplerId};

/// Validation errors that occur while registering inputs or configuring a run.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid configuration field '{field}': {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Sampler '{sampler}' expects {expected} {slot} objects, got {actual}")]
    ArityMismatch {
        sampler: String,
        slot: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown sampler: {id}")]
    UnknownSampler {
        id: SamplerId,
    },

    #[error("Unknown sampler instance: {id}")]
    UnknownInstance {
        id: InstanceId,
    },

    #[error("Unknown result: {id}")]
    UnknownResult {
        id: ResultId,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        field: String,
        reason: String,
    },
}

/// Internal inconsistencies detected while recovering a stream plan.
///
/// These indicate a malformed domain or a bug in the achievement graph and are
/// never retried.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("Preimage fact {fact} has no achiever")]
    MissingAchiever {
        fact: Fact,
    },

    #[error("No axiom subset justifies the preimage of step {step} (unjustified: {unjustified:?})")]
    UnjustifiedAxioms {
        step: usize,
        unjustified: Vec<Literal>,
    },

    #[error("Precondition {literal} does not hold at step {step}")]
    PreconditionViolated {
        step: usize,
        literal: Literal,
    },

    #[error("Search returned unknown operator '{name}'")]
    UnknownOperator {
        name: String,
    },

    #[error("Grounded operator '{name}' is missing binding for parameter '{parameter}'")]
    MissingBinding {
        name: String,
        parameter: String,
    },
}

/// Configurations that are understood but deliberately not supported.
#[derive(Debug, Error)]
pub enum UnsupportedError {
    #[error("Fluent stream result {result} is required by another stream")]
    FluentDependency {
        result: String,
    },
}

/// Top-level error type for kyroplan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("Unsupported: {0}")]
    Unsupported(#[from] UnsupportedError),

    #[error("Collaborator '{collaborator}' failed: {message}")]
    Collaborator {
        collaborator: String,
        message: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl PlanError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a collaborator error.
    #[must_use]
    pub fn collaborator(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if recovery found the plan internally inconsistent.
    #[must_use]
    pub const fn is_inconsistency(&self) -> bool {
        matches!(self, Self::Recovery(_))
    }

    /// Returns true if the input hit a documented limitation.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// Returns true if a collaborator failed.
    #[must_use]
    pub const fn is_collaborator(&self) -> bool {
        matches!(self, Self::Collaborator { .. })
    }
}

/// Result type alias for kyroplan operations.
pub type PlanResult<T> = Result<T, PlanError>;
