//! # kyroplan - Stream-Plan Recovery and Scheduling
//!
//! kyroplan turns a discrete plan found over an *optimistic* relaxation of a
//! planning problem into an executable interleaving of sampler invocations
//! ("streams") and actions. Samplers produce concrete values and certified
//! facts; the planner only sees placeholders for those values. This crate
//! decides which samplers must run, in what order, and against which runtime
//! facts, so that the discrete plan becomes executable.
//!
//! ## Core Concepts
//!
//! - **Fact / Placeholder**: predicates over constants or not-yet-sampled values
//! - **Sampler / Result**: declared streams and their optimistic outcomes, kept in a [`StreamRegistry`]
//! - **Evaluations**: facts known to hold, tagged with the result that produced them
//! - **RelaxedScheduler**: plans, recovers the preimage, and assembles a [`CombinedPlan`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kyroplan::reference::{ReferenceGrounder, UniformCostSearch};
//! use kyroplan::{Evaluations, RelaxedScheduler, SchedulerConfig};
//!
//! let scheduler = RelaxedScheduler::new(
//!     Arc::new(ReferenceGrounder),
//!     Arc::new(UniformCostSearch::default()),
//! )
//! .with_config(SchedulerConfig::default());
//!
//! let outcome = scheduler.schedule(&mut registry, &evaluations, &goal, &domain, &results)?;
//! if let Some(plan) = outcome.plan {
//!     println!("{}", plan.to_json_pretty()?);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod domain;
pub mod error;
pub mod evaluation;
pub mod fact;
pub mod stream;
pub mod task;

// Collaborators and engine
pub mod external;
pub mod plan;
pub mod reference;
pub mod scheduling;

// Re-export primary types at crate root for convenience
pub use config::{scale_cost, SchedulerConfig, COST_SCALE};
pub use domain::{ActionCost, ActionSchema, AxiomSchema, Domain, Problem};
pub use error::{PlanError, PlanResult, RecoveryError, UnsupportedError, ValidationError};
pub use evaluation::{Evaluations, FunctionValue};
pub use fact::{Fact, Literal, Mapping, Object, Placeholder, EQ, UNSATISFIABLE};
pub use plan::{CombinedPlan, PlanStep};
pub use stream::{
    ConstraintStream, GlobalConstraint, InstanceId, OptimizerId, ResultId, Sampler, SamplerId,
    SamplerKind, StreamRegistry, StreamResult,
};
pub use task::{GroundedAxiom, GroundedOperator, GroundedTask, OperatorId};

pub use external::{
    Grounder, NegativeConverter, PlannedAction, Search, StreamPostprocessor, TimedSearch,
};
pub use scheduling::{RelaxedScheduler, ScheduleOutcome};
