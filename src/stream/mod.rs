//! Samplers ("streams"), their instances, and their results.
//!
//! All three live in a [`StreamRegistry`] arena and are referred to by index
//! handles. Results form a dependency DAG through their instances' domain
//! facts, which may themselves be certified by other results.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Wraps a raw arena index.
            #[must_use]
            pub const fn from_index(index: usize) -> Self {
                Self(index)
            }

            /// Raw arena index.
            #[must_use]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Handle to a declared sampler.
    SamplerId,
    "s"
);
arena_id!(
    /// Handle to a sampler instance.
    InstanceId,
    "i"
);
arena_id!(
    /// Handle to a sampler result.
    ResultId,
    "r"
);
arena_id!(
    /// Handle to an optimizer group.
    OptimizerId,
    "o"
);

mod optimizer;
mod registry;
mod sampler;

pub use optimizer::{ConstraintStream, GlobalConstraint, Optimizer};
pub use registry::{SamplerInstance, StreamRegistry, StreamResult};
pub use sampler::{OptimizerMembership, Sampler, SamplerBuilder, SamplerInfo, SamplerKind};
