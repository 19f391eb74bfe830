//! Default ordering of an extracted stream plan.

use std::collections::BTreeSet;

use crate::error::{PlanError, PlanResult};
use crate::evaluation::Evaluations;
use crate::external::StreamPostprocessor;
use crate::fact::Fact;
use crate::stream::{ResultId, StreamRegistry};

/// Stable topological order: each result is placed as early as its position
/// allows once every domain fact certified by another plan result is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyPostprocessor;

impl StreamPostprocessor for DependencyPostprocessor {
    fn postprocess(
        &self,
        registry: &StreamRegistry,
        _evaluations: &Evaluations,
        stream_plan: &[ResultId],
        _target_facts: &[Fact],
    ) -> PlanResult<Vec<ResultId>> {
        let produced: BTreeSet<Fact> = stream_plan
            .iter()
            .flat_map(|&r| registry.certified(r))
            .collect();
        let mut available: BTreeSet<Fact> = BTreeSet::new();
        let mut pending: Vec<ResultId> = stream_plan.to_vec();
        let mut ordered = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let ready = pending.iter().position(|&r| {
                registry
                    .domain(r)
                    .iter()
                    .all(|f| !produced.contains(f) || available.contains(f))
            });
            let Some(index) = ready else {
                return Err(PlanError::internal(format!(
                    "stream plan has a dependency cycle among {} results",
                    pending.len()
                )));
            };
            let result = pending.remove(index);
            available.extend(registry.certified(result));
            ordered.push(result);
        }
        Ok(ordered)
    }
}
