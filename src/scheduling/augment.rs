//! Augmented-domain construction.
//!
//! Results are split into those applied up front (their certified facts join
//! the optimistic initial state) and those deferred to synthetic "stream
//! actions" the search interleaves with domain actions.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{ActionCost, ActionSchema, Domain};
use crate::evaluation::Evaluations;
use crate::fact::{Fact, Literal};
use crate::stream::{ResultId, StreamRegistry};

/// Applied-now and deferred results, each in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultPartition {
    /// Results whose certified facts are assumed up front.
    pub applied: Vec<ResultId>,
    /// Results turned into stream actions.
    pub deferred: Vec<ResultId>,
}

/// Partition candidate results.
///
/// Function results are always applied. A stream result is applied when it is
/// not simultaneous (per sampler or via `simultaneous`) and its domain facts
/// already hold in the optimistic evaluations accumulated so far.
#[must_use]
pub fn partition_results(
    registry: &StreamRegistry,
    evaluations: &Evaluations,
    results: &[ResultId],
    simultaneous: bool,
) -> ResultPartition {
    let mut partition = ResultPartition::default();
    let mut known: BTreeSet<Fact> = evaluations.fact_set();
    for &result in results {
        let sampler = registry.sampler_of(result);
        let apply_now = !(simultaneous || sampler.info.simultaneous);
        let supported = registry.domain(result).iter().all(|f| known.contains(f));
        if sampler.is_function() || (apply_now && supported) {
            known.extend(registry.certified(result));
            partition.applied.push(result);
        } else {
            partition.deferred.push(result);
        }
    }
    partition
}

/// A domain extended with one stream action per deferred result.
#[derive(Debug, Clone)]
pub struct AugmentedDomain {
    /// Base actions followed by stream actions.
    pub domain: Domain,
    /// Stream action name to the result it stands for.
    pub result_from_name: BTreeMap<String, ResultId>,
}

/// Synthesize a parameterless, zero-cost stream action per deferred result.
#[must_use]
pub fn add_stream_actions(
    registry: &StreamRegistry,
    domain: &Domain,
    deferred: &[ResultId],
) -> AugmentedDomain {
    let mut augmented = domain.clone();
    let mut result_from_name = BTreeMap::new();
    for (i, &result) in deferred.iter().enumerate() {
        let sampler = registry.sampler_of(result);
        if sampler.is_function() {
            continue;
        }
        let name = format!("{}-{i}", sampler.name);
        let mut action = ActionSchema::new::<&str>(name.clone(), &[]).cost(ActionCost::Constant(0.0));
        action.preconditions = registry
            .domain(result)
            .into_iter()
            .map(Literal::positive)
            .collect();
        action.add_effects = registry.certified(result);
        augmented.actions.push(action);
        result_from_name.insert(name, result);
    }
    AugmentedDomain {
        domain: augmented,
        result_from_name,
    }
}

/// True if any result belongs to an optimizer.
#[must_use]
pub fn using_optimizers(registry: &StreamRegistry, results: &[ResultId]) -> bool {
    results.iter().any(|&r| registry.is_optimizer_result(r))
}

/// Goal that additionally forbids the `unsatisfiable` sentinel.
#[must_use]
pub fn add_unsatisfiable_to_goal(goal: &[Literal]) -> Vec<Literal> {
    let mut extended = goal.to_vec();
    let sentinel = Fact::unsatisfiable().negative();
    if !extended.contains(&sentinel) {
        extended.push(sentinel);
    }
    extended
}
