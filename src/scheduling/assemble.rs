//! Final plan assembly and cost accounting.

use std::collections::BTreeMap;

use crate::config::COST_SCALE;
use crate::error::PlanResult;
use crate::evaluation::Evaluations;
use crate::plan::{CombinedPlan, PlanStep};
use crate::stream::{ResultId, StreamRegistry};
use crate::task::{GroundedTask, OperatorId};

/// Action plan split into stream actions and domain actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSplit {
    /// Results of stream actions, in plan order.
    pub stream_results: Vec<ResultId>,
    /// Domain actions, in plan order.
    pub actions: Vec<OperatorId>,
}

/// Separate stream actions (looked up by schema name) from domain actions.
#[must_use]
pub fn split_actions(
    task: &GroundedTask,
    action_ids: &[OperatorId],
    result_from_name: &BTreeMap<String, ResultId>,
) -> ActionSplit {
    let mut split = ActionSplit::default();
    for &id in action_ids {
        let stream = task[id]
            .schema
            .as_ref()
            .and_then(|schema| result_from_name.get(schema));
        match stream {
            Some(&result) => split.stream_results.push(result),
            None => split.actions.push(id),
        }
    }
    split
}

/// Function results that price the plan's actions.
///
/// Empty under unit costs; otherwise each action whose cost comes from a
/// function head contributes the result that computed the head's value.
#[must_use]
pub fn function_plan(
    task: &GroundedTask,
    actions: &[OperatorId],
    opt_evaluations: &Evaluations,
    unit_costs: bool,
) -> Vec<ResultId> {
    if unit_costs {
        return Vec::new();
    }
    let mut plan = Vec::new();
    for &id in actions {
        let Some(head) = &task[id].cost_function else {
            continue;
        };
        if let Some(result) = opt_evaluations.function(head).and_then(|v| v.result) {
            if !plan.contains(&result) {
                plan.push(result);
            }
        }
    }
    plan
}

/// Plan cost: the action count under unit costs, otherwise the sum of the
/// operators' original scaled costs divided by [`COST_SCALE`].
#[must_use]
pub fn plan_cost(costs: &[i64], unit_costs: bool) -> f64 {
    if unit_costs {
        #[allow(clippy::cast_precision_loss)]
        let count = costs.len() as f64;
        return count;
    }
    #[allow(clippy::cast_precision_loss)]
    let total = costs.iter().sum::<i64>() as f64;
    total / COST_SCALE
}

/// Ordered groups of a combined plan.
#[derive(Debug, Clone, Default)]
pub struct PlanParts<'a> {
    /// Applied and static results, already ordered.
    pub static_results: &'a [ResultId],
    /// Per-step rebound fluent results.
    pub fluent_results: &'a [ResultId],
    /// Results of stream actions the search chose.
    pub stream_action_results: &'a [ResultId],
    /// Domain actions.
    pub actions: &'a [OperatorId],
    /// Function results and negated tests.
    pub function_results: &'a [ResultId],
}

/// Concatenate the groups into a combined plan.
///
/// Order: static results, rebound fluent results, stream-action results,
/// domain actions, function-only results.
pub fn assemble(
    registry: &StreamRegistry,
    task: &GroundedTask,
    parts: &PlanParts<'_>,
) -> PlanResult<CombinedPlan> {
    let mut plan = CombinedPlan::new();
    for &result in parts
        .static_results
        .iter()
        .chain(parts.fluent_results)
        .chain(parts.stream_action_results)
    {
        plan.push(PlanStep::from_result(registry, result));
    }
    for &id in parts.actions {
        let operator = &task[id];
        let name = operator.schema.clone().unwrap_or_else(|| operator.name.clone());
        let args = operator.external_args()?;
        plan.push(PlanStep::action(name, args));
    }
    for &result in parts.function_results {
        plan.push(PlanStep::from_result(registry, result));
    }
    Ok(plan)
}
