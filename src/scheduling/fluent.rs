//! Rebinding of fluent stream results to the states they are used in.
//!
//! A fluent sampler's outcome depends on the world state at the time it runs.
//! The optimistic result in the plan is a single stand-in; here it is replaced
//! by one fresh instance per step that needs it, bound to that step's fluent
//! facts, and the action at that step is rewritten to use the new
//! placeholders.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{PlanResult, UnsupportedError};
use crate::fact::{mapping_from, Fact, Mapping};
use crate::stream::{ResultId, StreamRegistry};
use crate::task::{GroundedTask, OperatorId};

use super::achievers::AchievementGraph;

/// Stream plan split into results kept as-is and rebound fluent results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FluentResolution {
    /// Static results in their original order.
    pub static_plan: Vec<ResultId>,
    /// Fresh per-step results replacing the fluent ones.
    pub fluent_plan: Vec<ResultId>,
}

/// Steps at which each result's outputs are needed.
///
/// Walking the plan backwards, a result inherits the steps of every certified
/// fact it is the recorded achiever of and passes them on to its own domain
/// facts.
#[must_use]
pub fn steps_from_result(
    registry: &StreamRegistry,
    stream_plan: &[ResultId],
    graph: &AchievementGraph,
    fact_steps: &BTreeMap<Fact, BTreeSet<usize>>,
) -> BTreeMap<ResultId, BTreeSet<usize>> {
    let mut fact_steps = fact_steps.clone();
    let mut steps: BTreeMap<ResultId, BTreeSet<usize>> = BTreeMap::new();
    for &result in stream_plan.iter().rev() {
        let mut needed = BTreeSet::new();
        for fact in registry.certified(result) {
            if graph.achiever(&fact) == Some(result) {
                if let Some(at) = fact_steps.get(&fact) {
                    needed.extend(at);
                }
            }
        }
        for fact in registry.domain(result) {
            fact_steps.entry(fact).or_default().extend(&needed);
        }
        steps.insert(result, needed);
    }
    steps
}

/// Replace each fluent result of `stream_plan` by per-step results.
///
/// `action_ids[i]` is the operator of step `i`; a step whose operator mentions
/// rebound placeholders is pointed at a rewritten copy pushed onto `task`.
/// A fluent result whose certified facts feed another result of the plan is
/// rejected.
pub fn resolve_fluents(
    registry: &mut StreamRegistry,
    stream_plan: &[ResultId],
    graph: &AchievementGraph,
    fact_steps: &BTreeMap<Fact, BTreeSet<usize>>,
    real_states: &[BTreeSet<Fact>],
    task: &mut GroundedTask,
    action_ids: &mut [OperatorId],
) -> PlanResult<FluentResolution> {
    let steps = steps_from_result(registry, stream_plan, graph, fact_steps);
    let initial = real_states.first().cloned().unwrap_or_default();

    let mut resolution = FluentResolution::default();
    for &result in stream_plan {
        let sampler = registry.sampler_of(result);
        if registry[result].opt_index != 0 || !sampler.is_fluent() {
            resolution.static_plan.push(result);
            continue;
        }

        let certified: BTreeSet<Fact> = registry
            .certified(result)
            .into_iter()
            .filter(|f| !initial.contains(f))
            .collect();
        let feeds_another = stream_plan
            .iter()
            .filter(|&&other| other != result)
            .any(|&other| registry.domain(other).iter().any(|f| certified.contains(f)));
        if feeds_another {
            return Err(UnsupportedError::FluentDependency {
                result: format!("{} ({})", result, sampler.name),
            }
            .into());
        }

        let old = registry[result].clone();
        let sampler_id = registry[old.instance].sampler;
        let inputs = registry[old.instance].inputs.clone();
        let fluents = registry[sampler_id].fluents.clone();
        for &step in steps.get(&result).into_iter().flatten() {
            let fluent_facts: Vec<Fact> = real_states
                .get(step)
                .into_iter()
                .flatten()
                .filter(|f| fluents.contains(&f.predicate))
                .cloned()
                .collect();
            let instance = registry.new_instance(sampler_id, inputs.clone(), fluent_facts)?;
            let rebound = registry.add_result(instance, None, old.opt_index)?;
            resolution.fluent_plan.push(rebound);

            if old.outputs.is_empty() || step >= action_ids.len() {
                continue;
            }
            let mapping = mapping_from(&old.outputs, &registry[rebound].outputs);
            let rewritten = rewrite_operator(task, action_ids[step], &mapping);
            action_ids[step] = task.push_operator(rewritten);
        }
    }
    debug!(
        static_results = resolution.static_plan.len(),
        fluent_results = resolution.fluent_plan.len(),
        "fluent results resolved"
    );
    Ok(resolution)
}

fn rewrite_operator(
    task: &GroundedTask,
    id: OperatorId,
    mapping: &Mapping,
) -> crate::task::GroundedOperator {
    let mut operator = task[id].clone();
    for value in operator.bindings.values_mut() {
        if let Some(new) = mapping.get(value) {
            *value = new.clone();
        }
    }
    for literal in &mut operator.preconditions {
        *literal = literal.substitute(mapping);
    }
    for fact in operator.add_effects.iter_mut().chain(operator.del_effects.iter_mut()) {
        *fact = fact.substitute(mapping);
    }
    if let Some(head) = &mut operator.cost_function {
        *head = head.substitute(mapping);
    }
    operator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::Evaluations;
    use crate::fact::Object;
    use crate::stream::Sampler;
    use crate::task::GroundedOperator;

    fn var(name: &str) -> Object {
        Object::variable(name)
    }

    fn photo(name: &str, target: Fact) -> GroundedOperator {
        GroundedOperator {
            name: name.to_string(),
            schema: Some("photo".to_string()),
            parameters: vec!["?v".to_string()],
            num_external_parameters: 1,
            bindings: [("?v".to_string(), target.args[1].clone())].into_iter().collect(),
            preconditions: vec![target.positive()],
            add_effects: Vec::new(),
            del_effects: Vec::new(),
            cost: 1000,
            cost_function: None,
        }
    }

    #[test]
    fn fluent_result_is_rebound_per_step() {
        let mut registry = StreamRegistry::new();
        let scan = registry.add_sampler(
            Sampler::stream("scan")
                .inputs(&["?o"])
                .outputs(&["?v"])
                .certified(Fact::new("view", vec![var("?o"), var("?v")]))
                .fluent("light")
                .build()
                .unwrap(),
        );
        let inst = registry.get_instance(scan, vec![Object::constant("o")], vec![]).unwrap();
        let r = registry.add_result(inst, None, 0).unwrap();
        let view = registry.certified(r)[0].clone();
        let graph = AchievementGraph::build(&registry, &Evaluations::new(), &[r], false);

        let mut task = GroundedTask::default();
        let a0 = task.push_operator(photo("photo1", view.clone()));
        let a1 = task.push_operator(photo("photo2", view.clone()));
        let mut action_ids = vec![a0, a1];
        let fact_steps: BTreeMap<Fact, BTreeSet<usize>> =
            [(view.clone(), BTreeSet::from([0, 1]))].into_iter().collect();
        let states = vec![
            BTreeSet::from([Fact::ground("light", &["on"])]),
            BTreeSet::from([Fact::ground("light", &["off"])]),
            BTreeSet::new(),
        ];

        let resolution = resolve_fluents(
            &mut registry,
            &[r],
            &graph,
            &fact_steps,
            &states,
            &mut task,
            &mut action_ids,
        )
        .unwrap();

        assert!(resolution.static_plan.is_empty());
        assert_eq!(resolution.fluent_plan.len(), 2);
        let first = resolution.fluent_plan[0];
        let second = resolution.fluent_plan[1];
        assert_ne!(registry[first].instance, registry[second].instance);
        assert_ne!(registry[first].outputs, registry[second].outputs);
        assert_eq!(
            registry[registry[first].instance].fluent_facts,
            vec![Fact::ground("light", &["on"])]
        );

        assert_eq!(task.operators.len(), 4);
        assert_ne!(action_ids, vec![a0, a1]);
        assert_eq!(task[action_ids[0]].bindings["?v"], registry[first].outputs[0]);
        assert_eq!(task[action_ids[1]].bindings["?v"], registry[second].outputs[0]);
        // The grounder's operator is untouched.
        assert_eq!(task[a0].bindings["?v"], registry[r].outputs[0]);
    }

    #[test]
    fn fluent_result_feeding_another_stream_is_unsupported() {
        let mut registry = StreamRegistry::new();
        let scan = registry.add_sampler(
            Sampler::stream("scan")
                .inputs(&["?o"])
                .outputs(&["?v"])
                .certified(Fact::new("view", vec![var("?o"), var("?v")]))
                .fluent("light")
                .build()
                .unwrap(),
        );
        let plan_path = registry.add_sampler(
            Sampler::stream("plan-path")
                .inputs(&["?o", "?v"])
                .outputs(&["?t"])
                .domain(Fact::new("view", vec![var("?o"), var("?v")]))
                .certified(Fact::new("path", vec![var("?v"), var("?t")]))
                .build()
                .unwrap(),
        );
        let i1 = registry.get_instance(scan, vec![Object::constant("o")], vec![]).unwrap();
        let r1 = registry.add_result(i1, None, 0).unwrap();
        let v = registry[r1].outputs[0].clone();
        let i2 = registry
            .get_instance(plan_path, vec![Object::constant("o"), v], vec![])
            .unwrap();
        let r2 = registry.add_result(i2, None, 0).unwrap();
        let graph = AchievementGraph::build(&registry, &Evaluations::new(), &[r1, r2], false);

        let err = resolve_fluents(
            &mut registry,
            &[r1, r2],
            &graph,
            &BTreeMap::new(),
            &[BTreeSet::new()],
            &mut GroundedTask::default(),
            &mut [],
        )
        .unwrap_err();
        assert!(err.is_unsupported());
    }
}
