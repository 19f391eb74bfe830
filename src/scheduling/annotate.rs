//! Effort and optimizer annotation of a grounded task, applied before search.
//!
//! Operator costs are biased by the effort of the stream results their
//! preconditions depend on, and exhausted optimizer constraint streams are
//! turned into rules that derive `unsatisfiable()` for the bindings they ruled
//! out.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use tracing::{debug, trace};

use crate::config::scale_cost;
use crate::error::RecoveryError;
use crate::fact::{Fact, Literal, Mapping, Object};
use crate::stream::{GlobalConstraint, OptimizerId, ResultId, StreamRegistry};
use crate::task::GroundedTask;

use super::achievers::{plan_effort, AchievementGraph};

/// Add stream effort to operator costs and optimizer stream facts to effects.
///
/// For every operator, the positive preconditions known to the achievement
/// graph are traced back to a minimal set of results. With an
/// `effort_weight`, the operator's cost grows by the weighted effort of that
/// set. Every optimizer result in the set contributes its stream fact as an
/// extra add effect.
pub fn add_stream_efforts(
    registry: &StreamRegistry,
    task: &mut GroundedTask,
    graph: &AchievementGraph,
    effort_weight: Option<f64>,
    unit_efforts: bool,
) -> Result<(), RecoveryError> {
    let mut new_atoms = BTreeSet::new();
    for operator in &mut task.operators {
        let targets: Vec<Fact> = operator
            .preconditions
            .iter()
            .filter(|l| !l.negated && graph.contains(&l.fact))
            .map(|l| l.fact.clone())
            .collect();
        let stream_plan = graph.extract(registry, &targets)?;
        if let Some(weight) = effort_weight {
            let effort = plan_effort(registry, &stream_plan, unit_efforts);
            operator.cost += scale_cost(weight * effort);
        }
        for result in stream_plan {
            if let Some((_, fact)) = registry.stream_fact(result) {
                if !operator.add_effects.contains(&fact) {
                    operator.add_effects.push(fact.clone());
                }
                new_atoms.insert(fact);
            }
        }
        trace!(operator = %operator.name, cost = operator.cost, "operator annotated");
    }
    task.atoms.extend(new_atoms);
    Ok(())
}

/// Add blocking rules for the exhausted constraint streams of every optimizer
/// that owns one of `results`.
///
/// Each output slot of a disabled constraint stream ranges over the outputs
/// that the candidate results of the referenced instance realized; every
/// combination yields one [`GlobalConstraint::BlockBindings`]. When the
/// constraint instance was called and never succeeded, the blocked constraint
/// facts alone form the condition. Otherwise the condition additionally
/// requires the absence of every other optimizer stream fact with one of the
/// combination's objects among its arguments, inputs and outputs alike.
pub fn add_optimizer_axioms(
    registry: &StreamRegistry,
    task: &mut GroundedTask,
    results: &[ResultId],
) -> Vec<GlobalConstraint> {
    let optimizer_results: Vec<ResultId> = results
        .iter()
        .copied()
        .filter(|&r| registry.is_optimizer_result(r))
        .collect();
    let optimizers: BTreeSet<OptimizerId> = optimizer_results
        .iter()
        .filter_map(|&r| registry.stream_fact(r).map(|(o, _)| o))
        .collect();
    if optimizers.is_empty() {
        return Vec::new();
    }

    let mut constraints = Vec::new();
    for optimizer_id in optimizers {
        let Some(optimizer) = registry.optimizer(optimizer_id) else {
            continue;
        };
        let mut facts_from_arg: BTreeMap<Object, BTreeSet<Fact>> = BTreeMap::new();
        for &result in &optimizer_results {
            let Some((owner, fact)) = registry.stream_fact(result) else {
                continue;
            };
            if owner != optimizer_id {
                continue;
            }
            for arg in &fact.args {
                facts_from_arg.entry(arg.clone()).or_default().insert(fact.clone());
            }
        }

        for stream in &optimizer.constraint_streams {
            if !registry[stream.instance].disabled {
                continue;
            }
            let candidates: Vec<Vec<Object>> = stream
                .outputs
                .iter()
                .map(|out| {
                    registry
                        .results_of_instance(out.instance)
                        .into_iter()
                        .filter(|r| results.contains(r))
                        .filter_map(|r| registry[r].outputs.get(out.output_index).cloned())
                        .collect()
                })
                .collect();
            let combos: Vec<Vec<Object>> = if candidates.is_empty() {
                vec![Vec::new()]
            } else {
                candidates.into_iter().multi_cartesian_product().collect()
            };

            let instance = &registry[stream.instance];
            let submodular = instance.enumerated && instance.successes == 0;
            for combo in combos {
                let mapping: Mapping = stream
                    .outputs
                    .iter()
                    .map(|&p| Object::Placeholder(p))
                    .zip(combo.iter().cloned())
                    .collect();
                let blocked: BTreeSet<Fact> = stream
                    .constraints
                    .iter()
                    .map(|f| f.substitute(&mapping))
                    .collect();
                let mut condition: Vec<Literal> =
                    blocked.iter().cloned().map(Literal::positive).collect();
                if !submodular {
                    let additional: BTreeSet<Fact> = combo
                        .iter()
                        .flat_map(|arg| facts_from_arg.get(arg).into_iter().flatten())
                        .filter(|f| !blocked.contains(*f))
                        .cloned()
                        .collect();
                    condition.extend(additional.into_iter().map(Literal::negative));
                }
                let constraint = GlobalConstraint::BlockBindings {
                    optimizer: optimizer_id,
                    condition,
                };
                task.axioms.push(constraint.to_axiom());
                constraints.push(constraint);
            }
        }
    }
    if !constraints.is_empty() {
        task.atoms.insert(Fact::unsatisfiable());
        debug!(rules = constraints.len(), "optimizer blocking rules added");
    }
    constraints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::Evaluations;
    use crate::fact::Placeholder;
    use crate::stream::{ConstraintStream, Sampler};
    use crate::task::GroundedOperator;

    fn var(name: &str) -> Object {
        Object::variable(name)
    }

    fn operator(pre: Vec<Literal>) -> GroundedOperator {
        GroundedOperator {
            name: "place".to_string(),
            schema: Some("place".to_string()),
            parameters: Vec::new(),
            num_external_parameters: 0,
            bindings: BTreeMap::new(),
            preconditions: pre,
            add_effects: Vec::new(),
            del_effects: Vec::new(),
            cost: 1000,
            cost_function: None,
        }
    }

    /// One optimizer variable stream `pose(?o) -> ?p` and a constraint stream over its output.
    fn optimizer_registry() -> (StreamRegistry, OptimizerId, ResultId, ResultId) {
        let mut registry = StreamRegistry::new();
        let opt = registry.add_optimizer("placement");
        let pose = registry.add_sampler(
            Sampler::stream("pose-var")
                .inputs(&["?o"])
                .outputs(&["?p"])
                .certified(Fact::new("pose", vec![var("?o"), var("?p")]))
                .effort(2.0)
                .optimizer(opt, Fact::new("uses-pose", vec![var("?o"), var("?p")]))
                .build()
                .unwrap(),
        );
        let cfree = registry.add_sampler(
            Sampler::stream("cfree-constraint")
                .inputs(&["?p"])
                .certified(Fact::new("cfree", vec![var("?p")]))
                .build()
                .unwrap(),
        );
        let pose_inst = registry.get_instance(pose, vec![Object::constant("a")], vec![]).unwrap();
        let r1 = registry.add_result(pose_inst, None, 0).unwrap();
        let r2 = registry.add_result(pose_inst, Some(vec![Object::constant("p2")]), 0).unwrap();

        let p = Placeholder {
            instance: pose_inst,
            output_index: 0,
        };
        let constraint_inst = registry
            .get_instance(cfree, vec![Object::Placeholder(p)], vec![])
            .unwrap();
        registry
            .add_constraint_stream(
                opt,
                ConstraintStream {
                    instance: constraint_inst,
                    outputs: vec![p],
                    constraints: vec![Fact::new("cfree", vec![Object::Placeholder(p)])],
                },
            )
            .unwrap();
        (registry, opt, r1, r2)
    }

    #[test]
    fn efforts_bias_costs_and_inject_stream_facts() {
        let (registry, _, r1, _) = optimizer_registry();
        let graph = AchievementGraph::build(&registry, &Evaluations::new(), &[r1], false);
        let pose_fact = registry.certified(r1)[0].clone();
        let mut task = GroundedTask::default();
        task.operators.push(operator(vec![pose_fact.positive()]));

        add_stream_efforts(&registry, &mut task, &graph, Some(0.5), false).unwrap();
        assert_eq!(task.operators[0].cost, 2000);
        let (_, stream_fact) = registry.stream_fact(r1).unwrap();
        assert_eq!(task.operators[0].add_effects, vec![stream_fact.clone()]);
        assert!(task.atoms.contains(&stream_fact));
    }

    #[test]
    fn no_weight_keeps_costs() {
        let (registry, _, r1, _) = optimizer_registry();
        let graph = AchievementGraph::build(&registry, &Evaluations::new(), &[r1], false);
        let mut task = GroundedTask::default();
        task.operators.push(operator(vec![registry.certified(r1)[0].clone().positive()]));
        add_stream_efforts(&registry, &mut task, &graph, None, false).unwrap();
        assert_eq!(task.operators[0].cost, 1000);
    }

    #[test]
    fn active_constraint_streams_add_nothing() {
        let (registry, _, r1, r2) = optimizer_registry();
        let mut task = GroundedTask::default();
        assert!(add_optimizer_axioms(&registry, &mut task, &[r1, r2]).is_empty());
        assert!(task.axioms.is_empty());
    }

    #[test]
    fn exhausted_constraint_blocks_each_binding() {
        let (mut registry, opt, r1, r2) = optimizer_registry();
        let constraint_inst = registry.optimizer(opt).unwrap().constraint_streams[0].instance;
        registry.record_call(constraint_inst, false, true);

        let mut task = GroundedTask::default();
        let constraints = add_optimizer_axioms(&registry, &mut task, &[r1, r2]);
        assert_eq!(constraints.len(), 2);
        assert_eq!(task.axioms.len(), 2);
        assert!(task.axioms.iter().all(|a| a.effect == Fact::unsatisfiable()));
        // Never succeeded: only the blocked constraint facts.
        assert!(constraints.iter().all(|c| match c {
            GlobalConstraint::BlockBindings { condition, .. } => condition.len() == 1,
        }));
    }

    #[test]
    fn partially_successful_constraint_also_negates_other_facts() {
        let (mut registry, opt, r1, r2) = optimizer_registry();
        let grasp = registry.add_sampler(
            Sampler::stream("grasp-var")
                .inputs(&["?p"])
                .outputs(&["?g"])
                .certified(Fact::new("grasp", vec![var("?p"), var("?g")]))
                .optimizer(opt, Fact::new("uses-grasp", vec![var("?p"), var("?g")]))
                .build()
                .unwrap(),
        );
        let grasp_inst = registry
            .get_instance(grasp, vec![Object::constant("p2")], vec![])
            .unwrap();
        let r3 = registry.add_result(grasp_inst, None, 0).unwrap();
        let constraint_inst = registry.optimizer(opt).unwrap().constraint_streams[0].instance;
        registry.record_call(constraint_inst, true, true);

        let mut task = GroundedTask::default();
        let constraints = add_optimizer_axioms(&registry, &mut task, &[r1, r2, r3]);
        assert_eq!(constraints.len(), 2);
        let (_, uses_grasp) = registry.stream_fact(r3).unwrap();
        let GlobalConstraint::BlockBindings { condition, .. } = &constraints[1];
        assert_eq!(
            condition,
            &vec![
                Fact::ground("cfree", &["p2"]).positive(),
                uses_grasp.negative(),
                Fact::ground("uses-pose", &["a", "p2"]).negative(),
            ]
        );
        let GlobalConstraint::BlockBindings { condition, .. } = &constraints[0];
        assert_eq!(condition.len(), 2);
    }

    #[test]
    fn facts_sharing_an_output_are_negated() {
        let (mut registry, opt, r1, _) = optimizer_registry();
        let conf = registry.add_sampler(
            Sampler::stream("conf-var")
                .inputs(&["?o"])
                .outputs(&["?c"])
                .certified(Fact::new("conf", vec![var("?o"), var("?c")]))
                .optimizer(opt, Fact::new("uses-conf", vec![var("?o"), var("?c")]))
                .build()
                .unwrap(),
        );
        let conf_inst = registry
            .get_instance(conf, vec![Object::constant("b")], vec![])
            .unwrap();
        let r3 = registry.add_result(conf_inst, None, 0).unwrap();
        let constraint_inst = registry.optimizer(opt).unwrap().constraint_streams[0].instance;
        registry.record_call(constraint_inst, true, true);

        let mut task = GroundedTask::default();
        let constraints = add_optimizer_axioms(&registry, &mut task, &[r1, r3]);
        assert_eq!(constraints.len(), 1);

        // `uses-pose(a, #i0.0)` only shares the pose output with the blocked binding.
        let pose = Object::Placeholder(Placeholder {
            instance: registry[r1].instance,
            output_index: 0,
        });
        let GlobalConstraint::BlockBindings { condition, .. } = &constraints[0];
        assert_eq!(
            condition,
            &vec![
                Fact::new("cfree", vec![pose.clone()]).positive(),
                Fact::new("uses-pose", vec![Object::constant("a"), pose]).negative(),
            ]
        );
        let (_, uses_conf) = registry.stream_fact(r3).unwrap();
        assert!(!condition.contains(&uses_conf.negative()));
    }
}
