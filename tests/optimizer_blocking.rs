use std::sync::Arc;

use kyroplan::reference::{ReferenceGrounder, UniformCostSearch};
use kyroplan::{
    ActionSchema, ConstraintStream, Domain, Evaluations, Fact, Object, Placeholder, PlanStep,
    RelaxedScheduler, ResultId, Sampler, SchedulerConfig, StreamRegistry,
};

fn var(name: &str) -> Object {
    Object::variable(name)
}

struct Setup {
    registry: StreamRegistry,
    pose_a: ResultId,
    pose_b: ResultId,
    constraint: kyroplan::InstanceId,
}

/// Poses for objects `a` and `b` belong to one optimizer; a constraint stream
/// covers only the pose of `a`.
fn setup() -> Setup {
    let mut registry = StreamRegistry::new();
    let placement = registry.add_optimizer("placement");
    let pose = registry.add_sampler(
        Sampler::stream("pose-var")
            .inputs(&["?o"])
            .outputs(&["?p"])
            .certified(Fact::new("pose", vec![var("?o"), var("?p")]))
            .optimizer(placement, Fact::new("uses-pose", vec![var("?o"), var("?p")]))
            .build()
            .unwrap(),
    );
    let feasible = registry.add_sampler(
        Sampler::stream("feasible")
            .inputs(&["?p"])
            .certified(Fact::new("feasible", vec![var("?p")]))
            .build()
            .unwrap(),
    );
    let inst_a = registry
        .get_instance(pose, vec![Object::constant("a")], vec![])
        .unwrap();
    let inst_b = registry
        .get_instance(pose, vec![Object::constant("b")], vec![])
        .unwrap();
    let pose_a = registry.add_result(inst_a, None, 0).unwrap();
    let pose_b = registry.add_result(inst_b, None, 0).unwrap();

    let p = Placeholder {
        instance: inst_a,
        output_index: 0,
    };
    let constraint = registry
        .get_instance(feasible, vec![Object::Placeholder(p)], vec![])
        .unwrap();
    registry
        .add_constraint_stream(
            placement,
            ConstraintStream {
                instance: constraint,
                outputs: vec![p],
                constraints: vec![Fact::new(
                    "uses-pose",
                    vec![Object::constant("a"), Object::Placeholder(p)],
                )],
            },
        )
        .unwrap();
    Setup {
        registry,
        pose_a,
        pose_b,
        constraint,
    }
}

fn domain() -> Domain {
    Domain::new("placement").with_action(
        ActionSchema::new("place", &["?o", "?p"])
            .precondition(Fact::new("pose", vec![var("?o"), var("?p")]).positive())
            .add(Fact::ground("placed", &[] as &[&str])),
    )
}

fn schedule(setup: &mut Setup) -> kyroplan::ScheduleOutcome {
    let scheduler = RelaxedScheduler::new(
        Arc::new(ReferenceGrounder),
        Arc::new(UniformCostSearch::default()),
    )
    .with_config(SchedulerConfig::default());
    let goal = vec![Fact::ground("placed", &[] as &[&str]).positive()];
    let results = [setup.pose_a, setup.pose_b];
    scheduler
        .schedule(
            &mut setup.registry,
            &Evaluations::new(),
            &goal,
            &domain(),
            &results,
        )
        .unwrap()
}

fn placed_object(outcome: &kyroplan::ScheduleOutcome) -> Object {
    let plan = outcome.plan.as_ref().expect("plan");
    let Some(PlanStep::Action { args, .. }) = plan.actions().next() else {
        panic!("expected an action");
    };
    args[0].clone()
}

#[test]
fn active_optimizer_does_not_block() {
    let mut setup = setup();
    let outcome = schedule(&mut setup);
    // Both placements are equally cheap; the first grounded one wins.
    assert_eq!(placed_object(&outcome), Object::constant("a"));
}

#[test]
fn exhausted_constraint_blocks_its_bindings() {
    let mut setup = setup();
    setup.registry.record_call(setup.constraint, false, true);

    let outcome = schedule(&mut setup);
    assert_eq!(placed_object(&outcome), Object::constant("b"));
    let plan = outcome.plan.expect("plan");
    assert_eq!(plan.results(), vec![setup.pose_b]);
}

#[test]
fn blocking_every_binding_is_unsolvable() {
    let mut setup = setup();
    setup.registry.record_call(setup.constraint, false, true);
    let scheduler = RelaxedScheduler::new(
        Arc::new(ReferenceGrounder),
        Arc::new(UniformCostSearch::default()),
    );
    let goal = vec![Fact::ground("placed", &[] as &[&str]).positive()];

    // Only the blocked pose is offered.
    let outcome = scheduler
        .schedule(
            &mut setup.registry,
            &Evaluations::new(),
            &goal,
            &domain(),
            &[setup.pose_a],
        )
        .unwrap();
    assert!(outcome.plan.is_none());
    assert!(outcome.cost.is_infinite());
}
