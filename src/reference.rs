//! Reference grounder and search.
//!
//! Small, exhaustive implementations of the [`Grounder`] and [`Search`]
//! contracts. They enumerate bindings over every object in the problem and
//! search the full state space, so they are only suitable for small problems
//! such as tests and benchmarks.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use tracing::{debug, warn};

use crate::config::scale_cost;
use crate::domain::{ActionCost, ActionSchema, AxiomSchema, Domain, Problem};
use crate::error::PlanResult;
use crate::external::{Grounder, PlannedAction, Search};
use crate::fact::{Fact, Literal, Mapping, Object, EQ};
use crate::task::{literal_holds, GroundedAxiom, GroundedOperator, GroundedTask};

/// Grounds every action and rule whose positive conditions are relaxed-reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceGrounder;

impl Grounder for ReferenceGrounder {
    fn instantiate(&self, domain: &Domain, problem: &Problem) -> PlanResult<Option<GroundedTask>> {
        let objects = collect_objects(domain, problem);
        let mut reachable: BTreeSet<Fact> = problem.init.clone();

        loop {
            let mut reached: Vec<Fact> = Vec::new();
            {
                let index = index_by_predicate(&reachable);
                for action in &domain.actions {
                    for mapping in
                        bindings(&action.parameters, &action.preconditions, &index, &objects)
                    {
                        if equalities_hold(&action.preconditions, &mapping) {
                            reached.extend(action.add_effects.iter().map(|f| f.substitute(&mapping)));
                        }
                    }
                }
                for axiom in &domain.axioms {
                    for mapping in bindings(&axiom.parameters, &axiom.condition, &index, &objects) {
                        if equalities_hold(&axiom.condition, &mapping) {
                            reached.push(axiom.derived.substitute(&mapping));
                        }
                    }
                }
            }
            let before = reachable.len();
            reachable.extend(reached);
            if reachable.len() == before {
                break;
            }
        }

        let unreachable = problem
            .goal
            .iter()
            .find(|l| !l.negated && !l.fact.is_equality() && !reachable.contains(&l.fact));
        if let Some(literal) = unreachable {
            debug!(%literal, "goal is relaxed-unreachable");
            return Ok(None);
        }

        let index = index_by_predicate(&reachable);
        let mut operators = Vec::new();
        for action in &domain.actions {
            for mapping in bindings(&action.parameters, &action.preconditions, &index, &objects) {
                if !equalities_hold(&action.preconditions, &mapping) {
                    continue;
                }
                if let Some(operator) = ground_action(action, &mapping, problem) {
                    operators.push(operator);
                }
            }
        }
        let mut axioms = Vec::new();
        for axiom in &domain.axioms {
            for mapping in bindings(&axiom.parameters, &axiom.condition, &index, &objects) {
                if equalities_hold(&axiom.condition, &mapping) {
                    axioms.push(ground_axiom(axiom, &mapping));
                }
            }
        }
        debug!(
            operators = operators.len(),
            axioms = axioms.len(),
            atoms = reachable.len(),
            "task grounded"
        );

        Ok(Some(GroundedTask {
            init: problem.init.clone(),
            goal: problem
                .goal
                .iter()
                .filter(|l| !l.fact.is_equality())
                .cloned()
                .collect(),
            operators,
            axioms,
            atoms: reachable,
            use_metric: problem.use_metric,
        }))
    }
}

fn collect_objects(domain: &Domain, problem: &Problem) -> BTreeSet<Object> {
    let facts = problem
        .init
        .iter()
        .chain(problem.goal.iter().map(|l| &l.fact))
        .chain(problem.function_values.keys());
    facts
        .flat_map(|f| f.args.iter())
        .chain(domain.constants.iter())
        .filter(|o| !o.is_variable())
        .cloned()
        .collect()
}

fn index_by_predicate(facts: &BTreeSet<Fact>) -> BTreeMap<&str, Vec<&Fact>> {
    let mut index: BTreeMap<&str, Vec<&Fact>> = BTreeMap::new();
    for fact in facts {
        index.entry(fact.predicate.as_str()).or_default().push(fact);
    }
    index
}

/// Every binding of `parameters` under which the positive, non-equality
/// conditions are in `index`; parameters they leave free range over `objects`.
fn bindings(
    parameters: &[Object],
    conditions: &[Literal],
    index: &BTreeMap<&str, Vec<&Fact>>,
    objects: &BTreeSet<Object>,
) -> Vec<Mapping> {
    let positive: Vec<&Fact> = conditions
        .iter()
        .filter(|l| !l.negated && !l.fact.is_equality())
        .map(|l| &l.fact)
        .collect();
    let mut matched = Vec::new();
    match_conditions(&positive, index, &mut Mapping::new(), &mut matched);

    let mut complete = Vec::new();
    for mapping in matched {
        let free: Vec<&Object> = parameters.iter().filter(|p| !mapping.contains_key(*p)).collect();
        extend_free(&free, objects, mapping, &mut complete);
    }
    complete
}

fn match_conditions(
    conditions: &[&Fact],
    index: &BTreeMap<&str, Vec<&Fact>>,
    mapping: &mut Mapping,
    out: &mut Vec<Mapping>,
) {
    let Some((first, rest)) = conditions.split_first() else {
        out.push(mapping.clone());
        return;
    };
    let Some(candidates) = index.get(first.predicate.as_str()) else {
        return;
    };
    for candidate in candidates {
        if candidate.args.len() != first.args.len() {
            continue;
        }
        let mut bound = Vec::new();
        let mut consistent = true;
        for (pattern, value) in first.args.iter().zip(&candidate.args) {
            if pattern.is_variable() {
                match mapping.get(pattern) {
                    Some(existing) if existing != value => {
                        consistent = false;
                        break;
                    }
                    Some(_) => {}
                    None => {
                        mapping.insert(pattern.clone(), value.clone());
                        bound.push(pattern.clone());
                    }
                }
            } else if pattern != value {
                consistent = false;
                break;
            }
        }
        if consistent {
            match_conditions(rest, index, mapping, out);
        }
        for variable in bound {
            mapping.remove(&variable);
        }
    }
}

fn extend_free(free: &[&Object], objects: &BTreeSet<Object>, mapping: Mapping, out: &mut Vec<Mapping>) {
    let Some((first, rest)) = free.split_first() else {
        out.push(mapping);
        return;
    };
    for object in objects {
        let mut extended = mapping.clone();
        extended.insert((*first).clone(), object.clone());
        extend_free(rest, objects, extended, out);
    }
}

fn equalities_hold(conditions: &[Literal], mapping: &Mapping) -> bool {
    conditions
        .iter()
        .filter(|l| l.fact.predicate == EQ)
        .all(|l| {
            let fact = l.fact.substitute(mapping);
            let equal = fact.args.windows(2).all(|w| w[0] == w[1]);
            equal != l.negated
        })
}

fn ground_action(action: &ActionSchema, mapping: &Mapping, problem: &Problem) -> Option<GroundedOperator> {
    let (cost, cost_function) = match &action.cost {
        ActionCost::Constant(_) | ActionCost::Function(_) if !problem.use_metric => {
            (scale_cost(1.0), None)
        }
        ActionCost::Constant(c) => (scale_cost(*c), None),
        ActionCost::Function(head) => {
            let head = head.substitute(mapping);
            let value = problem.function_values.get(&head)?;
            (scale_cost(*value), Some(head))
        }
    };
    let args: Vec<String> = action
        .parameters
        .iter()
        .map(|p| mapping.get(p).map_or_else(|| p.to_string(), ToString::to_string))
        .collect();
    let name = if args.is_empty() {
        action.name.clone()
    } else {
        format!("{}({})", action.name, args.join(", "))
    };
    let bindings = action
        .parameters
        .iter()
        .filter_map(|p| mapping.get(p).map(|v| (p.to_string(), v.clone())))
        .collect();
    Some(GroundedOperator {
        name,
        schema: Some(action.name.clone()),
        parameters: action.parameters.iter().map(ToString::to_string).collect(),
        num_external_parameters: action.num_external_parameters,
        bindings,
        preconditions: action
            .preconditions
            .iter()
            .filter(|l| !l.fact.is_equality())
            .map(|l| l.substitute(mapping))
            .collect(),
        add_effects: action.add_effects.iter().map(|f| f.substitute(mapping)).collect(),
        del_effects: action.del_effects.iter().map(|f| f.substitute(mapping)).collect(),
        cost,
        cost_function,
    })
}

fn ground_axiom(axiom: &AxiomSchema, mapping: &Mapping) -> GroundedAxiom {
    GroundedAxiom {
        name: axiom.name.clone(),
        condition: axiom
            .condition
            .iter()
            .filter(|l| !l.fact.is_equality())
            .map(|l| l.substitute(mapping))
            .collect(),
        effect: axiom.derived.substitute(mapping),
    }
}

/// Uniform-cost search over full states, with derived predicates evaluated
/// by closing each state under the task's rules.
#[derive(Debug, Clone, Copy)]
pub struct UniformCostSearch {
    max_expansions: usize,
}

impl Default for UniformCostSearch {
    fn default() -> Self {
        Self {
            max_expansions: 100_000,
        }
    }
}

impl UniformCostSearch {
    /// Search that gives up after `max_expansions` expanded states.
    #[must_use]
    pub const fn with_max_expansions(max_expansions: usize) -> Self {
        Self { max_expansions }
    }
}

impl Search for UniformCostSearch {
    fn solve(&self, task: &GroundedTask) -> PlanResult<Option<Vec<PlannedAction>>> {
        let mut states: Vec<BTreeSet<Fact>> = vec![task.init.clone()];
        let mut parents: Vec<Option<(usize, usize)>> = vec![None];
        let mut best: BTreeMap<BTreeSet<Fact>, i64> = BTreeMap::new();
        best.insert(task.init.clone(), 0);
        let mut queue = BinaryHeap::new();
        queue.push(Reverse((0_i64, 0_usize)));

        let mut expansions = 0;
        while let Some(Reverse((cost, node))) = queue.pop() {
            if best.get(&states[node]).is_some_and(|&c| c < cost) {
                continue;
            }
            let closed = task.derive(&states[node]);
            if task.goal.iter().all(|l| literal_holds(&closed, l)) {
                return Ok(Some(extract_plan(task, &parents, node)));
            }
            expansions += 1;
            if expansions > self.max_expansions {
                warn!(expansions, "search expansion limit reached");
                return Ok(None);
            }
            for (op_index, operator) in task.operators.iter().enumerate() {
                if !operator.applicable(&closed) {
                    continue;
                }
                let mut next = states[node].clone();
                operator.apply(&mut next);
                let next_cost = cost + operator.cost;
                if best.get(&next).is_some_and(|&c| c <= next_cost) {
                    continue;
                }
                best.insert(next.clone(), next_cost);
                states.push(next);
                parents.push(Some((node, op_index)));
                queue.push(Reverse((next_cost, states.len() - 1)));
            }
        }
        Ok(None)
    }
}

fn extract_plan(
    task: &GroundedTask,
    parents: &[Option<(usize, usize)>],
    mut node: usize,
) -> Vec<PlannedAction> {
    let mut plan = Vec::new();
    while let Some((parent, op_index)) = parents[node] {
        plan.push(PlannedAction::new(task.operators[op_index].name.clone()));
        node = parent;
    }
    plan.reverse();
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Object {
        Object::variable(name)
    }

    fn blocks_domain() -> Domain {
        Domain::new("blocks").with_action(
            ActionSchema::new("move", &["?x", "?from", "?to"])
                .precondition(Fact::new("on", vec![var("?x"), var("?from")]).positive())
                .precondition(Fact::new("clear", vec![var("?x")]).positive())
                .precondition(Fact::new("clear", vec![var("?to")]).positive())
                .precondition(Fact::new(EQ, vec![var("?x"), var("?to")]).negative())
                .add(Fact::new("on", vec![var("?x"), var("?to")]))
                .add(Fact::new("clear", vec![var("?from")]))
                .delete(Fact::new("on", vec![var("?x"), var("?from")]))
                .delete(Fact::new("clear", vec![var("?to")])),
        )
    }

    fn problem(goal: Vec<Literal>) -> Problem {
        Problem {
            init: [
                Fact::ground("on", &["a", "b"]),
                Fact::ground("on", &["b", "t"]),
                Fact::ground("clear", &["a"]),
                Fact::ground("clear", &["c"]),
                Fact::ground("on", &["c", "t"]),
            ]
            .into_iter()
            .collect(),
            function_values: BTreeMap::new(),
            goal,
            use_metric: true,
        }
    }

    #[test]
    fn grounder_skips_equal_bindings_and_unreachable_goals() {
        let task = ReferenceGrounder
            .instantiate(&blocks_domain(), &problem(vec![Fact::ground("on", &["a", "c"]).positive()]))
            .unwrap()
            .unwrap();
        assert!(task.operators.iter().all(|o| o.bindings["?x"] != o.bindings["?to"]));
        assert!(task.operators.iter().any(|o| o.name == "move(a, b, c)"));

        let none = ReferenceGrounder
            .instantiate(&blocks_domain(), &problem(vec![Fact::ground("on", &["a", "z"]).positive()]))
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn search_finds_cheapest_plan() {
        let goal = vec![
            Fact::ground("on", &["a", "c"]).positive(),
            Fact::ground("on", &["b", "a"]).positive(),
        ];
        let task = ReferenceGrounder
            .instantiate(&blocks_domain(), &problem(goal))
            .unwrap()
            .unwrap();
        let plan = UniformCostSearch::default().solve(&task).unwrap().unwrap();
        let names: Vec<&str> = plan.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["move(a, b, c)", "move(b, t, a)"]);
    }

    #[test]
    fn function_costs_require_values() {
        let domain = Domain::new("drive").with_action(
            ActionSchema::new("drive", &["?from", "?to"])
                .precondition(Fact::new("at", vec![var("?from")]).positive())
                .precondition(Fact::new("road", vec![var("?from"), var("?to")]).positive())
                .add(Fact::new("at", vec![var("?to")]))
                .delete(Fact::new("at", vec![var("?from")]))
                .cost(ActionCost::Function(Fact::new("dist", vec![var("?from"), var("?to")]))),
        );
        let problem = Problem {
            init: [
                Fact::ground("at", &["l1"]),
                Fact::ground("road", &["l1", "l2"]),
                Fact::ground("road", &["l1", "l3"]),
            ]
            .into_iter()
            .collect(),
            function_values: [(Fact::ground("dist", &["l1", "l2"]), 2.5)].into_iter().collect(),
            goal: vec![Fact::ground("at", &["l2"]).positive()],
            use_metric: true,
        };
        let task = ReferenceGrounder.instantiate(&domain, &problem).unwrap().unwrap();
        assert_eq!(task.operators.len(), 1);
        assert_eq!(task.operators[0].cost, 2500);
        assert_eq!(task.operators[0].cost_function, Some(Fact::ground("dist", &["l1", "l2"])));
    }

    #[test]
    fn search_respects_expansion_limit() {
        let goal = vec![Fact::ground("on", &["b", "a"]).positive()];
        let task = ReferenceGrounder
            .instantiate(&blocks_domain(), &problem(goal))
            .unwrap()
            .unwrap();
        assert!(UniformCostSearch::with_max_expansions(0).solve(&task).unwrap().is_none());
    }
}
