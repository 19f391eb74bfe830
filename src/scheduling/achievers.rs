//! Achievement graph: which result is recorded as the achiever of each fact.
//!
//! Built once per scheduling call by a Dijkstra-style forward pass over the
//! applied results. Initial facts have effort zero and no achiever; a result
//! fires once all of its domain facts are reached and offers its certified
//! facts at `own effort + sum of domain efforts`. A fact keeps the cheapest
//! achiever; ties keep the first.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use ordered_float::OrderedFloat;
use tracing::trace;

use crate::error::RecoveryError;
use crate::evaluation::Evaluations;
use crate::fact::Fact;
use crate::stream::{ResultId, StreamRegistry};

/// Achiever record of one fact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AchieverNode {
    /// Cumulative effort to reach the fact.
    pub effort: f64,
    /// Recorded achiever; `None` for initial facts.
    pub result: Option<ResultId>,
}

/// Map from fact to its recorded achiever.
#[derive(Debug, Clone, Default)]
pub struct AchievementGraph {
    nodes: BTreeMap<Fact, AchieverNode>,
}

impl AchievementGraph {
    /// Build the graph from initial `evaluations` and the `results` that may fire.
    #[must_use]
    pub fn build(
        registry: &StreamRegistry,
        evaluations: &Evaluations,
        results: &[ResultId],
        unit_efforts: bool,
    ) -> Self {
        let mut nodes: BTreeMap<Fact, AchieverNode> = BTreeMap::new();
        let mut waiting: BTreeMap<Fact, Vec<usize>> = BTreeMap::new();
        let mut remaining: Vec<usize> = Vec::with_capacity(results.len());
        let mut domains: Vec<Vec<Fact>> = Vec::with_capacity(results.len());
        let mut queue = BinaryHeap::new();
        let mut sequence = 0u64;

        for fact in evaluations.facts() {
            nodes.insert(
                fact.clone(),
                AchieverNode {
                    effort: 0.0,
                    result: None,
                },
            );
            queue.push(Reverse((OrderedFloat(0.0), sequence, fact.clone())));
            sequence += 1;
        }

        let mut ready = Vec::new();
        for (i, &result) in results.iter().enumerate() {
            let domain: Vec<Fact> = registry
                .domain(result)
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            for fact in &domain {
                waiting.entry(fact.clone()).or_default().push(i);
            }
            remaining.push(domain.len());
            if domain.is_empty() {
                ready.push(i);
            }
            domains.push(domain);
        }

        let fire = |i: usize,
                    nodes: &mut BTreeMap<Fact, AchieverNode>,
                    queue: &mut BinaryHeap<Reverse<(OrderedFloat<f64>, u64, Fact)>>,
                    sequence: &mut u64| {
            let result = results[i];
            let total = registry.effort(result, unit_efforts)
                + domains[i]
                    .iter()
                    .map(|f| nodes.get(f).map_or(0.0, |n| n.effort))
                    .sum::<f64>();
            for fact in registry.certified(result) {
                let improves = nodes.get(&fact).map_or(true, |n| total < n.effort);
                if improves {
                    trace!(%fact, %result, effort = total, "achiever recorded");
                    nodes.insert(
                        fact.clone(),
                        AchieverNode {
                            effort: total,
                            result: Some(result),
                        },
                    );
                    queue.push(Reverse((OrderedFloat(total), *sequence, fact)));
                    *sequence += 1;
                }
            }
        };

        for i in ready {
            fire(i, &mut nodes, &mut queue, &mut sequence);
        }

        while let Some(Reverse((_, _, fact))) = queue.pop() {
            let Some(dependents) = waiting.remove(&fact) else {
                continue;
            };
            for i in dependents {
                remaining[i] -= 1;
                if remaining[i] == 0 {
                    fire(i, &mut nodes, &mut queue, &mut sequence);
                }
            }
        }

        Self { nodes }
    }

    /// Achiever record of `fact`.
    #[must_use]
    pub fn node(&self, fact: &Fact) -> Option<&AchieverNode> {
        self.nodes.get(fact)
    }

    /// Recorded achiever of `fact` (`None` for initial or unknown facts).
    #[must_use]
    pub fn achiever(&self, fact: &Fact) -> Option<ResultId> {
        self.nodes.get(fact).and_then(|n| n.result)
    }

    /// Whether `fact` is reachable.
    #[must_use]
    pub fn contains(&self, fact: &Fact) -> bool {
        self.nodes.contains_key(fact)
    }

    /// Number of reachable facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no fact is reachable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Minimal set of results realizing `target_facts`, in dependency order.
    ///
    /// Walks from each target to its achiever and recursively into the
    /// achiever's domain facts, stopping at initial facts. Results appear once,
    /// after every result they depend on. A target (or transitive domain fact)
    /// missing from the graph is an internal inconsistency.
    pub fn extract(
        &self,
        registry: &StreamRegistry,
        target_facts: &[Fact],
    ) -> Result<Vec<ResultId>, RecoveryError> {
        let mut plan = Vec::new();
        let mut visited = BTreeSet::new();
        for fact in target_facts {
            self.extract_fact(registry, fact, &mut visited, &mut plan)?;
        }
        Ok(plan)
    }

    fn extract_fact(
        &self,
        registry: &StreamRegistry,
        fact: &Fact,
        visited: &mut BTreeSet<ResultId>,
        plan: &mut Vec<ResultId>,
    ) -> Result<(), RecoveryError> {
        let node = self
            .nodes
            .get(fact)
            .ok_or_else(|| RecoveryError::MissingAchiever { fact: fact.clone() })?;
        let Some(result) = node.result else {
            return Ok(());
        };
        if !visited.insert(result) {
            return Ok(());
        }
        for domain_fact in registry.domain(result) {
            self.extract_fact(registry, &domain_fact, visited, plan)?;
        }
        plan.push(result);
        Ok(())
    }
}

/// Sum of result efforts of a stream plan.
#[must_use]
pub fn plan_effort(registry: &StreamRegistry, stream_plan: &[ResultId], unit_efforts: bool) -> f64 {
    stream_plan
        .iter()
        .map(|&r| registry.effort(r, unit_efforts))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::Object;
    use crate::stream::Sampler;

    fn var(name: &str) -> Object {
        Object::variable(name)
    }

    /// block(?x) -> pose(?x, ?p); pose(?x, ?p) -> grasp(?x, ?p, ?g)
    fn chain() -> (StreamRegistry, ResultId, ResultId) {
        let mut registry = StreamRegistry::new();
        let pose = registry.add_sampler(
            Sampler::stream("sample-pose")
                .inputs(&["?x"])
                .outputs(&["?p"])
                .domain(Fact::new("block", vec![var("?x")]))
                .certified(Fact::new("pose", vec![var("?x"), var("?p")]))
                .effort(2.0)
                .build()
                .unwrap(),
        );
        let grasp = registry.add_sampler(
            Sampler::stream("sample-grasp")
                .inputs(&["?x", "?p"])
                .outputs(&["?g"])
                .domain(Fact::new("pose", vec![var("?x"), var("?p")]))
                .certified(Fact::new("grasp", vec![var("?x"), var("?p"), var("?g")]))
                .effort(3.0)
                .build()
                .unwrap(),
        );
        let i1 = registry.get_instance(pose, vec![Object::constant("a")], vec![]).unwrap();
        let r1 = registry.add_result(i1, None, 0).unwrap();
        let p = registry[r1].outputs[0].clone();
        let i2 = registry
            .get_instance(grasp, vec![Object::constant("a"), p], vec![])
            .unwrap();
        let r2 = registry.add_result(i2, None, 0).unwrap();
        (registry, r1, r2)
    }

    #[test]
    fn efforts_accumulate_along_chain() {
        let (registry, r1, r2) = chain();
        let init = Evaluations::from_init([Fact::ground("block", &["a"])]);
        let graph = AchievementGraph::build(&registry, &init, &[r2, r1], false);

        let grasp_fact = registry.certified(r2)[0].clone();
        let node = graph.node(&grasp_fact).unwrap();
        assert_eq!(node.result, Some(r2));
        assert!((node.effort - 5.0).abs() < 1e-9);
        assert_eq!(graph.achiever(&Fact::ground("block", &["a"])), None);
    }

    #[test]
    fn extraction_orders_dependencies_first_and_is_idempotent() {
        let (registry, r1, r2) = chain();
        let init = Evaluations::from_init([Fact::ground("block", &["a"])]);
        let graph = AchievementGraph::build(&registry, &init, &[r1, r2], false);
        let targets = registry.certified(r2);

        let first = graph.extract(&registry, &targets).unwrap();
        let second = graph.extract(&registry, &targets).unwrap();
        assert_eq!(first, vec![r1, r2]);
        assert_eq!(first, second);
        assert!((plan_effort(&registry, &first, false) - 5.0).abs() < 1e-9);
        assert!((plan_effort(&registry, &first, true) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn unreached_result_never_fires() {
        let (registry, r1, r2) = chain();
        let graph = AchievementGraph::build(&registry, &Evaluations::new(), &[r1, r2], false);
        assert!(graph.is_empty());
        let err = graph.extract(&registry, &registry.certified(r1)).unwrap_err();
        assert!(matches!(err, RecoveryError::MissingAchiever { .. }));
    }

    #[test]
    fn cheaper_achiever_wins() {
        let mut registry = StreamRegistry::new();
        let mk = |name: &str, effort: f64| {
            Sampler::stream(name)
                .inputs(&["?x"])
                .certified(Fact::new("reachable", vec![var("?x")]))
                .effort(effort)
                .build()
                .unwrap()
        };
        let slow = registry.add_sampler(mk("slow", 5.0));
        let fast = registry.add_sampler(mk("fast", 1.0));
        let i_slow = registry.get_instance(slow, vec![Object::constant("a")], vec![]).unwrap();
        let i_fast = registry.get_instance(fast, vec![Object::constant("a")], vec![]).unwrap();
        let r_slow = registry.add_result(i_slow, None, 0).unwrap();
        let r_fast = registry.add_result(i_fast, None, 0).unwrap();

        let graph = AchievementGraph::build(&registry, &Evaluations::new(), &[r_slow, r_fast], false);
        assert_eq!(graph.achiever(&Fact::ground("reachable", &["a"])), Some(r_fast));
    }
}
