//! Relaxed stream-plan scheduling.
//!
//! [`RelaxedScheduler`] plans over an optimistic relaxation in which candidate
//! stream results are assumed to succeed, then recovers which of those results
//! the discrete plan actually needs and how to order them around the actions.
//!
//! Phases of one call:
//!
//! 1. [`augment`]: apply results whose inputs are known, defer the rest to
//!    stream actions, and extend the goal when optimizers are involved.
//! 2. The grounder instantiates the augmented problem.
//! 3. [`annotate`]: bias operator costs by stream effort and add optimizer
//!    blocking rules.
//! 4. The search solves the task.
//! 5. [`preimage`]: rebuild the interleaved plan, its real states, and the
//!    causal preimage; negated tests go through the negative converter.
//! 6. [`achievers`]: extract the results the preimage needs, then order them
//!    with the postprocessor.
//! 7. [`fluent`]: rebind fluent results to the states they are used in.
//! 8. [`assemble`]: combine everything and account for cost.

pub mod achievers;
pub mod annotate;
pub mod assemble;
pub mod augment;
pub mod fluent;
pub mod negative;
pub mod postprocess;
pub mod preimage;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SchedulerConfig;
use crate::domain::{Domain, Problem};
use crate::error::{PlanResult, RecoveryError, ValidationError};
use crate::evaluation::Evaluations;
use crate::external::{
    Grounder, NegativeConverter, PlannedAction, Search, StreamPostprocessor, TimedSearch,
};
use crate::fact::Literal;
use crate::plan::CombinedPlan;
use crate::stream::{ResultId, StreamRegistry};
use crate::task::{GroundedTask, OperatorId};

use self::achievers::AchievementGraph;
use self::assemble::PlanParts;
use self::negative::DeclaredNegativeConverter;
use self::postprocess::DependencyPostprocessor;

/// Outcome of one scheduling call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    /// Combined plan; `None` when the relaxed problem has no solution.
    pub plan: Option<CombinedPlan>,
    /// Plan cost; `f64::INFINITY` without a plan.
    pub cost: f64,
}

impl ScheduleOutcome {
    /// Outcome of an unsolvable problem.
    #[must_use]
    pub const fn unsolvable() -> Self {
        Self {
            plan: None,
            cost: f64::INFINITY,
        }
    }

    /// Whether a plan was found.
    #[must_use]
    pub const fn is_solved(&self) -> bool {
        self.plan.is_some()
    }
}

/// Plans over optimistic stream results and recovers an executable
/// interleaving of stream invocations and actions.
#[derive(Clone)]
pub struct RelaxedScheduler {
    grounder: Arc<dyn Grounder>,
    search: Arc<dyn Search>,
    postprocessor: Arc<dyn StreamPostprocessor>,
    negative_converter: Arc<dyn NegativeConverter>,
    config: SchedulerConfig,
}

impl RelaxedScheduler {
    /// Create a scheduler with the default postprocessor and negative
    /// converter.
    #[must_use]
    pub fn new(grounder: Arc<dyn Grounder>, search: Arc<dyn Search>) -> Self {
        Self {
            grounder,
            search,
            postprocessor: Arc::new(DependencyPostprocessor),
            negative_converter: Arc::new(DeclaredNegativeConverter),
            config: SchedulerConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the stream-plan postprocessor.
    #[must_use]
    pub fn with_postprocessor(mut self, postprocessor: Arc<dyn StreamPostprocessor>) -> Self {
        self.postprocessor = postprocessor;
        self
    }

    /// Replace the converter for negated sampler tests.
    #[must_use]
    pub fn with_negative_converter(mut self, converter: Arc<dyn NegativeConverter>) -> Self {
        self.negative_converter = converter;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Plan for `goal` from `evaluations`, assuming the candidate `results`
    /// succeed, and recover the combined plan.
    ///
    /// New instances and results created while rebinding fluent streams and
    /// converting negated tests are registered in `registry`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad configuration, a recovery error
    /// when the returned plan cannot be justified, an unsupported error for a
    /// fluent result other streams depend on, and any collaborator failure
    /// unchanged. An unsolvable problem is not an error.
    pub fn schedule(
        &self,
        registry: &mut StreamRegistry,
        evaluations: &Evaluations,
        goal: &[Literal],
        domain: &Domain,
        results: &[ResultId],
    ) -> PlanResult<ScheduleOutcome> {
        let config = &self.config;
        config.validate()?;
        for &result in results {
            if result.index() >= registry.result_count() {
                return Err(ValidationError::UnknownResult { id: result }.into());
            }
        }

        let partition =
            augment::partition_results(registry, evaluations, results, config.simultaneous);
        let opt_evaluations = evaluations.with_results(registry, &partition.applied);
        let augmented = augment::add_stream_actions(registry, domain, &partition.deferred);
        let goal = if augment::using_optimizers(registry, results) {
            augment::add_unsatisfiable_to_goal(goal)
        } else {
            goal.to_vec()
        };
        debug!(
            applied = partition.applied.len(),
            deferred = partition.deferred.len(),
            "results partitioned"
        );

        // Recovery reasons from the initial state, with achieved results as achievers.
        let (base, applied) = if config.reachieve {
            let mut applied = evaluations.achieved_results();
            for &result in &partition.applied {
                if !applied.contains(&result) {
                    applied.push(result);
                }
            }
            (evaluations.initial_only(), applied)
        } else {
            (evaluations.clone(), partition.applied.clone())
        };

        let problem = Problem::from_evaluations(&opt_evaluations, goal, config.unit_costs);
        let Some(mut task) = self.grounder.instantiate(&augmented.domain, &problem)? else {
            debug!("grounder proved the problem unsolvable");
            return Ok(ScheduleOutcome::unsolvable());
        };

        let graph = AchievementGraph::build(registry, &base, &applied, config.unit_efforts);
        let cost_from_action: Vec<i64> = task.operators.iter().map(|o| o.cost).collect();
        if config.effort_weight.is_some() || augment::using_optimizers(registry, &applied) {
            annotate::add_stream_efforts(
                registry,
                &mut task,
                &graph,
                config.effort_weight,
                config.unit_efforts,
            )?;
        }
        annotate::add_optimizer_axioms(registry, &mut task, results);

        let Some(planned) = self.solve(&task)? else {
            debug!("search found no plan");
            return Ok(ScheduleOutcome::unsolvable());
        };
        let mut action_ids = resolve_names(&task, &planned)?;
        debug!(actions = action_ids.len(), "search returned a plan");

        let actions: Vec<_> = action_ids.iter().map(|&id| task[id].clone()).collect();
        let real_init = base.fact_set();
        let interleaved = preimage::recover_interleaved_plan(&task, &actions, &real_init)?;
        let plan_preimage = preimage::plan_preimage(&interleaved);
        let split_preimage = preimage::partition_preimage(
            &plan_preimage,
            &real_init,
            &registry.negative_predicates(),
        );
        let negative_results = self.negative_converter.convert(
            registry,
            &split_preimage.negative,
            &interleaved.real_states,
        )?;

        let stream_plan = graph.extract(registry, &split_preimage.targets)?;
        let stream_plan = self.postprocessor.postprocess(
            registry,
            &base,
            &stream_plan,
            &split_preimage.targets,
        )?;
        debug!(
            targets = split_preimage.targets.len(),
            results = stream_plan.len(),
            "stream plan extracted"
        );

        let split = assemble::split_actions(&task, &action_ids, &augmented.result_from_name);
        let costs: Vec<i64> = split
            .actions
            .iter()
            .map(|id| cost_from_action[id.index()])
            .collect();
        // Priced by the heads the search saw, before fluent rebinding renames them.
        let mut function_results =
            assemble::function_plan(&task, &split.actions, &opt_evaluations, config.unit_costs);
        function_results.extend(negative_results);

        let resolution = fluent::resolve_fluents(
            registry,
            &stream_plan,
            &graph,
            &preimage::fact_steps(&split_preimage.positive),
            &interleaved.real_states,
            &mut task,
            &mut action_ids,
        )?;
        let split = assemble::split_actions(&task, &action_ids, &augmented.result_from_name);

        let plan = assemble::assemble(
            registry,
            &task,
            &PlanParts {
                static_results: &resolution.static_plan,
                fluent_results: &resolution.fluent_plan,
                stream_action_results: &split.stream_results,
                actions: &split.actions,
                function_results: &function_results,
            },
        )?;
        let cost = assemble::plan_cost(&costs, config.unit_costs);
        debug!(steps = plan.len(), cost, "combined plan assembled");
        Ok(ScheduleOutcome {
            plan: Some(plan),
            cost,
        })
    }

    /// Search on a copy whose operators are renamed by handle.
    fn solve(&self, task: &GroundedTask) -> PlanResult<Option<Vec<PlannedAction>>> {
        let mut renamed = task.clone();
        for (i, operator) in renamed.operators.iter_mut().enumerate() {
            operator.name = OperatorId::from_index(i).to_string();
        }
        match self.config.max_search_time {
            Some(timeout) => TimedSearch::new(Arc::clone(&self.search), timeout).solve(&renamed),
            None => self.search.solve(&renamed),
        }
    }
}

fn resolve_names(
    task: &GroundedTask,
    planned: &[PlannedAction],
) -> Result<Vec<OperatorId>, RecoveryError> {
    let by_name: BTreeMap<String, OperatorId> = (0..task.operators.len())
        .map(|i| {
            let id = OperatorId::from_index(i);
            (id.to_string(), id)
        })
        .collect();
    planned
        .iter()
        .map(|action| {
            by_name
                .get(&action.name)
                .copied()
                .ok_or_else(|| RecoveryError::UnknownOperator {
                    name: action.name.clone(),
                })
        })
        .collect()
}
