//! Recovery of the facts a discrete plan relies on.
//!
//! The search only returns operator names. From them this module rebuilds the
//! interleaving of derived-predicate rules and actions, the real states the
//! plan passes through, and the causal preimage: every literal the plan needs,
//! tagged with the steps that need it.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::error::RecoveryError;
use crate::fact::{Fact, Literal};
use crate::stream::SamplerId;
use crate::task::{literal_holds, GroundedAxiom, GroundedOperator, GroundedTask};

/// Literal to the plan steps that need it.
pub type Preimage = BTreeMap<Literal, BTreeSet<usize>>;

/// A discrete plan with its supporting rules and states.
///
/// For `n` actions, `actions` holds them followed by the goal pseudo-operator,
/// `axiom_plans[i]` holds the rules that fire before `actions[i]`, and
/// `real_states[i]` is the state before step `i` (so all three have length
/// `n + 1`).
#[derive(Debug, Clone, Default)]
pub struct InterleavedPlan {
    /// Rules firing before each step.
    pub axiom_plans: Vec<Vec<GroundedAxiom>>,
    /// Actions, then the goal pseudo-operator.
    pub actions: Vec<GroundedOperator>,
    /// Real state before each step.
    pub real_states: Vec<BTreeSet<Fact>>,
}

impl InterleavedPlan {
    /// Number of real actions (excluding the goal).
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len().saturating_sub(1)
    }

    /// Whether the plan has no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rebuild the interleaved plan of `actions` (goal excluded).
///
/// Rules are recovered against the optimistic state (the task's initial state
/// advanced by each action); real states start from `real_init`. Each step's
/// basic preconditions must hold in the optimistic state.
pub fn recover_interleaved_plan(
    task: &GroundedTask,
    actions: &[GroundedOperator],
    real_init: &BTreeSet<Fact>,
) -> Result<InterleavedPlan, RecoveryError> {
    let derived = task.derived_predicates();
    let mut steps: Vec<GroundedOperator> = actions.to_vec();
    steps.push(GroundedOperator::goal(&task.goal));

    let mut state = task.init.clone();
    let mut real_state = real_init.clone();
    let mut plan = InterleavedPlan::default();
    for (step, operator) in steps.into_iter().enumerate() {
        for literal in &operator.preconditions {
            if !derived.contains(literal.predicate()) && !literal_holds(&state, literal) {
                return Err(RecoveryError::PreconditionViolated {
                    step,
                    literal: literal.clone(),
                });
            }
        }
        let axioms = recover_step_axioms(task, &derived, &state, &operator.preconditions, step)?;
        trace!(step, operator = %operator.name, axioms = axioms.len(), "step recovered");
        plan.axiom_plans.push(axioms);
        plan.real_states.push(real_state.clone());
        if step < actions.len() {
            operator.apply(&mut state);
            operator.apply(&mut real_state);
        }
        plan.actions.push(operator);
    }
    Ok(plan)
}

/// Minimal set of rules justifying the derived preconditions of one step.
///
/// Candidate rules are those whose basic conditions hold in `state`. A
/// positive derived precondition is justified by a rule whose derived
/// conditions were reached at a strictly earlier level; a negative one must not
/// be derivable at all.
fn recover_step_axioms(
    task: &GroundedTask,
    derived: &BTreeSet<String>,
    state: &BTreeSet<Fact>,
    preconditions: &[Literal],
    step: usize,
) -> Result<Vec<GroundedAxiom>, RecoveryError> {
    let needed: Vec<&Literal> = preconditions
        .iter()
        .filter(|l| derived.contains(l.predicate()))
        .collect();
    if needed.is_empty() {
        return Ok(Vec::new());
    }

    let candidates: Vec<&GroundedAxiom> = task
        .axioms
        .iter()
        .filter(|a| {
            a.condition
                .iter()
                .all(|l| derived.contains(l.predicate()) || literal_holds(state, l))
        })
        .collect();

    // Relaxed levels of derived atoms; negative derived conditions are ignored.
    let mut level: BTreeMap<Fact, usize> = BTreeMap::new();
    let mut round = 0;
    loop {
        let mut reached = Vec::new();
        for axiom in &candidates {
            if level.contains_key(&axiom.effect) {
                continue;
            }
            let ready = axiom
                .condition
                .iter()
                .filter(|l| derived.contains(l.predicate()) && !l.negated)
                .all(|l| level.get(&l.fact).is_some_and(|&lv| lv < round + 1));
            if ready {
                reached.push(axiom.effect.clone());
            }
        }
        if reached.is_empty() {
            break;
        }
        round += 1;
        for fact in reached {
            level.entry(fact).or_insert(round);
        }
    }

    let closure = task.derive(state);
    let mut unjustified = Vec::new();
    let mut chosen: Vec<GroundedAxiom> = Vec::new();
    let mut justified: BTreeSet<Fact> = BTreeSet::new();
    for literal in needed {
        if literal.negated {
            if closure.contains(&literal.fact) {
                unjustified.push(literal.clone());
            }
            continue;
        }
        if !justify(&literal.fact, &candidates, derived, &level, &mut justified, &mut chosen) {
            unjustified.push(literal.clone());
        }
    }
    if unjustified.is_empty() {
        Ok(chosen)
    } else {
        Err(RecoveryError::UnjustifiedAxioms { step, unjustified })
    }
}

fn justify(
    fact: &Fact,
    candidates: &[&GroundedAxiom],
    derived: &BTreeSet<String>,
    level: &BTreeMap<Fact, usize>,
    justified: &mut BTreeSet<Fact>,
    chosen: &mut Vec<GroundedAxiom>,
) -> bool {
    if justified.contains(fact) {
        return true;
    }
    let Some(&fact_level) = level.get(fact) else {
        return false;
    };
    let support = candidates.iter().find(|a| {
        a.effect == *fact
            && a.condition
                .iter()
                .filter(|l| derived.contains(l.predicate()) && !l.negated)
                .all(|l| level.get(&l.fact).is_some_and(|&lv| lv < fact_level))
    });
    let Some(axiom) = support else {
        return false;
    };
    for condition in &axiom.condition {
        if derived.contains(condition.predicate())
            && !condition.negated
            && !justify(&condition.fact, candidates, derived, level, justified, chosen)
        {
            return false;
        }
    }
    justified.insert(fact.clone());
    chosen.push((*axiom).clone());
    true
}

/// Causal preimage of an interleaved plan by backward regression.
///
/// Walking from the goal backwards, an action removes both signs of each atom
/// it affects and adds its preconditions at its step; a rule removes its
/// derived atom and adds its conditions at the step it precedes.
#[must_use]
pub fn plan_preimage(plan: &InterleavedPlan) -> Preimage {
    let mut preimage = Preimage::new();
    for step in (0..plan.actions.len()).rev() {
        let operator = &plan.actions[step];
        for fact in operator.add_effects.iter().chain(&operator.del_effects) {
            preimage.remove(&Literal::positive(fact.clone()));
            preimage.remove(&Literal::negative(fact.clone()));
        }
        for literal in &operator.preconditions {
            preimage.entry(literal.clone()).or_default().insert(step);
        }
        if let Some(axioms) = plan.axiom_plans.get(step) {
            for axiom in axioms.iter().rev() {
                preimage.remove(&Literal::positive(axiom.effect.clone()));
                for literal in &axiom.condition {
                    preimage.entry(literal.clone()).or_default().insert(step);
                }
            }
        }
    }
    preimage
}

/// Preimage split for stream recovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreimagePartition {
    /// Literals over predicates tested by negated samplers.
    pub negative: Preimage,
    /// Every other literal not already true in the real initial state.
    pub positive: Preimage,
    /// Positive, non-equality facts that stream results must certify.
    pub targets: Vec<Fact>,
}

/// Partition a preimage, dropping positive literals true in `real_init`.
#[must_use]
pub fn partition_preimage(
    preimage: &Preimage,
    real_init: &BTreeSet<Fact>,
    negative_predicates: &BTreeMap<String, SamplerId>,
) -> PreimagePartition {
    let mut partition = PreimagePartition::default();
    for (literal, steps) in preimage {
        if !literal.negated && real_init.contains(&literal.fact) {
            continue;
        }
        if negative_predicates.contains_key(literal.predicate()) {
            partition.negative.insert(literal.clone(), steps.clone());
            continue;
        }
        if !literal.negated && !literal.fact.is_equality() {
            partition.targets.push(literal.fact.clone());
        }
        partition.positive.insert(literal.clone(), steps.clone());
    }
    partition
}

/// Steps at which each target fact is needed, keyed by fact.
#[must_use]
pub fn fact_steps(preimage: &Preimage) -> BTreeMap<Fact, BTreeSet<usize>> {
    let mut steps: BTreeMap<Fact, BTreeSet<usize>> = BTreeMap::new();
    for (literal, at) in preimage {
        if !literal.negated {
            steps.entry(literal.fact.clone()).or_default().extend(at);
        }
    }
    steps
}
