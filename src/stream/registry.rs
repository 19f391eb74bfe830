//! Arena of samplers, sampler instances, and results.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::fact::{mapping_from, Fact, Mapping, Object, Placeholder};

use super::optimizer::{ConstraintStream, Optimizer};
use super::sampler::{Sampler, SamplerKind};
use super::{InstanceId, OptimizerId, ResultId, SamplerId};

/// A sampler bound to input objects (and, for fluent samplers, to the fluent
/// facts of one point in time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerInstance {
    /// Instance handle.
    pub id: InstanceId,
    /// Owning sampler.
    pub sampler: SamplerId,
    /// Input objects, aligned with the sampler's input parameters.
    pub inputs: Vec<Object>,
    /// Fluent facts the instance was bound to (sorted, deduplicated).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fluent_facts: Vec<Fact>,
    /// The sampler has been called at least once on this instance.
    pub enumerated: bool,
    /// No further values will be produced.
    pub disabled: bool,
    /// Number of calls that produced at least one value.
    pub successes: usize,
}

/// One outcome of a sampler instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamResult {
    /// Result handle.
    pub id: ResultId,
    /// Producing instance.
    pub instance: InstanceId,
    /// Output objects, aligned with the sampler's output parameters.
    pub outputs: Vec<Object>,
    /// Optimistic level; only level 0 results are rebound for fluents.
    pub opt_index: usize,
    /// Value of a function result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Owns every sampler, instance, result, and optimizer of one scheduling problem.
#[derive(Debug, Default, Clone)]
pub struct StreamRegistry {
    samplers: Vec<Sampler>,
    instances: Vec<SamplerInstance>,
    results: Vec<StreamResult>,
    optimizers: Vec<Optimizer>,
    instance_index: HashMap<(SamplerId, Vec<Object>, Vec<Fact>), InstanceId>,
}

impl StreamRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a sampler.
    pub fn add_sampler(&mut self, sampler: Sampler) -> SamplerId {
        let id = SamplerId::from_index(self.samplers.len());
        self.samplers.push(sampler);
        id
    }

    /// Declare an optimizer group.
    pub fn add_optimizer(&mut self, name: impl Into<String>) -> OptimizerId {
        let id = OptimizerId::from_index(self.optimizers.len());
        self.optimizers.push(Optimizer {
            id,
            name: name.into(),
            constraint_streams: Vec::new(),
        });
        id
    }

    /// Attach a constraint stream to an optimizer.
    pub fn add_constraint_stream(
        &mut self,
        optimizer: OptimizerId,
        stream: ConstraintStream,
    ) -> Result<(), ValidationError> {
        if stream.instance.index() >= self.instances.len() {
            return Err(ValidationError::UnknownInstance {
                id: stream.instance,
            });
        }
        let group = self
            .optimizers
            .get_mut(optimizer.index())
            .ok_or_else(|| ValidationError::InvalidField {
                field: "optimizer".to_string(),
                reason: format!("unknown optimizer {optimizer}"),
            })?;
        group.constraint_streams.push(stream);
        Ok(())
    }

    /// Returns the instance for `(sampler, inputs, fluent_facts)`, creating it on first use.
    pub fn get_instance(
        &mut self,
        sampler: SamplerId,
        inputs: Vec<Object>,
        fluent_facts: Vec<Fact>,
    ) -> Result<InstanceId, ValidationError> {
        let key = (sampler, inputs, normalize(fluent_facts));
        if let Some(id) = self.instance_index.get(&key) {
            return Ok(*id);
        }
        let id = self.new_instance(sampler, key.1.clone(), key.2.clone())?;
        self.instance_index.insert(key, id);
        Ok(id)
    }

    /// Creates an instance that is never shared with other lookups.
    ///
    /// Used when rebinding fluent results: each plan step needs its own
    /// placeholders even when two steps observe the same fluent facts.
    pub fn new_instance(
        &mut self,
        sampler: SamplerId,
        inputs: Vec<Object>,
        fluent_facts: Vec<Fact>,
    ) -> Result<InstanceId, ValidationError> {
        let declared = self
            .samplers
            .get(sampler.index())
            .ok_or(ValidationError::UnknownSampler { id: sampler })?;
        if declared.inputs.len() != inputs.len() {
            return Err(ValidationError::ArityMismatch {
                sampler: declared.name.clone(),
                slot: "input",
                expected: declared.inputs.len(),
                actual: inputs.len(),
            });
        }
        let id = InstanceId::from_index(self.instances.len());
        self.instances.push(SamplerInstance {
            id,
            sampler,
            inputs,
            fluent_facts: normalize(fluent_facts),
            enumerated: false,
            disabled: false,
            successes: 0,
        });
        Ok(id)
    }

    /// Register a result of `instance`.
    ///
    /// `None` outputs register the optimistic result: one fresh placeholder per
    /// output slot of the instance.
    pub fn add_result(
        &mut self,
        instance: InstanceId,
        outputs: Option<Vec<Object>>,
        opt_index: usize,
    ) -> Result<ResultId, ValidationError> {
        let owner = self
            .instances
            .get(instance.index())
            .ok_or(ValidationError::UnknownInstance { id: instance })?;
        let sampler = &self.samplers[owner.sampler.index()];
        let outputs = match outputs {
            Some(outputs) => outputs,
            None => placeholders(instance, sampler.outputs.len()),
        };
        if outputs.len() != sampler.outputs.len() {
            return Err(ValidationError::ArityMismatch {
                sampler: sampler.name.clone(),
                slot: "output",
                expected: sampler.outputs.len(),
                actual: outputs.len(),
            });
        }
        Ok(self.push_result(instance, outputs, opt_index, None))
    }

    /// Register the value of a function instance.
    pub fn add_function_result(
        &mut self,
        instance: InstanceId,
        value: f64,
    ) -> Result<ResultId, ValidationError> {
        let owner = self
            .instances
            .get(instance.index())
            .ok_or(ValidationError::UnknownInstance { id: instance })?;
        let sampler = &self.samplers[owner.sampler.index()];
        if !sampler.is_function() {
            return Err(ValidationError::InvalidField {
                field: "sampler".to_string(),
                reason: format!("{} is not a function sampler", sampler.name),
            });
        }
        if !value.is_finite() {
            return Err(ValidationError::InvalidField {
                field: "value".to_string(),
                reason: format!("function value must be finite, got {value}"),
            });
        }
        Ok(self.push_result(instance, Vec::new(), 0, Some(value)))
    }

    fn push_result(
        &mut self,
        instance: InstanceId,
        outputs: Vec<Object>,
        opt_index: usize,
        value: Option<f64>,
    ) -> ResultId {
        let id = ResultId::from_index(self.results.len());
        self.results.push(StreamResult {
            id,
            instance,
            outputs,
            opt_index,
            value,
        });
        id
    }

    /// Record that `instance` was called and whether it produced values.
    pub fn record_call(&mut self, instance: InstanceId, success: bool, exhausted: bool) {
        if let Some(inst) = self.instances.get_mut(instance.index()) {
            inst.enumerated = true;
            if success {
                inst.successes += 1;
            }
            inst.disabled |= exhausted;
        }
    }

    /// All declared samplers with their handles.
    pub fn samplers(&self) -> impl Iterator<Item = (SamplerId, &Sampler)> {
        self.samplers
            .iter()
            .enumerate()
            .map(|(i, s)| (SamplerId::from_index(i), s))
    }

    /// All optimizer groups.
    #[must_use]
    pub fn optimizers(&self) -> &[Optimizer] {
        &self.optimizers
    }

    /// Optimizer group by handle.
    #[must_use]
    pub fn optimizer(&self, id: OptimizerId) -> Option<&Optimizer> {
        self.optimizers.get(id.index())
    }

    /// Number of registered instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Number of registered results.
    #[must_use]
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// Sampler behind a result.
    #[must_use]
    pub fn sampler_of(&self, result: ResultId) -> &Sampler {
        &self[self[self[result].instance].sampler]
    }

    /// Domain facts of an instance.
    #[must_use]
    pub fn instance_domain(&self, instance: InstanceId) -> Vec<Fact> {
        let inst = &self[instance];
        let sampler = &self[inst.sampler];
        let mapping = mapping_from(&sampler.inputs, &inst.inputs);
        sampler
            .domain
            .iter()
            .map(|f| f.substitute(&mapping))
            .collect()
    }

    /// Domain facts of the instance behind a result.
    #[must_use]
    pub fn domain(&self, result: ResultId) -> Vec<Fact> {
        self.instance_domain(self[result].instance)
    }

    /// Parameter mapping (inputs and outputs) of a result.
    #[must_use]
    pub fn mapping(&self, result: ResultId) -> Mapping {
        let res = &self[result];
        let inst = &self[res.instance];
        let sampler = &self[inst.sampler];
        let mut mapping = mapping_from(&sampler.inputs, &inst.inputs);
        mapping.extend(mapping_from(&sampler.outputs, &res.outputs));
        mapping
    }

    /// Facts a result certifies.
    #[must_use]
    pub fn certified(&self, result: ResultId) -> Vec<Fact> {
        let mapping = self.mapping(result);
        self.sampler_of(result)
            .certified
            .iter()
            .map(|f| f.substitute(&mapping))
            .collect()
    }

    /// Function head a function result assigns, if any.
    #[must_use]
    pub fn function_head(&self, result: ResultId) -> Option<Fact> {
        match &self.sampler_of(result).kind {
            SamplerKind::Function { head } => Some(head.substitute(&self.mapping(result))),
            _ => None,
        }
    }

    /// Effort of a result; `unit_efforts` counts every result as one.
    #[must_use]
    pub fn effort(&self, result: ResultId, unit_efforts: bool) -> f64 {
        if unit_efforts {
            1.0
        } else {
            self.sampler_of(result).info.effort
        }
    }

    /// True if the result participates in an optimizer's constraints.
    #[must_use]
    pub fn is_optimizer_result(&self, result: ResultId) -> bool {
        self.sampler_of(result).optimizer.is_some()
    }

    /// Optimizer and substituted stream fact of an optimizer result.
    #[must_use]
    pub fn stream_fact(&self, result: ResultId) -> Option<(OptimizerId, Fact)> {
        self.sampler_of(result).optimizer.as_ref().map(|m| {
            (m.optimizer, m.stream_fact.substitute(&self.mapping(result)))
        })
    }

    /// Predicates tested by negated samplers.
    #[must_use]
    pub fn negative_predicates(&self) -> BTreeMap<String, SamplerId> {
        self.samplers()
            .filter_map(|(id, s)| s.negated_predicate().map(|p| (p.to_string(), id)))
            .collect()
    }

    /// Results registered for `instance`, in registration order.
    #[must_use]
    pub fn results_of_instance(&self, instance: InstanceId) -> Vec<ResultId> {
        self.results
            .iter()
            .filter(|r| r.instance == instance)
            .map(|r| r.id)
            .collect()
    }
}

fn placeholders(instance: InstanceId, count: usize) -> Vec<Object> {
    (0..count)
        .map(|output_index| {
            Object::Placeholder(Placeholder {
                instance,
                output_index,
            })
        })
        .collect()
}

fn normalize(facts: Vec<Fact>) -> Vec<Fact> {
    facts
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl Index<SamplerId> for StreamRegistry {
    type Output = Sampler;

    fn index(&self, id: SamplerId) -> &Sampler {
        &self.samplers[id.index()]
    }
}

impl Index<InstanceId> for StreamRegistry {
    type Output = SamplerInstance;

    fn index(&self, id: InstanceId) -> &SamplerInstance {
        &self.instances[id.index()]
    }
}

impl Index<ResultId> for StreamRegistry {
    type Output = StreamResult;

    fn index(&self, id: ResultId) -> &StreamResult {
        &self.results[id.index()]
    }
}
