//! Default conversion of negated-stream literals into test results.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::error::{PlanResult, ValidationError};
use crate::external::NegativeConverter;
use crate::fact::{Fact, Literal, Mapping, Object};
use crate::stream::{ResultId, StreamRegistry};

/// Instantiates the negated sampler behind each literal.
///
/// The literal's arguments are matched against the sampler's certified
/// template to recover the instance inputs. Fluent samplers get one instance
/// per step that needs the literal, bound to that step's fluent facts; other
/// samplers get a single instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredNegativeConverter;

impl NegativeConverter for DeclaredNegativeConverter {
    fn convert(
        &self,
        registry: &mut StreamRegistry,
        negative_preimage: &BTreeMap<Literal, BTreeSet<usize>>,
        real_states: &[BTreeSet<Fact>],
    ) -> PlanResult<Vec<ResultId>> {
        let samplers = registry.negative_predicates();
        let mut results = Vec::new();
        for (literal, steps) in negative_preimage {
            let Some(&sampler_id) = samplers.get(literal.predicate()) else {
                continue;
            };
            if !literal.negated {
                return Err(ValidationError::InvalidField {
                    field: "preimage".to_string(),
                    reason: format!("negated test predicate used positively in {literal}"),
                }
                .into());
            }
            let sampler = &registry[sampler_id];
            let template = sampler
                .certified
                .first()
                .ok_or_else(|| ValidationError::MissingField {
                    field: format!("{}.certified", sampler.name),
                })?;
            let mapping: Mapping = template
                .args
                .iter()
                .cloned()
                .zip(literal.fact.args.iter().cloned())
                .collect();
            let inputs = sampler
                .inputs
                .iter()
                .map(|p| {
                    mapping.get(p).cloned().ok_or_else(|| ValidationError::MissingField {
                        field: format!("{}.{p}", sampler.name),
                    })
                })
                .collect::<Result<Vec<Object>, _>>()?;

            let fluent_sets: Vec<Vec<Fact>> = if sampler.is_fluent() {
                let fluents = sampler.fluents.clone();
                steps
                    .iter()
                    .map(|&step| {
                        real_states
                            .get(step)
                            .into_iter()
                            .flatten()
                            .filter(|f| fluents.contains(&f.predicate))
                            .cloned()
                            .collect()
                    })
                    .collect()
            } else {
                vec![Vec::new()]
            };
            for fluent_facts in fluent_sets {
                let instance = registry.get_instance(sampler_id, inputs.clone(), fluent_facts)?;
                let result = registry.add_result(instance, None, 0)?;
                trace!(%literal, %result, "negated test scheduled");
                results.push(result);
            }
        }
        Ok(results)
    }
}
