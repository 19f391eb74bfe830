//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Fixed factor between real-valued costs and the integer costs searched over.
pub const COST_SCALE: f64 = 1000.0;

/// Converts a real-valued cost into the scaled integer domain.
#[must_use]
pub fn scale_cost(cost: f64) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    let scaled = (COST_SCALE * cost).round() as i64;
    scaled
}

/// Options for one scheduling call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Weight of stream effort added to operator costs; `None` disables the pass.
    pub effort_weight: Option<f64>,
    /// Count every stream result as one unit of effort.
    pub unit_efforts: bool,
    /// Ignore action costs and report the action count as plan cost.
    pub unit_costs: bool,
    /// Defer every stream result to a stream action.
    pub simultaneous: bool,
    /// Treat results that produced known evaluations as re-achievable.
    pub reachieve: bool,
    /// Wall-clock bound on the search call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_search_time: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            effort_weight: None,
            unit_efforts: false,
            unit_costs: false,
            simultaneous: false,
            reachieve: true,
            max_search_time: None,
        }
    }
}

impl SchedulerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(weight) = self.effort_weight {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ValidationError::InvalidConfig {
                    field: "effort_weight".to_string(),
                    reason: format!("must be finite and >= 0, got {weight}"),
                });
            }
        }
        if self.max_search_time == Some(Duration::ZERO) {
            return Err(ValidationError::InvalidConfig {
                field: "max_search_time".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}
