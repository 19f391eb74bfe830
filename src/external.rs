//! Collaborator contracts.
//!
//! The scheduler does not ground, search, reorder, or evaluate negated tests
//! itself; it consumes these traits. [`TimedSearch`] bounds any search with a
//! wall-clock limit by running it on a dedicated worker thread.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Domain, Problem};
use crate::error::{PlanError, PlanResult};
use crate::evaluation::Evaluations;
use crate::fact::{Fact, Literal, Object};
use crate::stream::{ResultId, StreamRegistry};
use crate::task::GroundedTask;

/// One step returned by a search: operator name and arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    /// Name of a grounded operator of the searched task.
    pub name: String,
    /// Arguments as reported by the search.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Object>,
}

impl PlannedAction {
    /// Planned action without arguments.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }
}

/// Instantiates a domain and problem into a grounded task.
pub trait Grounder: Send + Sync {
    /// Returns `Ok(None)` when the problem is provably unsolvable.
    fn instantiate(&self, domain: &Domain, problem: &Problem) -> PlanResult<Option<GroundedTask>>;
}

/// Solves a grounded task.
pub trait Search: Send + Sync {
    /// Returns `Ok(None)` when no plan was found.
    fn solve(&self, task: &GroundedTask) -> PlanResult<Option<Vec<PlannedAction>>>;
}

/// Produces a dependency-respecting order of extracted stream results.
pub trait StreamPostprocessor: Send + Sync {
    /// `stream_plan` is unordered; `target_facts` are the facts it must realize.
    fn postprocess(
        &self,
        registry: &StreamRegistry,
        evaluations: &Evaluations,
        stream_plan: &[ResultId],
        target_facts: &[Fact],
    ) -> PlanResult<Vec<ResultId>>;
}

/// Turns negated-stream literals in the preimage into test results.
pub trait NegativeConverter: Send + Sync {
    /// `negative_preimage` maps each literal over a negated predicate to the
    /// steps that need it; `real_states[i]` is the state before step `i`.
    fn convert(
        &self,
        registry: &mut StreamRegistry,
        negative_preimage: &BTreeMap<Literal, BTreeSet<usize>>,
        real_states: &[BTreeSet<Fact>],
    ) -> PlanResult<Vec<ResultId>>;
}

/// Runs a search on a worker thread and gives up after a timeout.
///
/// The worker cannot be interrupted; on timeout it is detached and its late
/// reply is dropped.
pub struct TimedSearch {
    inner: Arc<dyn Search>,
    timeout: Duration,
}

impl TimedSearch {
    /// Wrap `inner` with a wall-clock limit.
    #[must_use]
    pub fn new(inner: Arc<dyn Search>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// The configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Search for TimedSearch {
    fn solve(&self, task: &GroundedTask) -> PlanResult<Option<Vec<PlannedAction>>> {
        let (tx, rx) = bounded(1);
        let inner = Arc::clone(&self.inner);
        let task = task.clone();
        thread::Builder::new()
            .name("kyroplan-search".to_string())
            .spawn(move || {
                let _ = tx.send(inner.solve(&task));
            })
            .map_err(|e| PlanError::collaborator("search", format!("failed to spawn worker: {e}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = self.timeout.as_millis(), "search timed out");
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => Err(PlanError::collaborator(
                "search",
                "worker exited without a reply",
            )),
        }
    }
}
