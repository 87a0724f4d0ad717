//! Core types for the branching business simulation.
//!
//! A run owns everything it produced: the per-month generation history, the
//! state tree, and the id-keyed path map. Nothing here is process-global, so
//! independent runs can proceed concurrently.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SimulationError;
use crate::tree::StateTree;

/// Stable identifier minted when a state is created.
///
/// The path map is keyed by this id rather than by the state text, so two
/// branches producing identical descriptions never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateId(Uuid);

impl StateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ordered action labels from the tree root down to a state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPath(Vec<String>);

impl ActionPath {
    /// The empty path addressing the root sentinel.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path of the child reached by taking `label` from here.
    pub fn child(&self, label: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(label.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Splits into (path of the parent node, label of the final hop).
    /// `None` for the root path.
    pub fn parent_and_label(&self) -> Option<(&[String], &str)> {
        self.0
            .split_last()
            .map(|(label, parent)| (parent, label.as_str()))
    }
}

/// One business state at a point in simulated time.
///
/// The description is opaque text from a prediction oracle; revenue and
/// funding are derived on demand by [`crate::metrics::extract`], never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessState {
    pub id: StateId,
    pub description: String,
    /// Month this state belongs to; 0 is the seed.
    pub month: u32,
    /// Action labels taken from the root to reach this state.
    pub path: ActionPath,
}

impl BusinessState {
    /// The externally supplied month-0 state.
    pub fn seed(description: impl Into<String>) -> Self {
        Self {
            id: StateId::new(),
            description: description.into(),
            month: 0,
            path: ActionPath::root(),
        }
    }

    /// A state produced by a prediction oracle call.
    pub fn generated(description: String, month: u32, path: ActionPath) -> Self {
        Self {
            id: StateId::new(),
            description,
            month,
            path,
        }
    }
}

/// Knobs for one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of months to simulate.
    pub month_length: u32,
    /// Maximum states kept active for expansion each month.
    pub beam_width: usize,
    /// Maximum prediction calls in flight at once.
    pub concurrency_cap: usize,
    /// Deadline for a single oracle call.
    pub oracle_timeout: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            month_length: 1,
            beam_width: 4,
            concurrency_cap: 8,
            oracle_timeout: Duration::from_secs(60),
        }
    }
}

impl SimulationConfig {
    /// Rejects out-of-range values before any oracle call is made.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.month_length < 1 {
            return Err(SimulationError::InvalidConfig(
                "month_length must be >= 1".to_string(),
            ));
        }
        if self.beam_width < 1 {
            return Err(SimulationError::InvalidConfig(
                "beam_width must be >= 1".to_string(),
            ));
        }
        if self.concurrency_cap < 1 {
            return Err(SimulationError::InvalidConfig(
                "concurrency_cap must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a single `run` invocation produced.
///
/// Created at the start of the run, mutated only by the orchestrating task,
/// and returned by value on completion.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationRun {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Months actually advanced; may stop short of `month_length` when a
    /// month ends with no surviving states.
    pub month_index: u32,
    pub beam_width: usize,
    /// Generation history: `history[m]` is the full state list of month `m`.
    pub history: Vec<Vec<BusinessState>>,
    pub tree: StateTree,
    /// Id-keyed record of every generated state's tree address.
    pub paths: HashMap<StateId, ActionPath>,
}

impl SimulationRun {
    pub(crate) fn new(seed: BusinessState, beam_width: usize) -> Self {
        let tree = StateTree::new(&seed.description);
        let mut paths = HashMap::new();
        paths.insert(seed.id, seed.path.clone());
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            month_index: 0,
            beam_width,
            history: vec![vec![seed]],
            tree,
            paths,
        }
    }

    /// The final month's active state list.
    pub fn final_states(&self) -> &[BusinessState] {
        self.history.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every state across all months in generation order, seed first.
    ///
    /// Order within one month reflects prediction completion order and is
    /// nondeterministic; compare as a multiset.
    pub fn flat_states(&self) -> Vec<&BusinessState> {
        self.history.iter().flatten().collect()
    }

    /// Serializable nested-mapping view of the full state tree.
    pub fn snapshot(&self) -> serde_json::Value {
        self.tree.snapshot()
    }
}
