//! Shared deterministic types for the planning core.
//!
//! These types define stable contracts between the task model, the
//! decomposition strategies, the domain and the planner. They carry no
//! references into the task tree, only [`TaskId`] handles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to a task stored in a [`Domain`](crate::domain::Domain) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

impl TaskId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of running a primitive task's operator for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failure,
    /// The operator has not finished; it is invoked again on the next tick.
    Continue,
}

/// Outcome of decomposing a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecompositionStatus {
    Succeeded,
    /// No branch could be decomposed; the caller may try siblings.
    Failed,
    /// A branch lost against the running plan's traversal record. Cancels
    /// the whole search, not only the current compound task.
    Rejected,
    /// Decomposition stopped at a pause; the rest is queued on the context.
    Partial,
}

impl DecompositionStatus {
    /// True when the result carries a plan the planner can run.
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Succeeded | Self::Partial)
    }
}

/// Lifetime of a world-state write made by an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    /// Survives planning: folded into the world state when the plan is accepted.
    #[serde(rename = "permanent")]
    Permanent,
    /// Only visible to the rest of the planning pass.
    #[serde(rename = "planonly")]
    PlanOnly,
    /// Visible during planning and applied again when the task executes.
    #[serde(rename = "planandexecute")]
    PlanAndExecute,
}

/// Whether the context reads the live world state or the speculative stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    #[default]
    Executing,
    Planning,
}

/// Decomposition strategy of a compound task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundKind {
    /// Every child must decompose, in order.
    #[serde(rename = "sequence")]
    Sequence,
    /// The first child that fully decomposes wins.
    #[serde(rename = "select")]
    Selector,
}

impl fmt::Display for CompoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompoundKind::Sequence => f.write_str("sequence"),
            CompoundKind::Selector => f.write_str("select"),
        }
    }
}

/// Status plus a freshly owned plan.
///
/// Every decomposition returns its own plan; callers concatenate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    pub status: DecompositionStatus,
    pub plan: Vec<TaskId>,
}

impl Decomposition {
    pub fn succeeded(plan: Vec<TaskId>) -> Self {
        Self {
            status: DecompositionStatus::Succeeded,
            plan,
        }
    }

    pub fn partial(plan: Vec<TaskId>) -> Self {
        Self {
            status: DecompositionStatus::Partial,
            plan,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: DecompositionStatus::Failed,
            plan: Vec::new(),
        }
    }

    pub fn rejected() -> Self {
        Self {
            status: DecompositionStatus::Rejected,
            plan: Vec::new(),
        }
    }
}
