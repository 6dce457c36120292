//! Error types for domain authoring and host-side invariant violations.
//!
//! Planning failures are never errors: they are reported through
//! [`DecompositionStatus`](crate::core::types::DecompositionStatus). Everything
//! here indicates a defect in how the domain was built or how the host drives
//! the planner.

use thiserror::Error;

use crate::core::types::TaskId;

/// Errors raised by the HTN core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HtnError {
    #[error("context was not initialized")]
    NotInitialized,

    #[error("can not trim a context when in execution mode")]
    TrimWhileExecuting,

    #[error("task '{name}' can not be added as its own child")]
    SelfParent { name: String },

    #[error("task '{name}' already has a parent")]
    AlreadyAttached { name: String },

    #[error("adding '{child}' under '{parent}' would create a cycle")]
    CycleDetected { parent: String, child: String },

    #[error("task '{name}' is not a compound task and can not have children")]
    NotCompound { name: String },

    #[error("pause plan task can only be added to a sequence, not '{parent}'")]
    PauseOutsideSequence { parent: String },

    #[error("pause plan tasks cannot have {what}")]
    PauseTaskMutation { what: &'static str },

    #[error("task '{name}' is not a primitive task")]
    NotPrimitive { name: String },

    #[error("unknown task id {0}")]
    UnknownTask(TaskId),
}

impl HtnError {
    /// True for errors caused by a malformed task tree.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            HtnError::SelfParent { .. }
                | HtnError::AlreadyAttached { .. }
                | HtnError::CycleDetected { .. }
                | HtnError::NotCompound { .. }
                | HtnError::PauseOutsideSequence { .. }
                | HtnError::PauseTaskMutation { .. }
        )
    }
}
