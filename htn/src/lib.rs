//! Hierarchical task network (HTN) planning engine.
//!
//! A [`domain::Domain`] holds a tree of compound methods and primitive actions.
//! Planning decomposes that tree against the world state held by a
//! [`core::context::Context`] and yields an ordered plan of primitive tasks; a
//! [`planner::Planner`] runs the plan one tick at a time and replans when the
//! world changes or a task fails. The crate keeps the same split throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (task model, world-state context,
//!   sequence/selector decomposition). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (configuration files).
//!
//! Orchestration modules ([`domain`], [`planner`]) drive the core per tick.
//! A context belongs to one domain/planner pair at a time and is not meant to
//! be shared across threads.

pub mod core;
pub mod domain;
pub mod error;
pub mod io;
pub mod logging;
pub mod planner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::core::context::{Context, ContextConfig};
pub use crate::core::effect::Effect;
pub use crate::core::task::{CompoundTask, Condition, Operator, PausePlanTask, PrimitiveTask, Task};
pub use crate::core::types::{
    CompoundKind, ContextMode, Decomposition, DecompositionStatus, EffectKind, TaskId, TaskStatus,
};
pub use crate::domain::{CompoundDefinition, Domain, DomainDefinition, TaskDefinition};
pub use crate::error::HtnError;
pub use crate::planner::{Planner, PlannerConfig};
