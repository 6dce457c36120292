//! Dispatch from a compound task to its decomposition strategy.

use crate::core::context::Context;
use crate::core::selector::decompose_selector;
use crate::core::sequence::decompose_sequence;
use crate::core::task::Task;
use crate::core::types::{CompoundKind, Decomposition, TaskId};
use crate::domain::Domain;
use crate::error::HtnError;

/// Decompose the compound task `id`, starting at child `start_index`.
///
/// Returns a freshly owned plan. Only compound tasks can be decomposed.
pub fn decompose(
    domain: &Domain,
    ctx: &mut Context,
    id: TaskId,
    start_index: usize,
) -> Result<Decomposition, HtnError> {
    let task = match domain.task(id)? {
        Task::Compound(task) => task,
        other => {
            return Err(HtnError::NotCompound {
                name: other.name().to_string(),
            });
        }
    };

    ctx.enter_decomposition();
    ctx.log_decomposition(
        task.name(),
        format!("{} from index {start_index}", task.kind()),
    );
    let result = match task.kind() {
        CompoundKind::Sequence => decompose_sequence(domain, ctx, id, task, start_index),
        CompoundKind::Selector => decompose_selector(domain, ctx, task, start_index),
    };
    ctx.leave_decomposition();

    if let Ok(decomposition) = &result {
        ctx.log_decomposition(task.name(), format!("{:?}", decomposition.status));
    }
    result
}
