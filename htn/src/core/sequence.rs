//! Sequence decomposition: every child must decompose, any failure unwinds.

use crate::core::context::{ChangeStackSavepoint, Context};
use crate::core::decompose::decompose;
use crate::core::task::{CompoundTask, Task};
use crate::core::types::{Decomposition, DecompositionStatus, TaskId};
use crate::domain::Domain;
use crate::error::HtnError;

/// Decompose `task` (stored at `id`) as a sequence, starting at `start_index`.
///
/// Speculative writes made by children are rolled back when the sequence does
/// not produce a plan. A pause, directly or in a nested sequence, stops here
/// with [`DecompositionStatus::Partial`] and queues the remaining children.
pub(crate) fn decompose_sequence(
    domain: &Domain,
    ctx: &mut Context,
    id: TaskId,
    task: &CompoundTask,
    start_index: usize,
) -> Result<Decomposition, HtnError> {
    let mut savepoint = ChangeStackSavepoint::begin(ctx)?;
    let mut plan = Vec::new();
    let last_index = task.children().len().saturating_sub(1);

    for (index, &child_id) in task.children().iter().enumerate().skip(start_index) {
        let child = domain.task(child_id)?;

        if !child.is_valid(&savepoint) {
            savepoint.log_decomposition(task.name(), format!("child {} is not valid", child.name()));
            return Ok(Decomposition::failed());
        }

        match child {
            Task::Compound(_) => {
                let result = decompose(domain, &mut savepoint, child_id, 0)?;
                match result.status {
                    DecompositionStatus::Rejected | DecompositionStatus::Failed => {
                        return Ok(Decomposition {
                            status: result.status,
                            plan: Vec::new(),
                        });
                    }
                    DecompositionStatus::Partial => {
                        plan.extend(result.plan);
                        if index < last_index {
                            savepoint.enqueue_partial_plan(id, index + 1);
                        }
                        savepoint.log_decomposition(
                            task.name(),
                            format!("partial plan at index {index}"),
                        );
                        savepoint.commit();
                        return Ok(Decomposition::partial(plan));
                    }
                    DecompositionStatus::Succeeded => plan.extend(result.plan),
                }
            }
            Task::Primitive(primitive) => {
                savepoint.log_decomposition(task.name(), format!("pushed {}", primitive.name()));
                primitive.apply_effects(&mut savepoint);
                plan.push(child_id);
            }
            Task::Pause(_) => {
                savepoint.log_decomposition(task.name(), format!("paused at index {index}"));
                savepoint.set_has_paused_partial_plan(true);
                savepoint.enqueue_partial_plan(id, index + 1);
                savepoint.commit();
                return Ok(Decomposition::partial(plan));
            }
        }
    }

    if plan.is_empty() {
        return Ok(Decomposition::failed());
    }
    savepoint.commit();
    Ok(Decomposition::succeeded(plan))
}
