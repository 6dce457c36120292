//! Authoring checks that `Domain::add` cannot enforce on its own.

use crate::core::path::task_path;
use crate::core::task::Task;
use crate::core::types::{CompoundKind, TaskId};
use crate::domain::Domain;

/// Report authoring smells in a finished domain:
/// - Tasks never attached under the root
/// - Compound tasks without children (never valid)
/// - Pause tasks ending a sequence (resuming yields an empty plan)
/// - Primitive tasks directly under the root (their plans carry an empty
///   traversal record and are always rejected)
///
/// None of these stop planning; the domain just cannot do what it looks like.
pub fn validate_invariants(domain: &Domain) -> Vec<String> {
    let mut errors = Vec::new();

    for (id, task) in domain.tasks() {
        if id != domain.root() && domain.parent(id).is_none() {
            errors.push(format!("{}: task is not attached to the root", task.name()));
        }
    }

    validate_task(domain, domain.root(), &mut errors);
    errors
}

fn validate_task(domain: &Domain, id: TaskId, errors: &mut Vec<String>) {
    let Ok(Task::Compound(compound)) = domain.task(id) else {
        return;
    };
    let path = task_path(domain, id).unwrap_or_else(|| compound.name().to_string());

    if compound.children().is_empty() && id != domain.root() {
        errors.push(format!("{path}: compound task has no children"));
    }

    if compound.kind() == CompoundKind::Sequence
        && let Some(&last) = compound.children().last()
        && matches!(domain.task(last), Ok(Task::Pause(_)))
    {
        errors.push(format!("{path}: sequence ends with a pause"));
    }

    for &child in compound.children() {
        if id == domain.root()
            && let Ok(Task::Primitive(primitive)) = domain.task(child)
        {
            errors.push(format!(
                "{path}/{}: primitive task directly under the root is always rejected",
                primitive.name()
            ));
        }
        validate_task(domain, child, errors);
    }
}
