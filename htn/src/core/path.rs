//! Helpers for rendering deterministic task paths.

use crate::core::task::Task;
use crate::core::types::TaskId;
use crate::domain::Domain;

/// Return the `/`-separated name path to `target`, rooted at the domain root.
///
/// Tasks that are not attached under the root have no path.
pub fn task_path(domain: &Domain, target: TaskId) -> Option<String> {
    let mut path = Vec::new();
    if task_path_inner(domain, domain.root(), target, &mut path) {
        return Some(path.join("/"));
    }
    None
}

fn task_path_inner<'d>(domain: &'d Domain, id: TaskId, target: TaskId, path: &mut Vec<&'d str>) -> bool {
    let Ok(task) = domain.task(id) else {
        return false;
    };
    path.push(task.name());
    if id == target {
        return true;
    }
    if let Task::Compound(compound) = task {
        for &child in compound.children() {
            if task_path_inner(domain, child, target, path) {
                return true;
            }
        }
    }
    path.pop();
    false
}
