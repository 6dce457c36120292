//! Selector decomposition: the first child that fully decomposes wins.

use tracing::warn;

use crate::core::context::Context;
use crate::core::decompose::decompose;
use crate::core::task::{CompoundTask, Task};
use crate::core::types::{Decomposition, DecompositionStatus};
use crate::domain::Domain;
use crate::error::HtnError;

/// Decompose `task` as a selector, trying children from `start_index` in order.
///
/// While the traversal record is still inside the prefix of the running plan's
/// record, a child that cannot beat that plan rejects the whole search.
pub(crate) fn decompose_selector(
    domain: &Domain,
    ctx: &mut Context,
    task: &CompoundTask,
    start_index: usize,
) -> Result<Decomposition, HtnError> {
    for (index, &child_id) in task.children().iter().enumerate().skip(start_index) {
        let child = domain.task(child_id)?;

        if !ctx.last_mtr().is_empty() && ctx.mtr().len() < ctx.last_mtr().len() {
            let depth = ctx.mtr().len();
            if !beats_last_mtr(ctx, index, depth) {
                ctx.push_mtr(-1);
                ctx.push_mtr_debug(format!("REPLAN FAIL {}", child.name()));
                ctx.log_decomposition(
                    task.name(),
                    format!("rejected: index {depth} is beaten by the running plan"),
                );
                return Ok(Decomposition::rejected());
            }
        }

        if !child.is_valid(ctx) {
            ctx.log_decomposition(task.name(), format!("child {} is not valid", child.name()));
            continue;
        }

        match child {
            Task::Compound(compound) => {
                ctx.push_mtr(mtr_index(index));
                ctx.push_mtr_debug(compound.name().to_string());

                let result = decompose(domain, ctx, child_id, 0)?;
                match result.status {
                    DecompositionStatus::Rejected => return Ok(Decomposition::rejected()),
                    DecompositionStatus::Failed => {
                        ctx.pop_mtr();
                        ctx.pop_mtr_debug();
                    }
                    DecompositionStatus::Succeeded | DecompositionStatus::Partial => {
                        if result.status == DecompositionStatus::Partial {
                            ctx.log_decomposition(
                                task.name(),
                                format!("partial plan at index {index}"),
                            );
                        }
                        return Ok(result);
                    }
                }
            }
            Task::Primitive(primitive) => {
                ctx.log_decomposition(task.name(), format!("pushed {}", primitive.name()));
                primitive.apply_effects(ctx);
                return Ok(Decomposition::succeeded(vec![child_id]));
            }
            Task::Pause(pause) => {
                warn!(
                    selector = task.name(),
                    task = pause.name(),
                    "pause task under a selector is ignored"
                );
            }
        }
    }

    Ok(Decomposition::failed())
}

/// True when choosing `task_index` at `depth` still ranks at least as high as the
/// running plan's record.
///
/// Earlier record entries dominate later ones: a path of `[0, 0, 1]` beats a
/// running `[0, 1, 0]` even though its last choice is worse.
pub(crate) fn beats_last_mtr(ctx: &Context, task_index: usize, depth: usize) -> bool {
    let last_mtr = ctx.last_mtr();
    let Some(&last) = last_mtr.get(depth) else {
        return true;
    };
    if usize::try_from(last).is_ok_and(|last| last >= task_index) {
        return true;
    }

    for (current, previous) in ctx.mtr().iter().zip(last_mtr) {
        let diff = current - previous;
        if diff < 0 {
            return true;
        }
        if diff > 0 {
            return false;
        }
    }

    false
}

fn mtr_index(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{CompoundTask, PrimitiveTask};
    use crate::core::types::ContextMode;
    use crate::test_support::{has_state, primitive, test_context};

    fn planning_context() -> Context {
        let mut ctx = test_context();
        ctx.init();
        ctx.set_mode(ContextMode::Planning);
        ctx
    }

    #[test]
    fn no_children_fails() {
        let mut domain = Domain::new("Test");
        let task = domain
            .add_task(domain.root(), CompoundTask::selector("Test"))
            .expect("add");
        let mut ctx = test_context();

        let result = decompose(&domain, &mut ctx, task, 0).expect("decompose");
        assert_eq!(result, Decomposition::failed());
    }

    #[test]
    fn first_primitive_wins() {
        let mut domain = Domain::new("Test");
        let task = domain
            .add_task(domain.root(), CompoundTask::selector("Test"))
            .expect("add");
        let first = domain.add_task(task, primitive("Sub-task1")).expect("add");
        domain.add_task(task, primitive("Sub-task2")).expect("add");
        let mut ctx = planning_context();

        let result = decompose(&domain, &mut ctx, task, 0).expect("decompose");
        assert_eq!(result, Decomposition::succeeded(vec![first]));
    }

    #[test]
    fn invalid_children_are_skipped() {
        let mut domain = Domain::new("Test");
        let task = domain
            .add_task(domain.root(), CompoundTask::selector("Test"))
            .expect("add");
        domain
            .add_task(
                task,
                PrimitiveTask::new("Sub-task1").with_condition(has_state("HasA", 1)),
            )
            .expect("add");
        let second = domain.add_task(task, primitive("Sub-task2")).expect("add");
        let mut ctx = planning_context();

        let result = decompose(&domain, &mut ctx, task, 0).expect("decompose");
        assert_eq!(result, Decomposition::succeeded(vec![second]));
    }

    #[test]
    fn failed_compound_child_pops_its_record_entry() {
        let mut domain = Domain::new("Test");
        let task = domain
            .add_task(domain.root(), CompoundTask::selector("Test"))
            .expect("add");
        let empty = domain
            .add_task(task, CompoundTask::selector("Empty"))
            .expect("add");
        let inner = domain
            .add_task(empty, CompoundTask::selector("Inner"))
            .expect("add");
        domain
            .add_task(
                inner,
                PrimitiveTask::new("Blocked").with_condition(has_state("HasA", 1)),
            )
            .expect("add");
        let fallback = domain.add_task(task, primitive("Fallback")).expect("add");
        let mut ctx = planning_context();

        let result = decompose(&domain, &mut ctx, task, 0).expect("decompose");
        assert_eq!(result, Decomposition::succeeded(vec![fallback]));
        assert!(ctx.mtr().is_empty());
    }

    #[test]
    fn nested_selector_rejected_by_running_plan() {
        let (domain, task) = nested_domain();
        let mut ctx = planning_context();
        ctx.set_last_mtr(vec![0, 0]);

        let result = decompose(&domain, &mut ctx, task, 0).expect("decompose");
        assert_eq!(result.status, DecompositionStatus::Rejected);
        assert!(result.plan.is_empty());
        assert_eq!(ctx.mtr(), &[0, -1]);
    }

    #[test]
    fn earlier_branch_beats_running_plan() {
        let (domain, task) = nested_domain();
        let mut ctx = planning_context();
        ctx.set_last_mtr(vec![1, 0]);

        let result = decompose(&domain, &mut ctx, task, 0).expect("decompose");
        assert_eq!(result.status, DecompositionStatus::Succeeded);
        assert_eq!(ctx.mtr(), &[0]);
        let names: Vec<&str> = result
            .plan
            .iter()
            .map(|id| domain.task(*id).expect("task").name())
            .collect();
        assert_eq!(names, vec!["Sub-task2"]);
    }

    #[test]
    fn primitive_branch_beats_equal_record() {
        let mut domain = Domain::new("Test");
        let task = domain
            .add_task(domain.root(), CompoundTask::selector("Test"))
            .expect("add");
        domain
            .add_task(
                task,
                PrimitiveTask::new("Sub-task1").with_condition(has_state("HasA", 1)),
            )
            .expect("add");
        let second = domain.add_task(task, primitive("Sub-task2")).expect("add");
        let mut ctx = planning_context();
        ctx.set_last_mtr(vec![1]);

        let result = decompose(&domain, &mut ctx, task, 0).expect("decompose");
        assert_eq!(result, Decomposition::succeeded(vec![second]));
        assert!(ctx.mtr().is_empty());
    }

    #[test]
    fn lower_priority_primitive_is_rejected() {
        let mut domain = Domain::new("Test");
        let task = domain
            .add_task(domain.root(), CompoundTask::selector("Test"))
            .expect("add");
        domain
            .add_task(
                task,
                PrimitiveTask::new("Sub-task1").with_condition(has_state("HasA", 1)),
            )
            .expect("add");
        domain.add_task(task, primitive("Sub-task2")).expect("add");
        let mut ctx = planning_context();
        ctx.set_last_mtr(vec![0]);

        let result = decompose(&domain, &mut ctx, task, 0).expect("decompose");
        assert_eq!(result.status, DecompositionStatus::Rejected);
        assert_eq!(ctx.mtr(), &[-1]);
    }

    #[test]
    fn beats_last_mtr_prefers_earlier_entries() {
        let mut ctx = test_context();
        ctx.set_last_mtr(vec![0, 1, 0]);
        ctx.push_mtr(0);
        ctx.push_mtr(0);
        assert!(beats_last_mtr(&ctx, 1, 2));

        let mut ctx = test_context();
        ctx.set_last_mtr(vec![0, 1, 0]);
        ctx.push_mtr(0);
        ctx.push_mtr(1);
        assert!(!beats_last_mtr(&ctx, 1, 2));
        assert!(beats_last_mtr(&ctx, 0, 2));
    }

    #[test]
    fn debug_record_names_rejections() {
        let (domain, task) = nested_domain();
        let mut ctx = Context::with_config(crate::core::context::ContextConfig {
            debug_mtr: true,
            ..Default::default()
        })
        .with_world_state([("HasA", 0), ("HasB", 0), ("HasC", 0)]);
        ctx.init();
        ctx.set_mode(ContextMode::Planning);
        ctx.set_last_mtr(vec![0, 0]);

        decompose(&domain, &mut ctx, task, 0).expect("decompose");
        assert_eq!(ctx.mtr_debug(), &["Test2", "REPLAN FAIL Sub-task2"]);
    }

    /// Selector[ Test2: Selector[Sub-task1 (invalid), Sub-task2],
    ///           Test3: Sequence[Sub-task3, Sub-task4] ]
    fn nested_domain() -> (Domain, crate::core::types::TaskId) {
        let mut domain = Domain::new("Test");
        let task = domain
            .add_task(domain.root(), CompoundTask::selector("Test"))
            .expect("add");
        let task2 = domain
            .add_task(task, CompoundTask::selector("Test2"))
            .expect("add");
        let task3 = domain
            .add_task(task, CompoundTask::sequence("Test3"))
            .expect("add");
        domain
            .add_task(
                task2,
                PrimitiveTask::new("Sub-task1").with_condition(has_state("HasA", 1)),
            )
            .expect("add");
        domain.add_task(task2, primitive("Sub-task2")).expect("add");
        domain.add_task(task3, primitive("Sub-task3")).expect("add");
        domain.add_task(task3, primitive("Sub-task4")).expect("add");
        (domain, task)
    }
}
