//! Tick-driven plan executor.
//!
//! Each [`Planner::tick`] replans when the planner is idle or the world state
//! was marked dirty, dispatches the next primitive task of the plan and runs its
//! operator once. An operator returning [`TaskStatus::Continue`] is the only way
//! to spread work across ticks.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::context::Context;
use crate::core::effect::Effect;
use crate::core::task::{Condition, PrimitiveTask, Task};
use crate::core::types::{DecompositionStatus, EffectKind, TaskId, TaskStatus};
use crate::domain::Domain;
use crate::error::HtnError;

/// Planner options (TOML section `[planner]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Replan within the same tick once the last task of a plan succeeds.
    pub allow_immediate_replan: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            allow_immediate_replan: true,
        }
    }
}

type PlanCallback = Box<dyn FnMut(&[&PrimitiveTask])>;
type ReplacePlanCallback =
    Box<dyn FnMut(&[&PrimitiveTask], Option<&PrimitiveTask>, &[&PrimitiveTask])>;
type TaskCallback = Box<dyn FnMut(&PrimitiveTask)>;
type ConditionCallback = Box<dyn FnMut(&PrimitiveTask, &Condition)>;
type EffectCallback = Box<dyn FnMut(&Effect)>;

#[derive(Default)]
struct Callbacks {
    new_plan: Option<PlanCallback>,
    replace_plan: Option<ReplacePlanCallback>,
    new_task: Option<TaskCallback>,
    new_task_condition_failed: Option<ConditionCallback>,
    stop_current_task: Option<TaskCallback>,
    current_task_completed_successfully: Option<TaskCallback>,
    apply_effect: Option<EffectCallback>,
    current_task_failed: Option<TaskCallback>,
    current_task_continues: Option<TaskCallback>,
    current_task_executing_condition_failed: Option<ConditionCallback>,
}

fn notify(callback: &mut Option<TaskCallback>, task: &PrimitiveTask) {
    if let Some(callback) = callback {
        callback(task);
    }
}

fn notify_condition(callback: &mut Option<ConditionCallback>, task: &PrimitiveTask, condition: &Condition) {
    if let Some(callback) = callback {
        callback(task, condition);
    }
}

#[derive(Default)]
pub struct Planner {
    config: PlannerConfig,
    plan: VecDeque<TaskId>,
    current_task: Option<TaskId>,
    last_status: Option<TaskStatus>,
    callbacks: Callbacks,
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PlannerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Tasks still waiting to run, next first.
    pub fn plan(&self) -> &VecDeque<TaskId> {
        &self.plan
    }

    pub fn current_task(&self) -> Option<TaskId> {
        self.current_task
    }

    /// Status of the most recent operator call, or `Failure` after a tick
    /// that could not find a plan.
    pub fn last_status(&self) -> Option<TaskStatus> {
        self.last_status
    }

    pub fn on_new_plan(&mut self, callback: impl FnMut(&[&PrimitiveTask]) + 'static) {
        self.callbacks.new_plan = Some(Box::new(callback));
    }

    /// Called with the old plan, the interrupted task and the new plan.
    pub fn on_replace_plan(
        &mut self,
        callback: impl FnMut(&[&PrimitiveTask], Option<&PrimitiveTask>, &[&PrimitiveTask]) + 'static,
    ) {
        self.callbacks.replace_plan = Some(Box::new(callback));
    }

    pub fn on_new_task(&mut self, callback: impl FnMut(&PrimitiveTask) + 'static) {
        self.callbacks.new_task = Some(Box::new(callback));
    }

    pub fn on_new_task_condition_failed(
        &mut self,
        callback: impl FnMut(&PrimitiveTask, &Condition) + 'static,
    ) {
        self.callbacks.new_task_condition_failed = Some(Box::new(callback));
    }

    pub fn on_stop_current_task(&mut self, callback: impl FnMut(&PrimitiveTask) + 'static) {
        self.callbacks.stop_current_task = Some(Box::new(callback));
    }

    pub fn on_current_task_completed_successfully(
        &mut self,
        callback: impl FnMut(&PrimitiveTask) + 'static,
    ) {
        self.callbacks.current_task_completed_successfully = Some(Box::new(callback));
    }

    pub fn on_apply_effect(&mut self, callback: impl FnMut(&Effect) + 'static) {
        self.callbacks.apply_effect = Some(Box::new(callback));
    }

    pub fn on_current_task_failed(&mut self, callback: impl FnMut(&PrimitiveTask) + 'static) {
        self.callbacks.current_task_failed = Some(Box::new(callback));
    }

    pub fn on_current_task_continues(&mut self, callback: impl FnMut(&PrimitiveTask) + 'static) {
        self.callbacks.current_task_continues = Some(Box::new(callback));
    }

    pub fn on_current_task_executing_condition_failed(
        &mut self,
        callback: impl FnMut(&PrimitiveTask, &Condition) + 'static,
    ) {
        self.callbacks.current_task_executing_condition_failed = Some(Box::new(callback));
    }

    /// Advance planning and execution by one step.
    pub fn tick(&mut self, domain: &Domain, ctx: &mut Context) -> Result<(), HtnError> {
        self.tick_with(domain, ctx, self.config.allow_immediate_replan)
    }

    fn tick_with(
        &mut self,
        domain: &Domain,
        ctx: &mut Context,
        allow_immediate_replan: bool,
    ) -> Result<(), HtnError> {
        if !ctx.is_initialized() {
            return Err(HtnError::NotInitialized);
        }

        let mut decomposition_status = None;
        let mut is_trying_to_replace_plan = !self.plan.is_empty();

        if (self.current_task.is_none() && self.plan.is_empty()) || ctx.is_dirty() {
            let world_state_dirty_replan = ctx.is_dirty();
            ctx.set_dirty(false);

            // A dirty replan must beat the running partial plan, not continue it.
            let mut saved_queue = None;
            if world_state_dirty_replan && ctx.has_paused_partial_plan() {
                ctx.set_has_paused_partial_plan(false);
                saved_queue = Some(ctx.take_partial_plan_queue());
                ctx.shift_mtr();
                ctx.shift_mtr_debug();
            }

            let found = domain.find_plan(ctx);
            let usable = matches!(&found, Ok(decomposition) if decomposition.status.is_usable());
            if !usable && let Some(queue) = saved_queue {
                ctx.set_has_paused_partial_plan(true);
                ctx.replace_partial_plan_queue(queue);
                if !ctx.last_mtr().is_empty() {
                    ctx.restore_mtr();
                    ctx.restore_mtr_debug();
                }
            }

            let decomposition = found?;
            is_trying_to_replace_plan = !self.plan.is_empty();
            decomposition_status = Some(decomposition.status);
            if usable {
                self.adopt_plan(domain, ctx, decomposition.plan)?;
            }
        }

        if self.current_task.is_none()
            && let Some(next) = self.plan.pop_front()
        {
            self.current_task = Some(next);
            let task = primitive(domain, next)?;
            notify(&mut self.callbacks.new_task, task);

            if let Some(condition) = task.failed_condition(ctx) {
                debug!(task = task.name(), condition = condition.name(), "new task condition failed");
                notify_condition(&mut self.callbacks.new_task_condition_failed, task, condition);
                self.abort_plan(ctx);
                return Ok(());
            }
        }

        if let Some(id) = self.current_task {
            let task = primitive(domain, id)?;
            match task.operator() {
                None => {
                    warn!(task = task.name(), "primitive task has no operator");
                    self.current_task = None;
                    self.last_status = Some(TaskStatus::Failure);
                }
                Some(operator) => {
                    if let Some(condition) = task.failed_executing_condition(ctx) {
                        debug!(
                            task = task.name(),
                            condition = condition.name(),
                            "executing condition failed"
                        );
                        notify_condition(
                            &mut self.callbacks.current_task_executing_condition_failed,
                            task,
                            condition,
                        );
                        self.abort_plan(ctx);
                        return Ok(());
                    }

                    let status = operator.update(ctx);
                    self.last_status = Some(status);
                    match status {
                        TaskStatus::Success => {
                            self.complete_current_task(domain, ctx, task, allow_immediate_replan)?;
                        }
                        TaskStatus::Failure => {
                            debug!(task = task.name(), "task failed");
                            notify(&mut self.callbacks.current_task_failed, task);
                            self.abort_plan(ctx);
                        }
                        TaskStatus::Continue => {
                            notify(&mut self.callbacks.current_task_continues, task);
                        }
                    }
                }
            }
        }

        if self.current_task.is_none()
            && self.plan.is_empty()
            && !is_trying_to_replace_plan
            && matches!(
                decomposition_status,
                Some(DecompositionStatus::Failed | DecompositionStatus::Rejected)
            )
        {
            self.last_status = Some(TaskStatus::Failure);
        }
        Ok(())
    }

    fn adopt_plan(&mut self, domain: &Domain, ctx: &mut Context, new_plan: Vec<TaskId>) -> Result<(), HtnError> {
        let new_tasks = primitives(domain, &new_plan)?;
        if !self.plan.is_empty() || self.current_task.is_some() {
            let old_tasks = primitives(domain, &self.plan)?;
            let current = self
                .current_task
                .map(|id| primitive(domain, id))
                .transpose()?;
            debug!(
                old = old_tasks.len(),
                new = new_tasks.len(),
                interrupted = current.map(PrimitiveTask::name),
                "replace plan"
            );
            if let Some(callback) = &mut self.callbacks.replace_plan {
                callback(&old_tasks, current, &new_tasks);
            }
        } else if let Some(callback) = &mut self.callbacks.new_plan {
            callback(&new_tasks);
        }

        self.plan = new_plan.into();
        if let Some(id) = self.current_task.take() {
            let task = primitive(domain, id)?;
            notify(&mut self.callbacks.stop_current_task, task);
            task.stop(ctx);
        }

        ctx.shift_mtr();
        ctx.shift_mtr_debug();
        Ok(())
    }

    fn complete_current_task(
        &mut self,
        domain: &Domain,
        ctx: &mut Context,
        task: &PrimitiveTask,
        allow_immediate_replan: bool,
    ) -> Result<(), HtnError> {
        notify(&mut self.callbacks.current_task_completed_successfully, task);
        for effect in task.effects() {
            if effect.kind() != EffectKind::PlanAndExecute {
                continue;
            }
            if let Some(callback) = &mut self.callbacks.apply_effect {
                callback(effect);
            }
            effect.apply(ctx);
        }
        self.current_task = None;

        if self.plan.is_empty() {
            ctx.clear_last_mtr();
            ctx.clear_last_mtr_debug();
            ctx.set_dirty(false);
            if allow_immediate_replan {
                self.tick_with(domain, ctx, false)?;
            }
        }
        Ok(())
    }

    /// Drop the plan and all partial-plan state so the next tick replans from the root.
    fn abort_plan(&mut self, ctx: &mut Context) {
        self.current_task = None;
        self.plan.clear();
        ctx.clear_last_mtr();
        ctx.clear_last_mtr_debug();
        ctx.set_has_paused_partial_plan(false);
        ctx.clear_partial_plan_queue();
        ctx.set_dirty(false);
    }

    /// Drop the plan and stop the running task.
    pub fn reset(&mut self, domain: &Domain, ctx: &mut Context) {
        self.plan.clear();
        if let Some(task) = self
            .current_task
            .take()
            .and_then(|id| domain.task(id).ok())
            .and_then(Task::as_primitive)
        {
            task.stop(ctx);
        }
    }
}

impl fmt::Debug for Planner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planner")
            .field("config", &self.config)
            .field("plan", &self.plan)
            .field("current_task", &self.current_task)
            .field("last_status", &self.last_status)
            .finish_non_exhaustive()
    }
}

/// Only primitive tasks reach the executor; anything else is a domain defect.
fn primitive(domain: &Domain, id: TaskId) -> Result<&PrimitiveTask, HtnError> {
    let task = domain.task(id)?;
    task.as_primitive().ok_or_else(|| HtnError::NotPrimitive {
        name: task.name().to_string(),
    })
}

fn primitives<'d, 'i>(
    domain: &'d Domain,
    ids: impl IntoIterator<Item = &'i TaskId>,
) -> Result<Vec<&'d PrimitiveTask>, HtnError> {
    ids.into_iter().map(|id| primitive(domain, *id)).collect()
}
