//! Task tree ownership and the plan search.
//!
//! A [`Domain`] stores every task in an arena and wraps the top-level tasks in a
//! synthetic selector named `Root`. Planning is exactly "decompose `Root`",
//! plus resuming sequences that stopped at a pause.

use tracing::debug;

use crate::core::context::Context;
use crate::core::decompose::decompose;
use crate::core::effect::Effect;
use crate::core::task::{CompoundTask, Condition, PausePlanTask, PrimitiveTask, Task};
use crate::core::types::{CompoundKind, ContextMode, Decomposition, DecompositionStatus, TaskId};
use crate::error::HtnError;

/// Declarative description of a domain, built into a [`Domain`] by
/// [`Domain::from_definition`].
#[derive(Debug)]
pub struct DomainDefinition {
    pub name: String,
    pub tasks: Vec<TaskDefinition>,
}

#[derive(Debug)]
pub enum TaskDefinition {
    Primitive(PrimitiveTask),
    Compound(CompoundDefinition),
    Pause,
}

#[derive(Debug)]
pub struct CompoundDefinition {
    pub name: String,
    pub kind: CompoundKind,
    pub conditions: Vec<Condition>,
    pub tasks: Vec<TaskDefinition>,
}

impl CompoundDefinition {
    pub fn new(name: impl Into<String>, kind: CompoundKind) -> Self {
        Self {
            name: name.into(),
            kind,
            conditions: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_task(mut self, task: impl Into<TaskDefinition>) -> Self {
        self.tasks.push(task.into());
        self
    }
}

impl From<PrimitiveTask> for TaskDefinition {
    fn from(task: PrimitiveTask) -> Self {
        TaskDefinition::Primitive(task)
    }
}

impl From<CompoundDefinition> for TaskDefinition {
    fn from(definition: CompoundDefinition) -> Self {
        TaskDefinition::Compound(definition)
    }
}

#[derive(Debug)]
pub struct Domain {
    name: String,
    tasks: Vec<Task>,
    parents: Vec<Option<TaskId>>,
    root: TaskId,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: vec![Task::Compound(CompoundTask::selector("Root"))],
            parents: vec![None],
            root: TaskId::new(0),
        }
    }

    /// Build a domain from a definition. Structural checks of [`add`](Self::add) apply.
    pub fn from_definition(definition: DomainDefinition) -> Result<Self, HtnError> {
        let mut domain = Self::new(definition.name);
        let root = domain.root;
        for task in definition.tasks {
            domain.add_definition(root, task)?;
        }
        Ok(domain)
    }

    fn add_definition(&mut self, parent: TaskId, definition: TaskDefinition) -> Result<TaskId, HtnError> {
        match definition {
            TaskDefinition::Primitive(task) => self.add_task(parent, task),
            TaskDefinition::Pause => {
                let name = format!("Pause {}", self.tasks.len());
                self.add_task(parent, PausePlanTask::new(name))
            }
            TaskDefinition::Compound(compound) => {
                let mut task = CompoundTask::new(compound.name, compound.kind);
                for condition in compound.conditions {
                    task = task.with_condition(condition);
                }
                let id = self.add_task(parent, task)?;
                for child in compound.tasks {
                    self.add_definition(id, child)?;
                }
                Ok(id)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> TaskId {
        self.root
    }

    pub fn task(&self, id: TaskId) -> Result<&Task, HtnError> {
        self.tasks.get(id.index()).ok_or(HtnError::UnknownTask(id))
    }

    /// Gate the task `id` on one more condition. Pause tasks take none.
    pub fn add_condition(&mut self, id: TaskId, condition: Condition) -> Result<(), HtnError> {
        self.task_mut(id)?.add_condition(condition)
    }

    /// Only primitive tasks carry executing conditions.
    pub fn add_executing_condition(
        &mut self,
        id: TaskId,
        condition: Condition,
    ) -> Result<(), HtnError> {
        self.task_mut(id)?.add_executing_condition(condition)
    }

    /// Only primitive tasks carry effects.
    pub fn add_effect(&mut self, id: TaskId, effect: Effect) -> Result<(), HtnError> {
        self.task_mut(id)?.add_effect(effect)
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, HtnError> {
        self.tasks.get_mut(id.index()).ok_or(HtnError::UnknownTask(id))
    }

    /// Append a child id the arena does not hold.
    #[cfg(test)]
    pub(crate) fn push_dangling_child(&mut self, compound: TaskId) -> TaskId {
        let missing = TaskId::new(self.tasks.len() + 10);
        if let Some(Task::Compound(task)) = self.tasks.get_mut(compound.index()) {
            task.children.push(missing);
        }
        missing
    }

    /// Every task in insertion order, attached or not.
    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &Task)> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(index, task)| (TaskId::new(index), task))
    }

    pub fn parent(&self, id: TaskId) -> Option<TaskId> {
        self.parents.get(id.index()).copied().flatten()
    }

    /// Store a detached task. Attach it with [`add`](Self::add).
    pub fn insert(&mut self, task: impl Into<Task>) -> TaskId {
        let id = TaskId::new(self.tasks.len());
        self.tasks.push(task.into());
        self.parents.push(None);
        id
    }

    /// Append `child` to the children of `parent`.
    pub fn add(&mut self, parent: TaskId, child: TaskId) -> Result<(), HtnError> {
        let child_task = self.task(child)?;
        if parent == child {
            return Err(HtnError::SelfParent {
                name: child_task.name().to_string(),
            });
        }
        let parent_task = self.task(parent)?;
        if self.parent(child).is_some() {
            return Err(HtnError::AlreadyAttached {
                name: child_task.name().to_string(),
            });
        }
        if self.ancestors(parent).any(|ancestor| ancestor == child) {
            return Err(HtnError::CycleDetected {
                parent: parent_task.name().to_string(),
                child: child_task.name().to_string(),
            });
        }
        let Task::Compound(compound) = parent_task else {
            return Err(HtnError::NotCompound {
                name: parent_task.name().to_string(),
            });
        };
        if matches!(child_task, Task::Pause(_)) && compound.kind() != CompoundKind::Sequence {
            return Err(HtnError::PauseOutsideSequence {
                parent: compound.name().to_string(),
            });
        }

        if let Task::Compound(compound) = &mut self.tasks[parent.index()] {
            compound.children.push(child);
        }
        self.parents[child.index()] = Some(parent);
        Ok(())
    }

    /// Insert `task` and attach it under `parent` in one step.
    pub fn add_task(&mut self, parent: TaskId, task: impl Into<Task>) -> Result<TaskId, HtnError> {
        let id = self.insert(task);
        if let Err(err) = self.add(parent, id) {
            self.tasks.pop();
            self.parents.pop();
            return Err(err);
        }
        Ok(id)
    }

    /// `id` and its parents up to the root.
    fn ancestors(&self, id: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        std::iter::successors(Some(id), |current| self.parent(*current))
    }

    /// Run one planning pass.
    ///
    /// On a usable result the permanent speculative writes are folded into the
    /// world state; otherwise every speculative write is discarded. The context
    /// is back in [`ContextMode::Executing`] when this returns.
    pub fn find_plan(&self, ctx: &mut Context) -> Result<Decomposition, HtnError> {
        if !ctx.is_initialized() {
            return Err(HtnError::NotInitialized);
        }

        ctx.set_mode(ContextMode::Planning);
        let outcome = self.search(ctx);
        match &outcome {
            Ok(decomposition) if decomposition.status.is_usable() => {
                ctx.trim_for_execution()?;
                ctx.commit_changes();
            }
            _ => ctx.discard_changes(),
        }
        ctx.set_mode(ContextMode::Executing);

        if let Ok(decomposition) = &outcome {
            debug!(
                domain = %self.name,
                status = ?decomposition.status,
                plan_len = decomposition.plan.len(),
                mtr = ?ctx.mtr(),
                "find plan"
            );
        }
        outcome
    }

    fn search(&self, ctx: &mut Context) -> Result<Decomposition, HtnError> {
        let had_paused = ctx.has_paused_partial_plan();
        let saved_queue = ctx.partial_plan_queue().clone();

        let resuming = had_paused && ctx.last_mtr().is_empty();
        let outcome = if resuming {
            self.resume_partial_plan(ctx)
        } else {
            ctx.set_has_paused_partial_plan(false);
            ctx.clear_partial_plan_queue();
            ctx.clear_mtr();
            ctx.clear_mtr_debug();
            decompose(self, ctx, self.root, 0)
        }
        .map(|result| reject_if_no_better(ctx, result));

        // A failed search, or a root search that yields nothing, leaves the
        // paused plan as it was.
        let keep_paused = match &outcome {
            Ok(result) => !resuming && !result.status.is_usable(),
            Err(_) => true,
        };
        if keep_paused {
            ctx.set_has_paused_partial_plan(had_paused);
            ctx.replace_partial_plan_queue(saved_queue);
        }
        outcome
    }

    /// Continue the queued sequences, innermost first.
    ///
    /// Falls back to a fresh root search when the continuation yields nothing.
    fn resume_partial_plan(&self, ctx: &mut Context) -> Result<Decomposition, HtnError> {
        ctx.set_has_paused_partial_plan(false);
        let mut pending = ctx.take_partial_plan_queue();
        let mut status = DecompositionStatus::Rejected;
        let mut plan = Vec::new();

        while let Some(entry) = pending.pop_front() {
            let result = decompose(self, ctx, entry.task, entry.resume_index)?;
            status = result.status;
            if status.is_usable() {
                plan.extend(result.plan);
            }
            if ctx.has_paused_partial_plan() {
                break;
            }
        }

        if ctx.has_paused_partial_plan() {
            let mut queue = ctx.take_partial_plan_queue();
            queue.extend(pending);
            ctx.replace_partial_plan_queue(queue);
        }

        if !status.is_usable() {
            ctx.clear_mtr();
            ctx.clear_mtr_debug();
            return decompose(self, ctx, self.root, 0);
        }
        Ok(Decomposition { status, plan })
    }
}

/// Anti-oscillation: a search that ranks no higher than the running plan is
/// turned into a rejection.
fn reject_if_no_better(ctx: &Context, result: Decomposition) -> Decomposition {
    if is_no_better(ctx.mtr(), ctx.last_mtr()) {
        return Decomposition::rejected();
    }
    result
}

/// True when `mtr` ranks no higher than the running plan's `last_mtr`.
///
/// Decomposition only rejects branches that are strictly worse, so a search that
/// rediscovers the running plan has to be caught here.
fn is_no_better(mtr: &[i32], last_mtr: &[i32]) -> bool {
    mtr.len() == last_mtr.len()
        && mtr
            .iter()
            .zip(last_mtr)
            .all(|(current, previous)| current >= previous)
}
