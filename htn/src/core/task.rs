//! Task node model: primitive actions, compound methods and pause markers.
//!
//! Tasks never own each other. A compound task lists its children as
//! [`TaskId`]s into the owning domain's arena.

use std::fmt;

use crate::core::context::Context;
use crate::core::effect::Effect;
use crate::core::types::{CompoundKind, TaskId, TaskStatus};
use crate::error::HtnError;

type Predicate = Box<dyn Fn(&Context) -> bool>;

/// A named predicate over the current (mode-aware) world state.
pub struct Condition {
    name: String,
    predicate: Predicate,
}

impl Condition {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&Context) -> bool + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_valid(&self, ctx: &Context) -> bool {
        (self.predicate)(ctx)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Name of the first condition that does not hold, if any.
fn first_failed<'a>(conditions: &'a [Condition], ctx: &Context) -> Option<&'a Condition> {
    conditions.iter().find(|condition| !condition.is_valid(ctx))
}

/// The executable behavior of a primitive task.
pub trait Operator {
    /// Advance the action by one tick.
    fn update(&self, ctx: &mut Context) -> TaskStatus;

    /// Called when the running task is interrupted or the plan is replaced.
    fn stop(&self, _ctx: &mut Context) {}
}

impl<F> Operator for F
where
    F: Fn(&mut Context) -> TaskStatus,
{
    fn update(&self, ctx: &mut Context) -> TaskStatus {
        self(ctx)
    }
}

/// Leaf action.
#[derive(Default)]
pub struct PrimitiveTask {
    name: String,
    conditions: Vec<Condition>,
    executing_conditions: Vec<Condition>,
    effects: Vec<Effect>,
    operator: Option<Box<dyn Operator>>,
}

impl PrimitiveTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Condition re-checked on every tick while the task runs.
    pub fn with_executing_condition(mut self, condition: Condition) -> Self {
        self.executing_conditions.push(condition);
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_operator(mut self, operator: impl Operator + 'static) -> Self {
        self.operator = Some(Box::new(operator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn executing_conditions(&self) -> &[Condition] {
        &self.executing_conditions
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn operator(&self) -> Option<&dyn Operator> {
        self.operator.as_deref()
    }

    pub fn is_valid(&self, ctx: &Context) -> bool {
        self.failed_condition(ctx).is_none()
    }

    pub fn failed_condition(&self, ctx: &Context) -> Option<&Condition> {
        first_failed(&self.conditions, ctx)
    }

    pub fn failed_executing_condition(&self, ctx: &Context) -> Option<&Condition> {
        first_failed(&self.executing_conditions, ctx)
    }

    pub fn apply_effects(&self, ctx: &mut Context) {
        for effect in &self.effects {
            effect.apply(ctx);
        }
    }

    pub fn stop(&self, ctx: &mut Context) {
        if let Some(operator) = &self.operator {
            operator.stop(ctx);
        }
    }
}

impl fmt::Debug for PrimitiveTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveTask")
            .field("name", &self.name)
            .field("conditions", &self.conditions)
            .field("executing_conditions", &self.executing_conditions)
            .field("effects", &self.effects)
            .field("has_operator", &self.operator.is_some())
            .finish()
    }
}

/// A method: ordered children plus a decomposition strategy.
#[derive(Debug)]
pub struct CompoundTask {
    name: String,
    kind: CompoundKind,
    conditions: Vec<Condition>,
    pub(crate) children: Vec<TaskId>,
}

impl CompoundTask {
    pub fn new(name: impl Into<String>, kind: CompoundKind) -> Self {
        Self {
            name: name.into(),
            kind,
            conditions: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn sequence(name: impl Into<String>) -> Self {
        Self::new(name, CompoundKind::Sequence)
    }

    pub fn selector(name: impl Into<String>) -> Self {
        Self::new(name, CompoundKind::Selector)
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CompoundKind {
        self.kind
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    /// All conditions hold and there is at least one child to decompose.
    pub fn is_valid(&self, ctx: &Context) -> bool {
        first_failed(&self.conditions, ctx).is_none() && !self.children.is_empty()
    }
}

/// Marks the point where a sequence stops decomposing until the next planning pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PausePlanTask {
    name: String,
}

impl PausePlanTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
pub enum Task {
    Primitive(PrimitiveTask),
    Compound(CompoundTask),
    Pause(PausePlanTask),
}

impl Task {
    pub fn name(&self) -> &str {
        match self {
            Task::Primitive(task) => task.name(),
            Task::Compound(task) => task.name(),
            Task::Pause(task) => task.name(),
        }
    }

    pub fn is_valid(&self, ctx: &Context) -> bool {
        match self {
            Task::Primitive(task) => task.is_valid(ctx),
            Task::Compound(task) => task.is_valid(ctx),
            Task::Pause(_) => true,
        }
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveTask> {
        match self {
            Task::Primitive(task) => Some(task),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&CompoundTask> {
        match self {
            Task::Compound(task) => Some(task),
            _ => None,
        }
    }

    pub fn add_condition(&mut self, condition: Condition) -> Result<(), HtnError> {
        match self {
            Task::Primitive(task) => task.conditions.push(condition),
            Task::Compound(task) => task.conditions.push(condition),
            Task::Pause(_) => return Err(HtnError::PauseTaskMutation { what: "conditions" }),
        }
        Ok(())
    }

    pub fn add_executing_condition(&mut self, condition: Condition) -> Result<(), HtnError> {
        match self {
            Task::Primitive(task) => {
                task.executing_conditions.push(condition);
                Ok(())
            }
            Task::Compound(task) => Err(HtnError::NotPrimitive {
                name: task.name.clone(),
            }),
            Task::Pause(_) => Err(HtnError::PauseTaskMutation {
                what: "executing conditions",
            }),
        }
    }

    pub fn add_effect(&mut self, effect: Effect) -> Result<(), HtnError> {
        match self {
            Task::Primitive(task) => {
                task.effects.push(effect);
                Ok(())
            }
            Task::Compound(task) => Err(HtnError::NotPrimitive {
                name: task.name.clone(),
            }),
            Task::Pause(_) => Err(HtnError::PauseTaskMutation { what: "effects" }),
        }
    }
}

impl From<PrimitiveTask> for Task {
    fn from(task: PrimitiveTask) -> Self {
        Task::Primitive(task)
    }
}

impl From<CompoundTask> for Task {
    fn from(task: CompoundTask) -> Self {
        Task::Compound(task)
    }
}

impl From<PausePlanTask> for Task {
    fn from(task: PausePlanTask) -> Self {
        Task::Pause(task)
    }
}
