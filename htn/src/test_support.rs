//! Test-only helpers for building contexts, tasks and planner probes.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::core::context::Context;
use crate::core::effect::Effect;
use crate::core::task::{Condition, PrimitiveTask};
use crate::core::types::{EffectKind, TaskStatus};
use crate::planner::Planner;

/// Create an uninitialized context seeded with `HasA`, `HasB` and `HasC` set to 0.
pub fn test_context() -> Context {
    Context::new().with_world_state([("HasA", 0), ("HasB", 0), ("HasC", 0)])
}

/// Create a primitive task whose operator always succeeds.
pub fn primitive(name: &str) -> PrimitiveTask {
    PrimitiveTask::new(name).with_operator(|_: &mut Context| TaskStatus::Success)
}

/// Condition `key == value`, named after the comparison.
pub fn has_state(key: &str, value: impl Into<Value>) -> Condition {
    let key = key.to_string();
    let value = value.into();
    Condition::new(format!("{key} == {value}"), move |ctx| {
        ctx.has_state(&key, value.clone())
    })
}

/// Effect writing `value` to `key` and marking the context dirty.
pub fn set_state_effect(key: &str, value: impl Into<Value>, kind: EffectKind) -> Effect {
    let key = key.to_string();
    let value = value.into();
    Effect::new(format!("set {key}"), kind, move |ctx, kind| {
        ctx.set_state(key.clone(), value.clone(), true, kind);
    })
}

/// Records planner callbacks as compact strings, in firing order.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    events: Rc<RefCell<Vec<String>>>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install every planner callback.
    pub fn attach(&self, planner: &mut Planner) {
        let events = Rc::clone(&self.events);
        planner.on_new_plan(move |plan| {
            events
                .borrow_mut()
                .push(format!("new_plan:{}", join(plan.iter().copied())));
        });

        let events = Rc::clone(&self.events);
        planner.on_replace_plan(move |old, current, new| {
            events.borrow_mut().push(format!(
                "replace_plan:{}|{}|{}",
                join(old.iter().copied()),
                current.map_or("-", PrimitiveTask::name),
                join(new.iter().copied())
            ));
        });

        let events = Rc::clone(&self.events);
        planner.on_new_task(move |task| {
            events.borrow_mut().push(format!("new_task:{}", task.name()));
        });

        let events = Rc::clone(&self.events);
        planner.on_new_task_condition_failed(move |task, condition| {
            events.borrow_mut().push(format!(
                "new_task_condition_failed:{}:{}",
                task.name(),
                condition.name()
            ));
        });

        let events = Rc::clone(&self.events);
        planner.on_stop_current_task(move |task| {
            events.borrow_mut().push(format!("stop:{}", task.name()));
        });

        let events = Rc::clone(&self.events);
        planner.on_current_task_completed_successfully(move |task| {
            events.borrow_mut().push(format!("completed:{}", task.name()));
        });

        let events = Rc::clone(&self.events);
        planner.on_apply_effect(move |effect| {
            events.borrow_mut().push(format!("apply_effect:{}", effect.name()));
        });

        let events = Rc::clone(&self.events);
        planner.on_current_task_failed(move |task| {
            events.borrow_mut().push(format!("failed:{}", task.name()));
        });

        let events = Rc::clone(&self.events);
        planner.on_current_task_continues(move |task| {
            events.borrow_mut().push(format!("continues:{}", task.name()));
        });

        let events = Rc::clone(&self.events);
        planner.on_current_task_executing_condition_failed(move |task, condition| {
            events.borrow_mut().push(format!(
                "executing_condition_failed:{}:{}",
                task.name(),
                condition.name()
            ));
        });
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

fn join<'a>(tasks: impl Iterator<Item = &'a PrimitiveTask>) -> String {
    tasks.map(PrimitiveTask::name).collect::<Vec<_>>().join(",")
}
