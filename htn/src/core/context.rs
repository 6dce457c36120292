//! Planning/execution session state.
//!
//! A [`Context`] is owned by exactly one planner/domain pair at a time and is
//! reused across many planning cycles. It is not synchronized; sharing one
//! context between planners or threads is not supported.
//!
//! In [`ContextMode::Executing`] reads and writes go straight to the world
//! state. In [`ContextMode::Planning`] writes are pushed onto per-key change
//! stacks and reads see the most recent speculative value, so a planning pass
//! can be rolled back without touching the live state.

use std::collections::{BTreeMap, VecDeque};
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::types::{ContextMode, EffectKind, TaskId};
use crate::error::HtnError;

/// Live, authoritative world state.
pub type WorldState = BTreeMap<String, Value>;

/// Per-key change-stack lengths captured as a rollback point.
pub type StackDepth = BTreeMap<String, usize>;

/// Context options (TOML section `[context]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextConfig {
    /// Keep a human-readable twin of the method traversal record.
    pub debug_mtr: bool,

    /// Record every decomposition step in [`Context::decomposition_log`].
    pub log_decomposition: bool,

    /// Oldest decomposition log entries are dropped beyond this many.
    pub decomposition_log_limit: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            debug_mtr: false,
            log_decomposition: false,
            decomposition_log_limit: 1024,
        }
    }
}

/// One speculative world-state write.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub kind: EffectKind,
    pub value: Value,
}

/// Resume point for a sequence that stopped at a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialPlanEntry {
    /// The sequence to continue.
    pub task: TaskId,
    /// Child index to continue from.
    pub resume_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompositionLogEntry {
    pub depth: usize,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    config: ContextConfig,
    initialized: bool,
    dirty: bool,
    mode: ContextMode,
    world_state: WorldState,
    change_stack: BTreeMap<String, Vec<StateChange>>,
    mtr: Vec<i32>,
    last_mtr: Vec<i32>,
    mtr_debug: Vec<String>,
    last_mtr_debug: Vec<String>,
    partial_plan_queue: VecDeque<PartialPlanEntry>,
    has_paused_partial_plan: bool,
    decomposition_depth: usize,
    decomposition_log: VecDeque<DecompositionLogEntry>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Seed the world state. Keys seeded here get change stacks on [`init`](Self::init).
    pub fn with_world_state<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in entries {
            self.world_state.insert(key.into(), value.into());
        }
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn init(&mut self) {
        for key in self.world_state.keys() {
            self.change_stack.entry(key.clone()).or_default();
        }
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Clear every session field and require a fresh [`init`](Self::init).
    ///
    /// The world state and the configuration are kept.
    pub fn reset(&mut self) {
        self.mtr.clear();
        self.last_mtr.clear();
        self.mtr_debug.clear();
        self.last_mtr_debug.clear();
        self.partial_plan_queue.clear();
        self.has_paused_partial_plan = false;
        self.dirty = false;
        self.mode = ContextMode::Executing;
        self.change_stack.clear();
        self.decomposition_depth = 0;
        self.decomposition_log.clear();
        self.initialized = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Force (or cancel) a replan on the next tick.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ContextMode) {
        self.mode = mode;
    }

    pub fn world_state(&self) -> &WorldState {
        &self.world_state
    }

    /// Speculative writes for `key`, oldest first.
    pub fn change_stack(&self, key: &str) -> &[StateChange] {
        self.change_stack.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Current value of `key` as seen by the active mode.
    pub fn get_state(&self, key: &str) -> Option<&Value> {
        if self.mode == ContextMode::Planning
            && let Some(change) = self.change_stack.get(key).and_then(|stack| stack.last())
        {
            return Some(&change.value);
        }
        self.world_state.get(key)
    }

    pub fn has_state(&self, key: &str, value: impl Into<Value>) -> bool {
        self.get_state(key) == Some(&value.into())
    }

    /// Write `value` for `key`.
    ///
    /// While executing this mutates the world state and, when `mark_dirty` is
    /// set and the value actually changed, flags the context for replanning.
    /// While planning it only pushes onto the key's change stack.
    pub fn set_state(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
        mark_dirty: bool,
        kind: EffectKind,
    ) {
        let key = key.into();
        let value = value.into();
        match self.mode {
            ContextMode::Executing => {
                if self.world_state.get(&key) == Some(&value) {
                    return;
                }
                self.world_state.insert(key, value);
                if mark_dirty {
                    self.dirty = true;
                }
            }
            ContextMode::Planning => {
                self.change_stack
                    .entry(key)
                    .or_default()
                    .push(StateChange { kind, value });
            }
        }
    }

    pub fn world_state_change_depth(&self) -> Result<StackDepth, HtnError> {
        if !self.initialized {
            return Err(HtnError::NotInitialized);
        }
        Ok(self
            .change_stack
            .iter()
            .map(|(key, stack)| (key.clone(), stack.len()))
            .collect())
    }

    /// Drop every speculative write that is not [`EffectKind::Permanent`].
    pub fn trim_for_execution(&mut self) -> Result<(), HtnError> {
        if self.mode == ContextMode::Executing {
            return Err(HtnError::TrimWhileExecuting);
        }
        for stack in self.change_stack.values_mut() {
            stack.retain(|change| change.kind == EffectKind::Permanent);
        }
        Ok(())
    }

    /// Pop speculative writes above `depth`. Keys missing from `depth` are
    /// truncated to empty.
    pub fn trim_to_stack_depth(&mut self, depth: &StackDepth) -> Result<(), HtnError> {
        if self.mode == ContextMode::Executing {
            return Err(HtnError::TrimWhileExecuting);
        }
        self.rollback_to(depth);
        Ok(())
    }

    fn rollback_to(&mut self, depth: &StackDepth) {
        for (key, stack) in &mut self.change_stack {
            stack.truncate(depth.get(key).copied().unwrap_or(0));
        }
    }

    /// Fold the top of every change stack into the world state and clear the stacks.
    pub(crate) fn commit_changes(&mut self) {
        for (key, stack) in &mut self.change_stack {
            if let Some(change) = stack.pop() {
                self.world_state.insert(key.clone(), change.value);
            }
            stack.clear();
        }
    }

    pub(crate) fn discard_changes(&mut self) {
        for stack in self.change_stack.values_mut() {
            stack.clear();
        }
    }

    pub fn mtr(&self) -> &[i32] {
        &self.mtr
    }

    pub fn last_mtr(&self) -> &[i32] {
        &self.last_mtr
    }

    /// Install the traversal record of a plan that is already running.
    pub fn set_last_mtr(&mut self, last_mtr: Vec<i32>) {
        self.last_mtr = last_mtr;
    }

    pub(crate) fn push_mtr(&mut self, index: i32) {
        self.mtr.push(index);
    }

    pub(crate) fn pop_mtr(&mut self) {
        self.mtr.pop();
    }

    pub fn clear_mtr(&mut self) {
        self.mtr.clear();
    }

    pub fn clear_last_mtr(&mut self) {
        self.last_mtr.clear();
    }

    /// Copy the record being built into `last_mtr`.
    pub fn shift_mtr(&mut self) {
        self.last_mtr.clone_from(&self.mtr);
    }

    /// Move `last_mtr` back into the record being built.
    pub fn restore_mtr(&mut self) {
        self.mtr = std::mem::take(&mut self.last_mtr);
    }

    pub fn mtr_debug(&self) -> &[String] {
        &self.mtr_debug
    }

    pub fn last_mtr_debug(&self) -> &[String] {
        &self.last_mtr_debug
    }

    pub(crate) fn push_mtr_debug(&mut self, entry: String) {
        if self.config.debug_mtr {
            self.mtr_debug.push(entry);
        }
    }

    pub(crate) fn pop_mtr_debug(&mut self) {
        if self.config.debug_mtr {
            self.mtr_debug.pop();
        }
    }

    pub fn clear_mtr_debug(&mut self) {
        self.mtr_debug.clear();
    }

    pub fn clear_last_mtr_debug(&mut self) {
        self.last_mtr_debug.clear();
    }

    pub fn shift_mtr_debug(&mut self) {
        self.last_mtr_debug.clone_from(&self.mtr_debug);
    }

    pub fn restore_mtr_debug(&mut self) {
        self.mtr_debug = std::mem::take(&mut self.last_mtr_debug);
    }

    pub fn has_paused_partial_plan(&self) -> bool {
        self.has_paused_partial_plan
    }

    pub(crate) fn set_has_paused_partial_plan(&mut self, paused: bool) {
        self.has_paused_partial_plan = paused;
    }

    /// Resume points, innermost first.
    pub fn partial_plan_queue(&self) -> &VecDeque<PartialPlanEntry> {
        &self.partial_plan_queue
    }

    pub(crate) fn enqueue_partial_plan(&mut self, task: TaskId, resume_index: usize) {
        self.partial_plan_queue.push_back(PartialPlanEntry { task, resume_index });
    }

    pub(crate) fn take_partial_plan_queue(&mut self) -> VecDeque<PartialPlanEntry> {
        std::mem::take(&mut self.partial_plan_queue)
    }

    pub(crate) fn replace_partial_plan_queue(&mut self, queue: VecDeque<PartialPlanEntry>) {
        self.partial_plan_queue = queue;
    }

    pub fn clear_partial_plan_queue(&mut self) {
        self.partial_plan_queue.clear();
    }

    pub fn decomposition_depth(&self) -> usize {
        self.decomposition_depth
    }

    pub(crate) fn enter_decomposition(&mut self) {
        self.decomposition_depth += 1;
    }

    pub(crate) fn leave_decomposition(&mut self) {
        self.decomposition_depth = self.decomposition_depth.saturating_sub(1);
    }

    pub fn decomposition_log(&self) -> &VecDeque<DecompositionLogEntry> {
        &self.decomposition_log
    }

    pub fn clear_decomposition_log(&mut self) {
        self.decomposition_log.clear();
    }

    pub(crate) fn log_decomposition(&mut self, name: &str, description: String) {
        if !self.config.log_decomposition {
            return;
        }
        debug!(depth = self.decomposition_depth, task = name, "{description}");
        if self.decomposition_log.len() >= self.config.decomposition_log_limit {
            self.decomposition_log.pop_front();
        }
        self.decomposition_log.push_back(DecompositionLogEntry {
            depth: self.decomposition_depth,
            name: name.to_string(),
            description,
        });
    }
}

/// Rollback point over the change stacks.
///
/// Dropping the savepoint without [`commit`](Self::commit) restores the stack
/// depths recorded at [`begin`](Self::begin). Outside planning mode there is
/// nothing speculative to restore and the drop is a no-op.
pub(crate) struct ChangeStackSavepoint<'a> {
    ctx: &'a mut Context,
    depth: StackDepth,
    committed: bool,
}

impl<'a> ChangeStackSavepoint<'a> {
    pub(crate) fn begin(ctx: &'a mut Context) -> Result<Self, HtnError> {
        let depth = ctx.world_state_change_depth()?;
        Ok(Self {
            ctx,
            depth,
            committed: false,
        })
    }

    pub(crate) fn commit(mut self) {
        self.committed = true;
    }
}

impl Deref for ChangeStackSavepoint<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &*self.ctx
    }
}

impl DerefMut for ChangeStackSavepoint<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        &mut *self.ctx
    }
}

impl Drop for ChangeStackSavepoint<'_> {
    fn drop(&mut self) {
        if !self.committed && self.ctx.mode == ContextMode::Planning {
            self.ctx.rollback_to(&self.depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;

    fn planning_context() -> Context {
        let mut ctx = test_context();
        ctx.init();
        ctx.set_mode(ContextMode::Planning);
        ctx
    }

    #[test]
    fn defaults_to_executing_and_uninitialized() {
        let ctx = Context::new();
        assert_eq!(ctx.mode(), ContextMode::Executing);
        assert!(!ctx.is_initialized());
        assert!(!ctx.is_dirty());
    }

    #[test]
    fn init_creates_a_stack_per_known_key() {
        let mut ctx = test_context();
        ctx.init();
        assert!(ctx.is_initialized());
        let depth = ctx.world_state_change_depth().expect("depth");
        assert_eq!(depth.len(), 3);
        assert!(depth.values().all(|len| *len == 0));
    }

    #[test]
    fn has_state_compares_current_value() {
        let mut ctx = test_context();
        ctx.init();
        ctx.set_state("HasA", 1, true, EffectKind::Permanent);
        assert!(ctx.has_state("HasA", 1));
        assert!(!ctx.has_state("HasB", 1));
        assert!(!ctx.has_state("Missing", 1));
    }

    #[test]
    fn planning_writes_only_touch_the_change_stack() {
        let mut ctx = planning_context();
        ctx.set_state("HasA", 1, true, EffectKind::Permanent);

        assert_eq!(ctx.change_stack("HasA").len(), 1);
        assert_eq!(ctx.world_state()["HasA"], 0);
        assert_eq!(ctx.get_state("HasA"), Some(&Value::from(1)));
        assert!(!ctx.is_dirty());
    }

    #[test]
    fn executing_writes_mark_dirty_only_on_change() {
        let mut ctx = test_context();
        ctx.init();
        ctx.set_state("HasA", 0, true, EffectKind::Permanent);
        assert!(!ctx.is_dirty());

        ctx.set_state("HasA", 1, false, EffectKind::Permanent);
        assert!(!ctx.is_dirty());
        assert_eq!(ctx.world_state()["HasA"], 1);

        ctx.set_state("HasB", 1, true, EffectKind::Permanent);
        assert!(ctx.is_dirty());
        assert!(ctx.change_stack("HasB").is_empty());
    }

    #[test]
    fn planning_reads_fall_back_to_world_state() {
        let mut ctx = planning_context();
        ctx.set_state("HasB", 1, true, EffectKind::PlanOnly);
        assert_eq!(ctx.get_state("HasA"), Some(&Value::from(0)));
        assert_eq!(ctx.get_state("HasB"), Some(&Value::from(1)));

        ctx.set_mode(ContextMode::Executing);
        assert_eq!(ctx.get_state("HasB"), Some(&Value::from(0)));
    }

    #[test]
    fn change_depth_tracks_planning_writes() {
        let mut ctx = test_context();
        ctx.init();
        ctx.set_state("HasB", 1, true, EffectKind::Permanent);
        let executing = ctx.world_state_change_depth().expect("depth");

        ctx.set_mode(ContextMode::Planning);
        ctx.set_state("HasB", true, true, EffectKind::Permanent);
        let planning = ctx.world_state_change_depth().expect("depth");

        assert_eq!(executing["HasB"], 0);
        assert_eq!(planning["HasA"], 0);
        assert_eq!(planning["HasB"], 1);
    }

    #[test]
    fn change_depth_requires_init() {
        let ctx = test_context();
        assert_eq!(
            ctx.world_state_change_depth(),
            Err(HtnError::NotInitialized)
        );
    }

    #[test]
    fn trim_for_execution_keeps_only_permanent_writes() {
        let mut ctx = planning_context();
        ctx.set_state("HasA", 1, true, EffectKind::PlanAndExecute);
        ctx.set_state("HasB", 1, true, EffectKind::Permanent);
        ctx.set_state("HasC", 1, true, EffectKind::PlanOnly);
        ctx.trim_for_execution().expect("trim");

        assert!(ctx.change_stack("HasA").is_empty());
        assert_eq!(ctx.change_stack("HasB").len(), 1);
        assert!(ctx.change_stack("HasC").is_empty());
    }

    #[test]
    fn trims_fail_in_executing_mode() {
        let mut ctx = test_context();
        ctx.init();
        let depth = ctx.world_state_change_depth().expect("depth");
        assert_eq!(ctx.trim_for_execution(), Err(HtnError::TrimWhileExecuting));
        assert_eq!(
            ctx.trim_to_stack_depth(&depth),
            Err(HtnError::TrimWhileExecuting)
        );
    }

    #[test]
    fn trim_to_stack_depth_pops_newer_writes() {
        let mut ctx = planning_context();
        ctx.set_state("HasA", 1, true, EffectKind::PlanAndExecute);
        ctx.set_state("HasB", 1, true, EffectKind::Permanent);
        ctx.set_state("HasC", 1, true, EffectKind::PlanOnly);
        let depth = ctx.world_state_change_depth().expect("depth");

        ctx.set_state("HasA", 2, false, EffectKind::PlanAndExecute);
        ctx.set_state("HasB", 2, false, EffectKind::Permanent);
        ctx.set_state("HasC", 2, false, EffectKind::PlanOnly);
        ctx.set_state("Fresh", 2, false, EffectKind::PlanOnly);
        ctx.trim_to_stack_depth(&depth).expect("trim");

        assert_eq!(ctx.change_stack("HasA").len(), 1);
        assert_eq!(ctx.change_stack("HasB").len(), 1);
        assert_eq!(ctx.change_stack("HasC").len(), 1);
        assert!(ctx.change_stack("Fresh").is_empty());
        assert_eq!(ctx.get_state("HasA"), Some(&Value::from(1)));
    }

    #[test]
    fn savepoint_rolls_back_unless_committed() {
        let mut ctx = planning_context();
        {
            let mut savepoint = ChangeStackSavepoint::begin(&mut ctx).expect("savepoint");
            savepoint.set_state("HasA", 1, false, EffectKind::Permanent);
        }
        assert!(ctx.change_stack("HasA").is_empty());

        {
            let mut savepoint = ChangeStackSavepoint::begin(&mut ctx).expect("savepoint");
            savepoint.set_state("HasA", 1, false, EffectKind::Permanent);
            savepoint.commit();
        }
        assert_eq!(ctx.change_stack("HasA").len(), 1);
    }

    #[test]
    fn commit_changes_folds_top_of_stack() {
        let mut ctx = planning_context();
        ctx.set_state("HasC", 1, false, EffectKind::Permanent);
        ctx.set_state("HasC", 2, false, EffectKind::Permanent);
        ctx.commit_changes();

        assert_eq!(ctx.world_state()["HasC"], 2);
        assert!(ctx.change_stack("HasC").is_empty());
    }

    #[test]
    fn shift_and_restore_mtr_round_trip() {
        let mut ctx = test_context();
        ctx.push_mtr(0);
        ctx.push_mtr(2);
        ctx.shift_mtr();
        assert_eq!(ctx.last_mtr(), &[0, 2]);

        ctx.clear_mtr();
        ctx.restore_mtr();
        assert_eq!(ctx.mtr(), &[0, 2]);
        assert!(ctx.last_mtr().is_empty());
    }

    #[test]
    fn reset_clears_session_state() {
        let mut ctx = Context::with_config(ContextConfig {
            log_decomposition: true,
            ..ContextConfig::default()
        })
        .with_world_state([("HasA", 0)]);
        ctx.init();
        ctx.push_mtr(1);
        ctx.set_last_mtr(vec![1]);
        ctx.set_state("HasA", 1, true, EffectKind::Permanent);
        ctx.set_has_paused_partial_plan(true);
        ctx.enqueue_partial_plan(TaskId::new(1), 2);
        ctx.enter_decomposition();
        ctx.log_decomposition("Test", "entered".to_string());
        ctx.set_mode(ContextMode::Planning);
        ctx.set_state("HasA", 2, false, EffectKind::PlanOnly);

        ctx.reset();

        assert!(ctx.mtr().is_empty());
        assert!(ctx.last_mtr().is_empty());
        assert!(!ctx.is_initialized());
        assert!(!ctx.is_dirty());
        assert!(!ctx.has_paused_partial_plan());
        assert!(ctx.partial_plan_queue().is_empty());
        assert!(ctx.change_stack("HasA").is_empty());
        assert_eq!(ctx.decomposition_depth(), 0);
        assert!(ctx.decomposition_log().is_empty());
        assert_eq!(ctx.mode(), ContextMode::Executing);
        assert_eq!(ctx.world_state()["HasA"], 1);
        assert!(ctx.config().log_decomposition);
    }

    #[test]
    fn decomposition_log_is_bounded() {
        let mut ctx = Context::with_config(ContextConfig {
            log_decomposition: true,
            decomposition_log_limit: 2,
            ..ContextConfig::default()
        });
        ctx.log_decomposition("a", "first".to_string());
        ctx.log_decomposition("b", "second".to_string());
        ctx.log_decomposition("c", "third".to_string());

        let names: Vec<&str> = ctx
            .decomposition_log()
            .iter()
            .map(|entry| entry.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn decomposition_log_is_off_by_default() {
        let mut ctx = Context::new();
        ctx.log_decomposition("a", "first".to_string());
        assert!(ctx.decomposition_log().is_empty());
    }
}
