//! Typed world-state side effects attached to primitive tasks.

use std::fmt;

use crate::core::context::Context;
use crate::core::types::EffectKind;

type EffectAction = Box<dyn Fn(&mut Context, EffectKind)>;

/// A named write to the world state.
///
/// The action receives the effect's own [`EffectKind`] so it can forward it to
/// [`Context::set_state`]; where the write lands depends on the context mode.
pub struct Effect {
    name: String,
    kind: EffectKind,
    action: EffectAction,
}

impl Effect {
    pub fn new(
        name: impl Into<String>,
        kind: EffectKind,
        action: impl Fn(&mut Context, EffectKind) + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            action: Box::new(action),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn apply(&self, ctx: &mut Context) {
        (self.action)(ctx, self.kind);
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ContextMode;
    use crate::test_support::test_context;

    #[test]
    fn apply_forwards_its_kind() {
        let effect = Effect::new("set HasA", EffectKind::PlanOnly, |ctx, kind| {
            ctx.set_state("HasA", 1, true, kind);
        });
        let mut ctx = test_context();
        ctx.init();
        ctx.set_mode(ContextMode::Planning);
        effect.apply(&mut ctx);

        let stack = ctx.change_stack("HasA");
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].kind, EffectKind::PlanOnly);
    }

    #[test]
    fn apply_while_executing_writes_world_state() {
        let effect = Effect::new("set HasB", EffectKind::PlanAndExecute, |ctx, kind| {
            ctx.set_state("HasB", 1, true, kind);
        });
        let mut ctx = test_context();
        ctx.init();
        effect.apply(&mut ctx);

        assert!(ctx.has_state("HasB", 1));
        assert!(ctx.is_dirty());
    }

    #[test]
    fn debug_omits_the_action() {
        let effect = Effect::new("noop", EffectKind::Permanent, |_, _| {});
        let rendered = format!("{effect:?}");
        assert!(rendered.contains("noop"));
        assert!(rendered.contains("Permanent"));
    }
}
