//! The constraint evaluator (spec §4.6): pure boolean predicates over a
//! populated [`MatchContext`], evaluated in registration order with a
//! short-circuit on the first `false`.
//!
//! Constraints are first-class callable values (spec §9 "Constraints as
//! values"), not a trait hierarchy — closer to the teacher's closure-backed
//! constraint style than to its (partially unported) `Constraint` trait
//! object hierarchy in `constraints/mod.rs`.

use crate::binding::MatchContext;
use crate::ir::Ir;

/// A pure predicate over a successful source-pattern binding. May read
/// bound values' shape and dtype through `I`; must not mutate `I`.
pub struct Constraint<I: Ir> {
    name: String,
    predicate: Box<dyn Fn(&I, &MatchContext<I>) -> bool + Send + Sync>,
}

impl<I: Ir> Constraint<I> {
    /// Wraps `predicate` as a named constraint. `name` is used only for
    /// diagnostics when the constraint rejects a match.
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&I, &MatchContext<I>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    /// The constraint's diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates the predicate against `ir`/`ctx`.
    #[must_use]
    pub fn check(&self, ir: &I, ctx: &MatchContext<I>) -> bool {
        (self.predicate)(ir, ctx)
    }
}

/// Runs `constraints` in order against `ctx`, short-circuiting on the first
/// that returns `false` (spec §4.4 "Constraint evaluation", §4.6 "short-
/// circuit on first false").
///
/// Returns `true` iff every constraint passed.
pub fn evaluate_all<I: Ir>(constraints: &[Constraint<I>], ir: &I, ctx: &MatchContext<I>) -> bool {
    for constraint in constraints {
        if !constraint.check(ir, ctx) {
            tracing::debug!(constraint = constraint.name(), "constraint rejected match");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::TensorId;
    use drr_testkit::InMemoryIr;

    #[test]
    fn evaluate_all_short_circuits_on_first_false() {
        let ir = InMemoryIr::new();
        let ctx: MatchContext<InMemoryIr> = MatchContext::new();
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let constraints = vec![
            Constraint::new("always-false", move |_ir: &InMemoryIr, _ctx| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                false
            }),
            Constraint::new("never-reached", |_ir: &InMemoryIr, _ctx| {
                panic!("second constraint must not run after first fails")
            }),
        ];
        assert!(!evaluate_all(&constraints, &ir, &ctx));
    }

    #[test]
    fn evaluate_all_passes_when_every_constraint_holds() {
        let mut ir = InMemoryIr::new();
        let a = ir.input();
        let op = ir.push_op("relu", &[a]);
        let y = ir.result_value(op, 0);
        let mut ctx: MatchContext<InMemoryIr> = MatchContext::new();
        ctx.bind_value(TensorId(0), y);

        let constraints = vec![Constraint::new("has-f32-output", |ir: &InMemoryIr, ctx| {
            let Some(value) = ctx.value(TensorId(0)) else {
                return false;
            };
            matches!(ir.dtype(value), crate::ir::Dtype::F32)
        })];
        assert!(evaluate_all(&constraints, &ir, &ctx));
    }
}
