//! The binding environment threaded through matching and rewriting (spec
//! §3 `MatchContext`, §4.3).
//!
//! Grounded on the teacher's `CellMapping` (pattern/design cell
//! bijection): here the pattern side is split into two arenas (`OpCallId`
//! and `TensorId`) bound against a single host IR's `Op`/`Value` handles.
//! Op bindings are injective and monotone (spec §8 "Injectivity",
//! "Monotonicity"); value bindings are idempotent but need not be
//! injective, since two pattern tensors may alias the same host value.

use ahash::AHashMap;

use crate::ir::Ir;
use crate::pattern::{OpCallId, TensorId};

/// Maps pattern-graph `OpCall`/`Tensor` ids to host-IR operation/value
/// handles during a single match attempt, and carries the bound result
/// pattern operations forward into the rewrite applier.
#[derive(Clone, Debug)]
pub struct MatchContext<I: Ir> {
    op_bindings: AHashMap<OpCallId, I::Op>,
    reverse_op_bindings: AHashMap<I::Op, OpCallId>,
    value_bindings: AHashMap<TensorId, I::Value>,
}

impl<I: Ir> Default for MatchContext<I> {
    fn default() -> Self {
        Self {
            op_bindings: AHashMap::new(),
            reverse_op_bindings: AHashMap::new(),
            value_bindings: AHashMap::new(),
        }
    }
}

impl<I: Ir> MatchContext<I> {
    /// Creates an empty binding environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `pattern_op` to `host_op`, enforcing injectivity: fails if
    /// `host_op` is already bound to a *different* pattern `OpCall` (spec
    /// §8 "Injectivity"). Binding the same pair again is a no-op success
    /// (monotone, never un-binds).
    ///
    /// Returns `true` if the binding was accepted.
    #[must_use]
    #[contracts::debug_ensures(self.op_bindings.len() == self.reverse_op_bindings.len())]
    pub fn bind_op(&mut self, pattern_op: OpCallId, host_op: I::Op) -> bool {
        if let Some(&existing_pattern_op) = self.reverse_op_bindings.get(&host_op) {
            if existing_pattern_op != pattern_op {
                return false;
            }
        }
        if let Some(&existing_host_op) = self.op_bindings.get(&pattern_op) {
            return existing_host_op == host_op;
        }
        self.op_bindings.insert(pattern_op, host_op);
        self.reverse_op_bindings.insert(host_op, pattern_op);
        true
    }

    /// Binds `tensor` to `value`. Idempotent: re-binding to the same value
    /// succeeds, re-binding to a different value fails. Unlike `bind_op`,
    /// this is not required to be injective — two pattern tensors may
    /// legitimately alias the same host value.
    #[must_use]
    pub fn bind_value(&mut self, tensor: TensorId, value: I::Value) -> bool {
        match self.value_bindings.get(&tensor) {
            Some(&existing) => existing == value,
            None => {
                self.value_bindings.insert(tensor, value);
                true
            }
        }
    }

    /// The host operation bound to `pattern_op`, if any.
    #[must_use]
    pub fn op(&self, pattern_op: OpCallId) -> Option<I::Op> {
        self.op_bindings.get(&pattern_op).copied()
    }

    /// The host value bound to `tensor`, if any.
    #[must_use]
    pub fn value(&self, tensor: TensorId) -> Option<I::Value> {
        self.value_bindings.get(&tensor).copied()
    }

    /// Number of bound `OpCall`s.
    #[must_use]
    pub fn op_binding_count(&self) -> usize {
        self.op_bindings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drr_testkit::InMemoryIr;

    #[test]
    fn bind_op_is_idempotent_for_the_same_pair() {
        let mut ir = InMemoryIr::new();
        let op = ir.push_op("relu", &[]);
        let mut ctx: MatchContext<InMemoryIr> = MatchContext::new();
        assert!(ctx.bind_op(OpCallId(0), op));
        assert!(ctx.bind_op(OpCallId(0), op));
        assert_eq!(ctx.op_binding_count(), 1);
    }

    #[test]
    fn bind_op_rejects_non_injective_binding() {
        let mut ir = InMemoryIr::new();
        let op = ir.push_op("relu", &[]);
        let mut ctx: MatchContext<InMemoryIr> = MatchContext::new();
        assert!(ctx.bind_op(OpCallId(0), op));
        assert!(!ctx.bind_op(OpCallId(1), op));
    }

    #[test]
    fn bind_value_rejects_conflicting_rebind() {
        let mut ir = InMemoryIr::new();
        let op = ir.push_op("const", &[]);
        let a = ir.result_value(op, 0);
        let op2 = ir.push_op("const", &[]);
        let b = ir.result_value(op2, 0);
        let mut ctx: MatchContext<InMemoryIr> = MatchContext::new();
        assert!(ctx.bind_value(TensorId(0), a));
        assert!(!ctx.bind_value(TensorId(0), b));
    }
}
