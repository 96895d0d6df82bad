//! The abstract host-IR capability set (spec §4.1, §6).
//!
//! The core never touches host-IR internals directly: it is generic over any
//! provider of this narrow trait set, per the "polymorphism over the host
//! IR" design note. `Ir` exposes read-only queries; `Rewriter` extends it
//! with the three mutating primitives the applier needs. A concrete host
//! binds its own operation/value representations to `Ir::Op`/`Ir::Value` —
//! see `drr-testkit` for an in-memory reference implementation used by this
//! crate's own tests.

use std::fmt::Debug;
use std::hash::Hash;

/// A tensor shape as seen by constraints. Kept deliberately minimal (no
/// broadcasting, no symbolic dimensions) — richer shape algebra belongs to
/// the host IR, not the matching core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub Vec<i64>);

impl Shape {
    /// Builds a shape from a fixed list of dimensions.
    #[must_use]
    pub fn new(dims: impl Into<Vec<i64>>) -> Self {
        Self(dims.into())
    }
}

/// An element type as seen by constraints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dtype {
    /// 32-bit IEEE-754 float.
    F32,
    /// 64-bit IEEE-754 float.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// Boolean.
    Bool,
    /// Any host-specific element type not covered above, by name.
    Other(String),
}

/// A single rule-attribute value attached to a created operation.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    /// Signed integer attribute.
    Int(i64),
    /// Floating-point attribute.
    Float(f64),
    /// String attribute.
    Str(String),
    /// Boolean attribute.
    Bool(bool),
    /// A list of signed integers (e.g. a permutation or shape).
    IntList(Vec<i64>),
}

/// Named attributes passed to [`Rewriter::create`].
pub type Attributes = std::collections::BTreeMap<String, AttrValue>;

/// Read-only capability set the matcher and constraint evaluator need from
/// the host IR (spec §4.1, §6).
///
/// Implementors are expected to make every method here cheap (pointer/index
/// lookups): the matcher calls `opcode_name`, `operand`, `result`, `uses`,
/// and `use_count` on the order of once per pattern-graph edge per match
/// attempt.
pub trait Ir {
    /// Opaque handle to a host-IR operation. Cheap to copy and compare.
    type Op: Copy + Eq + Hash + Debug;
    /// Opaque handle to a host-IR value (an operation result or a
    /// block/function argument). Cheap to copy and compare.
    type Value: Copy + Eq + Hash + Debug;

    /// The opcode name of `op` (e.g. `"transpose"`, `"add"`).
    fn opcode_name(&self, op: Self::Op) -> &str;
    /// Number of operand slots `op` has.
    fn num_operands(&self, op: Self::Op) -> usize;
    /// Number of results `op` produces.
    fn num_results(&self, op: Self::Op) -> usize;
    /// The value flowing into operand slot `index` of `op`.
    ///
    /// # Panics
    /// Implementations may panic if `index >= self.num_operands(op)`.
    fn operand(&self, op: Self::Op, index: usize) -> Self::Value;
    /// The `index`-th result value produced by `op`.
    ///
    /// # Panics
    /// Implementations may panic if `index >= self.num_results(op)`.
    fn result(&self, op: Self::Op, index: usize) -> Self::Value;

    /// The operation that produced `value`, or `None` if `value` is a
    /// block/function argument with no defining op in this IR.
    fn defining_op(&self, value: Self::Value) -> Option<Self::Op>;
    /// All uses of `value`, as `(consumer op, operand index)` pairs, in the
    /// host's natural use-list iteration order. The matcher relies on this
    /// order for its deterministic, greedy sibling/child enqueue (spec
    /// §4.4 "Tie-breaking").
    fn uses(&self, value: Self::Value) -> Vec<(Self::Op, usize)>;
    /// Number of uses of `value`. Equivalent to `self.uses(value).len()`
    /// but may be cheaper for hosts that track use-counts incrementally.
    fn use_count(&self, value: Self::Value) -> usize {
        self.uses(value).len()
    }

    /// The shape of `value`, for constraint predicates only — never read by
    /// the matcher itself.
    fn shape(&self, value: Self::Value) -> Shape;
    /// The element type of `value`, for constraint predicates only.
    fn dtype(&self, value: Self::Value) -> Dtype;
}

/// Mutating capability set the rewrite applier needs from the host IR
/// (spec §4.1, §6). Every method can fail: the host IR is free to reject a
/// mutation (type mismatch, invalid attribute), which the applier surfaces
/// as `DrrError::Ir` with no rollback (spec §5, §7).
pub trait Rewriter: Ir {
    /// Host-IR error type for a rejected mutation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates a new operation with the given opcode, operand values, and
    /// attributes, returning a handle to it.
    fn create(
        &mut self,
        opcode: &str,
        operands: &[Self::Value],
        attributes: Attributes,
    ) -> Result<Self::Op, Self::Error>;

    /// Redirects every existing use of `old` to `new`.
    fn replace_all_uses(&mut self, old: Self::Value, new: Self::Value) -> Result<(), Self::Error>;

    /// Removes `op` from the IR. Callers (the applier) guarantee `op` has
    /// zero uses across all of its results at the time of the call.
    fn erase(&mut self, op: Self::Op) -> Result<(), Self::Error>;
}
