//! An in-memory reference host IR implementing `drr_core::ir::{Ir, Rewriter}`.
//!
//! This is not part of the declarative-rewrite-rule model itself — it
//! exists purely so `drr-core`'s own tests (and this crate's) have a
//! concrete, minimal host to match against and rewrite, the same role
//! `prjunnamed_netlist::Design` plays for the matcher this crate's sibling
//! is grounded on. Every operation here has exactly one result; that is a
//! testkit simplification, not a constraint `drr-core` imposes on real
//! hosts.

use std::sync::Once;

use thiserror::Error;

use drr_core::ir::{Attributes, Dtype, Ir, Rewriter, Shape};

static INIT: Once = Once::new();

/// Initializes a `tracing` subscriber for test output, once per process.
pub fn setup_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Opaque handle to an operation in an [`InMemoryIr`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OpId(u32);

/// Opaque handle to a value in an [`InMemoryIr`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValId(u32);

#[derive(Clone, Debug)]
struct OpSlot {
    opcode: String,
    operands: Vec<ValId>,
    results: Vec<ValId>,
    attributes: Attributes,
    erased: bool,
}

#[derive(Clone, Debug)]
struct ValSlot {
    producer: Option<OpId>,
    shape: Shape,
    dtype: Dtype,
    uses: Vec<(OpId, usize)>,
}

/// Errors an [`InMemoryIr`] can reject a rewrite applier mutation with.
#[derive(Debug, Error)]
pub enum InMemoryIrError {
    /// The applier asked to erase an operation that still has live uses on
    /// one of its results. The applier guarantees this never happens; this
    /// variant exists so the host can refuse rather than corrupt itself.
    #[error("cannot erase op {0:?}: result {1} still has {2} live use(s)")]
    LiveUsesOnErase(OpId, usize, usize),
    /// An operand index was out of range for the referenced operation.
    #[error("operand index {1} out of range for op {0:?}")]
    OperandOutOfRange(OpId, usize),
}

/// A minimal, single-result-per-op in-memory IR used as a reference host.
#[derive(Clone, Debug, Default)]
pub struct InMemoryIr {
    ops: Vec<OpSlot>,
    values: Vec<ValSlot>,
}

impl InMemoryIr {
    /// Creates an empty IR.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a free value with no producing op (a function argument),
    /// with an unconstrained shape and `Dtype::F32`.
    pub fn input(&mut self) -> ValId {
        self.input_typed(Shape::new(Vec::<i64>::new()), Dtype::F32)
    }

    /// Declares a free value with no producing op and an explicit shape and
    /// dtype, for constraint-predicate tests.
    pub fn input_typed(&mut self, shape: Shape, dtype: Dtype) -> ValId {
        let id = ValId(self.values.len() as u32);
        self.values.push(ValSlot {
            producer: None,
            shape,
            dtype,
            uses: Vec::new(),
        });
        id
    }

    /// Pushes an operation with `opcode` consuming `operands`, producing a
    /// single result of unconstrained shape and `Dtype::F32`.
    pub fn push_op(&mut self, opcode: &str, operands: &[ValId]) -> OpId {
        self.push_op_typed(opcode, operands, Shape::new(Vec::<i64>::new()), Dtype::F32)
    }

    /// Like [`Self::push_op`], but with an explicit result shape and dtype.
    pub fn push_op_typed(
        &mut self,
        opcode: &str,
        operands: &[ValId],
        result_shape: Shape,
        result_dtype: Dtype,
    ) -> OpId {
        self.push_op_full(opcode, operands, result_shape, result_dtype, Attributes::new())
    }

    /// Like [`Self::push_op`], but also attaching `attributes` to the
    /// pushed op, for constraints that read rule attributes (e.g. a
    /// `transpose`'s permutation) directly off [`Self::op_attributes`].
    pub fn push_op_with_attributes(
        &mut self,
        opcode: &str,
        operands: &[ValId],
        attributes: Attributes,
    ) -> OpId {
        self.push_op_full(
            opcode,
            operands,
            Shape::new(Vec::<i64>::new()),
            Dtype::F32,
            attributes,
        )
    }

    fn push_op_full(
        &mut self,
        opcode: &str,
        operands: &[ValId],
        result_shape: Shape,
        result_dtype: Dtype,
        attributes: Attributes,
    ) -> OpId {
        let op_id = OpId(self.ops.len() as u32);
        for (index, &operand) in operands.iter().enumerate() {
            self.values[operand.0 as usize].uses.push((op_id, index));
        }
        let result_id = ValId(self.values.len() as u32);
        self.values.push(ValSlot {
            producer: Some(op_id),
            shape: result_shape,
            dtype: result_dtype,
            uses: Vec::new(),
        });
        self.ops.push(OpSlot {
            opcode: opcode.to_string(),
            operands: operands.to_vec(),
            results: vec![result_id],
            attributes,
            erased: false,
        });
        op_id
    }

    /// The attributes attached to `op` at push time, for constraints that
    /// need to inspect them (e.g. a permutation list).
    #[must_use]
    pub fn op_attributes(&self, op: OpId) -> &Attributes {
        &self.ops[op.0 as usize].attributes
    }

    /// The `index`-th result of `op`. Since every op in this testkit has
    /// exactly one result, `index` is always `0`.
    #[must_use]
    pub fn result_value(&self, op: OpId, index: usize) -> ValId {
        self.ops[op.0 as usize].results[index]
    }

    /// Whether `op` has been erased by a prior `Rewriter::erase` call.
    #[must_use]
    pub fn is_erased(&self, op: OpId) -> bool {
        self.ops[op.0 as usize].erased
    }

    /// Total number of live (non-erased) operations, for asserting on the
    /// shape of a rewritten IR in tests.
    #[must_use]
    pub fn live_op_count(&self) -> usize {
        self.ops.iter().filter(|op| !op.erased).count()
    }
}

impl Ir for InMemoryIr {
    type Op = OpId;
    type Value = ValId;

    fn opcode_name(&self, op: Self::Op) -> &str {
        &self.ops[op.0 as usize].opcode
    }

    fn num_operands(&self, op: Self::Op) -> usize {
        self.ops[op.0 as usize].operands.len()
    }

    fn num_results(&self, op: Self::Op) -> usize {
        self.ops[op.0 as usize].results.len()
    }

    fn operand(&self, op: Self::Op, index: usize) -> Self::Value {
        self.ops[op.0 as usize].operands[index]
    }

    fn result(&self, op: Self::Op, index: usize) -> Self::Value {
        self.ops[op.0 as usize].results[index]
    }

    fn defining_op(&self, value: Self::Value) -> Option<Self::Op> {
        self.values[value.0 as usize].producer
    }

    fn uses(&self, value: Self::Value) -> Vec<(Self::Op, usize)> {
        self.values[value.0 as usize].uses.clone()
    }

    fn shape(&self, value: Self::Value) -> Shape {
        self.values[value.0 as usize].shape.clone()
    }

    fn dtype(&self, value: Self::Value) -> Dtype {
        self.values[value.0 as usize].dtype.clone()
    }
}

impl Rewriter for InMemoryIr {
    type Error = InMemoryIrError;

    fn create(
        &mut self,
        opcode: &str,
        operands: &[Self::Value],
        attributes: Attributes,
    ) -> Result<Self::Op, Self::Error> {
        let op_id = OpId(self.ops.len() as u32);
        for (index, &operand) in operands.iter().enumerate() {
            self.values[operand.0 as usize].uses.push((op_id, index));
        }
        let result_id = ValId(self.values.len() as u32);
        self.values.push(ValSlot {
            producer: Some(op_id),
            shape: Shape::new(Vec::<i64>::new()),
            dtype: Dtype::F32,
            uses: Vec::new(),
        });
        self.ops.push(OpSlot {
            opcode: opcode.to_string(),
            operands: operands.to_vec(),
            results: vec![result_id],
            attributes,
            erased: false,
        });
        tracing::debug!(opcode, op = ?op_id, "created operation");
        Ok(op_id)
    }

    fn replace_all_uses(&mut self, old: Self::Value, new: Self::Value) -> Result<(), Self::Error> {
        let uses = std::mem::take(&mut self.values[old.0 as usize].uses);
        for &(user_op, operand_index) in &uses {
            let slot = &mut self.ops[user_op.0 as usize];
            if operand_index >= slot.operands.len() {
                return Err(InMemoryIrError::OperandOutOfRange(user_op, operand_index));
            }
            slot.operands[operand_index] = new;
        }
        self.values[new.0 as usize].uses.extend(uses);
        Ok(())
    }

    fn erase(&mut self, op: Self::Op) -> Result<(), Self::Error> {
        for (result_index, &result) in self.ops[op.0 as usize].results.clone().iter().enumerate() {
            let live_uses = self.values[result.0 as usize].uses.len();
            if live_uses > 0 {
                return Err(InMemoryIrError::LiveUsesOnErase(
                    op,
                    result_index,
                    live_uses,
                ));
            }
        }
        let operands = self.ops[op.0 as usize].operands.clone();
        for operand in operands {
            self.values[operand.0 as usize]
                .uses
                .retain(|&(user, _)| user != op);
        }
        self.ops[op.0 as usize].erased = true;
        tracing::debug!(op = ?op, "erased operation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_op_registers_uses_on_operands() {
        let mut ir = InMemoryIr::new();
        let x = ir.input();
        let op = ir.push_op("relu", &[x]);
        assert_eq!(ir.uses(x), vec![(op, 0)]);
    }

    #[test]
    fn replace_all_uses_redirects_consumers() {
        let mut ir = InMemoryIr::new();
        let x = ir.input();
        let relu = ir.push_op("relu", &[x]);
        let y = ir.result_value(relu, 0);
        let consumer = ir.push_op("sigmoid", &[y]);

        let replacement_op = ir.push_op("gelu", &[x]);
        let z = ir.result_value(replacement_op, 0);
        ir.replace_all_uses(y, z).unwrap();

        assert_eq!(ir.operand(consumer, 0), z);
        assert!(ir.uses(y).is_empty());
    }

    #[test]
    fn erase_rejects_op_with_live_uses() {
        let mut ir = InMemoryIr::new();
        let x = ir.input();
        let relu = ir.push_op("relu", &[x]);
        let y = ir.result_value(relu, 0);
        let _consumer = ir.push_op("sigmoid", &[y]);

        let err = ir.erase(relu).unwrap_err();
        assert!(matches!(err, InMemoryIrError::LiveUsesOnErase(_, _, _)));
    }

    #[test]
    fn erase_succeeds_once_uses_are_gone() {
        let mut ir = InMemoryIr::new();
        let x = ir.input();
        let relu = ir.push_op("relu", &[x]);
        ir.erase(relu).unwrap();
        assert!(ir.is_erased(relu));
        assert_eq!(ir.live_op_count(), 0);
    }
}
