//! The rewrite applier (spec §4.5): given a successful source binding,
//! materializes the result pattern into the host IR and retires the
//! matched source operations.
//!
//! A faithful port of `PatternGraphRewrite`'s four-phase body in
//! `drr_rewrite_pattern.h` — `CreateOperations` →
//! `RebindIrTensorForAssignTensor` → `ReplaceOutputTensor` →
//! `DeleteSourcePatternOp` — run in that fixed order, with no rollback on
//! a mid-rewrite error (spec §5).

use drr_common::{Config, DrrError};

use crate::binding::MatchContext;
use crate::ir::Rewriter;
use crate::pattern::{ResultPatternGraph, SourcePatternGraph};

/// Runs the four-phase rewrite, mutating `ir` in place.
///
/// # Errors
/// Returns `DrrError::UnresolvedInput` if a result-pattern input or
/// tensor-assignment name cannot be resolved, and `DrrError::Ir` if the
/// host IR rejects a `create`/`replace_all_uses`/`erase` call. Neither
/// case is rolled back: the host IR may be left partially rewritten (spec
/// §5, §7).
pub fn apply_rewrite<I: Rewriter>(
    ir: &mut I,
    source: &SourcePatternGraph,
    result: &ResultPatternGraph,
    src_ctx: &MatchContext<I>,
    config: &Config,
) -> Result<(), DrrError> {
    let mut res_ctx = MatchContext::new();

    // Phase 1: copy result-pattern input values in from the source binding.
    for tensor_id in result.graph().input_tensor_ids() {
        let tensor = result.graph().tensor(tensor_id);
        if tensor.is_optional() {
            continue;
        }
        let name = tensor.name();
        let source_tensor_id = source
            .graph()
            .tensor_by_name(name)
            .ok_or_else(|| DrrError::UnresolvedInput(name.to_string()))?;
        let value = src_ctx
            .value(source_tensor_id)
            .ok_or_else(|| DrrError::UnresolvedInput(name.to_string()))?;
        let _ = res_ctx.bind_value(tensor_id, value);
    }

    // Phase 2: create result operations producers-before-consumers.
    for &op_call_id in result.graph().topo_order() {
        let op_call = result.graph().op(op_call_id);

        let mut operands = Vec::with_capacity(op_call.inputs().len());
        for &input_id in op_call.inputs() {
            let value = res_ctx.value(input_id).ok_or_else(|| {
                DrrError::UnresolvedInput(result.graph().tensor(input_id).name().to_string())
            })?;
            operands.push(value);
        }

        tracing::debug!(opcode = op_call.opcode(), "creating result operation");
        let created = ir
            .create(op_call.opcode(), &operands, op_call.attributes().clone())
            .map_err(DrrError::ir)?;
        let _ = res_ctx.bind_op(op_call_id, created);

        for (index, &output_id) in op_call.outputs().iter().enumerate() {
            let _ = res_ctx.bind_value(output_id, ir.result(created, index));
        }
    }

    // Phase 3: apply tensor-assignment redirects.
    for (src_name, dst_name) in result.tensor_assign_map() {
        let dst_id = result
            .graph()
            .tensor_by_name(dst_name)
            .ok_or_else(|| DrrError::UnresolvedInput(dst_name.clone()))?;
        let dst_value = res_ctx
            .value(dst_id)
            .ok_or_else(|| DrrError::UnresolvedInput(dst_name.clone()))?;
        let src_id = result
            .graph()
            .tensor_by_name(src_name)
            .ok_or_else(|| DrrError::UnresolvedInput(src_name.clone()))?;
        let _ = res_ctx.bind_value(src_id, dst_value);
    }

    // Phase 4: rewire host-IR uses of source outputs to result outputs.
    for source_output_name in source.graph().output_tensor_names().map(str::to_string) {
        if !result.graph().output_tensor_names().any(|n| n == source_output_name) {
            if config.warn_on_uncovered_output {
                tracing::warn!(
                    output = source_output_name.as_str(),
                    "source-pattern output has no corresponding result-pattern output; its uses are left unredirected"
                );
            }
            continue;
        }
        let source_output_id = source
            .graph()
            .tensor_by_name(&source_output_name)
            .expect("name came from this graph's own output_tensor_names");
        let result_output_id = result
            .graph()
            .tensor_by_name(&source_output_name)
            .expect("checked present above");
        let old_value = src_ctx
            .value(source_output_id)
            .ok_or_else(|| DrrError::UnresolvedInput(source_output_name.clone()))?;
        let new_value = res_ctx
            .value(result_output_id)
            .ok_or_else(|| DrrError::UnresolvedInput(source_output_name.clone()))?;
        ir.replace_all_uses(old_value, new_value)
            .map_err(DrrError::ir)?;
    }

    // Phase 5: erase source operations in reverse topological order.
    for &op_call_id in source.graph().topo_order().iter().rev() {
        let host_op = src_ctx
            .op(op_call_id)
            .expect("every source OpCall is bound after a successful match");
        ir.erase(host_op).map_err(DrrError::ir)?;
    }

    Ok(())
}
