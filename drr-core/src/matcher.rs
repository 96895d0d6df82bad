//! The pattern matcher (spec §4.4): anchored-BFS subgraph isomorphism from
//! a candidate host-IR operation against a [`SourcePatternGraph`].
//!
//! A faithful port of `PatternGraphMatch` in `drr_rewrite_pattern.h`: two
//! synchronized queues, two visited sets, bind-on-dequeue, operand walk
//! with sibling-fanout check and producer check, result walk with
//! output-exemption, and a final step-count completion invariant. The
//! original's `Bottom2UpMatch` is an unreachable auxiliary method and is
//! not ported.

use std::collections::VecDeque;

use ahash::AHashSet;

use crate::binding::MatchContext;
use crate::ir::Ir;
use crate::pattern::{OpCallId, SourcePatternGraph};

type VisitedSet<T> = AHashSet<T>;

/// Attempts to match `source` anchored at `anchor_op` in `ir`.
///
/// Returns `Some(ctx)` with a fully populated binding environment on
/// success (structural match only — constraint evaluation is the caller's
/// responsibility, per the `Rule::match_and_rewrite` split), or `None` on
/// any non-match. Performs no IR mutation.
pub fn match_source<I: Ir>(
    ir: &I,
    source: &SourcePatternGraph,
    anchor_op: I::Op,
) -> Option<MatchContext<I>> {
    let graph = source.graph();
    let mut ctx = MatchContext::new();

    let mut pattern_visited: VisitedSet<OpCallId> = AHashSet::new();
    let mut ir_visited: VisitedSet<I::Op> = AHashSet::new();
    let mut queue: VecDeque<(OpCallId, I::Op)> = VecDeque::new();

    queue.push_back((source.anchor(), anchor_op));
    pattern_visited.insert(source.anchor());
    ir_visited.insert(anchor_op);

    let mut step = 0usize;

    while let Some((p, h)) = queue.pop_front() {
        let op_call = graph.op(p);

        if op_call.opcode() != ir.opcode_name(h) {
            tracing::debug!(pattern_op = op_call.opcode(), ir_op = ir.opcode_name(h), "opcode mismatch");
            return None;
        }
        if !ctx.bind_op(p, h) {
            tracing::debug!(pattern_op = op_call.opcode(), "non-injective op binding");
            return None;
        }

        if op_call.inputs().len() != ir.num_operands(h) {
            tracing::debug!("operand arity mismatch for {}", op_call.opcode());
            return None;
        }

        for (i, &tensor_id) in op_call.inputs().to_vec().iter().enumerate() {
            let value = ir.operand(h, i);
            if !ctx.bind_value(tensor_id, value) {
                tracing::debug!("conflicting value binding on operand {i}");
                return None;
            }

            let tensor = graph.tensor(tensor_id);
            let is_input = graph.is_input_tensor(tensor_id);

            if !is_input && tensor.consumers().len() != ir.use_count(value) {
                tracing::debug!(
                    tensor = tensor.name(),
                    "sibling fanout mismatch: pattern has {} consumer(s), IR value has {}",
                    tensor.consumers().len(),
                    ir.use_count(value)
                );
                return None;
            }

            enqueue_unvisited_matches(
                graph,
                tensor.consumers(),
                ir.uses(value),
                ir,
                &mut pattern_visited,
                &mut ir_visited,
                &mut queue,
            );

            if is_input {
                continue;
            }

            let producer = tensor
                .producer()
                .expect("non-input tensor must have a producer");
            let Some(defining_op) = ir.defining_op(value) else {
                tracing::debug!(tensor = tensor.name(), "IR value has no defining op");
                return None;
            };
            if graph.op(producer).opcode() != ir.opcode_name(defining_op) {
                tracing::debug!(tensor = tensor.name(), "producer opcode mismatch");
                return None;
            }
            if pattern_visited.insert(producer) {
                ir_visited.insert(defining_op);
                queue.push_back((producer, defining_op));
            }
        }

        if op_call.outputs().len() != ir.num_results(h) {
            tracing::debug!("result arity mismatch for {}", op_call.opcode());
            return None;
        }

        for (i, &tensor_id) in op_call.outputs().to_vec().iter().enumerate() {
            let value = ir.result(h, i);
            if !ctx.bind_value(tensor_id, value) {
                tracing::debug!("conflicting value binding on result {i}");
                return None;
            }

            if graph.is_output_tensor(tensor_id) {
                continue;
            }

            let tensor = graph.tensor(tensor_id);
            if tensor.consumers().len() != ir.use_count(value) {
                tracing::debug!(
                    tensor = tensor.name(),
                    "child fanout mismatch: pattern has {} consumer(s), IR value has {}",
                    tensor.consumers().len(),
                    ir.use_count(value)
                );
                return None;
            }

            enqueue_unvisited_matches(
                graph,
                tensor.consumers(),
                ir.uses(value),
                ir,
                &mut pattern_visited,
                &mut ir_visited,
                &mut queue,
            );
        }

        step += 1;
    }

    if step != graph.op_call_count() {
        tracing::debug!(
            step,
            expected = graph.op_call_count(),
            "match incomplete: step count does not cover every OpCall"
        );
        return None;
    }

    Some(ctx)
}

/// For each unvisited pattern consumer of a tensor, searches the tensor's
/// unvisited IR uses for the first op with a matching opcode, in use-list
/// iteration order. A consumer with no match is left for later discovery
/// (spec §4.4 "Tie-breaking") — not an immediate failure.
#[allow(clippy::too_many_arguments)]
fn enqueue_unvisited_matches<I: Ir>(
    graph: &crate::pattern::PatternGraph,
    pattern_consumers: &[OpCallId],
    ir_uses: Vec<(I::Op, usize)>,
    ir: &I,
    pattern_visited: &mut VisitedSet<OpCallId>,
    ir_visited: &mut VisitedSet<I::Op>,
    queue: &mut VecDeque<(OpCallId, I::Op)>,
) {
    for &consumer in pattern_consumers {
        if pattern_visited.contains(&consumer) {
            continue;
        }
        let consumer_opcode = graph.op(consumer).opcode();
        let found = ir_uses
            .iter()
            .find(|(use_op, _)| !ir_visited.contains(use_op) && ir.opcode_name(*use_op) == consumer_opcode)
            .map(|&(use_op, _)| use_op);

        if let Some(use_op) = found {
            pattern_visited.insert(consumer);
            ir_visited.insert(use_op);
            queue.push_back((consumer, use_op));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{PatternGraphBuilder, SourcePatternGraph};
    use drr_testkit::InMemoryIr;

    fn transpose_transpose_source() -> SourcePatternGraph {
        let mut b = PatternGraphBuilder::new();
        b.input("x").unwrap();
        b.op("transpose", &["x"], &["y"]).unwrap();
        let c = b.op("transpose", &["y"], &["z"]).unwrap();
        b.mark_output("z").unwrap();
        let graph = b.build().unwrap();
        SourcePatternGraph::new(graph, c).unwrap()
    }

    #[test]
    fn matches_a_transpose_transpose_chain() {
        let source = transpose_transpose_source();
        let mut ir = InMemoryIr::new();
        let a = ir.input();
        let b_op = ir.push_op("transpose", &[a]);
        let b = ir.result_value(b_op, 0);
        let c_op = ir.push_op("transpose", &[b]);
        let c = ir.result_value(c_op, 0);
        let _use_c = ir.push_op("consume", &[c]);

        let ctx = match_source(&ir, &source, c_op).expect("expected a match");
        assert_eq!(ctx.op_binding_count(), 2);
    }

    #[test]
    fn rejects_opcode_mismatch() {
        let source = transpose_transpose_source();
        let mut ir = InMemoryIr::new();
        let a = ir.input();
        let b_op = ir.push_op("transpose", &[a]);
        let b = ir.result_value(b_op, 0);
        let c_op = ir.push_op("reshape", &[b]);
        let _use_c = ir.push_op("consume", &[ir.result_value(c_op, 0)]);

        assert!(match_source(&ir, &source, c_op).is_none());
    }

    #[test]
    fn rejects_fanout_mismatch_on_interior_tensor() {
        let mut b = PatternGraphBuilder::new();
        b.input("x").unwrap();
        let relu = b.op("relu", &["x"], &["y"]).unwrap();
        b.op("consume", &["y"], &["out"]).unwrap();
        b.mark_output("out").unwrap();
        let graph = b.build().unwrap();
        let source = SourcePatternGraph::new(graph, relu).unwrap();

        let mut ir = InMemoryIr::new();
        let x = ir.input();
        let relu_op = ir.push_op("relu", &[x]);
        let y = ir.result_value(relu_op, 0);
        let _u1 = ir.push_op("consume", &[y]);
        let _u2 = ir.push_op("consume", &[y]);

        assert!(match_source(&ir, &source, relu_op).is_none());
    }
}
