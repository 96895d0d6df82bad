//! The single external entry point (spec §6): a `Rule` bundling a source
//! pattern, a result pattern, constraints, and a [`Config`], with one
//! operation — `match_and_rewrite` — that matches, checks constraints, and
//! rewrites in a single call.

use drr_common::{Config, DrrError};

use crate::applier::apply_rewrite;
use crate::binding::MatchContext;
use crate::constraint::{evaluate_all, Constraint};
use crate::ir::Rewriter;
use crate::matcher::match_source;
use crate::pattern::{ResultPatternGraph, SourcePatternGraph};

/// A declarative rewrite rule: a source pattern, a result pattern, and the
/// constraints that must hold for a structural match to be accepted.
pub struct Rule<I: Rewriter> {
    source: SourcePatternGraph,
    result: ResultPatternGraph,
    constraints: Vec<Constraint<I>>,
    config: Config,
}

impl<I: Rewriter> Rule<I> {
    /// Builds a rule, validating that every non-optional result-pattern
    /// input tensor name resolves against the source pattern (spec §7
    /// "unresolved result-pattern input").
    ///
    /// `SourcePatternGraph::new` and `ResultPatternGraph::new` have
    /// already validated their own construction-time invariants (empty
    /// source graph, anchor reachability, tensor-assignment names); this
    /// constructor adds the one cross-graph check that spans both.
    ///
    /// # Errors
    /// Returns [`DrrError::RuleAuthoring`] if a result-pattern input name
    /// has no matching tensor in the source pattern.
    pub fn new(
        source: SourcePatternGraph,
        result: ResultPatternGraph,
        constraints: Vec<Constraint<I>>,
        config: Config,
    ) -> Result<Self, DrrError> {
        for tensor_id in result.graph().input_tensor_ids() {
            let tensor = result.graph().tensor(tensor_id);
            if tensor.is_optional() {
                continue;
            }
            if source.graph().tensor_by_name(tensor.name()).is_none() {
                return Err(DrrError::RuleAuthoring(format!(
                    "result-pattern input '{}' has no corresponding tensor in the source pattern",
                    tensor.name()
                )));
            }
        }

        Ok(Self {
            source,
            result,
            constraints,
            config,
        })
    }

    /// The anchor opcode of the source pattern, so a driver can index
    /// rules by opcode (spec §6).
    #[must_use]
    pub fn anchor_opcode(&self) -> &str {
        self.source.anchor_opcode()
    }

    /// This rule's relative profitability, opaque to the core itself.
    #[must_use]
    pub fn benefit(&self) -> i32 {
        self.config.benefit
    }

    /// Attempts to match this rule anchored at `op`, and if successful,
    /// rewrites `ir` in place.
    ///
    /// Returns `Ok(true)` iff the op anchored a successful match and the
    /// IR was mutated, `Ok(false)` on a clean non-match (structural
    /// mismatch or a failed constraint — no mutation, diagnostic log
    /// only), and `Err` only for the rule-authoring / IR-invariant classes
    /// in spec §7, which remain distinguishable from the silent `Ok(false)`
    /// non-match path.
    ///
    /// # Errors
    /// See [`applier::apply_rewrite`].
    pub fn match_and_rewrite(&self, op: I::Op, ir: &mut I) -> Result<bool, DrrError> {
        let Some(ctx) = match_source(ir, &self.source, op) else {
            return Ok(false);
        };

        if !evaluate_all(&self.constraints, ir, &ctx) {
            return Ok(false);
        }

        apply_rewrite(ir, &self.source, &self.result, &ctx, &self.config)?;
        Ok(true)
    }

    /// Evaluates this rule against every candidate in `candidates` without
    /// mutating `ir`, returning the bindings for every one that structurally
    /// matched and passed constraints.
    ///
    /// A driver can use this to decide which of several candidate anchors
    /// to commit to rewriting before mutating the IR — matching is
    /// read-only and safe to run concurrently (spec §5), unlike rewriting.
    /// With the `rayon` feature enabled this fans candidates out across a
    /// thread pool, mirroring the teacher's `candidates.into_par_iter()`
    /// gate in `svql_subgraph::matcher`.
    #[cfg(feature = "rayon")]
    pub fn find_all_matches(&self, ir: &I, candidates: Vec<I::Op>) -> Vec<(I::Op, MatchContext<I>)>
    where
        I: Sync,
        I::Op: Send,
        I::Value: Send,
    {
        use rayon::prelude::*;
        candidates
            .into_par_iter()
            .filter_map(|op| self.try_match(ir, op))
            .collect()
    }

    /// Non-`rayon` fallback of [`Self::find_all_matches`].
    #[cfg(not(feature = "rayon"))]
    pub fn find_all_matches(&self, ir: &I, candidates: Vec<I::Op>) -> Vec<(I::Op, MatchContext<I>)> {
        candidates
            .into_iter()
            .filter_map(|op| self.try_match(ir, op))
            .collect()
    }

    fn try_match(&self, ir: &I, op: I::Op) -> Option<(I::Op, MatchContext<I>)> {
        let ctx = match_source(ir, &self.source, op)?;
        evaluate_all(&self.constraints, ir, &ctx).then_some((op, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternGraphBuilder;
    use drr_testkit::InMemoryIr;

    fn transpose_fusion_rule() -> Rule<InMemoryIr> {
        let mut source_builder = PatternGraphBuilder::new();
        source_builder.input("x").unwrap();
        source_builder.op("transpose", &["x"], &["y"]).unwrap();
        let anchor = source_builder.op("transpose", &["y"], &["z"]).unwrap();
        source_builder.mark_output("z").unwrap();
        let source_graph = source_builder.build().unwrap();
        let source = SourcePatternGraph::new(source_graph, anchor).unwrap();

        let mut result_builder = PatternGraphBuilder::new();
        result_builder.input("x").unwrap();
        result_builder.placeholder("z").unwrap();
        result_builder.mark_output("z").unwrap();
        let result_graph = result_builder.build().unwrap();
        let result = ResultPatternGraph::new(
            result_graph,
            vec![("z".to_string(), "x".to_string())],
        )
        .unwrap();

        Rule::new(source, result, Vec::new(), Config::default()).unwrap()
    }

    #[test]
    fn match_and_rewrite_fuses_on_success() {
        let rule = transpose_fusion_rule();
        let mut ir = InMemoryIr::new();
        let a = ir.input();
        let b_op = ir.push_op("transpose", &[a]);
        let b = ir.result_value(b_op, 0);
        let c_op = ir.push_op("transpose", &[b]);
        let c = ir.result_value(c_op, 0);
        let use_op = ir.push_op("consume", &[c]);

        let rewritten = rule.match_and_rewrite(c_op, &mut ir).unwrap();
        assert!(rewritten);
        assert_eq!(ir.operand(use_op, 0), a);
    }

    #[test]
    fn match_and_rewrite_returns_false_on_opcode_mismatch() {
        let rule = transpose_fusion_rule();
        let mut ir = InMemoryIr::new();
        let a = ir.input();
        let b_op = ir.push_op("transpose", &[a]);
        let b = ir.result_value(b_op, 0);
        let c_op = ir.push_op("reshape", &[b]);
        let _use_op = ir.push_op("consume", &[ir.result_value(c_op, 0)]);

        let rewritten = rule.match_and_rewrite(c_op, &mut ir).unwrap();
        assert!(!rewritten);
        assert_eq!(ir.live_op_count(), 3);
    }

    #[test]
    fn rewrite_leaves_no_transpose_op_for_the_rule_to_rematch() {
        let rule = transpose_fusion_rule();
        let mut ir = InMemoryIr::new();
        let a = ir.input();
        let b_op = ir.push_op("transpose", &[a]);
        let b = ir.result_value(b_op, 0);
        let c_op = ir.push_op("transpose", &[b]);
        let _use_op = ir.push_op("consume", &[ir.result_value(c_op, 0)]);

        assert!(rule.match_and_rewrite(c_op, &mut ir).unwrap());
        assert!(ir.is_erased(b_op));
        assert!(ir.is_erased(c_op));
        // A driver re-walking the rewritten IR for live anchors would find
        // no surviving "transpose" op to offer the rule a second time,
        // which is how spec §8 invariant 6 (idempotence) holds in
        // practice — not by re-matching an already-erased handle.
    }

    #[test]
    fn find_all_matches_returns_only_structurally_valid_candidates() {
        let rule = transpose_fusion_rule();
        let mut ir = InMemoryIr::new();
        let a = ir.input();
        let b_op = ir.push_op("transpose", &[a]);
        let b = ir.result_value(b_op, 0);
        let good_anchor = ir.push_op("transpose", &[b]);
        let bad_anchor = ir.push_op("reshape", &[b]);

        let matches = rule.find_all_matches(&ir, vec![good_anchor, bad_anchor]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0, good_anchor);
    }

    #[test]
    fn new_rejects_unresolved_result_pattern_input() {
        let mut source_builder = PatternGraphBuilder::new();
        source_builder.input("x").unwrap();
        let anchor = source_builder.op("relu", &["x"], &["y"]).unwrap();
        source_builder.mark_output("y").unwrap();
        let source_graph = source_builder.build().unwrap();
        let source = SourcePatternGraph::new(source_graph, anchor).unwrap();

        let mut result_builder = PatternGraphBuilder::new();
        result_builder.input("not_in_source").unwrap();
        result_builder.op("relu6", &["not_in_source"], &["y"]).unwrap();
        result_builder.mark_output("y").unwrap();
        let result_graph = result_builder.build().unwrap();
        let result = ResultPatternGraph::new(result_graph, Vec::new()).unwrap();

        let err = Rule::<InMemoryIr>::new(source, result, Vec::new(), Config::default())
            .unwrap_err();
        assert!(matches!(err, DrrError::RuleAuthoring(_)));
    }
}
