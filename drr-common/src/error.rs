//! Error types for rewrite-rule construction and application.
//!
//! Design principle, carried over from the rule-authoring/execution split in
//! the original DRR implementation: almost every error here should occur
//! during **rule construction** (building the pattern graphs) rather than
//! during matching. A clean non-match is not an error at all — it is `false`
//! (or `Ok(false)`) returned from `match_and_rewrite`. These variants are
//! reserved for bugs in how a rule was authored, or for the host IR
//! rejecting a mutation the applier asked it to make.

use thiserror::Error;

/// Errors raised while constructing or applying a declarative rewrite rule.
#[derive(Debug, Error)]
pub enum DrrError {
    /// The source or result pattern graph failed a construction-time
    /// well-formedness check (emptiness, connectivity, anchor reachability,
    /// producer uniqueness). These are rule-authoring bugs, not recoverable
    /// runtime conditions.
    #[error("rule authoring error: {0}")]
    RuleAuthoring(String),

    /// A result-pattern operation referenced an input tensor name that was
    /// never bound in the result `MatchContext` (neither copied in from the
    /// source binding nor produced by an earlier result-pattern operation).
    #[error("unresolved result-pattern input tensor: {0}")]
    UnresolvedInput(String),

    /// The host IR rejected a mutation requested by the rewrite applier
    /// (e.g. a type mismatch on `create`). The host IR may be left in a
    /// partially rewritten state; this crate performs no rollback, per the
    /// single-pass, no-rollback concurrency model.
    #[error("IR invariant violation: {0}")]
    Ir(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl DrrError {
    /// Wraps a host-IR error (from `Rewriter::create`, `replace_all_uses`,
    /// or `erase`) as a [`DrrError::Ir`].
    pub fn ir<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Ir(Box::new(err))
    }
}
