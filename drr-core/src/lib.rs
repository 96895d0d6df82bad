//! Declarative Rewrite Rule (DRR) matcher and applier over an abstract
//! host IR.
//!
//! This crate is the matcher/applier core only: it consumes already-built
//! [`pattern::SourcePatternGraph`]/[`pattern::ResultPatternGraph`] values
//! (the builder DSL a rule author would use to construct those is outside
//! this crate's scope) and a host IR implementing [`ir::Ir`]/[`ir::Rewriter`],
//! and exposes a single entry point, [`rule::Rule::match_and_rewrite`].
//!
//! See `drr-testkit` for a minimal in-memory host IR used by this crate's
//! own tests.

pub mod applier;
pub mod binding;
pub mod constraint;
pub mod ir;
pub mod matcher;
pub mod pattern;
pub mod rule;

pub use binding::MatchContext;
pub use constraint::Constraint;
pub use ir::{Ir, Rewriter};
pub use rule::Rule;
