//! The pattern-graph model (spec §3, §4.2): immutable descriptions of a
//! source or result graph shared by an `OpCall`/`Tensor` arena.

mod graph;

pub use graph::{
    OpCall, OpCallId, PatternGraph, PatternGraphBuilder, ResultPatternGraph, SourcePatternGraph,
    Tensor, TensorId,
};
