//! The transform contract.

use crate::{ir::FlowGraph, Result};

/// A transform from one flow graph to another.
///
/// Passes are pure: they never mutate their input and read analyses only through the
/// graph (or the builder they stage edits in), so results computed for the input stay
/// valid and results for the output are derived incrementally.
///
/// A pass that finds nothing to do returns its input, so callers can detect a change
/// with [`FlowGraph::is_same_revision`].
pub trait GraphPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Transforms `graph`.
    ///
    /// # Errors
    ///
    /// Returns an error if a required analysis is unavailable or an edit would break a
    /// graph invariant.
    fn run(&self, graph: &FlowGraph) -> Result<FlowGraph>;
}
