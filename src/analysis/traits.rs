//! The analysis contract.
//!
//! An analysis turns a [`FlowGraph`] into a result. Results are memoized per graph
//! revision by the graph's analysis cache, keyed by the result type, so a pass never
//! computes or stores analysis results itself: it asks the graph.
//!
//! Every analysis must satisfy one law: re-analyzing a graph incrementally from a previous
//! result and the update log that separates the two revisions yields a result equal to
//! analyzing the new graph from scratch. The default [`FlowGraphAnalysis::analyze_with_updates`]
//! satisfies it trivially by starting over.

use std::sync::Arc;

use crate::{
    analysis::cache::ResultAlias,
    ir::{FlowGraph, FlowGraphUpdate},
    Result,
};

/// A pluggable analysis over flow graphs.
///
/// # Examples
///
/// ```rust
/// use flowir::{analysis::FlowGraphAnalysis, ir::FlowGraph, Result};
///
/// /// Counts the blocks of a graph.
/// struct BlockCount;
///
/// impl FlowGraphAnalysis for BlockCount {
///     type Output = usize;
///
///     fn analyze(&self, graph: &FlowGraph) -> Result<usize> {
///         Ok(graph.basic_block_tags().count())
///     }
/// }
///
/// let graph = FlowGraph::new().with_analysis(BlockCount).unwrap();
/// assert_eq!(*graph.get_analysis_result::<usize>().unwrap(), 1);
/// ```
pub trait FlowGraphAnalysis: Send + Sync + 'static {
    /// The result type; also the key under which the result is cached.
    type Output: Send + Sync + 'static;

    /// Analyzes a graph from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependent analysis is unavailable or the graph is malformed.
    fn analyze(&self, graph: &FlowGraph) -> Result<Self::Output>;

    /// Re-analyzes a graph given the result for an earlier revision and the updates,
    /// oldest first, that took the earlier revision to `graph`.
    ///
    /// Implementations return `previous` unchanged when no update can affect the result,
    /// patch it when they can, and fall back to [`FlowGraphAnalysis::analyze`] otherwise.
    ///
    /// # Errors
    ///
    /// Same as [`FlowGraphAnalysis::analyze`].
    fn analyze_with_updates(
        &self,
        graph: &FlowGraph,
        previous: &Arc<Self::Output>,
        updates: &[FlowGraphUpdate],
    ) -> Result<Arc<Self::Output>> {
        let _ = (previous, updates);
        Ok(Arc::new(self.analyze(graph)?))
    }

    /// Extra result keys this analysis answers, each with a projection from its output.
    ///
    /// A request for an alias key is served from the same cache slot as the primary
    /// result.
    fn aliases(&self) -> Vec<ResultAlias<Self::Output>> {
        Vec::new()
    }
}

/// An analysis whose result is a fixed value, independent of the graph.
///
/// Used to install policies (exception delayability, prototype specification rules) as
/// ordinary analysis results so that other analyses can depend on them.
#[derive(Debug, Clone)]
pub struct ConstantAnalysis<T> {
    value: Arc<T>,
}

impl<T> ConstantAnalysis<T> {
    /// Creates a constant analysis producing `value`.
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> FlowGraphAnalysis for ConstantAnalysis<T> {
    type Output = T;

    fn analyze(&self, _graph: &FlowGraph) -> Result<T> {
        Ok((*self.value).clone())
    }

    fn analyze_with_updates(
        &self,
        _graph: &FlowGraph,
        previous: &Arc<T>,
        _updates: &[FlowGraphUpdate],
    ) -> Result<Arc<T>> {
        Ok(Arc::clone(previous))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Policy(u32);

    #[test]
    fn test_constant_analysis_ignores_graph() {
        let graph = FlowGraph::new()
            .with_analysis(ConstantAnalysis::new(Policy(7)))
            .unwrap();
        assert_eq!(*graph.get_analysis_result::<Policy>().unwrap(), Policy(7));

        let mut builder = graph.to_builder();
        builder.add_basic_block("other").unwrap();
        let derived = builder.build();
        assert_eq!(*derived.get_analysis_result::<Policy>().unwrap(), Policy(7));
    }
}
