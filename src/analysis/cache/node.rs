//! The per-analysis cache node.
//!
//! A node either holds a materialized result or a link to the node it was derived from
//! together with the single update that separates the two. Requesting a result walks the
//! parent chain, collecting updates, until it reaches a materialized ancestor (incremental
//! re-analysis) or the root of the chain (analysis from scratch). Once materialized, a
//! node forgets its parent so chains never outlive the results they lead to.

use std::{
    any::type_name,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::trace;

use crate::{
    analysis::{
        cache::key::{AnyResult, ResultKey},
        traits::FlowGraphAnalysis,
    },
    ir::{FlowGraph, FlowGraphUpdate},
    Error, Result,
};

/// Type-erased interface of a cache node, as stored in the macro cache's slot table.
pub(crate) trait CacheSlot: Send + Sync {
    /// Every key this slot answers: the primary result key first, then aliases.
    fn keys(&self) -> Vec<ResultKey>;

    /// The key of the primary result.
    fn primary_key(&self) -> ResultKey;

    /// Derives the node for the next graph revision. Never runs the analysis.
    fn derive(self: Arc<Self>, update: &FlowGraphUpdate) -> Result<Arc<dyn CacheSlot>>;

    /// Produces the value for `key`, materializing the result if needed.
    fn result_for(&self, key: ResultKey, graph: &FlowGraph) -> Result<AnyResult>;
}

struct NodeState<A: FlowGraphAnalysis> {
    result: Option<Arc<A::Output>>,
    parent: Option<Arc<AnalysisCacheNode<A>>>,
    update: Option<FlowGraphUpdate>,
}

impl<A: FlowGraphAnalysis> Drop for NodeState<A> {
    // Unlinks the chain of unmaterialized ancestors one node at a time; a long edit
    // sequence would otherwise be freed through nested drops.
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(parent) = next {
            next = match Arc::try_unwrap(parent) {
                Ok(node) => node
                    .state
                    .into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .parent
                    .take(),
                Err(_) => None,
            };
        }
    }
}

/// Lazily materialized, thread-safe cache for a single analysis.
pub(crate) struct AnalysisCacheNode<A: FlowGraphAnalysis> {
    analysis: Arc<A>,
    state: RwLock<NodeState<A>>,
}

impl<A: FlowGraphAnalysis> AnalysisCacheNode<A> {
    /// Creates an empty root node.
    pub(crate) fn new(analysis: Arc<A>) -> Self {
        Self {
            analysis,
            state: RwLock::new(NodeState {
                result: None,
                parent: None,
                update: None,
            }),
        }
    }

    fn derived(self: &Arc<Self>, update: &FlowGraphUpdate) -> Result<Self> {
        let link = {
            let state = read_lock!(self.state)?;
            // A root that was never materialized gives nothing to replay against.
            state.result.is_some() || state.parent.is_some()
        };

        let (parent, update) = if link {
            (Some(Arc::clone(self)), Some(update.clone()))
        } else {
            (None, None)
        };

        Ok(Self {
            analysis: Arc::clone(&self.analysis),
            state: RwLock::new(NodeState {
                result: None,
                parent,
                update,
            }),
        })
    }

    /// Returns the result for `graph`, computing it at most once per node.
    pub(crate) fn get_result(&self, graph: &FlowGraph) -> Result<Arc<A::Output>> {
        if let Some(result) = &read_lock!(self.state)?.result {
            return Ok(Arc::clone(result));
        }

        let mut state = write_lock!(self.state)?;
        if let Some(result) = &state.result {
            return Ok(Arc::clone(result));
        }

        let result = self.compute(&state, graph)?;
        state.result = Some(Arc::clone(&result));
        state.parent = None;
        state.update = None;
        Ok(result)
    }

    fn compute(&self, state: &NodeState<A>, graph: &FlowGraph) -> Result<Arc<A::Output>> {
        let mut updates = Vec::new();
        let mut ancestor_result = None;

        if let (Some(parent), Some(update)) = (&state.parent, &state.update) {
            updates.push(update.clone());
            let mut current = Arc::clone(parent);
            loop {
                let (result, next) = {
                    let ancestor = read_lock!(current.state)?;
                    let next = match (&ancestor.parent, &ancestor.update) {
                        (Some(parent), Some(update)) => Some((Arc::clone(parent), update.clone())),
                        _ => None,
                    };
                    (ancestor.result.clone(), next)
                };

                if let Some(result) = result {
                    ancestor_result = Some(result);
                    break;
                }

                match next {
                    Some((parent, update)) => {
                        updates.push(update);
                        current = parent;
                    }
                    None => break,
                }
            }
        }

        match ancestor_result {
            Some(previous) => {
                updates.reverse();
                trace!(
                    analysis = type_name::<A>(),
                    updates = updates.len(),
                    "incremental analysis"
                );
                self.analysis.analyze_with_updates(graph, &previous, &updates)
            }
            None => {
                trace!(analysis = type_name::<A>(), "full analysis");
                Ok(Arc::new(self.analysis.analyze(graph)?))
            }
        }
    }

    #[cfg(test)]
    fn is_materialized(&self) -> bool {
        self.state.read().map(|s| s.result.is_some()).unwrap_or(false)
    }

    #[cfg(test)]
    fn has_parent(&self) -> bool {
        self.state.read().map(|s| s.parent.is_some()).unwrap_or(false)
    }
}

impl<A: FlowGraphAnalysis> CacheSlot for AnalysisCacheNode<A> {
    fn keys(&self) -> Vec<ResultKey> {
        std::iter::once(ResultKey::of::<A::Output>())
            .chain(self.analysis.aliases().iter().map(|alias| alias.key()))
            .collect()
    }

    fn primary_key(&self) -> ResultKey {
        ResultKey::of::<A::Output>()
    }

    fn derive(self: Arc<Self>, update: &FlowGraphUpdate) -> Result<Arc<dyn CacheSlot>> {
        Ok(Arc::new(self.derived(update)?))
    }

    fn result_for(&self, key: ResultKey, graph: &FlowGraph) -> Result<AnyResult> {
        let result = self.get_result(graph)?;
        if key == self.primary_key() {
            return Ok(result as AnyResult);
        }

        self.analysis
            .aliases()
            .iter()
            .find(|alias| alias.key() == key)
            .map(|alias| alias.project(&result))
            .ok_or(Error::AnalysisMismatch {
                expected: key.name(),
                found: type_name::<A::Output>(),
            })
    }
}
