//! Basic block predecessors.

use std::{collections::BTreeSet, sync::Arc};

use rustc_hash::FxHashMap;

use crate::{
    analysis::FlowGraphAnalysis,
    ir::{BasicBlockTag, FlowGraph, FlowGraphUpdate},
    Result,
};

static NO_PREDECESSORS: BTreeSet<BasicBlockTag> = BTreeSet::new();

/// The predecessors of every block in a graph.
///
/// Only blocks of the graph are recorded as branch targets; a branch to a block that no
/// longer exists contributes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlockPredecessors {
    predecessors: FxHashMap<BasicBlockTag, BTreeSet<BasicBlockTag>>,
}

impl BasicBlockPredecessors {
    /// Computes the predecessors of every block in `graph`.
    #[must_use]
    pub fn from_graph(graph: &FlowGraph) -> Self {
        let mut predecessors: FxHashMap<BasicBlockTag, BTreeSet<BasicBlockTag>> = graph
            .basic_block_tags()
            .map(|tag| (tag.clone(), BTreeSet::new()))
            .collect();
        for block in graph.basic_blocks() {
            for target in block.flow().branch_targets() {
                if let Some(set) = predecessors.get_mut(&target) {
                    set.insert(block.tag().clone());
                }
            }
        }
        Self { predecessors }
    }

    /// The predecessors of `block`, in creation order.
    #[must_use]
    pub fn get_predecessors_of(&self, block: &BasicBlockTag) -> &BTreeSet<BasicBlockTag> {
        self.predecessors.get(block).unwrap_or(&NO_PREDECESSORS)
    }

    /// Returns `true` if `predecessor` branches to `block`.
    #[must_use]
    pub fn is_predecessor_of(&self, predecessor: &BasicBlockTag, block: &BasicBlockTag) -> bool {
        self.get_predecessors_of(block).contains(predecessor)
    }

    fn refresh(&mut self, graph: &FlowGraph, block: &BasicBlockTag) {
        for set in self.predecessors.values_mut() {
            set.remove(block);
        }
        if let Some(data) = graph.get_basic_block(block) {
            for target in data.flow().branch_targets() {
                if let Some(set) = self.predecessors.get_mut(&target) {
                    set.insert(block.clone());
                }
            }
        }
    }
}

/// Computes [`BasicBlockPredecessors`].
///
/// Updates that do not touch control flow leave the previous result untouched; block
/// additions, removals and flow changes are patched in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredecessorAnalysis;

impl FlowGraphAnalysis for PredecessorAnalysis {
    type Output = BasicBlockPredecessors;

    fn analyze(&self, graph: &FlowGraph) -> Result<BasicBlockPredecessors> {
        Ok(BasicBlockPredecessors::from_graph(graph))
    }

    fn analyze_with_updates(
        &self,
        graph: &FlowGraph,
        previous: &Arc<BasicBlockPredecessors>,
        updates: &[FlowGraphUpdate],
    ) -> Result<Arc<BasicBlockPredecessors>> {
        if !updates.iter().any(FlowGraphUpdate::affects_control_flow) {
            return Ok(Arc::clone(previous));
        }

        let mut result = (**previous).clone();
        let mut dirty: BTreeSet<BasicBlockTag> = BTreeSet::new();
        for update in updates {
            match update {
                FlowGraphUpdate::AddBlock { tag } => {
                    result.predecessors.entry(tag.clone()).or_default();
                    dirty.insert(tag.clone());
                }
                FlowGraphUpdate::RemoveBlock { tag } => {
                    result.predecessors.remove(tag);
                    for set in result.predecessors.values_mut() {
                        set.remove(tag);
                    }
                    dirty.remove(tag);
                }
                FlowGraphUpdate::SetFlow { block } => {
                    dirty.insert(block.clone());
                }
                _ => {}
            }
        }

        for block in &dirty {
            result.refresh(graph, block);
        }
        Ok(Arc::new(result))
    }
}
