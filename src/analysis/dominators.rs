//! Dominator trees using the Cooper-Harvey-Kennedy algorithm.
//!
//! A block `d` **dominates** a block `n` if every path from the entry point to `n` passes
//! through `d`. The **immediate dominator** of `n` is the unique strict dominator of `n`
//! that every other strict dominator of `n` dominates. Making each block's immediate
//! dominator its parent yields the dominator tree, rooted at the entry point.
//!
//! # Algorithm
//!
//! "A Simple, Fast Dominance Algorithm" (Cooper, Harvey and Kennedy): number the
//! reachable blocks in postorder, then repeatedly sweep them in reverse postorder and set
//! each block's immediate dominator to the nearest common ancestor of its already
//! processed predecessors, until nothing changes. The traversal is iterative, so deep
//! graphs do not exhaust the stack.
//!
//! Blocks that are unreachable from the entry point have no immediate dominator and are
//! dominated only by themselves.

use std::{collections::BTreeSet, sync::Arc};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{predecessors::BasicBlockPredecessors, FlowGraphAnalysis},
    ir::{BasicBlockTag, FlowGraph, FlowGraphUpdate, ValueTag},
    Result,
};

/// Returns the blocks reachable from the entry point in postorder.
pub(crate) fn postorder(graph: &FlowGraph) -> Vec<BasicBlockTag> {
    let entry = graph.entry_point_tag();
    let mut order = Vec::new();
    let mut visited: FxHashSet<BasicBlockTag> = FxHashSet::default();
    let mut stack: Vec<(BasicBlockTag, Vec<BasicBlockTag>, usize)> = Vec::new();

    if let Some(block) = graph.get_basic_block(entry) {
        visited.insert(entry.clone());
        stack.push((entry.clone(), block.flow().branch_targets(), 0));
    }

    while let Some((tag, successors, next)) = stack.last_mut() {
        if let Some(successor) = successors.get(*next).cloned() {
            *next += 1;
            if visited.insert(successor.clone()) {
                if let Some(block) = graph.get_basic_block(&successor) {
                    let targets = block.flow().branch_targets();
                    stack.push((successor, targets, 0));
                }
            }
        } else {
            order.push(tag.clone());
            stack.pop();
        }
    }
    order
}

/// Returns the blocks reachable from the entry point in reverse postorder.
pub(crate) fn reverse_postorder(graph: &FlowGraph) -> Vec<BasicBlockTag> {
    let mut order = postorder(graph);
    order.reverse();
    order
}

/// The dominator tree of a flow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DominatorTree {
    entry: BasicBlockTag,
    idoms: FxHashMap<BasicBlockTag, BasicBlockTag>,
}

impl DominatorTree {
    /// Computes the dominator tree of `graph`.
    #[must_use]
    pub fn compute(graph: &FlowGraph, predecessors: &BasicBlockPredecessors) -> Self {
        let order = postorder(graph);
        let numbers: FxHashMap<&BasicBlockTag, usize> =
            order.iter().enumerate().map(|(index, tag)| (tag, index)).collect();
        let entry = graph.entry_point_tag().clone();

        // The entry temporarily dominates itself so that intersection terminates.
        let mut idoms: FxHashMap<BasicBlockTag, BasicBlockTag> = FxHashMap::default();
        idoms.insert(entry.clone(), entry.clone());

        let intersect = |idoms: &FxHashMap<BasicBlockTag, BasicBlockTag>,
                         mut first: BasicBlockTag,
                         mut second: BasicBlockTag| {
            while first != second {
                while numbers[&first] < numbers[&second] {
                    first = idoms[&first].clone();
                }
                while numbers[&second] < numbers[&first] {
                    second = idoms[&second].clone();
                }
            }
            first
        };

        let mut changed = true;
        while changed {
            changed = false;
            for block in order.iter().rev() {
                if block == &entry {
                    continue;
                }
                let mut new_idom: Option<BasicBlockTag> = None;
                for pred in predecessors.get_predecessors_of(block) {
                    if !idoms.contains_key(pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred.clone(),
                        Some(current) => intersect(&idoms, pred.clone(), current),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idoms.get(block) != Some(&new_idom) {
                        idoms.insert(block.clone(), new_idom);
                        changed = true;
                    }
                }
            }
        }

        idoms.remove(&entry);
        Self { entry, idoms }
    }

    /// The entry point the tree is rooted at.
    #[must_use]
    pub fn entry(&self) -> &BasicBlockTag {
        &self.entry
    }

    /// The immediate dominator of `block`; `None` for the entry point and for
    /// unreachable blocks.
    #[must_use]
    pub fn get_immediate_dominator(&self, block: &BasicBlockTag) -> Option<&BasicBlockTag> {
        self.idoms.get(block)
    }

    /// The blocks whose immediate dominator is `block`, in creation order.
    #[must_use]
    pub fn get_children(&self, block: &BasicBlockTag) -> BTreeSet<BasicBlockTag> {
        self.idoms
            .iter()
            .filter(|(_, idom)| *idom == block)
            .map(|(child, _)| child.clone())
            .collect()
    }

    /// The dominators of `block`, from `block` itself up to the entry point.
    #[must_use]
    pub fn get_dominator_chain(&self, block: &BasicBlockTag) -> Vec<BasicBlockTag> {
        let mut chain = vec![block.clone()];
        let mut current = block;
        while let Some(idom) = self.idoms.get(current) {
            chain.push(idom.clone());
            current = idom;
        }
        chain
    }

    /// Returns `true` if `dominator` dominates `block`. Every block dominates itself.
    #[must_use]
    pub fn is_dominated_by(&self, block: &BasicBlockTag, dominator: &BasicBlockTag) -> bool {
        let mut current = block;
        loop {
            if current == dominator {
                return true;
            }
            match self.idoms.get(current) {
                Some(idom) => current = idom,
                None => return false,
            }
        }
    }

    /// Returns `true` if `dominator` dominates `block` and is not `block`.
    #[must_use]
    pub fn is_strictly_dominated_by(
        &self,
        block: &BasicBlockTag,
        dominator: &BasicBlockTag,
    ) -> bool {
        block != dominator && self.is_dominated_by(block, dominator)
    }

    /// Returns `true` if the definition of `dominator` dominates the definition of
    /// `value`.
    ///
    /// Within one block, parameters dominate every instruction, and an instruction
    /// dominates the instructions after it. A value dominates itself.
    #[must_use]
    pub fn is_value_dominated_by(
        &self,
        graph: &FlowGraph,
        value: &ValueTag,
        dominator: &ValueTag,
    ) -> bool {
        if value == dominator {
            return true;
        }
        let (Some(value_block), Some(dominator_block)) =
            (graph.get_value_parent(value), graph.get_value_parent(dominator))
        else {
            return false;
        };
        if value_block != dominator_block {
            return self.is_strictly_dominated_by(value_block, dominator_block);
        }
        if graph.contains_parameter(dominator) {
            return true;
        }
        if graph.contains_parameter(value) {
            return false;
        }
        match (graph.get_instruction(value), graph.get_instruction(dominator)) {
            (Some(value), Some(dominator)) => dominator.index() < value.index(),
            _ => false,
        }
    }

    /// Returns `true` if the definition of `dominator` dominates the definition of
    /// `value` and is not the same value.
    #[must_use]
    pub fn is_value_strictly_dominated_by(
        &self,
        graph: &FlowGraph,
        value: &ValueTag,
        dominator: &ValueTag,
    ) -> bool {
        value != dominator && self.is_value_dominated_by(graph, value, dominator)
    }

    /// Returns `true` if the definition of `dominator` dominates the flow of `block`.
    #[must_use]
    pub fn is_flow_dominated_by(
        &self,
        graph: &FlowGraph,
        block: &BasicBlockTag,
        dominator: &ValueTag,
    ) -> bool {
        graph
            .get_value_parent(dominator)
            .is_some_and(|parent| self.is_dominated_by(block, parent))
    }

    /// Finds the deepest block that dominates every block in `blocks`.
    ///
    /// Returns `None` if `blocks` is empty or the blocks share no dominator, which
    /// happens when one of them is unreachable.
    #[must_use]
    pub fn try_find_common_dominator<'a>(
        &self,
        blocks: impl IntoIterator<Item = &'a BasicBlockTag>,
    ) -> Option<BasicBlockTag> {
        let chains: Vec<Vec<BasicBlockTag>> = blocks
            .into_iter()
            .map(|block| {
                let mut chain = self.get_dominator_chain(block);
                chain.reverse();
                chain
            })
            .collect();
        let shortest = chains.iter().map(Vec::len).min()?;

        let mut common = None;
        for position in 0..shortest {
            let candidate = &chains[0][position];
            if chains.iter().all(|chain| &chain[position] == candidate) {
                common = Some(candidate.clone());
            } else {
                break;
            }
        }
        common
    }
}

/// Computes the [`DominatorTree`].
///
/// Only updates that change the block structure (added or removed blocks, new flows, a
/// new entry point) invalidate the tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct DominatorTreeAnalysis;

impl FlowGraphAnalysis for DominatorTreeAnalysis {
    type Output = DominatorTree;

    fn analyze(&self, graph: &FlowGraph) -> Result<DominatorTree> {
        let predecessors = graph.get_analysis_result::<BasicBlockPredecessors>()?;
        Ok(DominatorTree::compute(graph, &predecessors))
    }

    fn analyze_with_updates(
        &self,
        graph: &FlowGraph,
        previous: &Arc<DominatorTree>,
        updates: &[FlowGraphUpdate],
    ) -> Result<Arc<DominatorTree>> {
        if updates.iter().any(FlowGraphUpdate::affects_control_flow) {
            Ok(Arc::new(self.analyze(graph)?))
        } else {
            Ok(Arc::clone(previous))
        }
    }
}
