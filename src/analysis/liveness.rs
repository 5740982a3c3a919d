//! Value liveness: which values each block imports and exports, and the range of
//! positions inside the block over which each value is live.
//!
//! # Positions
//!
//! Positions inside a block with `n` named instructions are numbered as follows:
//!
//! | Position | Meaning |
//! |----------|---------|
//! | [`BlockLiveness::IMPORT`] | the value flows in from a predecessor |
//! | [`BlockLiveness::PARAMETER`] | the block's parameters are defined |
//! | `0..n` | the named instruction at that index |
//! | `n` | the block's flow |
//! | `n + 1` | the value flows out to a successor |
//!
//! A live range `[start, end)` starts at the value's definition (or at the import
//! position) and ends at its last use (or at the export position).
//!
//! # Algorithm
//!
//! Standard backward dataflow: a block's exports are the union of its successors'
//! imports, and its imports are its upward-exposed uses plus the exports it does not
//! define. Branch arguments count as uses by the branching block's flow; a block's
//! parameters count as definitions of that block, so phi operands are never live into
//! the block that declares the parameter.

use std::collections::{BTreeSet, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{predecessors::BasicBlockPredecessors, FlowGraphAnalysis},
    ir::{BasicBlock, BasicBlockTag, FlowGraph, ValueTag},
    Result,
};

/// Liveness facts for a single block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockLiveness {
    ranges: FxHashMap<ValueTag, (isize, isize)>,
    imports: BTreeSet<ValueTag>,
    exports: BTreeSet<ValueTag>,
}

impl BlockLiveness {
    /// Position at which imported values become live.
    pub const IMPORT: isize = -2;
    /// Position at which block parameters are defined.
    pub const PARAMETER: isize = -1;

    /// Values live on entry to the block that the block does not define.
    #[must_use]
    pub fn imports(&self) -> &BTreeSet<ValueTag> {
        &self.imports
    }

    /// Values live on exit from the block.
    #[must_use]
    pub fn exports(&self) -> &BTreeSet<ValueTag> {
        &self.exports
    }

    /// The half-open range `[start, end)` over which `value` is live in this block.
    ///
    /// Values defined in the block but never used have an empty range at their
    /// definition.
    #[must_use]
    pub fn get_live_range(&self, value: &ValueTag) -> Option<(isize, isize)> {
        self.ranges.get(value).copied()
    }

    /// Iterates over every value with a range in this block.
    pub fn ranges(&self) -> impl Iterator<Item = (&ValueTag, (isize, isize))> {
        self.ranges.iter().map(|(value, range)| (value, *range))
    }

    /// Returns `true` if `value` is live immediately before `position`.
    #[must_use]
    pub fn is_live_at(&self, value: &ValueTag, position: isize) -> bool {
        self.ranges
            .get(value)
            .is_some_and(|&(start, end)| start < position && position <= end)
    }
}

/// Liveness facts for every block of a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueLiveness {
    blocks: FxHashMap<BasicBlockTag, BlockLiveness>,
}

impl ValueLiveness {
    /// The liveness facts of `block`, if the graph has such a block.
    #[must_use]
    pub fn get_block(&self, block: &BasicBlockTag) -> Option<&BlockLiveness> {
        self.blocks.get(block)
    }

    /// Iterates over all blocks' liveness facts.
    pub fn blocks(&self) -> impl Iterator<Item = (&BasicBlockTag, &BlockLiveness)> {
        self.blocks.iter()
    }

    /// Returns `true` if `value` is live on entry to `block`.
    #[must_use]
    pub fn is_imported(&self, block: &BasicBlockTag, value: &ValueTag) -> bool {
        self.blocks
            .get(block)
            .is_some_and(|liveness| liveness.imports.contains(value))
    }

    /// Returns `true` if `value` is live on exit from `block`.
    #[must_use]
    pub fn is_exported(&self, block: &BasicBlockTag, value: &ValueTag) -> bool {
        self.blocks
            .get(block)
            .is_some_and(|liveness| liveness.exports.contains(value))
    }
}

struct LocalFacts {
    upward_exposed: FxHashSet<ValueTag>,
    defined: FxHashSet<ValueTag>,
}

fn local_facts(block: &BasicBlock<'_>) -> LocalFacts {
    let mut defined: FxHashSet<ValueTag> = block.parameter_tags().cloned().collect();
    let mut upward_exposed = FxHashSet::default();
    for insn in block.named_instructions() {
        for arg in insn.arguments() {
            if !defined.contains(arg) {
                upward_exposed.insert(arg.clone());
            }
        }
        defined.insert(insn.tag().clone());
    }
    for value in block.flow().used_values() {
        if !defined.contains(&value) {
            upward_exposed.insert(value);
        }
    }
    LocalFacts {
        upward_exposed,
        defined,
    }
}

fn block_ranges(
    block: &BasicBlock<'_>,
    imports: BTreeSet<ValueTag>,
    exports: BTreeSet<ValueTag>,
) -> BlockLiveness {
    let instructions = block.named_instructions();
    let flow_position = instructions.len() as isize;
    let export_position = flow_position + 1;

    let mut ranges: FxHashMap<ValueTag, (isize, isize)> = FxHashMap::default();
    for value in &imports {
        ranges.insert(value.clone(), (BlockLiveness::IMPORT, BlockLiveness::IMPORT));
    }
    for param in block.parameter_tags() {
        ranges.insert(
            param.clone(),
            (BlockLiveness::PARAMETER, BlockLiveness::PARAMETER),
        );
    }

    for (index, insn) in instructions.iter().enumerate() {
        let position = index as isize;
        for arg in insn.arguments() {
            if let Some(range) = ranges.get_mut(arg) {
                range.1 = range.1.max(position);
            }
        }
        ranges.insert(insn.tag().clone(), (position, position));
    }
    for value in block.flow().used_values() {
        if let Some(range) = ranges.get_mut(&value) {
            range.1 = range.1.max(flow_position);
        }
    }
    for value in &exports {
        if let Some(range) = ranges.get_mut(value) {
            range.1 = export_position;
        }
    }

    BlockLiveness {
        ranges,
        imports,
        exports,
    }
}

/// Computes [`ValueLiveness`] with a backward worklist over the blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct LivenessAnalysis;

impl FlowGraphAnalysis for LivenessAnalysis {
    type Output = ValueLiveness;

    fn analyze(&self, graph: &FlowGraph) -> Result<ValueLiveness> {
        let predecessors = graph.get_analysis_result::<BasicBlockPredecessors>()?;

        let facts: FxHashMap<BasicBlockTag, LocalFacts> = graph
            .basic_blocks()
            .map(|block| (block.tag().clone(), local_facts(&block)))
            .collect();
        let mut imports: FxHashMap<BasicBlockTag, BTreeSet<ValueTag>> = FxHashMap::default();
        let mut exports: FxHashMap<BasicBlockTag, BTreeSet<ValueTag>> = FxHashMap::default();

        let mut worklist: VecDeque<BasicBlockTag> = graph.basic_block_tags().cloned().collect();
        let mut queued: FxHashSet<BasicBlockTag> = worklist.iter().cloned().collect();
        while let Some(tag) = worklist.pop_front() {
            queued.remove(&tag);
            let block = graph.basic_block(&tag)?;

            let mut live_out = BTreeSet::new();
            for successor in block.flow().branch_targets() {
                if let Some(live_in) = imports.get(&successor) {
                    live_out.extend(live_in.iter().cloned());
                }
            }

            let local = &facts[&tag];
            let mut live_in: BTreeSet<ValueTag> = local.upward_exposed.iter().cloned().collect();
            live_in.extend(
                live_out
                    .iter()
                    .filter(|value| !local.defined.contains(*value))
                    .cloned(),
            );
            exports.insert(tag.clone(), live_out);

            if imports.get(&tag) != Some(&live_in) {
                imports.insert(tag.clone(), live_in);
                for pred in predecessors.get_predecessors_of(&tag) {
                    if queued.insert(pred.clone()) {
                        worklist.push_back(pred.clone());
                    }
                }
            }
        }

        let mut blocks = FxHashMap::default();
        for block in graph.basic_blocks() {
            let tag = block.tag();
            let block_imports = imports.remove(tag).unwrap_or_default();
            let block_exports = exports.remove(tag).unwrap_or_default();
            blocks.insert(tag.clone(), block_ranges(&block, block_imports, block_exports));
        }
        Ok(ValueLiveness { blocks })
    }
}
