//! Block-level worklist fixpoint solver.
//!
//! # Algorithm
//!
//! 1. Seed the entry block's input with [`BlockFixpointAnalysis::create_entry_input`]
//! 2. Pop a block from the worklist and [`process`](BlockFixpointAnalysis::process) it
//! 3. Hand the output to every successor; a successor that has seen an input before
//!    gets the [`merge`](BlockFixpointAnalysis::merge) of both
//! 4. Re-enqueue successors whose input changed, until the worklist is empty
//!
//! Termination requires block states to form a finite-height lattice under `merge`, and
//! `process` and `merge` to be monotone. Blocks that are never reached get no state.

use std::{collections::VecDeque, sync::Arc};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::FlowGraphAnalysis,
    ir::{BasicBlock, BasicBlockTag, FlowGraph, FlowGraphUpdate},
    Result,
};

/// A forward dataflow problem over whole blocks.
pub trait BlockFixpointAnalysis: Send + Sync + 'static {
    /// The per-block state.
    type State: Clone + PartialEq + Send + Sync + 'static;

    /// The input of the entry block.
    fn create_entry_input(&self, graph: &FlowGraph) -> Self::State;

    /// Computes a block's output from its input.
    ///
    /// # Errors
    ///
    /// Implementations report malformed graphs or failed dependent lookups.
    fn process(&self, block: &BasicBlock<'_>, input: &Self::State) -> Result<Self::State>;

    /// Combines two inputs that reach the same block.
    fn merge(&self, first: &Self::State, second: &Self::State) -> Self::State;

    /// The inputs a block's output contributes to its successors. Every branch target
    /// receives the output unchanged by default.
    fn outgoing_inputs(
        &self,
        block: &BasicBlock<'_>,
        output: &Self::State,
    ) -> Vec<(BasicBlockTag, Self::State)> {
        block
            .flow()
            .branch_targets()
            .into_iter()
            .map(|target| (target, output.clone()))
            .collect()
    }
}

/// The fixpoint: each reached block's final input and output.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockFixpointResults<S> {
    inputs: FxHashMap<BasicBlockTag, S>,
    outputs: FxHashMap<BasicBlockTag, S>,
}

impl<S> BlockFixpointResults<S> {
    /// The input state of `block`, if the analysis reached it.
    #[must_use]
    pub fn get_input(&self, block: &BasicBlockTag) -> Option<&S> {
        self.inputs.get(block)
    }

    /// The output state of `block`, if the analysis reached it.
    #[must_use]
    pub fn get_output(&self, block: &BasicBlockTag) -> Option<&S> {
        self.outputs.get(block)
    }

    /// Iterates over the blocks the analysis reached.
    pub fn reached_blocks(&self) -> impl Iterator<Item = &BasicBlockTag> {
        self.inputs.keys()
    }
}

/// Solves `analysis` over `graph`.
///
/// # Errors
///
/// Propagates errors from [`BlockFixpointAnalysis::process`] and reports branches to
/// blocks the graph does not contain.
pub fn solve<A: BlockFixpointAnalysis>(
    analysis: &A,
    graph: &FlowGraph,
) -> Result<BlockFixpointResults<A::State>> {
    let entry = graph.entry_point_tag().clone();
    let mut inputs: FxHashMap<BasicBlockTag, A::State> = FxHashMap::default();
    let mut outputs: FxHashMap<BasicBlockTag, A::State> = FxHashMap::default();
    inputs.insert(entry.clone(), analysis.create_entry_input(graph));

    let mut worklist = VecDeque::from([entry.clone()]);
    let mut queued: FxHashSet<BasicBlockTag> = FxHashSet::from_iter([entry]);
    let mut iterations = 0usize;

    while let Some(tag) = worklist.pop_front() {
        queued.remove(&tag);
        iterations += 1;

        let block = graph.basic_block(&tag)?;
        let Some(input) = inputs.get(&tag) else {
            continue;
        };
        let output = analysis.process(&block, input)?;

        for (target, contribution) in analysis.outgoing_inputs(&block, &output) {
            let merged = match inputs.get(&target) {
                Some(existing) => {
                    let merged = analysis.merge(existing, &contribution);
                    if &merged == existing {
                        continue;
                    }
                    merged
                }
                None => contribution,
            };
            inputs.insert(target.clone(), merged);
            if queued.insert(target.clone()) {
                worklist.push_back(target);
            }
        }
        outputs.insert(tag, output);
    }

    tracing::trace!(iterations, blocks = inputs.len(), "block fixpoint converged");
    Ok(BlockFixpointResults { inputs, outputs })
}

/// Runs a [`BlockFixpointAnalysis`] as a [`FlowGraphAnalysis`], so that its results are
/// cached like any other analysis.
pub struct BlockFixpoint<A> {
    analysis: A,
}

impl<A: BlockFixpointAnalysis> BlockFixpoint<A> {
    /// Wraps `analysis`.
    pub fn new(analysis: A) -> Self {
        Self { analysis }
    }
}

impl<A: BlockFixpointAnalysis> FlowGraphAnalysis for BlockFixpoint<A> {
    type Output = BlockFixpointResults<A::State>;

    fn analyze(&self, graph: &FlowGraph) -> Result<Self::Output> {
        solve(&self.analysis, graph)
    }
}

/// Shortest branch distance from the entry point: a block fixpoint over `usize` states
/// merged with `min`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryDistance;

impl BlockFixpointAnalysis for EntryDistance {
    type State = usize;

    fn create_entry_input(&self, _graph: &FlowGraph) -> usize {
        0
    }

    fn process(&self, _block: &BasicBlock<'_>, input: &usize) -> Result<usize> {
        Ok(input + 1)
    }

    fn merge(&self, first: &usize, second: &usize) -> usize {
        *first.min(second)
    }
}

/// The blocks reachable from the entry point, with their branch distance from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockReachability {
    distances: FxHashMap<BasicBlockTag, usize>,
}

impl BlockReachability {
    /// Returns `true` if `block` is reachable from the entry point.
    #[must_use]
    pub fn is_reachable(&self, block: &BasicBlockTag) -> bool {
        self.distances.contains_key(block)
    }

    /// The minimal number of branches taken to reach `block` from the entry point.
    #[must_use]
    pub fn get_distance(&self, block: &BasicBlockTag) -> Option<usize> {
        self.distances.get(block).copied()
    }

    /// The number of reachable blocks.
    #[must_use]
    pub fn reachable_count(&self) -> usize {
        self.distances.len()
    }
}

/// Computes [`BlockReachability`] with the [`EntryDistance`] fixpoint. Only updates
/// that change control flow invalidate it.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockReachabilityAnalysis;

impl FlowGraphAnalysis for BlockReachabilityAnalysis {
    type Output = BlockReachability;

    fn analyze(&self, graph: &FlowGraph) -> Result<BlockReachability> {
        let results = solve(&EntryDistance, graph)?;
        Ok(BlockReachability {
            distances: results.inputs,
        })
    }

    fn analyze_with_updates(
        &self,
        graph: &FlowGraph,
        previous: &Arc<BlockReachability>,
        updates: &[FlowGraphUpdate],
    ) -> Result<Arc<BlockReachability>> {
        if updates.iter().any(FlowGraphUpdate::affects_control_flow) {
            Ok(Arc::new(self.analyze(graph)?))
        } else {
            Ok(Arc::clone(previous))
        }
    }
}

impl<A> std::fmt::Debug for BlockFixpoint<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockFixpoint").finish_non_exhaustive()
    }
}
