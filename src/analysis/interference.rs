//! Interference between values: two values interfere if they are live at the same time
//! somewhere in the graph.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::{
    analysis::{liveness::ValueLiveness, FlowGraphAnalysis},
    ir::{FlowGraph, ValueTag},
    Result,
};

static NO_VALUES: BTreeSet<ValueTag> = BTreeSet::new();

/// A symmetric interference relation between values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterferenceGraph {
    neighbors: FxHashMap<ValueTag, BTreeSet<ValueTag>>,
}

impl InterferenceGraph {
    /// Returns `true` if `first` and `second` are live at the same time.
    #[must_use]
    pub fn interferes(&self, first: &ValueTag, second: &ValueTag) -> bool {
        self.get_interfering_values(first).contains(second)
    }

    /// The values that interfere with `value`.
    #[must_use]
    pub fn get_interfering_values(&self, value: &ValueTag) -> &BTreeSet<ValueTag> {
        self.neighbors.get(value).unwrap_or(&NO_VALUES)
    }

    fn add_edge(&mut self, first: &ValueTag, second: &ValueTag) {
        self.neighbors
            .entry(first.clone())
            .or_default()
            .insert(second.clone());
        self.neighbors
            .entry(second.clone())
            .or_default()
            .insert(first.clone());
    }
}

/// Builds the [`InterferenceGraph`] from [`ValueLiveness`]: in every block, two values
/// interfere when their half-open live ranges overlap.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterferenceGraphAnalysis;

impl FlowGraphAnalysis for InterferenceGraphAnalysis {
    type Output = InterferenceGraph;

    fn analyze(&self, graph: &FlowGraph) -> Result<InterferenceGraph> {
        let liveness = graph.get_analysis_result::<ValueLiveness>()?;
        let mut result = InterferenceGraph::default();
        for (_, block) in liveness.blocks() {
            let mut ranges: Vec<(&ValueTag, (isize, isize))> = block
                .ranges()
                .filter(|(_, (start, end))| start < end)
                .collect();
            ranges.sort_by_key(|&(value, (start, _))| (start, value.id()));
            for (index, &(first, (_, first_end))) in ranges.iter().enumerate() {
                for &(second, (second_start, _)) in &ranges[index + 1..] {
                    if second_start >= first_end {
                        break;
                    }
                    result.add_edge(first, second);
                }
            }
        }
        Ok(result)
    }
}
