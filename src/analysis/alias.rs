//! Pointer aliasing.

use rustc_hash::FxHashSet;

use crate::{
    analysis::FlowGraphAnalysis,
    ir::{FlowGraph, ValueTag},
    Result,
};

/// How two pointers relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aliasing {
    /// The pointers never refer to the same memory.
    NoAlias,
    /// The pointers may or may not refer to the same memory.
    MayAlias,
    /// The pointers always refer to the same memory.
    MustAlias,
}

/// Aliasing facts about the pointers of a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasAnalysisResult {
    allocas: FxHashSet<ValueTag>,
}

impl AliasAnalysisResult {
    /// How `first` and `second` relate.
    ///
    /// A pointer must-aliases itself, two distinct stack slots never alias, and nothing
    /// is known about any other pair.
    #[must_use]
    pub fn get_aliasing(&self, first: &ValueTag, second: &ValueTag) -> Aliasing {
        if first == second {
            Aliasing::MustAlias
        } else if self.allocas.contains(first) && self.allocas.contains(second) {
            Aliasing::NoAlias
        } else {
            Aliasing::MayAlias
        }
    }
}

/// Computes an [`AliasAnalysisResult`] that only distinguishes stack slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrivialAliasAnalysis;

impl FlowGraphAnalysis for TrivialAliasAnalysis {
    type Output = AliasAnalysisResult;

    fn analyze(&self, graph: &FlowGraph) -> Result<AliasAnalysisResult> {
        let allocas = graph
            .named_instructions()
            .into_iter()
            .filter(|insn| insn.prototype().is_alloca())
            .map(|insn| insn.tag().clone())
            .collect();
        Ok(AliasAnalysisResult { allocas })
    }
}
