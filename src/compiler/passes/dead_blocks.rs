//! Dead block elimination.
//!
//! Removes every block the entry point cannot reach through any branch. Reachability
//! comes from [`BlockReachability`]; unreachable blocks only ever branch to each other or
//! to reachable blocks, so removing them together never leaves a dangling branch.

use crate::{
    analysis::BlockReachability,
    compiler::pass::GraphPass,
    ir::{BasicBlockTag, FlowGraph},
    Result,
};

/// Removes blocks that are unreachable from the entry point.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadBlockEliminationPass;

impl DeadBlockEliminationPass {
    /// Creates a new dead block elimination pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GraphPass for DeadBlockEliminationPass {
    fn name(&self) -> &'static str {
        "dead-block-elimination"
    }

    fn description(&self) -> &'static str {
        "Removes basic blocks that are unreachable from the entry point"
    }

    fn run(&self, graph: &FlowGraph) -> Result<FlowGraph> {
        let reachability = graph.get_analysis_result::<BlockReachability>()?;
        let dead: Vec<BasicBlockTag> = graph
            .basic_block_tags()
            .filter(|tag| !reachability.is_reachable(tag))
            .cloned()
            .collect();
        if dead.is_empty() {
            return Ok(graph.clone());
        }

        let mut builder = graph.to_builder();
        for tag in &dead {
            builder.remove_basic_block(tag)?;
        }
        tracing::debug!(pass = self.name(), removed = dead.len(), "removed dead blocks");
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockFlow, Branch, Constant, Instruction, Type};

    #[test]
    fn test_unreachable_cycle_is_removed() {
        let int = Type::int32();
        let mut builder = FlowGraph::new().to_builder();
        let entry = builder.entry_point_tag().clone();
        let live = builder.add_basic_block("live").unwrap();
        let first = builder.add_basic_block("first").unwrap();
        let second = builder.add_basic_block("second").unwrap();

        builder.set_flow(&entry, BlockFlow::jump(live.clone())).unwrap();
        builder
            .set_flow(&live, BlockFlow::Return(Instruction::default_constant(int.clone())))
            .unwrap();
        let value = builder
            .append_instruction(&first, Instruction::constant(Constant::i32(3), int.clone()), "value")
            .unwrap();
        builder
            .set_flow(&first, BlockFlow::Jump(Branch::with_values(second.clone(), vec![value.clone()])))
            .unwrap();
        builder.append_parameter(&second, int, "p").unwrap();
        builder.set_flow(&second, BlockFlow::jump(first.clone())).unwrap();
        let graph = builder.build();

        let optimized = DeadBlockEliminationPass::new().run(&graph).unwrap();
        assert_eq!(optimized.block_count(), 2);
        assert!(optimized.contains_basic_block(&live));
        assert!(!optimized.contains_basic_block(&first));
        assert!(!optimized.contains_basic_block(&second));
        assert!(!optimized.contains_value(&value));
        optimized.validate().unwrap();

        let again = DeadBlockEliminationPass::new().run(&optimized).unwrap();
        assert!(again.is_same_revision(&optimized));
    }
}
