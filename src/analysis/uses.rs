//! Def-use information: which instructions and flows use each value.

use std::{collections::BTreeSet, sync::Arc};

use rustc_hash::FxHashMap;

use crate::{
    analysis::FlowGraphAnalysis,
    ir::{BasicBlockTag, FlowGraph, FlowGraphUpdate, Instruction, ValueTag},
    Result,
};

static NO_INSTRUCTIONS: BTreeSet<ValueTag> = BTreeSet::new();
static NO_BLOCKS: BTreeSet<BasicBlockTag> = BTreeSet::new();

/// The users of every value in a graph.
///
/// Instruction uses are keyed by the using named instruction; flow uses (flow
/// instructions and branch arguments) by the block whose flow uses the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueUses {
    instructions: FxHashMap<ValueTag, BTreeSet<ValueTag>>,
    flows: FxHashMap<ValueTag, BTreeSet<BasicBlockTag>>,
    /// Values used by each instruction, so removal only visits those values.
    instruction_arguments: FxHashMap<ValueTag, Vec<ValueTag>>,
    /// Values used by each block's flow.
    flow_arguments: FxHashMap<BasicBlockTag, Vec<ValueTag>>,
}

impl ValueUses {
    /// Computes the uses of every value in `graph`.
    #[must_use]
    pub fn from_graph(graph: &FlowGraph) -> Self {
        let mut uses = Self::default();
        for block in graph.basic_blocks() {
            for insn in block.named_instructions() {
                uses.add_instruction(insn.tag(), insn.instruction());
            }
            uses.add_flow(graph, block.tag());
        }
        uses
    }

    /// The named instructions that use `value`.
    #[must_use]
    pub fn get_instruction_users(&self, value: &ValueTag) -> &BTreeSet<ValueTag> {
        self.instructions.get(value).unwrap_or(&NO_INSTRUCTIONS)
    }

    /// The blocks whose flow uses `value`.
    #[must_use]
    pub fn get_flow_users(&self, value: &ValueTag) -> &BTreeSet<BasicBlockTag> {
        self.flows.get(value).unwrap_or(&NO_BLOCKS)
    }

    /// Returns `true` if anything uses `value`.
    #[must_use]
    pub fn is_used(&self, value: &ValueTag) -> bool {
        self.instructions.contains_key(value) || self.flows.contains_key(value)
    }

    /// The number of distinct users of `value`.
    #[must_use]
    pub fn use_count(&self, value: &ValueTag) -> usize {
        self.get_instruction_users(value).len() + self.get_flow_users(value).len()
    }

    fn add_instruction(&mut self, tag: &ValueTag, instruction: &Instruction) {
        let arguments = instruction.arguments();
        if arguments.is_empty() {
            return;
        }
        for arg in arguments {
            self.instructions
                .entry(arg.clone())
                .or_default()
                .insert(tag.clone());
        }
        self.instruction_arguments
            .insert(tag.clone(), arguments.to_vec());
    }

    fn remove_instruction(&mut self, tag: &ValueTag) {
        let Some(arguments) = self.instruction_arguments.remove(tag) else {
            return;
        };
        for arg in arguments {
            if let Some(users) = self.instructions.get_mut(&arg) {
                users.remove(tag);
                if users.is_empty() {
                    self.instructions.remove(&arg);
                }
            }
        }
    }

    fn add_flow(&mut self, graph: &FlowGraph, block: &BasicBlockTag) {
        let Some(data) = graph.get_basic_block(block) else {
            return;
        };
        let values = data.flow().used_values();
        if values.is_empty() {
            return;
        }
        for value in &values {
            self.flows
                .entry(value.clone())
                .or_default()
                .insert(block.clone());
        }
        self.flow_arguments.insert(block.clone(), values);
    }

    fn remove_flow(&mut self, block: &BasicBlockTag) {
        let Some(values) = self.flow_arguments.remove(block) else {
            return;
        };
        for value in values {
            if let Some(users) = self.flows.get_mut(&value) {
                users.remove(block);
                if users.is_empty() {
                    self.flows.remove(&value);
                }
            }
        }
    }
}

/// Computes [`ValueUses`], patching the previous result for instruction and flow edits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueUseAnalysis;

impl FlowGraphAnalysis for ValueUseAnalysis {
    type Output = ValueUses;

    fn analyze(&self, graph: &FlowGraph) -> Result<ValueUses> {
        Ok(ValueUses::from_graph(graph))
    }

    fn analyze_with_updates(
        &self,
        graph: &FlowGraph,
        previous: &Arc<ValueUses>,
        updates: &[FlowGraphUpdate],
    ) -> Result<Arc<ValueUses>> {
        if updates
            .iter()
            .any(|update| matches!(update, FlowGraphUpdate::RemoveBlock { .. }))
        {
            return Ok(Arc::new(ValueUses::from_graph(graph)));
        }

        let mut uses = (**previous).clone();
        for update in updates {
            match update {
                FlowGraphUpdate::AddInstruction { tag, instruction } => {
                    uses.add_instruction(tag, instruction);
                }
                FlowGraphUpdate::ReplaceInstruction { tag, instruction } => {
                    uses.remove_instruction(tag);
                    uses.add_instruction(tag, instruction);
                }
                FlowGraphUpdate::RemoveInstruction { tag } => uses.remove_instruction(tag),
                FlowGraphUpdate::SetFlow { block } => {
                    uses.remove_flow(block);
                    uses.add_flow(graph, block);
                }
                FlowGraphUpdate::AddBlock { .. }
                | FlowGraphUpdate::RemoveBlock { .. }
                | FlowGraphUpdate::SetEntryPoint { .. }
                | FlowGraphUpdate::SetParameters { .. }
                | FlowGraphUpdate::RemapMembers { .. } => {}
            }
        }
        Ok(Arc::new(uses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithmeticOp, BlockFlow, Branch, Constant, Type};

    #[test]
    fn test_instruction_and_flow_uses() {
        let mut builder = FlowGraph::new().to_builder();
        let entry = builder.entry_point_tag().clone();
        let exit = builder.add_basic_block("exit").unwrap();
        let param = builder.append_parameter(&exit, Type::int32(), "p").unwrap();
        let one = builder
            .append_instruction(
                &entry,
                Instruction::constant(Constant::i32(1), Type::int32()),
                "one",
            )
            .unwrap();
        let sum = builder
            .append_instruction(
                &entry,
                Instruction::arithmetic(
                    ArithmeticOp::Add,
                    Type::int32(),
                    Type::int32(),
                    vec![one.clone(), one.clone()],
                ),
                "sum",
            )
            .unwrap();
        builder
            .set_flow(
                &entry,
                BlockFlow::Jump(Branch::with_values(exit.clone(), vec![sum.clone()])),
            )
            .unwrap();
        builder
            .set_flow(&exit, BlockFlow::Return(Instruction::copy(Type::int32(), param.clone())))
            .unwrap();
        let graph = builder.build();

        let uses = graph.get_analysis_result::<ValueUses>().unwrap();
        assert_eq!(uses.get_instruction_users(&one).len(), 1);
        assert!(uses.get_instruction_users(&one).contains(&sum));
        assert!(uses.get_flow_users(&sum).contains(&entry));
        assert!(uses.get_flow_users(&param).contains(&exit));
        assert_eq!(uses.use_count(&one), 1);
        assert!(!uses.is_used(&ValueTag::new("unrelated")));
    }

    #[test]
    fn test_incremental_matches_full() {
        let mut builder = FlowGraph::new().to_builder();
        let entry = builder.entry_point_tag().clone();
        let a = builder
            .append_instruction(&entry, Instruction::default_constant(Type::int32()), "a")
            .unwrap();
        let b = builder
            .append_instruction(&entry, Instruction::copy(Type::int32(), a.clone()), "b")
            .unwrap();
        builder
            .set_flow(&entry, BlockFlow::Return(Instruction::copy(Type::int32(), b.clone())))
            .unwrap();
        builder.get_analysis_result::<ValueUses>().unwrap();

        let c = builder
            .append_instruction(&entry, Instruction::copy(Type::int32(), a.clone()), "c")
            .unwrap();
        builder
            .replace_instruction(&b, Instruction::copy(Type::int32(), c.clone()))
            .unwrap();
        builder
            .set_flow(&entry, BlockFlow::Return(Instruction::copy(Type::int32(), c.clone())))
            .unwrap();
        builder.remove_instruction(&b).unwrap();

        let incremental = builder.get_analysis_result::<ValueUses>().unwrap();
        let full = ValueUses::from_graph(builder.graph());
        assert_eq!(*incremental, full);
        assert!(incremental.get_instruction_users(&a).contains(&c));
        assert!(!incremental.is_used(&b));
    }

    #[test]
    fn test_removals_only_touch_used_values() {
        let mut builder = FlowGraph::new().to_builder();
        let entry = builder.entry_point_tag().clone();
        let exit = builder.add_basic_block("exit").unwrap();
        let param = builder.append_parameter(&exit, Type::int32(), "p").unwrap();
        builder
            .set_flow(&exit, BlockFlow::Return(Instruction::copy(Type::int32(), param)))
            .unwrap();
        let seed = builder
            .append_instruction(&entry, Instruction::default_constant(Type::int32()), "seed")
            .unwrap();
        let copies: Vec<ValueTag> = (0..64)
            .map(|_| {
                builder
                    .append_instruction(&entry, Instruction::copy(Type::int32(), seed.clone()), "copy")
                    .unwrap()
            })
            .collect();
        builder
            .set_flow(
                &entry,
                BlockFlow::Jump(Branch::with_values(exit.clone(), vec![copies[0].clone()])),
            )
            .unwrap();
        builder.get_analysis_result::<ValueUses>().unwrap();

        builder
            .set_flow(&entry, BlockFlow::Jump(Branch::with_values(exit, vec![seed.clone()])))
            .unwrap();
        for copy in &copies {
            builder.remove_instruction(copy).unwrap();
        }

        let incremental = builder.get_analysis_result::<ValueUses>().unwrap();
        assert_eq!(*incremental, ValueUses::from_graph(builder.graph()));
        assert!(incremental.get_instruction_users(&seed).is_empty());
        assert!(incremental.get_flow_users(&seed).contains(&entry));
        assert!(!incremental.is_used(&copies[0]));
    }
}
