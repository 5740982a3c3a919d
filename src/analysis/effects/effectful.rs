//! The set of named instructions whose execution is observable beyond their result.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::{
    analysis::{
        effects::{
            delayability::ExceptionDelayability,
            instruction_specs::InstructionExceptionSpecs,
            specs::PrototypeMemorySpecs,
        },
        FlowGraphAnalysis,
    },
    ir::{FlowGraph, FlowGraphUpdate, Instruction, ValueTag},
    Result,
};

/// Named instructions that may write memory, or may throw an exception that cannot be
/// delayed. Removing or reordering them changes program behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectfulInstructions {
    instructions: FxHashSet<ValueTag>,
}

impl EffectfulInstructions {
    /// Returns `true` if the instruction behind `tag` is effectful.
    #[must_use]
    pub fn contains(&self, tag: &ValueTag) -> bool {
        self.instructions.contains(tag)
    }

    /// The effectful instructions.
    #[must_use]
    pub fn instructions(&self) -> &FxHashSet<ValueTag> {
        &self.instructions
    }

    /// The number of effectful instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if no instruction is effectful.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Computes [`EffectfulInstructions`].
///
/// The effect set sits on top of two independent layers: the memory and exception
/// specifications of instructions, and the [`ExceptionDelayability`] policy. Throwing
/// instructions are effectful only when the policy refuses to delay their exceptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectfulInstructionAnalysis;

struct EffectOracle {
    memory: Arc<PrototypeMemorySpecs>,
    exceptions: Arc<InstructionExceptionSpecs>,
    delayability: Arc<ExceptionDelayability>,
}

impl EffectOracle {
    fn new(graph: &FlowGraph) -> Result<Self> {
        Ok(Self {
            memory: graph.get_analysis_result::<PrototypeMemorySpecs>()?,
            exceptions: graph.get_analysis_result::<InstructionExceptionSpecs>()?,
            delayability: graph.get_analysis_result::<ExceptionDelayability>()?,
        })
    }

    fn is_effectful(&self, instruction: &Instruction) -> bool {
        let prototype = instruction.prototype();
        if self.memory.get_memory_specification(prototype).may_write() {
            return true;
        }
        self.exceptions
            .get_exception_specification(instruction)
            .can_throw_something()
            && !self.delayability.can_delay_exceptions(prototype)
    }
}

impl FlowGraphAnalysis for EffectfulInstructionAnalysis {
    type Output = EffectfulInstructions;

    fn analyze(&self, graph: &FlowGraph) -> Result<EffectfulInstructions> {
        let oracle = EffectOracle::new(graph)?;
        let instructions = graph
            .named_instructions()
            .into_iter()
            .filter(|insn| oracle.is_effectful(insn.instruction()))
            .map(|insn| insn.tag().clone())
            .collect();
        Ok(EffectfulInstructions { instructions })
    }

    fn analyze_with_updates(
        &self,
        graph: &FlowGraph,
        previous: &Arc<EffectfulInstructions>,
        updates: &[FlowGraphUpdate],
    ) -> Result<Arc<EffectfulInstructions>> {
        let mut result = (**previous).clone();
        for update in updates {
            match update {
                FlowGraphUpdate::SetFlow { .. }
                | FlowGraphUpdate::AddBlock { .. }
                | FlowGraphUpdate::SetEntryPoint { .. } => {}
                FlowGraphUpdate::RemoveInstruction { tag } => {
                    result.instructions.remove(tag);
                }
                _ => return Ok(Arc::new(self.analyze(graph)?)),
            }
        }
        Ok(Arc::new(result))
    }
}
