//! Global value numbering: partitions values into classes that are guaranteed to hold
//! the same value whenever both are defined.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{dominators::reverse_postorder, FlowGraphAnalysis},
    ir::{FlowGraph, Instruction, InstructionPrototype, ValueTag},
    Result,
};

/// Returns `true` if two instructions with this prototype and equivalent arguments
/// always produce the same value.
#[must_use]
pub fn is_copyable(prototype: &InstructionPrototype) -> bool {
    matches!(
        prototype,
        InstructionPrototype::Constant { .. }
            | InstructionPrototype::Copy { .. }
            | InstructionPrototype::ReinterpretCast { .. }
    ) || prototype.as_arithmetic().is_some()
}

/// A value numbering: each value maps to the representative of its class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueNumbering {
    numbers: FxHashMap<ValueTag, ValueTag>,
    expressions: FxHashMap<(InstructionPrototype, Vec<ValueTag>), ValueTag>,
}

impl ValueNumbering {
    /// The representative of `value`'s class. Unknown values are their own class.
    #[must_use]
    pub fn get_number(&self, value: &ValueTag) -> ValueTag {
        self.numbers.get(value).unwrap_or(value).clone()
    }

    /// Returns `true` if `first` and `second` always hold the same value.
    #[must_use]
    pub fn are_equivalent(&self, first: &ValueTag, second: &ValueTag) -> bool {
        self.get_number(first) == self.get_number(second)
    }

    /// The class an (anonymous) instruction would belong to, if its result is already
    /// computed by some value of the graph.
    #[must_use]
    pub fn try_get_number(&self, instruction: &Instruction) -> Option<ValueTag> {
        let prototype = instruction.prototype();
        if !is_copyable(prototype) {
            return None;
        }
        if prototype.is_copy() {
            return instruction.arguments().first().map(|arg| self.get_number(arg));
        }
        self.expressions.get(&self.key(instruction)).cloned()
    }

    /// Returns `true` if two instructions always compute the same value.
    #[must_use]
    pub fn are_instructions_equivalent(&self, first: &Instruction, second: &Instruction) -> bool {
        is_copyable(first.prototype()) && self.key(first) == self.key(second)
    }

    fn key(&self, instruction: &Instruction) -> (InstructionPrototype, Vec<ValueTag>) {
        (
            instruction.prototype().clone(),
            instruction
                .arguments()
                .iter()
                .map(|arg| self.get_number(arg))
                .collect(),
        )
    }

    fn add_instruction(&mut self, tag: &ValueTag, instruction: &Instruction) {
        let prototype = instruction.prototype();
        let number = if !is_copyable(prototype) {
            tag.clone()
        } else if prototype.is_copy() {
            instruction
                .arguments()
                .first()
                .map_or_else(|| tag.clone(), |arg| self.get_number(arg))
        } else {
            let key = self.key(instruction);
            self.expressions.entry(key).or_insert_with(|| tag.clone()).clone()
        };
        self.numbers.insert(tag.clone(), number);
    }
}

/// Computes a [`ValueNumbering`], visiting blocks in reverse postorder so that
/// definitions are numbered before the instructions that use them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueNumberingAnalysis;

impl FlowGraphAnalysis for ValueNumberingAnalysis {
    type Output = ValueNumbering;

    fn analyze(&self, graph: &FlowGraph) -> Result<ValueNumbering> {
        let mut numbering = ValueNumbering::default();
        for param in graph.parameter_tags() {
            numbering.numbers.insert(param.clone(), param.clone());
        }

        let order = reverse_postorder(graph);
        let visited: FxHashSet<_> = order.iter().cloned().collect();
        let unreachable = graph
            .basic_block_tags()
            .filter(|tag| !visited.contains(*tag))
            .cloned()
            .collect::<Vec<_>>();

        for tag in order.iter().chain(&unreachable) {
            for insn in graph.basic_block(tag)?.named_instructions() {
                numbering.add_instruction(insn.tag(), insn.instruction());
            }
        }
        Ok(numbering)
    }
}
