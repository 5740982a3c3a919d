//! Basic blocks and block parameters.

use std::{fmt, sync::Arc};

use crate::ir::{
    flow::BlockFlow,
    graph::FlowGraph,
    instruction::NamedInstruction,
    tag::{BasicBlockTag, ValueTag},
    types::Type,
};

/// A value imported into a block from its predecessors' branch arguments (a phi).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockParameter {
    /// The type of the parameter.
    pub ty: Type,
    /// The tag naming the parameter's value.
    pub tag: ValueTag,
}

impl BlockParameter {
    /// Creates a block parameter with a freshly minted tag.
    #[must_use]
    pub fn new(ty: Type, name: impl Into<Arc<str>>) -> Self {
        Self {
            ty,
            tag: ValueTag::new(name),
        }
    }

    /// Creates a block parameter with an existing tag.
    #[must_use]
    pub fn with_tag(ty: Type, tag: ValueTag) -> Self {
        Self { ty, tag }
    }
}

impl fmt::Display for BlockParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tag, self.ty)
    }
}

/// Storage for one block inside a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockData {
    pub(crate) tag: BasicBlockTag,
    pub(crate) parameters: Vec<BlockParameter>,
    pub(crate) instructions: Vec<ValueTag>,
    pub(crate) flow: BlockFlow,
}

impl BlockData {
    pub(crate) fn empty(tag: BasicBlockTag) -> Self {
        Self {
            tag,
            parameters: Vec::new(),
            instructions: Vec::new(),
            flow: BlockFlow::Unreachable,
        }
    }
}

/// A read-only view of a basic block inside a [`FlowGraph`].
#[derive(Clone, Copy)]
pub struct BasicBlock<'g> {
    graph: &'g FlowGraph,
    data: &'g BlockData,
}

impl<'g> BasicBlock<'g> {
    pub(crate) fn new(graph: &'g FlowGraph, data: &'g BlockData) -> Self {
        Self { graph, data }
    }

    /// The block's tag.
    #[must_use]
    pub fn tag(&self) -> &'g BasicBlockTag {
        &self.data.tag
    }

    /// The graph this block belongs to.
    #[must_use]
    pub fn graph(&self) -> &'g FlowGraph {
        self.graph
    }

    /// The block's parameters, in order.
    #[must_use]
    pub fn parameters(&self) -> &'g [BlockParameter] {
        &self.data.parameters
    }

    /// Iterates over the tags of the block's parameters.
    pub fn parameter_tags(&self) -> impl Iterator<Item = &'g ValueTag> + 'g {
        self.data.parameters.iter().map(|param| &param.tag)
    }

    /// The tags of the block's named instructions, in order.
    #[must_use]
    pub fn instruction_tags(&self) -> &'g [ValueTag] {
        &self.data.instructions
    }

    /// The block's named instructions, in order.
    #[must_use]
    pub fn named_instructions(&self) -> Vec<NamedInstruction> {
        self.data
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(index, tag)| {
                self.graph.instruction_entry(tag).map(|instruction| {
                    NamedInstruction::new(
                        tag.clone(),
                        instruction.clone(),
                        self.data.tag.clone(),
                        index,
                    )
                })
            })
            .collect()
    }

    /// The block's terminating flow.
    #[must_use]
    pub fn flow(&self) -> &'g BlockFlow {
        &self.data.flow
    }

    /// Returns `true` if this block is the graph's entry point.
    #[must_use]
    pub fn is_entry_point(&self) -> bool {
        self.graph.entry_point_tag() == &self.data.tag
    }
}

impl fmt::Debug for BasicBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicBlock")
            .field("tag", &self.data.tag)
            .field("parameters", &self.data.parameters)
            .field("instructions", &self.data.instructions)
            .field("flow", &self.data.flow)
            .finish()
    }
}

impl fmt::Display for BasicBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.data.tag)?;
        for (index, param) in self.data.parameters.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        writeln!(f, "):")?;
        for insn in self.named_instructions() {
            writeln!(f, "    {}", insn)?;
        }
        writeln!(f, "    {}", self.data.flow)
    }
}
