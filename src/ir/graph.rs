//! The immutable flow graph.
//!
//! A [`FlowGraph`] is a persistent value: blocks, instructions and parameters live in
//! structurally shared maps, so deriving a new revision through a
//! [`FlowGraphBuilder`] copies only what changes. Each graph carries its own analysis
//! cache; derived graphs carry caches derived from their parent's.

use std::{fmt, sync::Arc};

use imbl::{HashMap as ImHashMap, OrdMap};
use rustc_hash::FxHashMap;

use crate::{
    analysis::{
        cache::{AnalysisRegistry, MacroAnalysisCache, ResultKey},
        FlowGraphAnalysis,
    },
    ir::{
        block::{BasicBlock, BlockData},
        builder::FlowGraphBuilder,
        flow::{BlockFlow, BranchArgument},
        instruction::{Instruction, NamedInstruction},
        tag::{BasicBlockTag, ValueTag},
        types::Type,
        update::FlowGraphUpdate,
    },
    Result,
};

#[derive(Debug, Clone)]
pub(crate) struct InstructionSlot {
    pub(crate) instruction: Instruction,
    pub(crate) block: BasicBlockTag,
}

#[derive(Debug, Clone)]
pub(crate) struct ParameterSlot {
    pub(crate) ty: Type,
    pub(crate) block: BasicBlockTag,
}

/// The persistent contents of a graph revision.
#[derive(Debug, Clone)]
pub(crate) struct GraphData {
    pub(crate) blocks: OrdMap<BasicBlockTag, Arc<BlockData>>,
    pub(crate) instructions: ImHashMap<ValueTag, InstructionSlot>,
    pub(crate) parameters: ImHashMap<ValueTag, ParameterSlot>,
    pub(crate) entry: BasicBlockTag,
}

impl GraphData {
    fn with_entry(entry: BasicBlockTag) -> Self {
        let mut blocks = OrdMap::new();
        blocks.insert(entry.clone(), Arc::new(BlockData::empty(entry.clone())));
        Self {
            blocks,
            instructions: ImHashMap::new(),
            parameters: ImHashMap::new(),
            entry,
        }
    }

    pub(crate) fn contains_value(&self, tag: &ValueTag) -> bool {
        self.instructions.contains_key(tag) || self.parameters.contains_key(tag)
    }
}

/// An immutable SSA control-flow graph.
///
/// Blocks are iterated in creation order. Every value is defined exactly once, either by
/// a named instruction or by a block parameter.
///
/// # Examples
///
/// ```rust
/// use flowir::ir::{BlockFlow, Constant, FlowGraph, Instruction, Type};
///
/// let mut builder = FlowGraph::new().to_builder();
/// let entry = builder.entry_point_tag().clone();
/// let one = builder.append_instruction(&entry, Instruction::constant(Constant::i32(1), Type::int32()), "one")?;
/// builder.set_flow(&entry, BlockFlow::Return(Instruction::copy(Type::int32(), one)))?;
/// let graph = builder.build();
///
/// assert_eq!(graph.named_instructions().len(), 1);
/// graph.validate()?;
/// # Ok::<(), flowir::Error>(())
/// ```
#[derive(Clone)]
pub struct FlowGraph {
    data: Arc<GraphData>,
    cache: Arc<MacroAnalysisCache>,
}

impl FlowGraph {
    /// Creates a graph with a single empty entry block and the standard analyses.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(Arc::new(AnalysisRegistry::standard()))
    }

    /// Creates a graph with a single empty entry block whose cache falls back on
    /// `registry`.
    #[must_use]
    pub fn with_registry(registry: Arc<AnalysisRegistry>) -> Self {
        Self {
            data: Arc::new(GraphData::with_entry(BasicBlockTag::new("entry"))),
            cache: Arc::new(MacroAnalysisCache::new(registry)),
        }
    }

    pub(crate) fn data(&self) -> &GraphData {
        &self.data
    }

    /// Builds the revision holding `data`, deriving the analysis cache through `update`.
    pub(crate) fn derive(&self, data: GraphData, update: &FlowGraphUpdate) -> Result<FlowGraph> {
        Ok(FlowGraph {
            data: Arc::new(data),
            cache: Arc::new(self.cache.update(update)?),
        })
    }

    /// Returns `true` if both handles refer to the same graph revision.
    #[must_use]
    pub fn is_same_revision(&self, other: &FlowGraph) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// The registry this graph's cache falls back on.
    #[must_use]
    pub fn registry(&self) -> &Arc<AnalysisRegistry> {
        self.cache.registry()
    }

    /// Starts a builder whose edits derive new revisions from this one.
    #[must_use]
    pub fn to_builder(&self) -> FlowGraphBuilder {
        FlowGraphBuilder::from_graph(self.clone())
    }

    /// The entry point's tag.
    #[must_use]
    pub fn entry_point_tag(&self) -> &BasicBlockTag {
        &self.data.entry
    }

    /// The entry block.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the entry tag does not name a block.
    pub fn entry_point(&self) -> Result<BasicBlock<'_>> {
        self.basic_block(&self.data.entry)
    }

    /// Iterates over the block tags in creation order.
    pub fn basic_block_tags(&self) -> impl Iterator<Item = &BasicBlockTag> + '_ {
        self.data.blocks.keys()
    }

    /// Iterates over the blocks in creation order.
    pub fn basic_blocks(&self) -> impl Iterator<Item = BasicBlock<'_>> + '_ {
        self.data
            .blocks
            .values()
            .map(move |data| BasicBlock::new(self, data))
    }

    /// The number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.data.blocks.len()
    }

    /// Looks up a block.
    #[must_use]
    pub fn get_basic_block(&self, tag: &BasicBlockTag) -> Option<BasicBlock<'_>> {
        self.data
            .blocks
            .get(tag)
            .map(|data| BasicBlock::new(self, data))
    }

    /// Looks up a block that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if no block has this tag.
    pub fn basic_block(&self, tag: &BasicBlockTag) -> Result<BasicBlock<'_>> {
        self.get_basic_block(tag)
            .ok_or_else(|| malformed_error!("Unknown basic block '{:?}'", tag))
    }

    /// Returns `true` if a block has this tag.
    #[must_use]
    pub fn contains_basic_block(&self, tag: &BasicBlockTag) -> bool {
        self.data.blocks.contains_key(tag)
    }

    /// Returns `true` if a named instruction has this tag.
    #[must_use]
    pub fn contains_instruction(&self, tag: &ValueTag) -> bool {
        self.data.instructions.contains_key(tag)
    }

    /// Returns `true` if a block parameter has this tag.
    #[must_use]
    pub fn contains_parameter(&self, tag: &ValueTag) -> bool {
        self.data.parameters.contains_key(tag)
    }

    /// Returns `true` if this graph defines the value.
    #[must_use]
    pub fn contains_value(&self, tag: &ValueTag) -> bool {
        self.data.contains_value(tag)
    }

    pub(crate) fn instruction_entry(&self, tag: &ValueTag) -> Option<&Instruction> {
        self.data.instructions.get(tag).map(|slot| &slot.instruction)
    }

    /// Looks up a named instruction together with its position.
    #[must_use]
    pub fn get_instruction(&self, tag: &ValueTag) -> Option<NamedInstruction> {
        let slot = self.data.instructions.get(tag)?;
        let block = self.data.blocks.get(&slot.block)?;
        let index = block.instructions.iter().position(|t| t == tag)?;
        Some(NamedInstruction::new(
            tag.clone(),
            slot.instruction.clone(),
            slot.block.clone(),
            index,
        ))
    }

    /// Looks up a named instruction that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if no named instruction has this tag.
    pub fn instruction(&self, tag: &ValueTag) -> Result<NamedInstruction> {
        self.get_instruction(tag)
            .ok_or_else(|| malformed_error!("Unknown instruction '{:?}'", tag))
    }

    /// The block that defines a value, whether as instruction or parameter.
    #[must_use]
    pub fn get_value_parent(&self, tag: &ValueTag) -> Option<&BasicBlockTag> {
        self.data
            .instructions
            .get(tag)
            .map(|slot| &slot.block)
            .or_else(|| self.data.parameters.get(tag).map(|slot| &slot.block))
    }

    /// The type of a value.
    #[must_use]
    pub fn get_value_type(&self, tag: &ValueTag) -> Option<Type> {
        self.data
            .instructions
            .get(tag)
            .map(|slot| slot.instruction.result_type())
            .or_else(|| self.data.parameters.get(tag).map(|slot| slot.ty.clone()))
    }

    /// The type of a value that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the graph does not define the value.
    pub fn value_type(&self, tag: &ValueTag) -> Result<Type> {
        self.get_value_type(tag)
            .ok_or_else(|| malformed_error!("Unknown value '{:?}'", tag))
    }

    /// Iterates over the tags of all named instructions, in no particular order.
    pub fn instruction_tags(&self) -> impl Iterator<Item = &ValueTag> + '_ {
        self.data.instructions.keys()
    }

    /// Iterates over the tags of all block parameters, in no particular order.
    pub fn parameter_tags(&self) -> impl Iterator<Item = &ValueTag> + '_ {
        self.data.parameters.keys()
    }

    /// Iterates over every value the graph defines.
    pub fn value_tags(&self) -> impl Iterator<Item = &ValueTag> + '_ {
        self.instruction_tags().chain(self.parameter_tags())
    }

    /// All named instructions, block by block, in order.
    #[must_use]
    pub fn named_instructions(&self) -> Vec<NamedInstruction> {
        self.basic_blocks()
            .flat_map(|block| block.named_instructions())
            .collect()
    }

    /// Returns the result of type `T`, computing it if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AnalysisNotRegistered`] if neither an installed analysis
    /// nor the registry produces `T`, and propagates errors from the analysis itself.
    pub fn get_analysis_result<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.cache.get_result::<T>(self)
    }

    /// Returns the result of type `T`, or `None` if nothing produces one.
    ///
    /// # Errors
    ///
    /// Propagates errors from the analysis.
    pub fn try_get_analysis_result<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        self.cache.try_get_result::<T>(self)
    }

    /// Returns `true` if a result of type `T` is installed or registrable.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the cache lock is poisoned.
    pub fn has_analysis_for<T: 'static>(&self) -> Result<bool> {
        self.cache.has_analysis_for(ResultKey::of::<T>())
    }

    /// Returns this graph revision with `analysis` installed for its result type.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the cache lock is poisoned.
    pub fn with_analysis<A: FlowGraphAnalysis>(&self, analysis: A) -> Result<FlowGraph> {
        Ok(FlowGraph {
            data: Arc::clone(&self.data),
            cache: Arc::new(self.cache.with_analysis(analysis)?),
        })
    }

    /// Checks the structural invariants of the graph.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] describing the first violation found:
    /// a missing entry block, a dangling block or value reference, a use that does not
    /// follow its definition within a block, an argument count that disagrees with a
    /// prototype or with a branch target's parameter list, or a try marker outside a
    /// try flow.
    pub fn validate(&self) -> Result<()> {
        let data = &*self.data;
        if !data.blocks.contains_key(&data.entry) {
            return Err(malformed_error!("Entry point '{:?}' is not a block", data.entry));
        }

        let mut listed_instructions = 0usize;
        for block in data.blocks.values() {
            for param in &block.parameters {
                match data.parameters.get(&param.tag) {
                    Some(slot) if slot.block == block.tag => {}
                    _ => {
                        return Err(malformed_error!(
                            "Parameter '{:?}' of '{:?}' is not registered",
                            param.tag,
                            block.tag
                        ))
                    }
                }
            }

            let mut local_positions: FxHashMap<&ValueTag, usize> = FxHashMap::default();
            for (index, tag) in block.instructions.iter().enumerate() {
                local_positions.insert(tag, index);
            }

            for (index, tag) in block.instructions.iter().enumerate() {
                listed_instructions += 1;
                let slot = match data.instructions.get(tag) {
                    Some(slot) if slot.block == block.tag => slot,
                    _ => {
                        return Err(malformed_error!(
                            "Instruction '{:?}' of '{:?}' is not registered",
                            tag,
                            block.tag
                        ))
                    }
                };
                check_arity(&slot.instruction)?;
                for argument in slot.instruction.arguments() {
                    self.check_defined(argument)?;
                    if let Some(&position) = local_positions.get(argument) {
                        if position >= index {
                            return Err(malformed_error!(
                                "Instruction '{:?}' uses '{:?}' before its definition",
                                tag,
                                argument
                            ));
                        }
                    }
                }
            }

            for instruction in block.flow.instructions() {
                check_arity(instruction)?;
                for argument in instruction.arguments() {
                    self.check_defined(argument)?;
                }
            }

            let is_try = matches!(block.flow, BlockFlow::Try(_));
            for branch in block.flow.branches() {
                let Some(target) = data.blocks.get(&branch.target) else {
                    return Err(malformed_error!(
                        "Block '{:?}' branches to unknown block '{:?}'",
                        block.tag,
                        branch.target
                    ));
                };
                if branch.arguments.len() != target.parameters.len() {
                    return Err(malformed_error!(
                        "Branch from '{:?}' to '{:?}' passes {} arguments for {} parameters",
                        block.tag,
                        branch.target,
                        branch.arguments.len(),
                        target.parameters.len()
                    ));
                }
                for argument in &branch.arguments {
                    match argument {
                        BranchArgument::Value(value) => self.check_defined(value)?,
                        BranchArgument::TryResult | BranchArgument::TryException if !is_try => {
                            return Err(malformed_error!(
                                "Block '{:?}' uses a try marker outside a try flow",
                                block.tag
                            ))
                        }
                        _ => {}
                    }
                }
            }
        }

        if listed_instructions != data.instructions.len() {
            return Err(malformed_error!(
                "{} instructions are registered but {} are placed in blocks",
                data.instructions.len(),
                listed_instructions
            ));
        }
        Ok(())
    }

    fn check_defined(&self, value: &ValueTag) -> Result<()> {
        if self.data.contains_value(value) {
            Ok(())
        } else {
            Err(malformed_error!("Use of undefined value '{:?}'", value))
        }
    }
}

pub(crate) fn check_arity(instruction: &Instruction) -> Result<()> {
    let expected = instruction.prototype().parameter_count();
    if instruction.arguments().len() == expected {
        Ok(())
    } else {
        Err(malformed_error!(
            "'{}' takes {} arguments, got {}",
            instruction.prototype(),
            expected,
            instruction.arguments().len()
        ))
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowGraph")
            .field("entry", &self.data.entry)
            .field("blocks", &self.data.blocks.len())
            .field("instructions", &self.data.instructions.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "entry {}", self.data.entry)?;
        for block in self.basic_blocks() {
            write!(f, "{}", block)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Branch, Constant};

    #[test]
    fn test_new_graph_has_entry() {
        let graph = FlowGraph::new();
        assert_eq!(graph.block_count(), 1);
        assert!(graph.entry_point().unwrap().is_entry_point());
        assert_eq!(graph.entry_point_tag().name(), "entry");
        graph.validate().unwrap();
    }

    #[test]
    fn test_lookups() {
        let mut builder = FlowGraph::new().to_builder();
        let entry = builder.entry_point_tag().clone();
        let param = builder.append_parameter(&entry, Type::int32(), "p").unwrap();
        let c = builder
            .append_instruction(&entry, Instruction::constant(Constant::i32(2), Type::int32()), "c")
            .unwrap();
        let graph = builder.build();

        assert!(graph.contains_parameter(&param));
        assert!(graph.contains_instruction(&c));
        assert_eq!(graph.get_value_parent(&c), Some(&entry));
        assert_eq!(graph.get_value_type(&param), Some(Type::int32()));
        assert_eq!(graph.instruction(&c).unwrap().index(), 0);
        assert_eq!(graph.value_tags().count(), 2);
        assert!(graph.get_instruction(&param).is_none());
    }

    #[test]
    fn test_validate_rejects_argument_mismatch() {
        let mut builder = FlowGraph::new().to_builder();
        let entry = builder.entry_point_tag().clone();
        let target = builder.add_basic_block("target").unwrap();
        builder.append_parameter(&target, Type::int32(), "x").unwrap();
        builder
            .set_flow(&entry, BlockFlow::Jump(Branch::new(target)))
            .unwrap();
        let graph = builder.build();
        assert!(matches!(graph.validate(), Err(crate::Error::Malformed { .. })));
    }

    #[test]
    fn test_display_lists_blocks() {
        let mut builder = FlowGraph::new().to_builder();
        let entry = builder.entry_point_tag().clone();
        let c = builder
            .append_instruction(&entry, Instruction::constant(Constant::i32(42), Type::int32()), "c")
            .unwrap();
        builder
            .set_flow(&entry, BlockFlow::Return(Instruction::copy(Type::int32(), c)))
            .unwrap();
        let text = builder.build().to_string();
        assert!(text.starts_with("entry entry"));
        assert!(text.contains("42"));
        assert!(text.contains("return"));
    }
}
