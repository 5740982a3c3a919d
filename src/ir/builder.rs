//! Staged construction of new graph revisions.
//!
//! A [`FlowGraphBuilder`] owns a current [`FlowGraph`] and replaces it with a derived
//! revision on every edit, recording the [`FlowGraphUpdate`] that describes the edit.
//! Because each edit derives the analysis cache as well, analyses requested halfway
//! through a rewrite reflect the builder's current state and can be updated
//! incrementally from results computed earlier in the same rewrite.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::FlowGraphAnalysis,
    ir::{
        block::{BlockData, BlockParameter},
        flow::{BlockFlow, Branch},
        graph::{check_arity, FlowGraph, GraphData, InstructionSlot, ParameterSlot},
        instruction::Instruction,
        tag::{BasicBlockTag, ValueTag},
        types::Type,
        update::{FlowGraphUpdate, MemberMapping},
    },
    Result,
};

fn block_mut<'a>(data: &'a mut GraphData, tag: &BasicBlockTag) -> Result<&'a mut BlockData> {
    data.blocks
        .get_mut(tag)
        .map(Arc::make_mut)
        .ok_or_else(|| malformed_error!("Unknown basic block '{:?}'", tag))
}

/// A single-owner staging area for graph edits.
///
/// # Examples
///
/// ```rust
/// use flowir::ir::{BlockFlow, Branch, FlowGraphBuilder, Instruction, Type};
///
/// let mut builder = FlowGraphBuilder::new();
/// let entry = builder.entry_point_tag().clone();
/// let exit = builder.add_basic_block("exit")?;
/// let x = builder.append_parameter(&exit, Type::int32(), "x")?;
/// let zero = builder.append_instruction(&entry, Instruction::default_constant(Type::int32()), "zero")?;
/// builder.set_flow(&entry, BlockFlow::Jump(Branch::with_values(exit.clone(), vec![zero])))?;
/// builder.set_flow(&exit, BlockFlow::Return(Instruction::copy(Type::int32(), x)))?;
///
/// let (graph, updates) = builder.build_with_updates();
/// graph.validate()?;
/// assert_eq!(updates.len(), 5);
/// # Ok::<(), flowir::Error>(())
/// ```
pub struct FlowGraphBuilder {
    graph: FlowGraph,
    updates: Vec<FlowGraphUpdate>,
}

impl FlowGraphBuilder {
    /// Creates a builder for a fresh graph with an empty entry block.
    #[must_use]
    pub fn new() -> Self {
        Self::from_graph(FlowGraph::new())
    }

    pub(crate) fn from_graph(graph: FlowGraph) -> Self {
        Self {
            graph,
            updates: Vec::new(),
        }
    }

    /// The current revision.
    #[must_use]
    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    /// The entry point of the current revision.
    #[must_use]
    pub fn entry_point_tag(&self) -> &BasicBlockTag {
        self.graph.entry_point_tag()
    }

    /// The updates applied so far, oldest first.
    #[must_use]
    pub fn updates(&self) -> &[FlowGraphUpdate] {
        &self.updates
    }

    /// Returns `true` if at least one edit was applied.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.updates.is_empty()
    }

    fn working_copy(&self) -> GraphData {
        self.graph.data().clone()
    }

    fn commit(&mut self, data: GraphData, update: FlowGraphUpdate) -> Result<()> {
        self.graph = self.graph.derive(data, &update)?;
        self.updates.push(update);
        Ok(())
    }

    /// Adds an empty block with unreachable flow.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the analysis cache is poisoned.
    pub fn add_basic_block(&mut self, name: impl Into<Arc<str>>) -> Result<BasicBlockTag> {
        let tag = BasicBlockTag::new(name);
        let mut data = self.working_copy();
        data.blocks
            .insert(tag.clone(), Arc::new(BlockData::empty(tag.clone())));
        self.commit(data, FlowGraphUpdate::AddBlock { tag: tag.clone() })?;
        Ok(tag)
    }

    /// Removes a block together with its parameters and instructions.
    ///
    /// Branches that target the block are left alone; the caller redirects them.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the block is unknown or is the entry point.
    pub fn remove_basic_block(&mut self, tag: &BasicBlockTag) -> Result<()> {
        let mut data = self.working_copy();
        if &data.entry == tag {
            return Err(malformed_error!("Cannot remove the entry block '{:?}'", tag));
        }
        let block = data
            .blocks
            .remove(tag)
            .ok_or_else(|| malformed_error!("Unknown basic block '{:?}'", tag))?;
        for insn in &block.instructions {
            data.instructions.remove(insn);
        }
        for param in &block.parameters {
            data.parameters.remove(&param.tag);
        }
        self.commit(data, FlowGraphUpdate::RemoveBlock { tag: tag.clone() })
    }

    /// Appends a named instruction to a block and returns its tag.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the block is unknown or the instruction's
    /// argument count disagrees with its prototype.
    pub fn append_instruction(
        &mut self,
        block: &BasicBlockTag,
        instruction: Instruction,
        name: impl Into<Arc<str>>,
    ) -> Result<ValueTag> {
        let index = self.graph.basic_block(block)?.instruction_tags().len();
        self.insert_instruction(block, index, instruction, name)
    }

    /// Inserts a named instruction at `index` in a block and returns its tag.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the block is unknown, `index` is past the
    /// end of the block or the instruction's argument count disagrees with its prototype.
    pub fn insert_instruction(
        &mut self,
        block: &BasicBlockTag,
        index: usize,
        instruction: Instruction,
        name: impl Into<Arc<str>>,
    ) -> Result<ValueTag> {
        check_arity(&instruction)?;
        let tag = ValueTag::new(name);
        let mut data = self.working_copy();

        let block_data = block_mut(&mut data, block)?;
        if index > block_data.instructions.len() {
            return Err(malformed_error!(
                "Index {} is out of range for block '{:?}'",
                index,
                block
            ));
        }
        block_data.instructions.insert(index, tag.clone());
        data.instructions.insert(
            tag.clone(),
            InstructionSlot {
                instruction: instruction.clone(),
                block: block.clone(),
            },
        );

        self.commit(
            data,
            FlowGraphUpdate::AddInstruction {
                tag: tag.clone(),
                instruction,
            },
        )?;
        Ok(tag)
    }

    /// Replaces the instruction behind a tag, keeping its position.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if no named instruction has this tag or the
    /// argument count disagrees with the prototype.
    pub fn replace_instruction(&mut self, tag: &ValueTag, instruction: Instruction) -> Result<()> {
        check_arity(&instruction)?;
        let mut data = self.working_copy();
        let slot = data
            .instructions
            .get_mut(tag)
            .ok_or_else(|| malformed_error!("Unknown instruction '{:?}'", tag))?;
        slot.instruction = instruction.clone();
        self.commit(
            data,
            FlowGraphUpdate::ReplaceInstruction {
                tag: tag.clone(),
                instruction,
            },
        )
    }

    /// Removes a named instruction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if no named instruction has this tag.
    pub fn remove_instruction(&mut self, tag: &ValueTag) -> Result<()> {
        let mut data = self.working_copy();
        let slot = data
            .instructions
            .remove(tag)
            .ok_or_else(|| malformed_error!("Unknown instruction '{:?}'", tag))?;
        block_mut(&mut data, &slot.block)?
            .instructions
            .retain(|insn| insn != tag);
        self.commit(data, FlowGraphUpdate::RemoveInstruction { tag: tag.clone() })
    }

    /// Appends a parameter to a block and returns its tag.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the block is unknown.
    pub fn append_parameter(
        &mut self,
        block: &BasicBlockTag,
        ty: Type,
        name: impl Into<Arc<str>>,
    ) -> Result<ValueTag> {
        let param = BlockParameter::new(ty, name);
        let mut data = self.working_copy();
        block_mut(&mut data, block)?.parameters.push(param.clone());
        data.parameters.insert(
            param.tag.clone(),
            ParameterSlot {
                ty: param.ty,
                block: block.clone(),
            },
        );
        self.commit(
            data,
            FlowGraphUpdate::SetParameters {
                block: block.clone(),
            },
        )?;
        Ok(param.tag)
    }

    /// Replaces a block's parameter list.
    ///
    /// Parameters that disappear stop being defined; branch arguments feeding them are
    /// the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the block is unknown or a new parameter's tag
    /// is already defined elsewhere.
    pub fn set_parameters(
        &mut self,
        block: &BasicBlockTag,
        parameters: Vec<BlockParameter>,
    ) -> Result<()> {
        let mut data = self.working_copy();
        let old = std::mem::take(&mut block_mut(&mut data, block)?.parameters);
        for param in &old {
            data.parameters.remove(&param.tag);
        }
        for param in &parameters {
            if data.contains_value(&param.tag) {
                return Err(malformed_error!(
                    "Value '{:?}' is defined more than once",
                    param.tag
                ));
            }
            data.parameters.insert(
                param.tag.clone(),
                ParameterSlot {
                    ty: param.ty.clone(),
                    block: block.clone(),
                },
            );
        }
        block_mut(&mut data, block)?.parameters = parameters;
        self.commit(
            data,
            FlowGraphUpdate::SetParameters {
                block: block.clone(),
            },
        )
    }

    /// Replaces a block's flow.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the block or a branch target is unknown or
    /// a flow instruction's argument count disagrees with its prototype.
    pub fn set_flow(&mut self, block: &BasicBlockTag, flow: BlockFlow) -> Result<()> {
        for insn in flow.instructions() {
            check_arity(insn)?;
        }
        let mut data = self.working_copy();
        for target in flow.branch_targets() {
            if !data.blocks.contains_key(&target) {
                return Err(malformed_error!(
                    "Block '{:?}' branches to unknown block '{:?}'",
                    block,
                    target
                ));
            }
        }
        block_mut(&mut data, block)?.flow = flow;
        self.commit(
            data,
            FlowGraphUpdate::SetFlow {
                block: block.clone(),
            },
        )
    }

    /// Makes another block the entry point.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the block is unknown.
    pub fn set_entry_point(&mut self, tag: &BasicBlockTag) -> Result<()> {
        let mut data = self.working_copy();
        if !data.blocks.contains_key(tag) {
            return Err(malformed_error!("Unknown basic block '{:?}'", tag));
        }
        data.entry = tag.clone();
        self.commit(data, FlowGraphUpdate::SetEntryPoint { tag: tag.clone() })
    }

    /// Rewrites every use of a key of `replacements` into a use of its value, in named
    /// instructions, flow instructions and branch arguments alike. Definitions are not
    /// touched.
    ///
    /// # Errors
    ///
    /// Propagates errors from the individual edits.
    pub fn replace_uses(&mut self, replacements: &FxHashMap<ValueTag, ValueTag>) -> Result<()> {
        if replacements.is_empty() {
            return Ok(());
        }
        let map = |value: &ValueTag| {
            replacements
                .get(value)
                .cloned()
                .unwrap_or_else(|| value.clone())
        };

        let snapshot = self.graph.clone();
        for insn in snapshot.named_instructions() {
            if insn.arguments().iter().any(|arg| replacements.contains_key(arg)) {
                self.replace_instruction(insn.tag(), insn.instruction().map_arguments(map))?;
            }
        }
        for block in snapshot.basic_blocks() {
            let flow = block.flow();
            if flow
                .used_values()
                .iter()
                .any(|value| replacements.contains_key(value))
            {
                self.set_flow(block.tag(), flow.map_values(map))?;
            }
        }
        Ok(())
    }

    /// Removes the definitions of a set of values.
    ///
    /// Instructions are deleted; parameters are dropped from their block together with
    /// the branch arguments that fed them.
    ///
    /// # Errors
    ///
    /// Propagates errors from the individual edits.
    pub fn remove_definitions(&mut self, values: &FxHashSet<ValueTag>) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let snapshot = self.graph.clone();

        let mut dropped: FxHashMap<BasicBlockTag, Vec<bool>> = FxHashMap::default();
        for block in snapshot.basic_blocks() {
            let mask: Vec<bool> = block
                .parameters()
                .iter()
                .map(|param| values.contains(&param.tag))
                .collect();
            if mask.iter().any(|&dead| dead) {
                let kept = block
                    .parameters()
                    .iter()
                    .filter(|param| !values.contains(&param.tag))
                    .cloned()
                    .collect();
                self.set_parameters(block.tag(), kept)?;
                dropped.insert(block.tag().clone(), mask);
            }
        }

        for value in values {
            if snapshot.contains_instruction(value) {
                self.remove_instruction(value)?;
            }
        }

        if dropped.is_empty() {
            return Ok(());
        }
        for block in snapshot.basic_blocks() {
            let flow = block.flow();
            if !flow.branches().iter().any(|b| dropped.contains_key(&b.target)) {
                continue;
            }
            let branches = flow
                .branches()
                .into_iter()
                .map(|branch| match dropped.get(&branch.target) {
                    Some(mask) => Branch::with_arguments(
                        branch.target.clone(),
                        branch
                            .arguments
                            .iter()
                            .zip(mask)
                            .filter(|&(_, &dead)| !dead)
                            .map(|(arg, _)| arg.clone())
                            .collect(),
                    ),
                    None => branch.clone(),
                })
                .collect();
            self.set_flow(block.tag(), flow.with_branches(branches))?;
        }
        Ok(())
    }

    /// Rewrites every type and method the graph refers to.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the analysis cache is poisoned.
    pub fn map_members(&mut self, mapping: &MemberMapping) -> Result<()> {
        let map_type = |ty: &Type| ty.map(&|t: &Type| mapping.map_type(t));
        let mut data = self.working_copy();

        data.instructions = data
            .instructions
            .iter()
            .map(|(tag, slot)| {
                (
                    tag.clone(),
                    InstructionSlot {
                        instruction: slot.instruction.map_members(mapping),
                        block: slot.block.clone(),
                    },
                )
            })
            .collect();
        data.parameters = data
            .parameters
            .iter()
            .map(|(tag, slot)| {
                (
                    tag.clone(),
                    ParameterSlot {
                        ty: map_type(&slot.ty),
                        block: slot.block.clone(),
                    },
                )
            })
            .collect();
        data.blocks = data
            .blocks
            .iter()
            .map(|(tag, block)| {
                let mut block = (**block).clone();
                for param in &mut block.parameters {
                    param.ty = map_type(&param.ty);
                }
                block.flow = block.flow.map_members(mapping);
                (tag.clone(), Arc::new(block))
            })
            .collect();

        self.commit(
            data,
            FlowGraphUpdate::RemapMembers {
                mapping: mapping.clone(),
            },
        )
    }

    /// Installs an analysis on the current revision and every revision derived from it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the analysis cache is poisoned.
    pub fn add_analysis<A: FlowGraphAnalysis>(&mut self, analysis: A) -> Result<()> {
        self.graph = self.graph.with_analysis(analysis)?;
        Ok(())
    }

    /// Returns an analysis result for the current revision.
    ///
    /// # Errors
    ///
    /// See [`FlowGraph::get_analysis_result`].
    pub fn get_analysis_result<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.graph.get_analysis_result::<T>()
    }

    /// Finishes the build.
    #[must_use]
    pub fn build(self) -> FlowGraph {
        self.graph
    }

    /// Finishes the build, also returning the updates relative to the starting revision.
    #[must_use]
    pub fn build_with_updates(self) -> (FlowGraph, Vec<FlowGraphUpdate>) {
        (self.graph, self.updates)
    }
}

impl Default for FlowGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
