//! Promotion of stack slots to SSA values.
//!
//! An `alloca` whose address is only ever used as the pointer operand of non-volatile
//! loads and stores never has its identity observed, so it can be replaced by plain SSA
//! values: loads become copies of the value currently held by the slot, stores become
//! copies of the value they store, and block parameters take the place of phis.
//!
//! # Algorithm
//!
//! The construction follows Braun et al., *Simple and Efficient Construction of Static
//! Single Assignment Form*:
//!
//! 1. Blocks are filled depth-first from the entry, then every block the entry cannot
//!    reach. Filling a block rewrites its loads and stores.
//! 2. A block is sealed once all of its predecessors are filled. Reading a slot in an
//!    unsealed block creates a placeholder parameter whose operands are added on sealing.
//! 3. Reading a slot in a sealed block with a single predecessor reads it in that
//!    predecessor instead; with several (or none) it creates a parameter and reads the
//!    slot in every predecessor to find the branch arguments.
//! 4. The promoted `alloca`s are deleted. Parameters the construction appended to the
//!    entry block are replaced by default constants, or, when the entry has predecessors,
//!    by a new entry block that passes default constants for them.
//!
//! Reads walk predecessor chains iteratively and phi operands are resolved from a
//! worklist, so neither the block traversal nor the reads recurse.
//!
//! # Example
//!
//! Before:
//! ```text
//! entry:
//!   a = alloca<i32>
//!   s = store<i32>(a, x)
//!   t = load<i32>(a)
//!   return copy(t)
//! ```
//!
//! After:
//! ```text
//! entry:
//!   s = copy(x)
//!   t = copy(x)
//!   return copy(t)
//! ```

use std::{collections::VecDeque, sync::Arc};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::BasicBlockPredecessors,
    compiler::pass::GraphPass,
    ir::{
        BasicBlockTag, BlockFlow, BlockParameter, Branch, BranchArgument, FlowGraph,
        FlowGraphBuilder, Instruction, InstructionPrototype, Type, ValueTag,
    },
    Result,
};

/// Replaces non-escaping `alloca` slots with SSA values and block parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocaToRegisterPass;

impl AllocaToRegisterPass {
    /// Creates a new alloca-to-register pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GraphPass for AllocaToRegisterPass {
    fn name(&self) -> &'static str {
        "alloca-to-register"
    }

    fn description(&self) -> &'static str {
        "Promotes stack slots that are only loaded and stored to SSA values"
    }

    fn run(&self, graph: &FlowGraph) -> Result<FlowGraph> {
        let eligible = find_eligible_allocas(graph);
        if eligible.is_empty() {
            return Ok(graph.clone());
        }

        let promoted = eligible.len();
        let mut construction = SsaConstruction::new(graph.to_builder(), eligible)?;
        construction.run()?;
        tracing::debug!(pass = self.name(), promoted, "promoted stack slots");
        Ok(construction.builder.build())
    }
}

/// Maps every promotable `alloca` to its element type.
fn find_eligible_allocas(graph: &FlowGraph) -> FxHashMap<ValueTag, Type> {
    let mut allocas = FxHashMap::default();
    let mut pinned = FxHashSet::default();

    for insn in graph.named_instructions() {
        classify_uses(insn.instruction(), Some(insn.tag()), &mut allocas, &mut pinned);
    }
    for block in graph.basic_blocks() {
        let flow = block.flow();
        for instruction in flow.instructions() {
            classify_uses(instruction, None, &mut allocas, &mut pinned);
        }
        for branch in flow.branches() {
            pinned.extend(branch.values().cloned());
        }
    }

    allocas.retain(|tag, _| !pinned.contains(tag));
    allocas
}

fn classify_uses(
    instruction: &Instruction,
    tag: Option<&ValueTag>,
    allocas: &mut FxHashMap<ValueTag, Type>,
    pinned: &mut FxHashSet<ValueTag>,
) {
    let args = instruction.arguments();
    match instruction.prototype() {
        InstructionPrototype::Load { is_volatile, .. } => {
            if *is_volatile {
                pinned.extend(args.iter().cloned());
            }
        }
        InstructionPrototype::Store { is_volatile, .. } => {
            // The stored value escapes; so does the slot of a volatile store.
            pinned.insert(args[1].clone());
            if *is_volatile {
                pinned.insert(args[0].clone());
            }
        }
        InstructionPrototype::Alloca { element_type } => {
            if let Some(tag) = tag {
                allocas.insert(tag.clone(), element_type.clone());
            }
        }
        _ => pinned.extend(args.iter().cloned()),
    }
}

/// A placeholder parameter whose branch arguments still have to be found.
struct PendingPhi {
    variable: ValueTag,
    block: BasicBlockTag,
    phi: ValueTag,
}

struct SsaConstruction {
    builder: FlowGraphBuilder,
    variables: FxHashMap<ValueTag, Type>,
    predecessors: Arc<BasicBlockPredecessors>,
    current_def: FxHashMap<ValueTag, FxHashMap<BasicBlockTag, ValueTag>>,
    /// Present for unsealed blocks only.
    incomplete_phis: FxHashMap<BasicBlockTag, Vec<(ValueTag, ValueTag)>>,
    filled: FxHashSet<BasicBlockTag>,
    processed: FxHashSet<BasicBlockTag>,
    pending: VecDeque<PendingPhi>,
}

impl SsaConstruction {
    fn new(builder: FlowGraphBuilder, variables: FxHashMap<ValueTag, Type>) -> Result<Self> {
        let predecessors = builder.get_analysis_result::<BasicBlockPredecessors>()?;
        let incomplete_phis = builder
            .graph()
            .basic_block_tags()
            .map(|tag| (tag.clone(), Vec::new()))
            .collect();
        let current_def = variables
            .keys()
            .map(|var| (var.clone(), FxHashMap::default()))
            .collect();
        Ok(Self {
            builder,
            variables,
            predecessors,
            current_def,
            incomplete_phis,
            filled: FxHashSet::default(),
            processed: FxHashSet::default(),
            pending: VecDeque::new(),
        })
    }

    fn run(&mut self) -> Result<()> {
        let graph = self.builder.graph().clone();
        let entry = graph.entry_point_tag().clone();
        let old_entry_parameters = graph.basic_block(&entry)?.parameters().to_vec();

        self.fill_from(entry.clone())?;
        for tag in graph.basic_block_tags() {
            self.fill_from(tag.clone())?;
        }
        self.resolve_pending()?;

        for alloca in self.variables.keys() {
            self.builder.remove_instruction(alloca)?;
        }

        self.fix_entry_parameters(&entry, &old_entry_parameters)
    }

    /// Fills `start` and everything reachable from it that is not filled yet, in
    /// depth-first preorder.
    fn fill_from(&mut self, start: BasicBlockTag) -> Result<()> {
        let mut stack = vec![start];
        while let Some(tag) = stack.pop() {
            if !self.processed.insert(tag.clone()) {
                continue;
            }
            if self.can_seal(&tag) {
                self.seal(&tag);
            }
            self.fill(&tag)?;
            self.filled.insert(tag.clone());

            let targets = self.builder.graph().basic_block(&tag)?.flow().branch_targets();
            for target in &targets {
                if self.can_seal(target) {
                    self.seal(target);
                }
            }
            self.resolve_pending()?;
            stack.extend(targets.into_iter().rev());
        }
        Ok(())
    }

    fn fill(&mut self, tag: &BasicBlockTag) -> Result<()> {
        let block = self.builder.graph().basic_block(tag)?;
        let instructions = block.named_instructions();
        let flow = block.flow().clone();

        for insn in instructions {
            if let Some(rewritten) = self.rewrite(insn.instruction(), tag) {
                self.builder.replace_instruction(insn.tag(), rewritten)?;
            }
        }

        let mut changed = false;
        let flow_instructions: Vec<Instruction> = flow
            .instructions()
            .into_iter()
            .map(|instruction| match self.rewrite(instruction, tag) {
                Some(rewritten) => {
                    changed = true;
                    rewritten
                }
                None => instruction.clone(),
            })
            .collect();
        if changed {
            let current = self.builder.graph().basic_block(tag)?.flow().clone();
            self.builder
                .set_flow(tag, current.with_instructions(flow_instructions))?;
        }
        Ok(())
    }

    fn rewrite(&mut self, instruction: &Instruction, block: &BasicBlockTag) -> Option<Instruction> {
        let args = instruction.arguments();
        match instruction.prototype() {
            InstructionPrototype::Load { element_type, .. } if self.variables.contains_key(&args[0]) => {
                let value = self.read_variable(&args[0], block);
                Some(Instruction::copy(element_type.clone(), value))
            }
            InstructionPrototype::Store { element_type, .. } if self.variables.contains_key(&args[0]) => {
                self.write_variable(&args[0], block, args[1].clone());
                Some(Instruction::copy(element_type.clone(), args[1].clone()))
            }
            _ => None,
        }
    }

    fn can_seal(&self, block: &BasicBlockTag) -> bool {
        self.predecessors
            .get_predecessors_of(block)
            .iter()
            .all(|pred| self.filled.contains(pred))
    }

    fn is_sealed(&self, block: &BasicBlockTag) -> bool {
        !self.incomplete_phis.contains_key(block)
    }

    fn seal(&mut self, block: &BasicBlockTag) {
        if let Some(phis) = self.incomplete_phis.remove(block) {
            for (variable, phi) in phis {
                self.pending.push_back(PendingPhi {
                    variable,
                    block: block.clone(),
                    phi,
                });
            }
        }
    }

    fn write_variable(&mut self, variable: &ValueTag, block: &BasicBlockTag, value: ValueTag) {
        if let Some(defs) = self.current_def.get_mut(variable) {
            defs.insert(block.clone(), value);
        }
    }

    fn lookup_def(&self, variable: &ValueTag, block: &BasicBlockTag) -> Option<ValueTag> {
        self.current_def
            .get(variable)
            .and_then(|defs| defs.get(block))
            .cloned()
    }

    fn new_phi(variable: &ValueTag) -> ValueTag {
        ValueTag::new(format!("{}.phi", variable.name()))
    }

    /// The value `variable` holds at the current point of `block`.
    fn read_variable(&mut self, variable: &ValueTag, block: &BasicBlockTag) -> ValueTag {
        let mut walked: Vec<BasicBlockTag> = Vec::new();
        let mut current = block.clone();

        let value = loop {
            if let Some(value) = self.lookup_def(variable, &current) {
                break value;
            }
            if !self.is_sealed(&current) {
                let phi = Self::new_phi(variable);
                if let Some(phis) = self.incomplete_phis.get_mut(&current) {
                    phis.push((variable.clone(), phi.clone()));
                }
                break phi;
            }

            let preds = self.predecessors.get_predecessors_of(&current);
            let single = (preds.len() == 1)
                .then(|| preds.iter().next().cloned())
                .flatten()
                .filter(|pred| *pred != current && !walked.contains(pred));
            if let Some(pred) = single {
                walked.push(std::mem::replace(&mut current, pred));
                continue;
            }

            let phi = Self::new_phi(variable);
            self.pending.push_back(PendingPhi {
                variable: variable.clone(),
                block: current.clone(),
                phi: phi.clone(),
            });
            break phi;
        };

        self.write_variable(variable, &current, value.clone());
        for tag in &walked {
            self.write_variable(variable, tag, value.clone());
        }
        value
    }

    /// Appends the parameters of pending phis together with one argument per branch
    /// into their block.
    fn resolve_pending(&mut self) -> Result<()> {
        while let Some(PendingPhi {
            variable,
            block,
            phi,
        }) = self.pending.pop_front()
        {
            let preds: Vec<BasicBlockTag> = self
                .predecessors
                .get_predecessors_of(&block)
                .iter()
                .cloned()
                .collect();
            let values: Vec<ValueTag> = preds
                .iter()
                .map(|pred| self.read_variable(&variable, pred))
                .collect();

            let ty = self
                .variables
                .get(&variable)
                .cloned()
                .unwrap_or(Type::Void);
            let mut parameters = self.builder.graph().basic_block(&block)?.parameters().to_vec();
            parameters.push(BlockParameter::with_tag(ty, phi));
            self.builder.set_parameters(&block, parameters)?;

            for (pred, value) in preds.iter().zip(values) {
                let flow = self.builder.graph().basic_block(pred)?.flow().clone();
                let branches = flow
                    .branches()
                    .into_iter()
                    .map(|branch| {
                        if branch.target == block {
                            branch.add_argument(BranchArgument::Value(value.clone()))
                        } else {
                            branch.clone()
                        }
                    })
                    .collect();
                self.builder.set_flow(pred, flow.with_branches(branches))?;
            }
        }
        Ok(())
    }

    fn fix_entry_parameters(
        &mut self,
        entry: &BasicBlockTag,
        old_parameters: &[BlockParameter],
    ) -> Result<()> {
        let parameters = self.builder.graph().basic_block(entry)?.parameters().to_vec();
        if parameters.len() == old_parameters.len() {
            return Ok(());
        }
        let old_tags: FxHashSet<&ValueTag> = old_parameters.iter().map(|p| &p.tag).collect();

        if self.predecessors.get_predecessors_of(entry).is_empty() {
            self.builder.set_parameters(entry, old_parameters.to_vec())?;
            let mut replacements = FxHashMap::default();
            let added = parameters.iter().filter(|p| !old_tags.contains(&p.tag));
            for (index, parameter) in added.enumerate() {
                let constant = self.builder.insert_instruction(
                    entry,
                    index,
                    Instruction::default_constant(parameter.ty.clone()),
                    parameter.tag.name(),
                )?;
                replacements.insert(parameter.tag.clone(), constant);
            }
            return self.builder.replace_uses(&replacements);
        }

        let thunk = self
            .builder
            .add_basic_block(format!("{}.thunk", entry.name()))?;
        let mut renamed = FxHashMap::default();
        for parameter in old_parameters {
            let tag = self
                .builder
                .append_parameter(&thunk, parameter.ty.clone(), parameter.tag.name())?;
            renamed.insert(parameter.tag.clone(), tag);
        }
        let mut arguments = Vec::with_capacity(parameters.len());
        for parameter in &parameters {
            let value = match renamed.get(&parameter.tag) {
                Some(tag) => tag.clone(),
                None => self.builder.append_instruction(
                    &thunk,
                    Instruction::default_constant(parameter.ty.clone()),
                    parameter.tag.name(),
                )?,
            };
            arguments.push(value);
        }
        self.builder
            .set_flow(&thunk, BlockFlow::Jump(Branch::with_values(entry.clone(), arguments)))?;
        self.builder.set_entry_point(&thunk)
    }
}
