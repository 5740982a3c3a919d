//! Sparse conditional constant propagation.
//!
//! Values are assigned cells of a four-level lattice:
//!
//! ```text
//!            Top
//!          /     \
//!   Constant(v)  NonNull
//!          \     /
//!          Bottom
//! ```
//!
//! `Top` means "no evaluation has reached this value yet", `Constant(v)` that every
//! execution computes `v`, `NonNull` that the value is an unknown but non-null pointer,
//! and `Bottom` that nothing is known. The lattice is solved with the sparse conditional
//! engine in [`crate::analysis::dataflow::lattice`], so blocks only become live when a
//! branch that may actually be taken reaches them.
//!
//! # Transform
//!
//! Once the cells are known:
//!
//! 1. Instructions in live blocks whose cell is a constant become constant instructions.
//! 2. Parameters of live non-entry blocks whose cell is a constant are replaced by a
//!    constant materialized at the start of the entry block.
//! 3. Blocks that never became live lose their instructions and end in `unreachable`.
//! 4. Switches drop the cases that can no longer be taken; a switch on a constant becomes
//!    a jump. Returned values that fold are returned as constants.
//!
//! The now-unused definitions are left for dead value elimination.
//!
//! # Example
//!
//! Before:
//! ```text
//! entry:
//!   two = const 2
//!   switch copy(two) { 1 -> a, 2 -> b, default -> c }
//! ```
//!
//! After:
//! ```text
//! entry:
//!   two = const 2
//!   jump b
//! a: unreachable
//! c: unreachable
//! ```

use std::{collections::BTreeSet, fmt, sync::Arc};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{dataflow::lattice, LatticeAnalysis, LatticeCells, ValueNullability},
    compiler::{
        evaluate::{ConstantEvaluator, DefaultEvaluator},
        pass::GraphPass,
    },
    ir::{
        BlockFlow, Branch, Constant, FlowGraph, Instruction, InstructionPrototype,
        NamedInstruction, PointerKind, SwitchFlow, Type, ValueTag,
    },
    Result,
};

/// A cell of the constant propagation lattice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantCell {
    /// Not evaluated yet.
    Top,
    /// Always this constant.
    Constant(Constant),
    /// Some non-null pointer.
    NonNull,
    /// Unknown.
    Bottom,
}

impl ConstantCell {
    /// The constant, if this cell holds one.
    #[must_use]
    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            ConstantCell::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// The greatest lower bound of two cells.
    #[must_use]
    pub fn meet(&self, other: &ConstantCell) -> ConstantCell {
        match (self, other) {
            (ConstantCell::Top, cell) | (cell, ConstantCell::Top) => cell.clone(),
            (ConstantCell::Constant(a), ConstantCell::Constant(b)) if a == b => self.clone(),
            (ConstantCell::NonNull, ConstantCell::NonNull) => ConstantCell::NonNull,
            _ => ConstantCell::Bottom,
        }
    }
}

/// The constant propagation lattice problem.
///
/// Folding is delegated to a [`ConstantEvaluator`]. Instructions that do not fold still
/// get a [`ConstantCell::NonNull`] cell when [`ValueNullability`] proves their pointer
/// result non-null.
#[derive(Clone)]
pub struct ConstantLattice {
    evaluator: Arc<dyn ConstantEvaluator>,
}

impl fmt::Debug for ConstantLattice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantLattice").finish_non_exhaustive()
    }
}

impl Default for ConstantLattice {
    fn default() -> Self {
        Self::new(Arc::new(DefaultEvaluator))
    }
}

impl ConstantLattice {
    /// Creates the lattice problem on top of `evaluator`.
    #[must_use]
    pub fn new(evaluator: Arc<dyn ConstantEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Evaluates a named instruction, or an anonymous flow instruction when `tag` is
    /// `None`.
    fn evaluate_instruction(
        &self,
        instruction: &Instruction,
        tag: Option<&ValueTag>,
        cells: &LatticeCells<ConstantCell>,
        nullability: &ValueNullability,
    ) -> ConstantCell {
        let prototype = instruction.prototype();
        if prototype.is_copy() {
            if let Some(source) = instruction.arguments().first() {
                return cells.get(source).clone();
            }
        }

        let mut constants = Vec::with_capacity(instruction.arguments().len());
        let mut found_top = false;
        let mut found_unknown = false;
        for argument in instruction.arguments() {
            match cells.get(argument) {
                ConstantCell::Top => found_top = true,
                ConstantCell::Constant(value) => constants.push(value.clone()),
                ConstantCell::NonNull | ConstantCell::Bottom => found_unknown = true,
            }
        }

        if !found_unknown {
            if found_top {
                return ConstantCell::Top;
            }
            if let Some(value) = self.evaluator.evaluate(prototype, &constants) {
                return ConstantCell::Constant(value);
            }
        }

        if is_non_null(instruction, tag, nullability) {
            ConstantCell::NonNull
        } else {
            ConstantCell::Bottom
        }
    }
}

/// Only pointers and generic parameters can be null at all, so only they get a
/// `NonNull` cell.
fn is_non_null(instruction: &Instruction, tag: Option<&ValueTag>, nullability: &ValueNullability) -> bool {
    let result_type = instruction.result_type();
    if !matches!(result_type, Type::Pointer(..) | Type::GenericParameter(_)) {
        return false;
    }
    match tag {
        Some(tag) => nullability.is_non_null(tag),
        None => {
            matches!(
                instruction.prototype(),
                InstructionPrototype::Alloca { .. } | InstructionPrototype::NewObject { .. }
            ) || matches!(result_type, Type::Pointer(_, PointerKind::Reference))
        }
    }
}

/// Indices of the switch branches a condition with cell `condition` may take.
fn live_switch_branches(switch: &SwitchFlow, condition: &ConstantCell) -> Vec<usize> {
    let default = switch.cases.len();
    match condition {
        ConstantCell::Top => Vec::new(),
        ConstantCell::Constant(value) => vec![switch
            .cases
            .iter()
            .position(|case| case.values.contains(value))
            .unwrap_or(default)],
        ConstantCell::NonNull => (0..=default)
            .filter(|&index| {
                index == default || !switch.cases[index].values.iter().all(Constant::is_null)
            })
            .collect(),
        ConstantCell::Bottom => (0..=default).collect(),
    }
}

impl LatticeAnalysis for ConstantLattice {
    type Cell = ConstantCell;

    fn top(&self) -> ConstantCell {
        ConstantCell::Top
    }

    fn bottom(&self) -> ConstantCell {
        ConstantCell::Bottom
    }

    fn meet(&self, first: &ConstantCell, second: &ConstantCell) -> ConstantCell {
        first.meet(second)
    }

    fn evaluate(
        &self,
        instruction: &NamedInstruction,
        cells: &LatticeCells<ConstantCell>,
        graph: &FlowGraph,
    ) -> Result<ConstantCell> {
        let nullability = graph.get_analysis_result::<ValueNullability>()?;
        Ok(self.evaluate_instruction(
            instruction.instruction(),
            Some(instruction.tag()),
            cells,
            &nullability,
        ))
    }

    fn live_branches(
        &self,
        flow: &BlockFlow,
        cells: &LatticeCells<ConstantCell>,
        graph: &FlowGraph,
    ) -> Result<Vec<usize>> {
        match flow {
            BlockFlow::Switch(switch) => {
                let nullability = graph.get_analysis_result::<ValueNullability>()?;
                let condition = self.evaluate_instruction(&switch.value, None, cells, &nullability);
                Ok(live_switch_branches(switch, &condition))
            }
            _ => Ok((0..flow.branches().len()).collect()),
        }
    }
}

/// Folds constants and removes the code they prove unreachable.
#[derive(Debug, Clone, Default)]
pub struct ConstantPropagationPass {
    lattice: ConstantLattice,
}

impl ConstantPropagationPass {
    /// Creates a constant propagation pass using the [`DefaultEvaluator`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a constant propagation pass that folds with `evaluator`.
    #[must_use]
    pub fn with_evaluator(evaluator: Arc<dyn ConstantEvaluator>) -> Self {
        Self {
            lattice: ConstantLattice::new(evaluator),
        }
    }

    fn rewrite_flow(
        &self,
        flow: &BlockFlow,
        live: Option<&BTreeSet<usize>>,
        cells: &LatticeCells<ConstantCell>,
        nullability: &ValueNullability,
    ) -> Option<BlockFlow> {
        match flow {
            BlockFlow::Return(value) => {
                let cell = self.lattice.evaluate_instruction(value, None, cells, nullability);
                let folded = cell.as_constant()?;
                if value.prototype().as_constant() == Some(folded) {
                    return None;
                }
                Some(BlockFlow::Return(Instruction::constant(
                    folded.clone(),
                    value.result_type(),
                )))
            }
            BlockFlow::Switch(switch) => {
                let live = live.filter(|live| !live.is_empty())?;
                let branches = flow.branches();
                let condition =
                    self.lattice
                        .evaluate_instruction(&switch.value, None, cells, nullability);
                if condition.as_constant().is_some() && live.len() == 1 {
                    let taken: &Branch = live.first().and_then(|&index| branches.get(index))?;
                    return Some(BlockFlow::Jump(taken.clone()));
                }

                let mut cases: Vec<_> = switch
                    .cases
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| live.contains(index))
                    .map(|(_, case)| case.clone())
                    .collect();
                let default = if live.contains(&switch.cases.len()) {
                    switch.default.clone()
                } else {
                    cases.pop()?.branch
                };
                let pruned =
                    BlockFlow::Switch(SwitchFlow::new(switch.value.clone(), cases, default));
                (pruned != *flow).then_some(pruned)
            }
            BlockFlow::Jump(_) | BlockFlow::Try(_) | BlockFlow::Unreachable => None,
        }
    }
}

impl GraphPass for ConstantPropagationPass {
    fn name(&self) -> &'static str {
        "constant-propagation"
    }

    fn description(&self) -> &'static str {
        "Sparse conditional constant propagation"
    }

    fn run(&self, graph: &FlowGraph) -> Result<FlowGraph> {
        let results = lattice::solve(&self.lattice, graph)?;
        let nullability = graph.get_analysis_result::<ValueNullability>()?;
        let entry = graph.entry_point_tag().clone();
        let mut builder = graph.to_builder();
        let mut folded = 0usize;
        let mut killed = 0usize;

        for block in graph.basic_blocks() {
            let tag = block.tag();
            if !results.is_live(tag) {
                let already_dead =
                    block.instruction_tags().is_empty() && *block.flow() == BlockFlow::Unreachable;
                if !already_dead {
                    for insn in block.instruction_tags() {
                        builder.remove_instruction(insn)?;
                    }
                    builder.set_flow(tag, BlockFlow::Unreachable)?;
                    killed += 1;
                }
                continue;
            }

            for insn in block.named_instructions() {
                let Some(value) = results.get_cell(insn.tag()).as_constant() else {
                    continue;
                };
                if insn.prototype().as_constant() != Some(value) {
                    builder.replace_instruction(
                        insn.tag(),
                        Instruction::constant(value.clone(), insn.instruction().result_type()),
                    )?;
                    folded += 1;
                }
            }

            let live_branches = results.get_live_branches(tag);
            if let Some(flow) =
                self.rewrite_flow(block.flow(), live_branches, results.cells(), &nullability)
            {
                builder.set_flow(tag, flow)?;
            }
        }

        let mut replacements = FxHashMap::default();
        for block in graph.basic_blocks() {
            if block.is_entry_point() || !results.is_live(block.tag()) {
                continue;
            }
            for param in block.parameters() {
                if let Some(value) = results.get_cell(&param.tag).as_constant() {
                    let constant = builder.insert_instruction(
                        &entry,
                        0,
                        Instruction::constant(value.clone(), param.ty.clone()),
                        param.tag.name(),
                    )?;
                    replacements.insert(param.tag.clone(), constant);
                }
            }
        }
        folded += replacements.len();
        builder.replace_uses(&replacements)?;
        let parameters: FxHashSet<ValueTag> = replacements.into_keys().collect();
        builder.remove_definitions(&parameters)?;

        if !builder.has_changes() {
            return Ok(graph.clone());
        }
        tracing::debug!(pass = self.name(), folded, killed, "propagated constants");
        Ok(builder.build())
    }
}
