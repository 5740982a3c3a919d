//! Sparse, conditional value-level lattice solver.
//!
//! A [`LatticeAnalysis`] assigns every value a cell of a bounded lattice. The solver only
//! ever evaluates instructions in blocks that some live branch reaches, so facts about
//! values refine which branches are live, which in turn decides which blocks are visited.
//!
//! # Algorithm
//!
//! Two worklists interact:
//!
//! - the **value worklist** holds values whose cell may change. An instruction's new cell
//!   is the meet of its old cell and [`LatticeAnalysis::evaluate`]; a block parameter's
//!   new cell is the meet of its old cell and the cells of every argument a live branch
//!   passed to it. When a cell changes, its instruction users and flow users are queued.
//! - the **flow worklist** holds blocks whose flow must be (re)examined. The first visit
//!   to a block queues all of its instructions. Each visit asks
//!   [`LatticeAnalysis::live_branches`] which branches may be taken, marks their targets
//!   live, records their arguments against the target parameters and queues the targets.
//!
//! Cells only move down, toward [`LatticeAnalysis::bottom`]. On a finite-height lattice
//! the solver therefore terminates.

use std::collections::{BTreeSet, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{FlowGraphAnalysis, ValueUses},
    ir::{
        BasicBlockTag, BlockFlow, BlockParameter, BranchArgument, FlowGraph, NamedInstruction,
        ValueTag,
    },
    Result,
};

/// Current cells of the values of a graph. Values without a cell are at the top.
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeCells<C> {
    cells: FxHashMap<ValueTag, C>,
    top: C,
}

impl<C: Clone + PartialEq> LatticeCells<C> {
    fn new(top: C) -> Self {
        Self {
            cells: FxHashMap::default(),
            top,
        }
    }

    /// The cell of `value`.
    #[must_use]
    pub fn get(&self, value: &ValueTag) -> &C {
        self.cells.get(value).unwrap_or(&self.top)
    }

    /// Iterates over the values that left the top cell.
    pub fn iter(&self) -> impl Iterator<Item = (&ValueTag, &C)> {
        self.cells.iter()
    }

    fn set(&mut self, value: ValueTag, cell: C) -> bool {
        if self.get(&value) == &cell {
            return false;
        }
        self.cells.insert(value, cell);
        true
    }
}

/// A value-level dataflow problem over a bounded lattice.
pub trait LatticeAnalysis: Send + Sync + 'static {
    /// A lattice cell.
    type Cell: Clone + PartialEq + Send + Sync + 'static;

    /// The top cell: `meet(top, x) == x` for every `x`.
    fn top(&self) -> Self::Cell;

    /// The bottom cell: `meet(bottom, x) == bottom` for every `x`.
    fn bottom(&self) -> Self::Cell;

    /// The greatest lower bound of two cells.
    fn meet(&self, first: &Self::Cell, second: &Self::Cell) -> Self::Cell;

    /// The cell of a parameter of the entry block. Such values come from outside the
    /// graph, hence bottom by default.
    fn entry_parameter_cell(&self, parameter: &BlockParameter) -> Self::Cell {
        let _ = parameter;
        self.bottom()
    }

    /// Evaluates an instruction given the current cells.
    ///
    /// # Errors
    ///
    /// Implementations report failed lookups of dependent analyses.
    fn evaluate(
        &self,
        instruction: &NamedInstruction,
        cells: &LatticeCells<Self::Cell>,
        graph: &FlowGraph,
    ) -> Result<Self::Cell>;

    /// The indices, into [`BlockFlow::branches`], of the branches `flow` may take given
    /// the current cells. Every branch by default.
    ///
    /// # Errors
    ///
    /// Implementations report failed lookups of dependent analyses.
    fn live_branches(
        &self,
        flow: &BlockFlow,
        cells: &LatticeCells<Self::Cell>,
        graph: &FlowGraph,
    ) -> Result<Vec<usize>> {
        let _ = (cells, graph);
        Ok((0..flow.branches().len()).collect())
    }
}

/// The fixpoint of a [`LatticeAnalysis`].
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeResults<C> {
    cells: LatticeCells<C>,
    live_blocks: FxHashSet<BasicBlockTag>,
    live_branches: FxHashMap<BasicBlockTag, BTreeSet<usize>>,
}

impl<C: Clone + PartialEq> LatticeResults<C> {
    /// The final cell of `value`; values in dead blocks stay at the top.
    #[must_use]
    pub fn get_cell(&self, value: &ValueTag) -> &C {
        self.cells.get(value)
    }

    /// All final cells.
    #[must_use]
    pub fn cells(&self) -> &LatticeCells<C> {
        &self.cells
    }

    /// Returns `true` if some live branch reaches `block`. The entry is always live.
    #[must_use]
    pub fn is_live(&self, block: &BasicBlockTag) -> bool {
        self.live_blocks.contains(block)
    }

    /// The live blocks.
    #[must_use]
    pub fn live_blocks(&self) -> &FxHashSet<BasicBlockTag> {
        &self.live_blocks
    }

    /// Indices, into [`BlockFlow::branches`], of the branches of `block` that may be
    /// taken. `None` for dead blocks.
    #[must_use]
    pub fn get_live_branches(&self, block: &BasicBlockTag) -> Option<&BTreeSet<usize>> {
        self.live_branches.get(block)
    }
}

struct Solver<'a, A: LatticeAnalysis> {
    analysis: &'a A,
    graph: &'a FlowGraph,
    uses: &'a ValueUses,
    cells: LatticeCells<A::Cell>,
    bottom: A::Cell,
    parameter_arguments: FxHashMap<ValueTag, FxHashSet<ValueTag>>,
    visited: FxHashSet<BasicBlockTag>,
    live_blocks: FxHashSet<BasicBlockTag>,
    live_branches: FxHashMap<BasicBlockTag, BTreeSet<usize>>,
    value_worklist: VecDeque<ValueTag>,
    flow_worklist: VecDeque<BasicBlockTag>,
}

impl<A: LatticeAnalysis> Solver<'_, A> {
    fn run(&mut self) -> Result<()> {
        loop {
            while let Some(value) = self.value_worklist.pop_front() {
                self.update_value(value)?;
            }
            match self.flow_worklist.pop_front() {
                Some(block) => self.visit_flow(block)?,
                None => return Ok(()),
            }
        }
    }

    fn update_value(&mut self, value: ValueTag) -> Result<()> {
        let old = self.cells.get(&value).clone();
        if old == self.bottom {
            return Ok(());
        }

        let new = if let Some(insn) = self.graph.get_instruction(&value) {
            if !self.visited.contains(insn.block()) {
                return Ok(());
            }
            let evaluated = self.analysis.evaluate(&insn, &self.cells, self.graph)?;
            self.analysis.meet(&old, &evaluated)
        } else {
            let mut cell = old.clone();
            if let Some(arguments) = self.parameter_arguments.get(&value) {
                for argument in arguments {
                    cell = self.analysis.meet(&cell, self.cells.get(argument));
                    if cell == self.bottom {
                        break;
                    }
                }
            }
            cell
        };

        if self.cells.set(value.clone(), new) {
            self.enqueue_users(&value);
        }
        Ok(())
    }

    fn enqueue_users(&mut self, value: &ValueTag) {
        for user in self.uses.get_instruction_users(value) {
            let in_visited_block = self
                .graph
                .get_value_parent(user)
                .is_some_and(|block| self.visited.contains(block));
            if in_visited_block {
                self.value_worklist.push_back(user.clone());
            }
        }
        for block in self.uses.get_flow_users(value) {
            if self.visited.contains(block) {
                self.flow_worklist.push_back(block.clone());
            }
        }
    }

    fn visit_flow(&mut self, tag: BasicBlockTag) -> Result<()> {
        let graph = self.graph;
        let block = graph.basic_block(&tag)?;
        if self.visited.insert(tag.clone()) {
            self.value_worklist
                .extend(block.instruction_tags().iter().cloned());
        }

        let flow = block.flow();
        let branches = flow.branches();
        let live = self.analysis.live_branches(flow, &self.cells, graph)?;
        let known = self.live_branches.entry(tag).or_default();
        known.extend(live.into_iter().filter(|index| *index < branches.len()));
        let known: Vec<usize> = known.iter().copied().collect();

        // Arguments of already-live branches are revisited too: this visit may stem from
        // an argument's cell changing.
        for index in known {
            let branch = branches[index];
            self.live_blocks.insert(branch.target.clone());
            if !self.visited.contains(&branch.target) {
                self.flow_worklist.push_back(branch.target.clone());
            }

            let target = graph.basic_block(&branch.target)?;
            for (parameter, argument) in target.parameter_tags().zip(&branch.arguments) {
                match argument {
                    BranchArgument::Value(value) => {
                        self.parameter_arguments
                            .entry(parameter.clone())
                            .or_default()
                            .insert(value.clone());
                    }
                    BranchArgument::TryResult | BranchArgument::TryException => {
                        if self.cells.set(parameter.clone(), self.bottom.clone()) {
                            self.enqueue_users(parameter);
                        }
                    }
                }
                self.value_worklist.push_back(parameter.clone());
            }
        }
        Ok(())
    }
}

/// Solves `analysis` over `graph`.
///
/// # Errors
///
/// Fails if [`ValueUses`] is unavailable, if the graph is malformed or if the analysis
/// reports an error.
pub fn solve<A: LatticeAnalysis>(analysis: &A, graph: &FlowGraph) -> Result<LatticeResults<A::Cell>> {
    let uses = graph.get_analysis_result::<ValueUses>()?;
    let entry = graph.entry_point()?;

    let mut cells = LatticeCells::new(analysis.top());
    for parameter in entry.parameters() {
        cells.set(parameter.tag.clone(), analysis.entry_parameter_cell(parameter));
    }

    let mut solver = Solver {
        analysis,
        graph,
        uses: &uses,
        cells,
        bottom: analysis.bottom(),
        parameter_arguments: FxHashMap::default(),
        visited: FxHashSet::default(),
        live_blocks: FxHashSet::from_iter([entry.tag().clone()]),
        live_branches: FxHashMap::default(),
        value_worklist: VecDeque::new(),
        flow_worklist: VecDeque::from([entry.tag().clone()]),
    };
    solver.run()?;

    tracing::trace!(
        live_blocks = solver.live_blocks.len(),
        blocks = graph.block_count(),
        "lattice analysis converged"
    );
    Ok(LatticeResults {
        cells: solver.cells,
        live_blocks: solver.live_blocks,
        live_branches: solver.live_branches,
    })
}

/// Runs a [`LatticeAnalysis`] as a cached [`FlowGraphAnalysis`].
pub struct SparseLattice<A> {
    analysis: A,
}

impl<A: LatticeAnalysis> SparseLattice<A> {
    /// Wraps `analysis`.
    pub fn new(analysis: A) -> Self {
        Self { analysis }
    }
}

impl<A: LatticeAnalysis> FlowGraphAnalysis for SparseLattice<A> {
    type Output = LatticeResults<A::Cell>;

    fn analyze(&self, graph: &FlowGraph) -> Result<Self::Output> {
        solve(&self.analysis, graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        ArithmeticOp, Branch, Constant, Instruction, IntegerConstant, SwitchCase, SwitchFlow,
        Type,
    };

    #[derive(Debug, Clone, PartialEq)]
    enum Known {
        Top,
        Int(IntegerConstant),
        Bottom,
    }

    /// Tracks integer constants through additions.
    struct KnownIntegers;

    impl LatticeAnalysis for KnownIntegers {
        type Cell = Known;

        fn top(&self) -> Known {
            Known::Top
        }

        fn bottom(&self) -> Known {
            Known::Bottom
        }

        fn meet(&self, first: &Known, second: &Known) -> Known {
            match (first, second) {
                (Known::Top, other) | (other, Known::Top) => other.clone(),
                (Known::Int(a), Known::Int(b)) if a == b => first.clone(),
                _ => Known::Bottom,
            }
        }

        fn evaluate(
            &self,
            instruction: &NamedInstruction,
            cells: &LatticeCells<Known>,
            _graph: &FlowGraph,
        ) -> Result<Known> {
            let prototype = instruction.prototype();
            if let Some(value) = prototype.as_constant().and_then(Constant::as_int) {
                return Ok(Known::Int(*value));
            }
            if prototype.as_arithmetic() == Some(ArithmeticOp::Add) {
                let args = instruction.arguments();
                return Ok(match (cells.get(&args[0]), cells.get(&args[1])) {
                    (Known::Int(a), Known::Int(b)) => Known::Int(a.add(b)),
                    (Known::Bottom, _) | (_, Known::Bottom) => Known::Bottom,
                    _ => Known::Top,
                });
            }
            Ok(Known::Bottom)
        }
    }

    #[test]
    fn test_loop_carried_constant() {
        let int = Type::int32();
        let mut builder = FlowGraph::new().to_builder();
        let entry = builder.entry_point_tag().clone();
        let head = builder.add_basic_block("head").unwrap();
        let exit = builder.add_basic_block("exit").unwrap();
        let island = builder.add_basic_block("island").unwrap();

        let flag = builder.append_parameter(&entry, Type::Bool, "flag").unwrap();
        let one = builder
            .append_instruction(&entry, Instruction::constant(Constant::i32(1), int.clone()), "one")
            .unwrap();
        builder
            .set_flow(&entry, BlockFlow::Jump(Branch::with_values(head.clone(), vec![one])))
            .unwrap();

        let p = builder.append_parameter(&head, int.clone(), "p").unwrap();
        let zero = builder
            .append_instruction(&head, Instruction::constant(Constant::i32(0), int.clone()), "zero")
            .unwrap();
        let q = builder
            .append_instruction(
                &head,
                Instruction::arithmetic(ArithmeticOp::Add, int.clone(), int.clone(), vec![p.clone(), zero]),
                "q",
            )
            .unwrap();
        builder
            .set_flow(
                &head,
                BlockFlow::Switch(SwitchFlow::new(
                    Instruction::copy(Type::Bool, flag.clone()),
                    vec![SwitchCase::new(
                        vec![Constant::Bool(true)],
                        Branch::with_values(head.clone(), vec![q.clone()]),
                    )],
                    Branch::with_values(exit.clone(), vec![q.clone()]),
                )),
            )
            .unwrap();

        let r = builder.append_parameter(&exit, int.clone(), "r").unwrap();
        builder
            .set_flow(&exit, BlockFlow::Return(Instruction::copy(int.clone(), r.clone())))
            .unwrap();

        let stranded = builder
            .append_instruction(&island, Instruction::constant(Constant::i32(7), int.clone()), "stranded")
            .unwrap();
        builder
            .set_flow(&island, BlockFlow::Jump(Branch::with_values(exit.clone(), vec![stranded.clone()])))
            .unwrap();
        let graph = builder.build();

        let results = graph
            .with_analysis(SparseLattice::new(KnownIntegers))
            .unwrap()
            .get_analysis_result::<LatticeResults<Known>>()
            .unwrap();

        let expected = Known::Int(IntegerConstant::new(1, crate::ir::IntegerSpec::INT32));
        assert_eq!(results.get_cell(&p), &expected);
        assert_eq!(results.get_cell(&q), &expected);
        assert_eq!(results.get_cell(&r), &expected);
        assert_eq!(results.get_cell(&flag), &Known::Bottom);
        assert_eq!(results.get_cell(&stranded), &Known::Top);
        assert!(results.is_live(&exit));
        assert!(!results.is_live(&island));
        assert_eq!(results.get_live_branches(&head).map(BTreeSet::len), Some(2));
        assert!(results.get_live_branches(&island).is_none());
    }
}
