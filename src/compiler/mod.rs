//! Graph-to-graph transformations.
//!
//! This module sits on top of [`crate::analysis`]: passes ask the graph for the analyses
//! they need and stage their edits in a [`FlowGraphBuilder`](crate::ir::FlowGraphBuilder),
//! so every analysis the output needs can be derived incrementally from the input's.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  PassScheduler              fixpoint over the enabled passes │
//! │    ├─ optimize()            one graph                        │
//! │    └─ optimize_all()        many graphs, on rayon            │
//! │                                                              │
//! │  GraphPass trait            FlowGraph -> FlowGraph           │
//! │                                                              │
//! │  Passes                                                      │
//! │    ├─ alloca-to-register    SSA construction for locals      │
//! │    ├─ constant-propagation  sparse conditional, lattice-based│
//! │    ├─ copy-propagation      copies, trivial parameters       │
//! │    ├─ dead-value-elimination                                 │
//! │    └─ dead-block-elimination                                 │
//! │                                                              │
//! │  ConstantEvaluator          pluggable constant folding       │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod evaluate;
mod pass;
mod passes;
mod scheduler;

pub use evaluate::{ConstantEvaluator, DefaultEvaluator};
pub use pass::GraphPass;
pub use passes::{
    AllocaToRegisterPass, ConstantCell, ConstantLattice, ConstantPropagationPass,
    CopyPropagationPass, DeadBlockEliminationPass, DeadValueEliminationPass,
};
pub use scheduler::PassScheduler;
