//! Analyses over flow graphs and the machinery that memoizes them.
//!
//! # Architecture
//!
//! - [`FlowGraphAnalysis`] - the contract every analysis implements
//! - [`cache`] - per-graph memoization of results, keyed by result type, and the
//!   [`AnalysisRegistry`] of defaults
//! - [`dataflow`] - generic block-level and sparse lattice fixpoint engines
//! - concrete analyses: predecessors, dominators, value uses, liveness, interference,
//!   nullability, aliasing, side [`effects`], instruction ordering and value numbering
//!
//! Results are requested through the graph, never computed directly:
//!
//! ```rust
//! use flowir::{
//!     analysis::DominatorTree,
//!     ir::{BlockFlow, FlowGraph},
//! };
//!
//! let mut builder = FlowGraph::new().to_builder();
//! let entry = builder.entry_point_tag().clone();
//! let exit = builder.add_basic_block("exit").unwrap();
//! builder.set_flow(&entry, BlockFlow::jump(exit.clone())).unwrap();
//! let graph = builder.build();
//!
//! let dominators = graph.get_analysis_result::<DominatorTree>().unwrap();
//! assert!(dominators.is_strictly_dominated_by(&exit, &entry));
//! ```

pub mod cache;
pub mod dataflow;
pub mod effects;

mod alias;
mod dominators;
mod interference;
mod liveness;
mod nullability;
mod numbering;
mod ordering;
mod predecessors;
mod traits;
mod uses;

pub use alias::{AliasAnalysisResult, Aliasing, TrivialAliasAnalysis};
pub use cache::{AnalysisRegistry, ResultAlias, ResultKey};
pub use dataflow::{
    BlockFixpoint, BlockFixpointAnalysis, BlockFixpointResults, BlockReachability,
    BlockReachabilityAnalysis, LatticeAnalysis, LatticeCells, LatticeResults, SparseLattice,
};
pub use dominators::{DominatorTree, DominatorTreeAnalysis};
pub use effects::{
    DelayabilityPolicy, EffectfulInstructionAnalysis, EffectfulInstructions,
    ExceptionDelayability, ExceptionSpecification, InstructionExceptionSpecs,
    InstructionExceptionSpecsAnalysis, MemorySpecification, PrototypeExceptionSpecs,
    PrototypeMemorySpecs,
};
pub use interference::{InterferenceGraph, InterferenceGraphAnalysis};
pub use liveness::{BlockLiveness, LivenessAnalysis, ValueLiveness};
pub use nullability::{is_non_null_type, NullabilityAnalysis, ValueNullability};
pub use numbering::{is_copyable, ValueNumbering, ValueNumberingAnalysis};
pub use ordering::{InstructionOrdering, InstructionOrderingAnalysis};
pub use predecessors::{BasicBlockPredecessors, PredecessorAnalysis};
pub use traits::{ConstantAnalysis, FlowGraphAnalysis};
pub use uses::{ValueUseAnalysis, ValueUses};
