//! # flowir Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the flowir library. Import this module to get quick access to the essential
//! types for building, analyzing and optimizing flow graphs.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all flowir operations
pub use crate::Error;

/// The result type used throughout flowir
pub use crate::Result;

/// Optimizer configuration
pub use crate::config::OptimizerConfig;

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Graphs, builders and edit logs
pub use crate::ir::{BasicBlock, FlowGraph, FlowGraphBuilder, FlowGraphUpdate};

/// Tags naming blocks and values
pub use crate::ir::{BasicBlockTag, ValueTag};

/// Instructions and their prototypes
pub use crate::ir::{ArithmeticOp, Instruction, InstructionPrototype, NamedInstruction};

/// Constants
pub use crate::ir::{Constant, IntegerConstant};

/// Block parameters and terminators
pub use crate::ir::{
    BlockFlow, BlockParameter, Branch, BranchArgument, SwitchCase, SwitchFlow, TryFlow,
};

/// The opaque type surface
pub use crate::ir::{IntegerSpec, Method, MethodAttributes, MethodLookup, PointerKind, Type};

// ================================================================================================
// Analyses
// ================================================================================================

/// The analysis contract and the registry of defaults
pub use crate::analysis::{AnalysisRegistry, FlowGraphAnalysis};

/// Fixpoint engines
pub use crate::analysis::{BlockFixpointAnalysis, LatticeAnalysis};

/// Frequently requested analysis results
pub use crate::analysis::{
    BasicBlockPredecessors, BlockReachability, DominatorTree, EffectfulInstructions,
    ValueNullability, ValueUses,
};

// ================================================================================================
// Compiler
// ================================================================================================

/// Passes and the scheduler
pub use crate::compiler::{GraphPass, PassScheduler};
