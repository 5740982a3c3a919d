//! Side effects: exception and memory specifications, exception delayability, and the
//! per-graph set of effectful instructions built on top of them.
//!
//! # Layers
//!
//! - [`PrototypeExceptionSpecs`] / [`PrototypeMemorySpecs`] - graph-independent rule
//!   tables keyed by prototype shape, installed as constant analyses
//! - [`ExceptionDelayability`] - a policy deciding which exceptions may be raised late
//! - [`InstructionExceptionSpecs`] - prototype specifications refined with nullability
//! - [`EffectfulInstructions`] - the instructions dead-code elimination must keep and
//!   reordering must respect
//!
//! The delayability policy and the specification tables evolve independently; swapping
//! one (through [`crate::ir::FlowGraph::with_analysis`]) changes the effect set without
//! touching the other.

mod delayability;
mod effectful;
mod instruction_specs;
mod specs;

pub use delayability::{DelayabilityPolicy, ExceptionDelayability};
pub use effectful::{EffectfulInstructionAnalysis, EffectfulInstructions};
pub use instruction_specs::{InstructionExceptionSpecs, InstructionExceptionSpecsAnalysis};
pub use specs::{
    ExceptionSpecification, MemorySpecification, PrototypeExceptionSpecs, PrototypeMemorySpecs,
    ARRAY_GET_ELEMENT_POINTER, ARRAY_GET_LENGTH, ARRAY_LOAD_ELEMENT, ARRAY_NEW,
    ARRAY_STORE_ELEMENT, EXCEPTION_RETHROW, EXCEPTION_THROW,
};
