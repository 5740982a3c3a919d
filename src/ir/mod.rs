//! The intermediate representation: an immutable SSA control-flow graph.
//!
//! A [`FlowGraph`] is a set of [`BasicBlock`]s connected by [`Branch`]es. Each block has
//! an ordered list of [`BlockParameter`]s (the SSA join mechanism), an ordered list of
//! named instructions and a terminating [`BlockFlow`]. Every value is named by a
//! [`ValueTag`] and defined exactly once.
//!
//! # Key Components
//!
//! - [`FlowGraph`] - The immutable graph and its attached analysis cache
//! - [`FlowGraphBuilder`] - Staged edits producing new graph revisions
//! - [`FlowGraphUpdate`] - The log of edits between two revisions
//! - [`Instruction`] / [`InstructionPrototype`] - Operations and their static metadata
//! - [`Type`] / [`Method`] - The opaque type surface the IR consumes

mod block;
mod builder;
mod constant;
mod flow;
mod graph;
mod instruction;
mod prototype;
mod tag;
mod types;
mod update;

pub use block::{BasicBlock, BlockParameter};
pub use builder::FlowGraphBuilder;
pub use constant::{Constant, IntegerConstant};
pub use flow::{BlockFlow, Branch, BranchArgument, SwitchCase, SwitchFlow, TryFlow};
pub use graph::FlowGraph;
pub use instruction::{Instruction, NamedInstruction};
pub use prototype::{ArithmeticOp, InstructionPrototype, ARITHMETIC_NAMESPACE};
pub use tag::{BasicBlockTag, ValueTag};
pub use types::{IntegerSpec, Method, MethodAttributes, MethodLookup, PointerKind, Type};
pub use update::{FlowGraphUpdate, MemberMapping};
