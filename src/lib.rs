// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # flowir
//!
//! An immutable, SSA-based control-flow-graph intermediate representation with a lazily
//! computed, incrementally maintained analysis cache, and the optimization passes built
//! on top of it.
//!
//! ## Features
//!
//! - **Immutable graphs** - every edit produces a new [`ir::FlowGraph`] revision that
//!   shares structure with its parent and can be handed to other threads freely
//! - **Incremental analyses** - results are computed on first request, and a derived
//!   graph replays the edit log against its parent's results instead of recomputing
//! - **Generic fixpoint engines** - block-level and sparse conditional lattice solvers
//! - **SSA construction** for stack slots, constant propagation, copy propagation and
//!   dead code elimination, run to a fixpoint by a [`compiler::PassScheduler`]
//!
//! ## Quick Start
//!
//! ```rust
//! use flowir::prelude::*;
//!
//! // entry: a = alloca<i32>; store(a, 41); t = load(a); b = t + 1; return b
//! let int = Type::int32();
//! let mut builder = FlowGraph::new().to_builder();
//! let entry = builder.entry_point_tag().clone();
//! let slot = builder.append_instruction(&entry, Instruction::alloca(int.clone()), "a")?;
//! let value = builder.append_instruction(&entry, Instruction::constant(Constant::i32(41), int.clone()), "c41")?;
//! builder.append_instruction(&entry, Instruction::store(int.clone(), slot.clone(), value), "s")?;
//! let loaded = builder.append_instruction(&entry, Instruction::load(int.clone(), slot), "t")?;
//! let one = builder.append_instruction(&entry, Instruction::constant(Constant::i32(1), int.clone()), "one")?;
//! let sum = builder.append_instruction(
//!     &entry,
//!     Instruction::arithmetic(ArithmeticOp::Add, int.clone(), int.clone(), vec![loaded, one]),
//!     "b",
//! )?;
//! builder.set_flow(&entry, BlockFlow::Return(Instruction::copy(int, sum)))?;
//! let graph = builder.build();
//!
//! let optimized = PassScheduler::default().optimize(&graph)?;
//! assert!(optimized.named_instructions().is_empty());
//! match optimized.entry_point()?.flow() {
//!     BlockFlow::Return(value) => assert_eq!(value.prototype().as_constant(), Some(&Constant::i32(42))),
//!     _ => unreachable!(),
//! }
//! # Ok::<(), flowir::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - tags, types, instructions, flows, the graph and its builder
//! - [`analysis`] - the analysis contract, the per-graph cache and the built-in analyses
//! - [`compiler`] - graph passes and the scheduler that runs them
//! - [`config`] - optimizer configuration
//! - [`prelude`] - re-exports of the commonly used types
//! - [`Error`] and [`Result`] - error handling

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use flowir::prelude::*;
///
/// let graph = FlowGraph::new();
/// let dominators = graph.get_analysis_result::<DominatorTree>()?;
/// assert_eq!(dominators.get_immediate_dominator(graph.entry_point_tag()), None);
/// # Ok::<(), flowir::Error>(())
/// ```
pub mod prelude;

/// The SSA flow graph intermediate representation.
///
/// # Key Types
///
/// - [`ir::FlowGraph`] - an immutable graph revision together with its analysis cache
/// - [`ir::FlowGraphBuilder`] - staged edits that derive new revisions
/// - [`ir::Instruction`], [`ir::InstructionPrototype`] - operations
/// - [`ir::BlockFlow`], [`ir::Branch`] - block terminators
pub mod ir;

/// Analyses over flow graphs and the cache that memoizes them.
pub mod analysis;

/// Graph-to-graph optimization passes.
pub mod compiler;

/// Optimizer configuration.
pub mod config;

/// `flowir` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `flowir` Error type
///
/// # Examples
///
/// ```rust
/// use flowir::{analysis::DominatorTree, ir::FlowGraph, Error};
///
/// let graph = FlowGraph::new();
/// match graph.get_analysis_result::<DominatorTree>() {
///     Ok(tree) => println!("{:?}", tree),
///     Err(Error::AnalysisNotRegistered { result_type }) => println!("missing {}", result_type),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;
