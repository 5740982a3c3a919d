//! Generic fixpoint engines over flow graphs.
//!
//! Two engines are provided:
//!
//! - [`BlockFixpointAnalysis`]: a forward, block-granular worklist solver over
//!   arbitrary per-block states (see [`fixpoint`])
//! - [`LatticeAnalysis`]: a sparse, conditional value-granular solver whose facts
//!   also decide which branches are live (see [`lattice`])
//!
//! Both are plain solvers. Wrapping them in [`BlockFixpoint`] or [`SparseLattice`] turns
//! them into [`FlowGraphAnalysis`](crate::analysis::FlowGraphAnalysis) implementations
//! whose results the graph caches.
//!
//! # Example
//!
//! ```rust
//! use flowir::{
//!     analysis::BlockReachability,
//!     ir::{BlockFlow, FlowGraph},
//! };
//!
//! let mut builder = FlowGraph::new().to_builder();
//! let entry = builder.entry_point_tag().clone();
//! let next = builder.add_basic_block("next").unwrap();
//! let dead = builder.add_basic_block("dead").unwrap();
//! builder.set_flow(&entry, BlockFlow::jump(next.clone())).unwrap();
//! let graph = builder.build();
//!
//! let reachability = graph.get_analysis_result::<BlockReachability>().unwrap();
//! assert!(reachability.is_reachable(&next));
//! assert!(!reachability.is_reachable(&dead));
//! ```

pub mod fixpoint;
pub mod lattice;

pub use fixpoint::{
    BlockFixpoint, BlockFixpointAnalysis, BlockFixpointResults, BlockReachability,
    BlockReachabilityAnalysis, EntryDistance,
};
pub use lattice::{LatticeAnalysis, LatticeCells, LatticeResults, SparseLattice};
