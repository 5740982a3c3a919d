//! Memoization of analysis results.
//!
//! Every [`crate::ir::FlowGraph`] owns a macro cache that maps result keys to lazily
//! materialized per-analysis cache nodes. Deriving a new graph revision derives a new
//! macro cache in time proportional to the number of installed analyses, without running
//! any of them. A result is computed the first time it is requested for a revision,
//! incrementally from the nearest materialized ancestor when there is one.

mod key;
mod macro_cache;
mod node;
mod registry;

pub use key::{ResultAlias, ResultKey};
pub use registry::AnalysisRegistry;

pub(crate) use macro_cache::MacroAnalysisCache;
