use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The flow graph core has a deliberately small failure surface. Well-formed graphs never make
/// an analysis fail; the only recoverable condition is asking a graph for an analysis result
/// that nobody knows how to compute. Everything else signals an internal invariant violation.
///
/// # Error Categories
///
/// ## Analysis Errors
/// - [`Error::AnalysisNotRegistered`] - No installed analysis and no registry default for a result type
/// - [`Error::AnalysisMismatch`] - A cache slot produced a result of an unexpected type
/// - [`Error::LockError`] - An analysis cache lock was poisoned by a panicking analysis
///
/// ## Graph Errors
/// - [`Error::Malformed`] - A graph invariant was violated (dangling tag, duplicate definition, ...)
///
/// # Examples
///
/// ```rust
/// use flowir::{Error, analysis::DominatorTree, ir::FlowGraph, analysis::AnalysisRegistry};
/// use std::sync::Arc;
///
/// let graph = FlowGraph::with_registry(Arc::new(AnalysisRegistry::empty()));
/// match graph.get_analysis_result::<DominatorTree>() {
///     Err(Error::AnalysisNotRegistered { result_type }) => {
///         eprintln!("no analysis for {}", result_type);
///     }
///     Err(e) => eprintln!("other error: {}", e),
///     Ok(_) => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// No analysis is installed for the requested result type and the graph's analysis
    /// registry has no default for it either.
    ///
    /// This is a lookup failure, not a transient condition: retrying on the same graph
    /// yields the same error. Install the analysis with
    /// [`crate::ir::FlowGraph::with_analysis`] or register a default in the
    /// [`crate::analysis::AnalysisRegistry`] the graph was created with.
    #[error("No analysis registered for result type '{result_type}'")]
    AnalysisNotRegistered {
        /// Name of the requested result type
        result_type: &'static str,
    },

    /// A cache slot produced a value whose type differs from the requested result type.
    ///
    /// Only reachable through a result alias whose projection returns the wrong type.
    #[error("Analysis result mismatch - expected '{expected}', found '{found}'")]
    AnalysisMismatch {
        /// Name of the requested result type
        expected: &'static str,
        /// Name of the result type the slot actually stores
        found: &'static str,
    },

    /// The flow graph violates one of its structural invariants.
    ///
    /// Dangling block or value tags, values defined twice, arguments that do not match a
    /// prototype's arity and branches whose argument lists do not match their target's
    /// parameter list all end up here. These are bugs in whatever produced the graph.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Failed to lock target.
    ///
    /// This error occurs when an analysis panicked while holding a cache node's lock,
    /// leaving the lock poisoned for every later reader.
    #[error("Failed to lock target")]
    LockError,
}
