//! Optimizer configuration.

use crate::analysis::DelayabilityPolicy;

/// Selects the passes the [`PassScheduler`](crate::compiler::PassScheduler) runs and the
/// policies the default analyses use.
///
/// # Examples
///
/// ```rust
/// use flowir::{analysis::DelayabilityPolicy, config::OptimizerConfig};
///
/// let config = OptimizerConfig {
///     enable_copy_propagation: false,
///     exception_delayability: DelayabilityPolicy::Permissive,
///     ..OptimizerConfig::default()
/// };
/// assert_eq!(config.max_iterations, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Upper bound on the number of times the pass pipeline is repeated.
    pub max_iterations: usize,
    /// Promote stack slots that are only loaded and stored to SSA values.
    pub enable_alloca_to_register: bool,
    /// Run sparse conditional constant propagation.
    pub enable_constant_propagation: bool,
    /// Forward copies and trivial block parameters.
    pub enable_copy_propagation: bool,
    /// Delete values nothing observable depends on.
    pub enable_dead_value_elimination: bool,
    /// Delete blocks the entry point cannot reach.
    pub enable_dead_block_elimination: bool,
    /// Whether exceptions may be raised later than the instruction that causes them.
    pub exception_delayability: DelayabilityPolicy,
    /// Optimize independent graphs on the rayon thread pool.
    pub parallel: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            enable_alloca_to_register: true,
            enable_constant_propagation: true,
            enable_copy_propagation: true,
            enable_dead_value_elimination: true,
            enable_dead_block_elimination: true,
            exception_delayability: DelayabilityPolicy::Strict,
            parallel: true,
        }
    }
}
