//! Pass scheduler for orchestrating graph pass execution.
//!
//! The `PassScheduler` runs its passes in order, over and over, until a full round leaves
//! the graph unchanged or the iteration limit is reached. Passes signal "no change" by
//! returning their input revision. A scheduler built from an [`OptimizerConfig`] installs
//! the configured exception delayability on every graph it optimizes, so the effect
//! analyses the passes consult follow the configuration.

use rayon::prelude::*;

use crate::{
    analysis::{
        ConstantAnalysis, DelayabilityPolicy, EffectfulInstructionAnalysis,
        ExceptionDelayability, InstructionOrderingAnalysis,
    },
    compiler::{
        pass::GraphPass,
        passes::{
            AllocaToRegisterPass, ConstantPropagationPass, CopyPropagationPass,
            DeadBlockEliminationPass, DeadValueEliminationPass,
        },
    },
    config::OptimizerConfig,
    ir::FlowGraph,
    Result,
};

/// Runs a pipeline of [`GraphPass`]es to a fixpoint.
///
/// # Examples
///
/// ```rust
/// use flowir::{
///     compiler::PassScheduler,
///     config::OptimizerConfig,
///     ir::{BlockFlow, Constant, FlowGraph, Instruction, Type},
/// };
///
/// let mut builder = FlowGraph::new().to_builder();
/// let entry = builder.entry_point_tag().clone();
/// let unused = builder.append_instruction(&entry, Instruction::constant(Constant::i32(1), Type::int32()), "unused")?;
/// builder.set_flow(&entry, BlockFlow::Return(Instruction::default_constant(Type::int32())))?;
/// let graph = builder.build();
///
/// let scheduler = PassScheduler::from_config(&OptimizerConfig::default());
/// let optimized = scheduler.optimize(&graph)?;
/// assert!(!optimized.contains_value(&unused));
/// # Ok::<(), flowir::Error>(())
/// ```
pub struct PassScheduler {
    /// Maximum number of rounds over the whole pipeline.
    max_iterations: usize,
    /// Whether [`PassScheduler::optimize_all`] uses the rayon thread pool.
    parallel: bool,
    /// Delayability policy installed on optimized graphs; `None` keeps the graph's own.
    exception_delayability: Option<DelayabilityPolicy>,
    /// The passes, in execution order.
    passes: Vec<Box<dyn GraphPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::from_config(&OptimizerConfig::default())
    }
}

impl PassScheduler {
    /// Creates a scheduler without passes.
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            parallel: true,
            exception_delayability: None,
            passes: Vec::new(),
        }
    }

    /// Creates a scheduler running the passes `config` enables, in the order:
    /// alloca-to-register, constant propagation, copy propagation, dead value
    /// elimination, dead block elimination.
    #[must_use]
    pub fn from_config(config: &OptimizerConfig) -> Self {
        let mut scheduler = Self::new(config.max_iterations);
        scheduler.parallel = config.parallel;
        scheduler.exception_delayability = Some(config.exception_delayability);
        if config.enable_alloca_to_register {
            scheduler.add_pass(AllocaToRegisterPass::new());
        }
        if config.enable_constant_propagation {
            scheduler.add_pass(ConstantPropagationPass::new());
        }
        if config.enable_copy_propagation {
            scheduler.add_pass(CopyPropagationPass::new());
        }
        if config.enable_dead_value_elimination {
            scheduler.add_pass(DeadValueEliminationPass::new());
        }
        if config.enable_dead_block_elimination {
            scheduler.add_pass(DeadBlockEliminationPass::new());
        }
        scheduler
    }

    /// Appends a pass to the pipeline.
    pub fn add_pass(&mut self, pass: impl GraphPass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Names of the scheduled passes, in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// The iteration limit.
    #[must_use]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Optimizes one graph.
    ///
    /// # Errors
    ///
    /// Returns the first error any pass reports.
    pub fn optimize(&self, graph: &FlowGraph) -> Result<FlowGraph> {
        let mut current = self.with_policies(graph)?;
        for iteration in 0..self.max_iterations {
            let mut changed = false;
            for pass in &self.passes {
                let next = pass.run(&current)?;
                if !next.is_same_revision(&current) {
                    tracing::trace!(pass = pass.name(), iteration, "pass changed the graph");
                    changed = true;
                    current = next;
                }
            }
            if !changed {
                tracing::debug!(iterations = iteration + 1, "optimization converged");
                return Ok(current);
            }
        }
        tracing::debug!(
            max_iterations = self.max_iterations,
            "optimization stopped at the iteration limit"
        );
        Ok(current)
    }

    /// The configured delayability policy, if any.
    #[must_use]
    pub fn exception_delayability(&self) -> Option<DelayabilityPolicy> {
        self.exception_delayability
    }

    /// Installs the configured analysis policies on `graph`. Keeps the revision.
    ///
    /// The analyses that read the policy are reinstalled too, so results `graph` already
    /// cached under another policy are not reused.
    fn with_policies(&self, graph: &FlowGraph) -> Result<FlowGraph> {
        let Some(policy) = self.exception_delayability else {
            return Ok(graph.clone());
        };
        if let Some(installed) = graph.try_get_analysis_result::<ExceptionDelayability>()? {
            if installed.policy() == policy {
                return Ok(graph.clone());
            }
        }
        graph
            .with_analysis(ConstantAnalysis::new(ExceptionDelayability::new(policy)))?
            .with_analysis(EffectfulInstructionAnalysis)?
            .with_analysis(InstructionOrderingAnalysis)
    }

    /// Optimizes independent graphs, in parallel unless the scheduler was configured
    /// otherwise. Results are in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if optimizing any graph fails.
    pub fn optimize_all(&self, graphs: &[FlowGraph]) -> Result<Vec<FlowGraph>> {
        if self.parallel {
            graphs.par_iter().map(|graph| self.optimize(graph)).collect()
        } else {
            graphs.iter().map(|graph| self.optimize(graph)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        analysis::effects::ARRAY_GET_ELEMENT_POINTER,
        ir::{BlockFlow, Constant, Instruction, InstructionPrototype, PointerKind, Type},
    };

    /// Appends one instruction per run until it has run `budget` times.
    struct GrowingPass {
        budget: usize,
        runs: AtomicUsize,
    }

    impl GraphPass for GrowingPass {
        fn name(&self) -> &'static str {
            "growing"
        }

        fn run(&self, graph: &FlowGraph) -> Result<FlowGraph> {
            if self.runs.fetch_add(1, Ordering::SeqCst) >= self.budget {
                return Ok(graph.clone());
            }
            let mut builder = graph.to_builder();
            let entry = builder.entry_point_tag().clone();
            builder.append_instruction(&entry, Instruction::constant(Constant::i32(0), Type::int32()), "grown")?;
            Ok(builder.build())
        }
    }

    fn growing(budget: usize) -> GrowingPass {
        GrowingPass {
            budget,
            runs: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_default_pipeline() {
        let scheduler = PassScheduler::default();
        assert_eq!(scheduler.max_iterations(), 8);
        assert_eq!(
            scheduler.pass_names(),
            vec![
                "alloca-to-register",
                "constant-propagation",
                "copy-propagation",
                "dead-value-elimination",
                "dead-block-elimination",
            ]
        );
    }

    #[test]
    fn test_disabled_passes_are_skipped() {
        let config = OptimizerConfig {
            enable_alloca_to_register: false,
            enable_copy_propagation: false,
            ..OptimizerConfig::default()
        };
        let scheduler = PassScheduler::from_config(&config);
        assert_eq!(
            scheduler.pass_names(),
            vec![
                "constant-propagation",
                "dead-value-elimination",
                "dead-block-elimination",
            ]
        );
    }

    #[test]
    fn test_runs_until_no_change() {
        let mut scheduler = PassScheduler::new(10);
        scheduler.add_pass(growing(3));
        let optimized = scheduler.optimize(&FlowGraph::new()).unwrap();
        assert_eq!(optimized.named_instructions().len(), 3);
    }

    #[test]
    fn test_iteration_limit() {
        let mut scheduler = PassScheduler::new(2);
        scheduler.add_pass(growing(usize::MAX));
        let optimized = scheduler.optimize(&FlowGraph::new()).unwrap();
        assert_eq!(optimized.named_instructions().len(), 2);
    }

    #[test]
    fn test_optimize_all_keeps_order() {
        let graphs: Vec<FlowGraph> = (0..4)
            .map(|value| {
                let mut builder = FlowGraph::new().to_builder();
                let entry = builder.entry_point_tag().clone();
                builder
                    .set_flow(
                        &entry,
                        BlockFlow::Return(Instruction::constant(Constant::i32(value), Type::int32())),
                    )
                    .unwrap();
                builder.build()
            })
            .collect();

        let optimized = PassScheduler::default().optimize_all(&graphs).unwrap();
        assert_eq!(optimized.len(), 4);
        for (value, graph) in (0..4).zip(&optimized) {
            match graph.entry_point().unwrap().flow() {
                BlockFlow::Return(insn) => {
                    assert_eq!(insn.prototype().as_constant(), Some(&Constant::i32(value)));
                }
                other => panic!("expected a return, found {:?}", other),
            }
        }
    }

    /// `entry(array): gep = array.get_element_pointer(array, 0); return 0`
    fn unused_element_address() -> (FlowGraph, crate::ir::ValueTag) {
        let mut builder = FlowGraph::new().to_builder();
        let entry = builder.entry_point_tag().clone();
        let array = builder
            .append_parameter(&entry, Type::pointer_to(Type::int32(), PointerKind::Box), "array")
            .unwrap();
        let index = builder
            .append_instruction(&entry, Instruction::default_constant(Type::int32()), "index")
            .unwrap();
        let gep = builder
            .append_instruction(
                &entry,
                Instruction::new(
                    InstructionPrototype::Intrinsic {
                        name: ARRAY_GET_ELEMENT_POINTER.into(),
                        result_type: Type::pointer_to(Type::int32(), PointerKind::Transient),
                        parameter_types: vec![
                            Type::pointer_to(Type::int32(), PointerKind::Box),
                            Type::int32(),
                        ],
                    },
                    vec![array, index],
                ),
                "gep",
            )
            .unwrap();
        builder
            .set_flow(&entry, BlockFlow::Return(Instruction::default_constant(Type::int32())))
            .unwrap();
        (builder.build(), gep)
    }

    #[test]
    fn test_configured_delayability_reaches_the_passes() {
        let (graph, gep) = unused_element_address();

        let strict = PassScheduler::default();
        assert_eq!(strict.exception_delayability(), Some(DelayabilityPolicy::Strict));
        assert!(strict.optimize(&graph).unwrap().contains_value(&gep));

        let permissive = PassScheduler::from_config(&OptimizerConfig {
            exception_delayability: DelayabilityPolicy::Permissive,
            ..OptimizerConfig::default()
        });
        let optimized = permissive.optimize(&graph).unwrap();
        assert!(!optimized.contains_value(&gep));
        assert_eq!(
            optimized
                .get_analysis_result::<ExceptionDelayability>()
                .unwrap()
                .policy(),
            DelayabilityPolicy::Permissive
        );

        // The input graph keeps its own policy.
        assert_eq!(
            graph
                .get_analysis_result::<ExceptionDelayability>()
                .unwrap()
                .policy(),
            DelayabilityPolicy::Strict
        );
    }

    #[test]
    fn test_bare_scheduler_keeps_graph_policy() {
        let (graph, gep) = unused_element_address();
        let graph = graph
            .with_analysis(ConstantAnalysis::new(ExceptionDelayability::new(
                DelayabilityPolicy::Permissive,
            )))
            .unwrap();

        let mut scheduler = PassScheduler::new(4);
        scheduler.add_pass(crate::compiler::DeadValueEliminationPass::new());
        assert_eq!(scheduler.exception_delayability(), None);
        assert!(!scheduler.optimize(&graph).unwrap().contains_value(&gep));
    }
}
