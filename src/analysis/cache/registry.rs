//! The registry of default analyses.

use std::{fmt, sync::Arc};

use rustc_hash::FxHashMap;

use crate::{
    analysis::{
        alias::TrivialAliasAnalysis,
        dataflow::BlockReachabilityAnalysis,
        cache::{
            key::ResultKey,
            node::{AnalysisCacheNode, CacheSlot},
        },
        dominators::DominatorTreeAnalysis,
        effects::{
            DelayabilityPolicy, EffectfulInstructionAnalysis, ExceptionDelayability,
            InstructionExceptionSpecsAnalysis, PrototypeExceptionSpecs, PrototypeMemorySpecs,
        },
        interference::InterferenceGraphAnalysis,
        liveness::LivenessAnalysis,
        nullability::NullabilityAnalysis,
        numbering::ValueNumberingAnalysis,
        ordering::InstructionOrderingAnalysis,
        predecessors::PredecessorAnalysis,
        traits::{ConstantAnalysis, FlowGraphAnalysis},
        uses::ValueUseAnalysis,
    },
    config::OptimizerConfig,
    ir::FlowGraph,
};

type SlotFactory = dyn Fn(&FlowGraph) -> Arc<dyn CacheSlot> + Send + Sync;

/// A directory of default analyses, keyed by result type.
///
/// A graph consults its registry the first time a result type is requested that no
/// installed analysis answers. The registry is an ordinary value: graphs created with
/// different registries see different defaults.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use flowir::{
///     analysis::{AnalysisRegistry, BasicBlockPredecessors, PredecessorAnalysis},
///     ir::FlowGraph,
/// };
///
/// let mut registry = AnalysisRegistry::empty();
/// registry.register(PredecessorAnalysis);
///
/// let graph = FlowGraph::with_registry(Arc::new(registry));
/// assert!(graph.get_analysis_result::<BasicBlockPredecessors>().is_ok());
/// ```
#[derive(Clone, Default)]
pub struct AnalysisRegistry {
    factories: FxHashMap<ResultKey, Arc<SlotFactory>>,
}

impl AnalysisRegistry {
    /// A registry without any default.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding every analysis this crate ships, with strict exception
    /// delayability.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register(PredecessorAnalysis)
            .register(DominatorTreeAnalysis)
            .register(BlockReachabilityAnalysis)
            .register(ValueUseAnalysis)
            .register(LivenessAnalysis)
            .register(InterferenceGraphAnalysis)
            .register(ConstantAnalysis::new(PrototypeExceptionSpecs::default()))
            .register(ConstantAnalysis::new(PrototypeMemorySpecs::default()))
            .register(ConstantAnalysis::new(ExceptionDelayability::new(
                DelayabilityPolicy::Strict,
            )))
            .register(InstructionExceptionSpecsAnalysis)
            .register(EffectfulInstructionAnalysis)
            .register(NullabilityAnalysis)
            .register(TrivialAliasAnalysis)
            .register(InstructionOrderingAnalysis)
            .register(ValueNumberingAnalysis);
        registry
    }

    /// The standard registry with the policies selected by `config`.
    #[must_use]
    pub fn from_config(config: &OptimizerConfig) -> Self {
        let mut registry = Self::standard();
        registry.register(ConstantAnalysis::new(ExceptionDelayability::new(
            config.exception_delayability,
        )));
        registry
    }

    /// Registers `analysis` as the default for its result type and its aliases.
    ///
    /// Every graph that falls back on this registry shares the analysis object; each
    /// graph revision still gets its own cache node.
    pub fn register<A: FlowGraphAnalysis>(&mut self, analysis: A) -> &mut Self {
        let keys: Vec<ResultKey> = std::iter::once(ResultKey::of::<A::Output>())
            .chain(analysis.aliases().iter().map(|alias| alias.key()))
            .collect();
        let analysis = Arc::new(analysis);
        let factory: Arc<SlotFactory> = Arc::new(move |_graph: &FlowGraph| {
            Arc::new(AnalysisCacheNode::new(Arc::clone(&analysis))) as Arc<dyn CacheSlot>
        });

        for key in keys {
            self.factories.insert(key, Arc::clone(&factory));
        }
        self
    }

    /// Registers a factory that builds the analysis for the graph that needs it.
    ///
    /// Only the factory's primary result key is registered.
    pub fn register_with<A, F>(&mut self, factory: F) -> &mut Self
    where
        A: FlowGraphAnalysis,
        F: Fn(&FlowGraph) -> A + Send + Sync + 'static,
    {
        let factory: Arc<SlotFactory> = Arc::new(move |graph: &FlowGraph| {
            Arc::new(AnalysisCacheNode::new(Arc::new(factory(graph)))) as Arc<dyn CacheSlot>
        });
        self.factories.insert(ResultKey::of::<A::Output>(), factory);
        self
    }

    /// Returns `true` if a default is registered for `key`.
    #[must_use]
    pub fn contains(&self, key: ResultKey) -> bool {
        self.factories.contains_key(&key)
    }

    /// Returns `true` if a default is registered for result type `T`.
    #[must_use]
    pub fn contains_result<T: 'static>(&self) -> bool {
        self.contains(ResultKey::of::<T>())
    }

    pub(crate) fn create(&self, key: ResultKey, graph: &FlowGraph) -> Option<Arc<dyn CacheSlot>> {
        self.factories.get(&key).map(|factory| factory(graph))
    }
}

impl fmt::Debug for AnalysisRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&'static str> = self.factories.keys().map(ResultKey::name).collect();
        names.sort_unstable();
        f.debug_struct("AnalysisRegistry")
            .field("results", &names)
            .finish()
    }
}
