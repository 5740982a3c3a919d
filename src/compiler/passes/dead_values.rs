//! Dead value elimination.
//!
//! A value is live if something observable depends on it. The roots are:
//!
//! - effectful instructions (see [`EffectfulInstructions`])
//! - parameters of the entry block
//! - arguments of flow instructions
//!
//! Liveness then flows backwards from a live instruction to its arguments and from a
//! live block parameter to every branch argument that feeds it. Everything else is
//! deleted; dead parameters take their branch arguments with them.
//!
//! Stores are effectful, but a store into an `alloca` of the same graph is only
//! observable through that slot. Such stores are live only once their slot is.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::EffectfulInstructions,
    compiler::pass::GraphPass,
    ir::{FlowGraph, InstructionPrototype, NamedInstruction, ValueTag},
    Result,
};

/// Deletes instructions and block parameters nothing observable depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadValueEliminationPass;

impl DeadValueEliminationPass {
    /// Creates a new dead value elimination pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Returns the slot a store writes to, if the slot is a local `alloca`.
fn local_store_slot(graph: &FlowGraph, insn: &NamedInstruction) -> Option<ValueTag> {
    if !matches!(insn.prototype(), InstructionPrototype::Store { .. }) {
        return None;
    }
    let pointer = insn.arguments().first()?;
    let slot = graph.get_instruction(pointer)?;
    slot.prototype().is_alloca().then(|| pointer.clone())
}

fn compute_live_values(graph: &FlowGraph) -> Result<FxHashSet<ValueTag>> {
    let effectful = graph.get_analysis_result::<EffectfulInstructions>()?;

    let mut roots: Vec<ValueTag> = graph.entry_point()?.parameter_tags().cloned().collect();
    let mut deferred_stores: Vec<(ValueTag, ValueTag)> = Vec::new();
    for insn in graph.named_instructions() {
        if !effectful.contains(insn.tag()) {
            continue;
        }
        match local_store_slot(graph, &insn) {
            Some(slot) => deferred_stores.push((insn.tag().clone(), slot)),
            None => roots.push(insn.tag().clone()),
        }
    }

    let mut parameter_arguments: FxHashMap<ValueTag, Vec<ValueTag>> = FxHashMap::default();
    for block in graph.basic_blocks() {
        let flow = block.flow();
        for instruction in flow.instructions() {
            roots.extend(instruction.arguments().iter().cloned());
        }
        for branch in flow.branches() {
            let target = graph.basic_block(&branch.target)?;
            for (param, argument) in target.parameter_tags().zip(&branch.arguments) {
                if let Some(value) = argument.as_value() {
                    parameter_arguments
                        .entry(param.clone())
                        .or_default()
                        .push(value.clone());
                }
            }
        }
    }

    let mut live: FxHashSet<ValueTag> = FxHashSet::default();
    let mut worklist = roots;
    loop {
        while let Some(value) = worklist.pop() {
            if !live.insert(value.clone()) {
                continue;
            }
            if let Some(arguments) = parameter_arguments.get(&value) {
                worklist.extend(arguments.iter().cloned());
            } else if let Some(insn) = graph.get_instruction(&value) {
                worklist.extend(insn.arguments().iter().cloned());
            }
        }

        worklist.extend(
            deferred_stores
                .iter()
                .filter(|(store, slot)| live.contains(slot) && !live.contains(store))
                .map(|(store, _)| store.clone()),
        );
        if worklist.is_empty() {
            return Ok(live);
        }
    }
}

impl GraphPass for DeadValueEliminationPass {
    fn name(&self) -> &'static str {
        "dead-value-elimination"
    }

    fn description(&self) -> &'static str {
        "Removes unused instructions and block parameters without effects"
    }

    fn run(&self, graph: &FlowGraph) -> Result<FlowGraph> {
        let live = compute_live_values(graph)?;
        let dead: FxHashSet<ValueTag> = graph
            .value_tags()
            .filter(|value| !live.contains(*value))
            .cloned()
            .collect();
        if dead.is_empty() {
            return Ok(graph.clone());
        }

        let mut builder = graph.to_builder();
        builder.remove_definitions(&dead)?;
        tracing::debug!(pass = self.name(), removed = dead.len(), "removed dead values");
        Ok(builder.build())
    }
}
