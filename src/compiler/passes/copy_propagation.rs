//! Copy propagation pass.
//!
//! Replaces every use of a copy with a use of the copied value. Block parameters are
//! treated as copies too when they are trivial: every branch that reaches the block
//! passes either the same value or the parameter itself. Trivial parameters are removed
//! together with the branch arguments that fed them; the copy instructions themselves are
//! left for dead value elimination.
//!
//! # Example
//!
//! Before:
//! ```text
//! entry(x):
//!   y = copy(x)
//!   jump head(y)
//! head(p):
//!   switch ... { ... -> head(p), default -> exit }
//! exit:
//!   return copy(p)
//! ```
//!
//! After:
//! ```text
//! entry(x):
//!   y = copy(x)
//!   jump head
//! head:
//!   switch ... { ... -> head, default -> exit }
//! exit:
//!   return copy(x)
//! ```
//!
//! Entry block parameters are never trivial: their values come from the caller. Neither
//! are parameters fed by a try flow's result or exception.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    compiler::pass::GraphPass,
    ir::{BranchArgument, FlowGraph, ValueTag},
    Result,
};

/// Forwards copies and trivial block parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyPropagationPass;

impl CopyPropagationPass {
    /// Creates a new copy propagation pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Follows `forwards` from `value` to the value it ultimately stands for.
fn resolve(forwards: &FxHashMap<ValueTag, ValueTag>, value: &ValueTag) -> ValueTag {
    let mut current = value;
    // A chain can never be longer than the map; the bound also stops on cycles.
    for _ in 0..=forwards.len() {
        match forwards.get(current) {
            Some(next) => current = next,
            None => break,
        }
    }
    current.clone()
}

/// Maps every non-entry parameter to the arguments it receives, or to `None` if some
/// branch passes it a try marker.
fn collect_parameter_arguments(graph: &FlowGraph) -> Result<FxHashMap<ValueTag, Option<Vec<ValueTag>>>> {
    let mut arguments: FxHashMap<ValueTag, Option<Vec<ValueTag>>> = FxHashMap::default();
    for block in graph.basic_blocks() {
        if block.is_entry_point() {
            continue;
        }
        for param in block.parameter_tags() {
            arguments.insert(param.clone(), Some(Vec::new()));
        }
    }

    for block in graph.basic_blocks() {
        for branch in block.flow().branches() {
            let target = graph.basic_block(&branch.target)?;
            for (param, argument) in target.parameter_tags().zip(&branch.arguments) {
                let Some(entry) = arguments.get_mut(param) else {
                    continue;
                };
                match argument {
                    BranchArgument::Value(value) => {
                        if let Some(values) = entry {
                            values.push(value.clone());
                        }
                    }
                    BranchArgument::TryResult | BranchArgument::TryException => *entry = None,
                }
            }
        }
    }
    Ok(arguments)
}

impl GraphPass for CopyPropagationPass {
    fn name(&self) -> &'static str {
        "copy-propagation"
    }

    fn description(&self) -> &'static str {
        "Forwards copies and removes trivial block parameters"
    }

    fn run(&self, graph: &FlowGraph) -> Result<FlowGraph> {
        let mut forwards: FxHashMap<ValueTag, ValueTag> = FxHashMap::default();
        for insn in graph.named_instructions() {
            if insn.prototype().is_copy() {
                if let Some(source) = insn.arguments().first() {
                    if source != insn.tag() {
                        forwards.insert(insn.tag().clone(), source.clone());
                    }
                }
            }
        }

        // Removing one trivial parameter can make another one trivial, so iterate.
        let parameter_arguments = collect_parameter_arguments(graph)?;
        let mut trivial: FxHashSet<ValueTag> = FxHashSet::default();
        loop {
            let mut changed = false;
            for (param, arguments) in &parameter_arguments {
                let Some(arguments) = arguments else {
                    continue;
                };
                if trivial.contains(param) {
                    continue;
                }
                let distinct: FxHashSet<ValueTag> = arguments
                    .iter()
                    .map(|value| resolve(&forwards, value))
                    .filter(|value| value != param)
                    .collect();
                if distinct.len() == 1 {
                    if let Some(source) = distinct.into_iter().next() {
                        forwards.insert(param.clone(), source);
                        trivial.insert(param.clone());
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        let replacements: FxHashMap<ValueTag, ValueTag> = forwards
            .keys()
            .map(|value| (value.clone(), resolve(&forwards, value)))
            .filter(|(value, source)| value != source)
            .collect();

        let mut builder = graph.to_builder();
        builder.replace_uses(&replacements)?;
        builder.remove_definitions(&trivial)?;
        if !builder.has_changes() {
            return Ok(graph.clone());
        }

        tracing::debug!(
            pass = self.name(),
            copies = replacements.len().saturating_sub(trivial.len()),
            parameters = trivial.len(),
            "propagated copies"
        );
        Ok(builder.build())
    }
}
