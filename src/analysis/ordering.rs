//! A conservative must-run-before relation between the named instructions of a block.
//!
//! The dependency relation is built from these rules, then closed transitively:
//!
//! 1. Throwing instructions whose exceptions cannot be delayed are totally ordered.
//! 2. Memory operations are ordered when their footprints may overlap:
//!    - reads depend on earlier writes to possibly aliasing addresses;
//!    - writes depend on earlier reads and writes of possibly aliasing addresses;
//!    - throwing instructions depend on earlier writes;
//!    - writes depend on earlier throwing instructions.
//! 3. Instructions depend on arguments defined earlier in the same block.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{
        alias::{AliasAnalysisResult, Aliasing},
        effects::{
            ExceptionDelayability, InstructionExceptionSpecs, MemorySpecification,
            PrototypeMemorySpecs,
        },
        FlowGraphAnalysis,
    },
    ir::{BasicBlock, FlowGraph, ValueTag},
    Result,
};

/// The transitive must-run-before relation between instructions of the same block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionOrdering {
    dependencies: FxHashMap<ValueTag, FxHashSet<ValueTag>>,
}

impl InstructionOrdering {
    /// Returns `true` if `first` must run before `second`.
    ///
    /// Instructions in different blocks are never related.
    #[must_use]
    pub fn must_run_before(&self, first: &ValueTag, second: &ValueTag) -> bool {
        self.dependencies
            .get(second)
            .is_some_and(|deps| deps.contains(first))
    }

    /// Every instruction `tag` transitively depends on.
    #[must_use]
    pub fn get_dependencies(&self, tag: &ValueTag) -> Option<&FxHashSet<ValueTag>> {
        self.dependencies.get(tag)
    }
}

struct Oracles {
    memory: Arc<PrototypeMemorySpecs>,
    exceptions: Arc<InstructionExceptionSpecs>,
    aliasing: Arc<AliasAnalysisResult>,
    delayability: Arc<ExceptionDelayability>,
}

#[derive(Default)]
struct BlockState {
    known_writes: Vec<(ValueTag, ValueTag)>,
    known_reads: Vec<(ValueTag, ValueTag)>,
    unknown_writes: Vec<ValueTag>,
    unknown_reads: Vec<ValueTag>,
    last_write: Option<ValueTag>,
    last_read: Option<ValueTag>,
    last_thrower: Option<ValueTag>,
    last_strict_thrower: Option<ValueTag>,
}

fn order_block(
    block: &BasicBlock<'_>,
    oracles: &Oracles,
    dependencies: &mut FxHashMap<ValueTag, FxHashSet<ValueTag>>,
) {
    let mut state = BlockState::default();
    let mut seen: FxHashSet<ValueTag> = FxHashSet::default();

    for insn in block.named_instructions() {
        let tag = insn.tag().clone();
        let instruction = insn.instruction();
        let prototype = instruction.prototype();
        let memory = oracles.memory.get_memory_specification(prototype);
        let throws = oracles
            .exceptions
            .get_exception_specification(instruction)
            .can_throw_something();

        let mut deps: FxHashSet<ValueTag> = FxHashSet::default();
        let previous_thrower = state.last_thrower.clone();
        let previous_read = state.last_read.clone();

        if throws {
            deps.extend(state.last_write.clone());
            if !oracles.delayability.can_delay_exceptions(prototype) {
                deps.extend(state.last_strict_thrower.replace(tag.clone()));
            }
            state.last_thrower = Some(tag.clone());
        }

        if memory.may_read() {
            deps.extend(state.unknown_writes.iter().cloned());
            if let MemorySpecification::ArgumentRead(index) = memory {
                let address = instruction.arguments()[index].clone();
                deps.extend(
                    state
                        .known_writes
                        .iter()
                        .filter(|(_, written)| {
                            oracles.aliasing.get_aliasing(written, &address) != Aliasing::NoAlias
                        })
                        .map(|(writer, _)| writer.clone()),
                );
                state.known_reads.push((tag.clone(), address));
            } else {
                deps.extend(state.last_write.clone());
                state.unknown_reads.push(tag.clone());
            }
            state.last_read = Some(tag.clone());
        }

        if memory.may_write() {
            deps.extend(state.unknown_writes.iter().cloned());
            deps.extend(state.unknown_reads.iter().cloned());
            if let MemorySpecification::ArgumentWrite(index) = memory {
                let address = instruction.arguments()[index].clone();
                deps.extend(
                    state
                        .known_writes
                        .iter()
                        .chain(&state.known_reads)
                        .filter(|(other, touched)| {
                            *other != tag
                                && oracles.aliasing.get_aliasing(touched, &address)
                                    != Aliasing::NoAlias
                        })
                        .map(|(other, _)| other.clone()),
                );
                state.known_writes.push((tag.clone(), address));
            } else {
                deps.extend(state.last_write.clone());
                deps.extend(previous_read);
                deps.extend(state.known_reads.iter().map(|(reader, _)| reader.clone()));
                deps.extend(state.known_writes.iter().map(|(writer, _)| writer.clone()));
                state.unknown_writes.push(tag.clone());
            }
            deps.extend(previous_thrower);
            state.last_write = Some(tag.clone());
        }

        deps.extend(
            instruction
                .arguments()
                .iter()
                .filter(|arg| seen.contains(*arg))
                .cloned(),
        );
        deps.remove(&tag);

        let direct: Vec<ValueTag> = deps.iter().cloned().collect();
        for dep in direct {
            if let Some(transitive) = dependencies.get(&dep) {
                deps.extend(transitive.iter().cloned());
            }
        }

        seen.insert(tag.clone());
        dependencies.insert(tag, deps);
    }
}

/// Computes the [`InstructionOrdering`] from memory and exception specifications,
/// aliasing and exception delayability.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstructionOrderingAnalysis;

impl FlowGraphAnalysis for InstructionOrderingAnalysis {
    type Output = InstructionOrdering;

    fn analyze(&self, graph: &FlowGraph) -> Result<InstructionOrdering> {
        let oracles = Oracles {
            memory: graph.get_analysis_result::<PrototypeMemorySpecs>()?,
            exceptions: graph.get_analysis_result::<InstructionExceptionSpecs>()?,
            aliasing: graph.get_analysis_result::<AliasAnalysisResult>()?,
            delayability: graph.get_analysis_result::<ExceptionDelayability>()?,
        };
        let mut dependencies = FxHashMap::default();
        for block in graph.basic_blocks() {
            order_block(&block, &oracles, &mut dependencies);
        }
        Ok(InstructionOrdering { dependencies })
    }
}
