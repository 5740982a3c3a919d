//! Exception specifications of concrete instructions.
//!
//! Prototype-level specifications are refined with what the graph knows about the
//! instruction's arguments: a null check on an argument that is provably non-null cannot
//! fire.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{
    analysis::{
        effects::specs::{ExceptionSpecification, PrototypeExceptionSpecs},
        nullability::ValueNullability,
        FlowGraphAnalysis,
    },
    ir::{FlowGraph, Instruction},
    Result,
};

/// Exception specifications for every instruction of a graph, named or anonymous.
#[derive(Debug, Clone)]
pub struct InstructionExceptionSpecs {
    prototypes: Arc<PrototypeExceptionSpecs>,
    refined: FxHashMap<Instruction, ExceptionSpecification>,
}

impl InstructionExceptionSpecs {
    /// The exception specification of `instruction`.
    ///
    /// Instructions that do not appear in the analyzed graph get their prototype's
    /// specification.
    #[must_use]
    pub fn get_exception_specification(&self, instruction: &Instruction) -> ExceptionSpecification {
        self.refined.get(instruction).cloned().unwrap_or_else(|| {
            self.prototypes
                .get_exception_specification(instruction.prototype())
        })
    }
}

fn refine(
    specification: ExceptionSpecification,
    instruction: &Instruction,
    nullability: &ValueNullability,
) -> ExceptionSpecification {
    match specification {
        ExceptionSpecification::NullCheck { argument } => match instruction.arguments().get(argument) {
            Some(value) if nullability.is_non_null(value) => ExceptionSpecification::NoThrow,
            _ => specification,
        },
        other => other,
    }
}

/// Computes [`InstructionExceptionSpecs`] from [`PrototypeExceptionSpecs`] and
/// [`ValueNullability`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InstructionExceptionSpecsAnalysis;

impl FlowGraphAnalysis for InstructionExceptionSpecsAnalysis {
    type Output = InstructionExceptionSpecs;

    fn analyze(&self, graph: &FlowGraph) -> Result<InstructionExceptionSpecs> {
        let prototypes = graph.get_analysis_result::<PrototypeExceptionSpecs>()?;
        let nullability = graph.get_analysis_result::<ValueNullability>()?;

        let mut refined = FxHashMap::default();
        for block in graph.basic_blocks() {
            let named = block.named_instructions();
            let instructions = named
                .iter()
                .map(|insn| insn.instruction())
                .chain(block.flow().instructions());
            for instruction in instructions {
                if refined.contains_key(instruction) {
                    continue;
                }
                let specification = refine(
                    prototypes.get_exception_specification(instruction.prototype()),
                    instruction,
                    &nullability,
                );
                refined.insert(instruction.clone(), specification);
            }
        }

        Ok(InstructionExceptionSpecs {
            prototypes,
            refined,
        })
    }
}
