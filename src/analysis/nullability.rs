//! Nullability: which values are provably non-null, and which are dereferenceable when
//! they are not null.

use rustc_hash::FxHashSet;

use crate::{
    analysis::FlowGraphAnalysis,
    ir::{FlowGraph, Instruction, InstructionPrototype, PointerKind, Type, ValueTag},
    Result,
};

/// Non-null and dereferenceability facts about the values of a graph.
///
/// Values the graph does not define are conservatively nullable and not dereferenceable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueNullability {
    non_null: FxHashSet<ValueTag>,
    dereferenceable_or_null: FxHashSet<ValueTag>,
}

impl ValueNullability {
    /// Returns `true` if `value` is never null.
    #[must_use]
    pub fn is_non_null(&self, value: &ValueTag) -> bool {
        self.non_null.contains(value)
    }

    /// Returns `true` if `value` is either null or safe to dereference.
    #[must_use]
    pub fn is_dereferenceable_or_null(&self, value: &ValueTag) -> bool {
        self.dereferenceable_or_null.contains(value)
    }

    /// Returns `true` if `value` is never null and safe to dereference.
    #[must_use]
    pub fn is_dereferenceable(&self, value: &ValueTag) -> bool {
        self.is_non_null(value) && self.is_dereferenceable_or_null(value)
    }
}

/// Returns `true` if no value of type `ty` can be null.
///
/// Only pointers and generic parameters admit null; of the pointers, references never do.
#[must_use]
pub fn is_non_null_type(ty: &Type) -> bool {
    match ty {
        Type::Pointer(_, kind) => *kind == PointerKind::Reference,
        Type::GenericParameter(_) => false,
        _ => true,
    }
}

fn is_dereferenceable_or_null_type(ty: &Type) -> bool {
    match ty {
        Type::Pointer(_, kind) => matches!(kind, PointerKind::Reference | PointerKind::Box),
        Type::GenericParameter(_) => false,
        _ => true,
    }
}

/// Prototypes whose result, when produced at all, is a valid non-null pointer.
fn produces_dereferenceable(prototype: &InstructionPrototype) -> bool {
    matches!(
        prototype,
        InstructionPrototype::Alloca { .. } | InstructionPrototype::NewObject { .. }
    )
}

/// Computes [`ValueNullability`].
///
/// Facts come from result types, from prototypes (allocas and new objects are non-null,
/// non-null constants are non-null) and flow through copies, casts and stores until
/// nothing changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullabilityAnalysis;

impl NullabilityAnalysis {
    fn non_null(instruction: &Instruction, facts: &ValueNullability) -> bool {
        let prototype = instruction.prototype();
        if is_non_null_type(&prototype.result_type()) || produces_dereferenceable(prototype) {
            return true;
        }
        match prototype {
            InstructionPrototype::Constant { value, .. } => !value.is_null(),
            InstructionPrototype::Copy { .. } | InstructionPrototype::ReinterpretCast { .. } => {
                facts.is_non_null(&instruction.arguments()[0])
            }
            InstructionPrototype::Store { .. } => facts.is_non_null(&instruction.arguments()[1]),
            _ => false,
        }
    }

    fn dereferenceable_or_null(instruction: &Instruction, facts: &ValueNullability) -> bool {
        let prototype = instruction.prototype();
        if is_dereferenceable_or_null_type(&prototype.result_type())
            || produces_dereferenceable(prototype)
        {
            return true;
        }
        match prototype {
            InstructionPrototype::Constant { value, .. } => value.is_null(),
            InstructionPrototype::Copy { .. } => {
                facts.is_dereferenceable_or_null(&instruction.arguments()[0])
            }
            _ => false,
        }
    }
}

impl FlowGraphAnalysis for NullabilityAnalysis {
    type Output = ValueNullability;

    fn analyze(&self, graph: &FlowGraph) -> Result<ValueNullability> {
        let mut facts = ValueNullability::default();
        for block in graph.basic_blocks() {
            for param in block.parameters() {
                if is_non_null_type(&param.ty) {
                    facts.non_null.insert(param.tag.clone());
                }
                if is_dereferenceable_or_null_type(&param.ty) {
                    facts.dereferenceable_or_null.insert(param.tag.clone());
                }
            }
        }

        let instructions = graph.named_instructions();
        let mut changed = true;
        while changed {
            changed = false;
            for insn in &instructions {
                let tag = insn.tag();
                if !facts.non_null.contains(tag) && Self::non_null(insn.instruction(), &facts) {
                    facts.non_null.insert(tag.clone());
                    changed = true;
                }
                if !facts.dereferenceable_or_null.contains(tag)
                    && Self::dereferenceable_or_null(insn.instruction(), &facts)
                {
                    facts.dereferenceable_or_null.insert(tag.clone());
                    changed = true;
                }
            }
        }
        Ok(facts)
    }
}
