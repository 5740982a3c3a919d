//! Exception delayability: whether an instruction's exception may be raised later than
//! the instruction itself, e.g. when its result is first used.
//!
//! A bounds-checked element address computation whose result is only dereferenced on
//! one path is the canonical example: under a permissive policy the check may move to
//! the dereference, so the address computation alone is not effectful.

use crate::{
    analysis::effects::specs::ARRAY_GET_ELEMENT_POINTER,
    ir::{FlowGraph, InstructionPrototype, ValueTag},
};

/// How liberally exceptions may be delayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DelayabilityPolicy {
    /// No exception may ever be delayed.
    #[default]
    Strict,
    /// Exceptions from address computations may be delayed until the address is used.
    Permissive,
}

/// Decides, per prototype shape, whether exceptions may be delayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExceptionDelayability {
    policy: DelayabilityPolicy,
}

impl ExceptionDelayability {
    /// Creates a delayability oracle for `policy`.
    #[must_use]
    pub const fn new(policy: DelayabilityPolicy) -> Self {
        Self { policy }
    }

    /// The policy this oracle implements.
    #[must_use]
    pub const fn policy(&self) -> DelayabilityPolicy {
        self.policy
    }

    /// Returns `true` if exceptions thrown by instructions with this prototype may be
    /// delayed.
    #[must_use]
    pub fn can_delay_exceptions(&self, prototype: &InstructionPrototype) -> bool {
        match self.policy {
            DelayabilityPolicy::Strict => false,
            DelayabilityPolicy::Permissive => {
                prototype.intrinsic_name() == Some(ARRAY_GET_ELEMENT_POINTER)
            }
        }
    }

    /// Looks up the instruction behind `tag` and checks its prototype. Unknown tags are
    /// never delayable.
    #[must_use]
    pub fn can_delay_instruction(&self, graph: &FlowGraph, tag: &ValueTag) -> bool {
        graph
            .get_instruction(tag)
            .is_some_and(|insn| self.can_delay_exceptions(insn.prototype()))
    }
}
