//! Instructions and named instructions.
//!
//! An [`Instruction`] is an immutable pair of a prototype and an ordered argument list.
//! When placed in a block and given a result tag it becomes a [`NamedInstruction`], the
//! unit of SSA definition. Flows also carry anonymous instructions (a switch's scrutinee,
//! a return value, a try's guarded operation); those have no tag of their own.

use std::{fmt, sync::Arc};

use crate::ir::{
    constant::Constant,
    prototype::{ArithmeticOp, InstructionPrototype},
    tag::{BasicBlockTag, ValueTag},
    types::{Method, MethodLookup, Type},
    update::MemberMapping,
};

/// An operation applied to a list of argument values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    prototype: Arc<InstructionPrototype>,
    arguments: Vec<ValueTag>,
}

impl Instruction {
    /// Creates an instruction from a prototype and its arguments.
    #[must_use]
    pub fn new(prototype: InstructionPrototype, arguments: Vec<ValueTag>) -> Self {
        Self {
            prototype: Arc::new(prototype),
            arguments,
        }
    }

    /// Creates an instruction that shares an existing prototype.
    #[must_use]
    pub fn with_prototype(prototype: Arc<InstructionPrototype>, arguments: Vec<ValueTag>) -> Self {
        Self {
            prototype,
            arguments,
        }
    }

    /// `const value : result_type`
    #[must_use]
    pub fn constant(value: Constant, result_type: Type) -> Self {
        Self::new(
            InstructionPrototype::Constant { value, result_type },
            Vec::new(),
        )
    }

    /// A constant holding the default value of `ty`.
    #[must_use]
    pub fn default_constant(ty: Type) -> Self {
        Self::constant(Constant::default_for(&ty), ty)
    }

    /// `copy(value)`
    #[must_use]
    pub fn copy(result_type: Type, value: ValueTag) -> Self {
        Self::new(InstructionPrototype::Copy { result_type }, vec![value])
    }

    /// `alloca<element_type>()`
    #[must_use]
    pub fn alloca(element_type: Type) -> Self {
        Self::new(InstructionPrototype::Alloca { element_type }, Vec::new())
    }

    /// `load<element_type>(pointer)`
    #[must_use]
    pub fn load(element_type: Type, pointer: ValueTag) -> Self {
        Self::new(
            InstructionPrototype::Load {
                element_type,
                is_volatile: false,
            },
            vec![pointer],
        )
    }

    /// `store<element_type>(pointer, value)`
    #[must_use]
    pub fn store(element_type: Type, pointer: ValueTag, value: ValueTag) -> Self {
        Self::new(
            InstructionPrototype::Store {
                element_type,
                is_volatile: false,
            },
            vec![pointer, value],
        )
    }

    /// `reinterpret_cast<target_type>(value)`
    #[must_use]
    pub fn reinterpret_cast(target_type: Type, value: ValueTag) -> Self {
        Self::new(InstructionPrototype::ReinterpretCast { target_type }, vec![value])
    }

    /// A call; instance methods take their receiver as the first argument.
    #[must_use]
    pub fn call(callee: Method, lookup: MethodLookup, arguments: Vec<ValueTag>) -> Self {
        Self::new(InstructionPrototype::Call { callee, lookup }, arguments)
    }

    /// Object allocation followed by a constructor call.
    #[must_use]
    pub fn new_object(constructor: Method, object_type: Type, arguments: Vec<ValueTag>) -> Self {
        Self::new(
            InstructionPrototype::NewObject {
                constructor,
                object_type,
            },
            arguments,
        )
    }

    /// An `arith.*` intrinsic whose operands all share `operand_type`.
    #[must_use]
    pub fn arithmetic(
        op: ArithmeticOp,
        result_type: Type,
        operand_type: Type,
        arguments: Vec<ValueTag>,
    ) -> Self {
        let parameter_types = vec![operand_type; arguments.len()];
        Self::new(
            InstructionPrototype::arithmetic(op, result_type, parameter_types),
            arguments,
        )
    }

    /// Returns the prototype.
    #[must_use]
    pub fn prototype(&self) -> &InstructionPrototype {
        &self.prototype
    }

    /// Returns the shared prototype handle.
    #[must_use]
    pub fn prototype_arc(&self) -> &Arc<InstructionPrototype> {
        &self.prototype
    }

    /// Returns the arguments.
    #[must_use]
    pub fn arguments(&self) -> &[ValueTag] {
        &self.arguments
    }

    /// Returns the result type.
    #[must_use]
    pub fn result_type(&self) -> Type {
        self.prototype.result_type()
    }

    /// Returns a copy of this instruction with every argument passed through `map`.
    #[must_use]
    pub fn map_arguments(&self, mut map: impl FnMut(&ValueTag) -> ValueTag) -> Self {
        Self {
            prototype: Arc::clone(&self.prototype),
            arguments: self.arguments.iter().map(&mut map).collect(),
        }
    }

    /// Returns a copy of this instruction with its members remapped.
    #[must_use]
    pub fn map_members(&self, mapping: &MemberMapping) -> Self {
        Self {
            prototype: Arc::new(self.prototype.map_members(mapping)),
            arguments: self.arguments.clone(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.prototype)?;
        for (index, arg) in self.arguments.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

/// An instruction placed in a basic block, together with the tag naming its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedInstruction {
    tag: ValueTag,
    instruction: Instruction,
    block: BasicBlockTag,
    index: usize,
}

impl NamedInstruction {
    pub(crate) fn new(
        tag: ValueTag,
        instruction: Instruction,
        block: BasicBlockTag,
        index: usize,
    ) -> Self {
        Self {
            tag,
            instruction,
            block,
            index,
        }
    }

    /// The tag naming this instruction's result.
    #[must_use]
    pub fn tag(&self) -> &ValueTag {
        &self.tag
    }

    /// The instruction itself.
    #[must_use]
    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    /// Shorthand for `instruction().prototype()`.
    #[must_use]
    pub fn prototype(&self) -> &InstructionPrototype {
        self.instruction.prototype()
    }

    /// Shorthand for `instruction().arguments()`.
    #[must_use]
    pub fn arguments(&self) -> &[ValueTag] {
        self.instruction.arguments()
    }

    /// The tag of the block that defines this instruction.
    #[must_use]
    pub fn block(&self) -> &BasicBlockTag {
        &self.block
    }

    /// The position of this instruction within its block.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for NamedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.tag, self.instruction)
    }
}
