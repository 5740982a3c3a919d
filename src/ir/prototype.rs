//! Instruction prototypes: the operation kind plus its static metadata.
//!
//! An [`InstructionPrototype`] says *what* an instruction does (load an `i32`, call
//! `foo`, add two integers) without saying *which* values it operates on; those are the
//! instruction's arguments. Prototypes are shared between instructions through `Arc`.
//!
//! Arithmetic is expressed through intrinsics named `arith.<op>`, see [`ArithmeticOp`].

use std::{fmt, str::FromStr, sync::Arc};

use strum::{EnumIter, EnumString, IntoStaticStr};

use crate::ir::{
    constant::Constant,
    types::{Method, MethodLookup, PointerKind, Type},
    update::MemberMapping,
};

/// Namespace prefix of arithmetic intrinsics.
pub const ARITHMETIC_NAMESPACE: &str = "arith";

/// Arithmetic and comparison operators available as `arith.*` intrinsics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, EnumIter)]
pub enum ArithmeticOp {
    /// Addition.
    #[strum(serialize = "add")]
    Add,
    /// Subtraction.
    #[strum(serialize = "sub")]
    Subtract,
    /// Multiplication.
    #[strum(serialize = "mul")]
    Multiply,
    /// Division.
    #[strum(serialize = "div")]
    Divide,
    /// Remainder.
    #[strum(serialize = "rem")]
    Remainder,
    /// Bitwise and.
    #[strum(serialize = "and")]
    And,
    /// Bitwise or.
    #[strum(serialize = "or")]
    Or,
    /// Bitwise exclusive or.
    #[strum(serialize = "xor")]
    Xor,
    /// Left shift.
    #[strum(serialize = "shl")]
    LeftShift,
    /// Right shift.
    #[strum(serialize = "shr")]
    RightShift,
    /// Equality test.
    #[strum(serialize = "eq")]
    IsEqualTo,
    /// Inequality test.
    #[strum(serialize = "neq")]
    IsNotEqualTo,
    /// Less-than test.
    #[strum(serialize = "lt")]
    IsLessThan,
    /// Greater-than test.
    #[strum(serialize = "gt")]
    IsGreaterThan,
    /// Less-than-or-equal test.
    #[strum(serialize = "lte")]
    IsLessThanOrEqualTo,
    /// Greater-than-or-equal test.
    #[strum(serialize = "gte")]
    IsGreaterThanOrEqualTo,
    /// Bitwise or logical complement.
    #[strum(serialize = "not")]
    Not,
}

impl ArithmeticOp {
    /// Returns the full intrinsic name, e.g. `arith.add`.
    #[must_use]
    pub fn intrinsic_name(self) -> String {
        let op: &'static str = self.into();
        format!("{}.{}", ARITHMETIC_NAMESPACE, op)
    }

    /// Parses a full intrinsic name back into an operator.
    #[must_use]
    pub fn from_intrinsic_name(name: &str) -> Option<Self> {
        let (namespace, op) = name.split_once('.')?;
        if namespace != ARITHMETIC_NAMESPACE {
            return None;
        }
        ArithmeticOp::from_str(op).ok()
    }

    /// Returns `true` for comparisons, which produce booleans.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            ArithmeticOp::IsEqualTo
                | ArithmeticOp::IsNotEqualTo
                | ArithmeticOp::IsLessThan
                | ArithmeticOp::IsGreaterThan
                | ArithmeticOp::IsLessThanOrEqualTo
                | ArithmeticOp::IsGreaterThanOrEqualTo
        )
    }

    /// Returns `true` if the operator can trap (integer division by zero).
    #[must_use]
    pub const fn may_trap(self) -> bool {
        matches!(self, ArithmeticOp::Divide | ArithmeticOp::Remainder)
    }

    /// Number of operands the operator takes.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            ArithmeticOp::Not => 1,
            _ => 2,
        }
    }
}

/// The operation an instruction performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstructionPrototype {
    /// Materializes a constant. Takes no arguments.
    Constant {
        /// The constant value.
        value: Constant,
        /// The type of the produced value.
        result_type: Type,
    },
    /// Copies its single argument.
    Copy {
        /// The type of the copied value.
        result_type: Type,
    },
    /// Allocates a stack slot and produces a transient pointer to it. Takes no arguments.
    Alloca {
        /// The type of the slot's contents.
        element_type: Type,
    },
    /// Loads a value through its single pointer argument.
    Load {
        /// The type of the loaded value.
        element_type: Type,
        /// Volatile loads are never reordered with other memory operations.
        is_volatile: bool,
    },
    /// Stores its second argument through its first (pointer) argument and produces the
    /// stored value.
    Store {
        /// The type of the stored value.
        element_type: Type,
        /// Volatile stores are never reordered with other memory operations.
        is_volatile: bool,
    },
    /// Reinterprets its single argument as another type.
    ReinterpretCast {
        /// The type the argument is reinterpreted as.
        target_type: Type,
    },
    /// Calls a method. Instance methods take the receiver as their first argument.
    Call {
        /// The method to call.
        callee: Method,
        /// How the callee is resolved.
        lookup: MethodLookup,
    },
    /// Allocates a new object and runs a constructor on it. Takes the constructor's
    /// explicit arguments and produces a non-null reference.
    NewObject {
        /// The constructor to run.
        constructor: Method,
        /// The type of the allocated object.
        object_type: Type,
    },
    /// A named operation whose semantics are defined by convention.
    Intrinsic {
        /// The intrinsic's full name, e.g. `arith.add`.
        name: Arc<str>,
        /// The type of the produced value.
        result_type: Type,
        /// The types of the arguments.
        parameter_types: Vec<Type>,
    },
}

impl InstructionPrototype {
    /// Creates an arithmetic intrinsic prototype.
    #[must_use]
    pub fn arithmetic(op: ArithmeticOp, result_type: Type, parameter_types: Vec<Type>) -> Self {
        InstructionPrototype::Intrinsic {
            name: op.intrinsic_name().into(),
            result_type,
            parameter_types,
        }
    }

    /// Returns the type of the value instructions with this prototype produce.
    #[must_use]
    pub fn result_type(&self) -> Type {
        match self {
            InstructionPrototype::Constant { result_type, .. }
            | InstructionPrototype::Copy { result_type }
            | InstructionPrototype::Intrinsic { result_type, .. } => result_type.clone(),
            InstructionPrototype::Alloca { element_type } => {
                Type::pointer_to(element_type.clone(), PointerKind::Transient)
            }
            InstructionPrototype::Load { element_type, .. }
            | InstructionPrototype::Store { element_type, .. } => element_type.clone(),
            InstructionPrototype::ReinterpretCast { target_type } => target_type.clone(),
            InstructionPrototype::Call { callee, .. } => callee.return_type.clone(),
            InstructionPrototype::NewObject { object_type, .. } => object_type.clone(),
        }
    }

    /// Returns the number of arguments instructions with this prototype take.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        match self {
            InstructionPrototype::Constant { .. } | InstructionPrototype::Alloca { .. } => 0,
            InstructionPrototype::Copy { .. }
            | InstructionPrototype::Load { .. }
            | InstructionPrototype::ReinterpretCast { .. } => 1,
            InstructionPrototype::Store { .. } => 2,
            InstructionPrototype::Call { callee, .. } => {
                callee.parameter_types.len() + usize::from(!callee.is_static)
            }
            InstructionPrototype::NewObject { constructor, .. } => {
                constructor.parameter_types.len()
            }
            InstructionPrototype::Intrinsic {
                parameter_types, ..
            } => parameter_types.len(),
        }
    }

    /// Returns the arithmetic operator if this is an `arith.*` intrinsic.
    #[must_use]
    pub fn as_arithmetic(&self) -> Option<ArithmeticOp> {
        match self {
            InstructionPrototype::Intrinsic { name, .. } => ArithmeticOp::from_intrinsic_name(name),
            _ => None,
        }
    }

    /// Returns the intrinsic name if this is an intrinsic.
    #[must_use]
    pub fn intrinsic_name(&self) -> Option<&str> {
        match self {
            InstructionPrototype::Intrinsic { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns the constant if this is a constant prototype.
    #[must_use]
    pub const fn as_constant(&self) -> Option<&Constant> {
        match self {
            InstructionPrototype::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Returns `true` for `copy` prototypes.
    #[must_use]
    pub const fn is_copy(&self) -> bool {
        matches!(self, InstructionPrototype::Copy { .. })
    }

    /// Returns `true` for `alloca` prototypes.
    #[must_use]
    pub const fn is_alloca(&self) -> bool {
        matches!(self, InstructionPrototype::Alloca { .. })
    }

    /// Rewrites every type and method this prototype refers to.
    #[must_use]
    pub fn map_members(&self, mapping: &MemberMapping) -> Self {
        let map_type = |ty: &Type| ty.map(&|t: &Type| mapping.map_type(t));
        match self {
            InstructionPrototype::Constant { value, result_type } => InstructionPrototype::Constant {
                value: value.clone(),
                result_type: map_type(result_type),
            },
            InstructionPrototype::Copy { result_type } => InstructionPrototype::Copy {
                result_type: map_type(result_type),
            },
            InstructionPrototype::Alloca { element_type } => InstructionPrototype::Alloca {
                element_type: map_type(element_type),
            },
            InstructionPrototype::Load {
                element_type,
                is_volatile,
            } => InstructionPrototype::Load {
                element_type: map_type(element_type),
                is_volatile: *is_volatile,
            },
            InstructionPrototype::Store {
                element_type,
                is_volatile,
            } => InstructionPrototype::Store {
                element_type: map_type(element_type),
                is_volatile: *is_volatile,
            },
            InstructionPrototype::ReinterpretCast { target_type } => {
                InstructionPrototype::ReinterpretCast {
                    target_type: map_type(target_type),
                }
            }
            InstructionPrototype::Call { callee, lookup } => InstructionPrototype::Call {
                callee: mapping.map_method(callee),
                lookup: *lookup,
            },
            InstructionPrototype::NewObject {
                constructor,
                object_type,
            } => InstructionPrototype::NewObject {
                constructor: mapping.map_method(constructor),
                object_type: map_type(object_type),
            },
            InstructionPrototype::Intrinsic {
                name,
                result_type,
                parameter_types,
            } => InstructionPrototype::Intrinsic {
                name: Arc::clone(name),
                result_type: map_type(result_type),
                parameter_types: parameter_types.iter().map(map_type).collect(),
            },
        }
    }
}

impl fmt::Display for InstructionPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstructionPrototype::Constant { value, .. } => write!(f, "const {}", value),
            InstructionPrototype::Copy { result_type } => write!(f, "copy<{}>", result_type),
            InstructionPrototype::Alloca { element_type } => write!(f, "alloca<{}>", element_type),
            InstructionPrototype::Load {
                element_type,
                is_volatile,
            } => write!(
                f,
                "{}load<{}>",
                if *is_volatile { "volatile " } else { "" },
                element_type
            ),
            InstructionPrototype::Store {
                element_type,
                is_volatile,
            } => write!(
                f,
                "{}store<{}>",
                if *is_volatile { "volatile " } else { "" },
                element_type
            ),
            InstructionPrototype::ReinterpretCast { target_type } => {
                write!(f, "reinterpret_cast<{}>", target_type)
            }
            InstructionPrototype::Call { callee, lookup } => match lookup {
                MethodLookup::Static => write!(f, "call {}", callee.name),
                MethodLookup::Virtual => write!(f, "callvirt {}", callee.name),
            },
            InstructionPrototype::NewObject { constructor, .. } => {
                write!(f, "new {}", constructor.name)
            }
            InstructionPrototype::Intrinsic { name, .. } => write!(f, "intrinsic {}", name),
        }
    }
}
