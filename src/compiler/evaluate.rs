//! Compile-time evaluation of instructions over constant arguments.
//!
//! Constant propagation does not know what an instruction computes; it asks a
//! [`ConstantEvaluator`]. [`DefaultEvaluator`] folds the operations whose semantics the IR
//! itself fixes: constants, copies, integer reinterpret casts and the `arith.*`
//! intrinsics. Front ends with richer intrinsic sets can plug in their own evaluator and
//! fall back to the default one.
//!
//! # Example
//!
//! ```rust
//! use flowir::{
//!     compiler::{ConstantEvaluator, DefaultEvaluator},
//!     ir::{ArithmeticOp, Constant, InstructionPrototype, Type},
//! };
//!
//! let add = InstructionPrototype::arithmetic(
//!     ArithmeticOp::Add,
//!     Type::int32(),
//!     vec![Type::int32(), Type::int32()],
//! );
//! let sum = DefaultEvaluator.evaluate(&add, &[Constant::i32(41), Constant::i32(1)]);
//! assert_eq!(sum, Some(Constant::i32(42)));
//! ```

use crate::ir::{ArithmeticOp, Constant, InstructionPrototype, IntegerConstant, Type};

/// Evaluates instructions whose arguments are all known constants.
pub trait ConstantEvaluator: Send + Sync {
    /// Evaluates `prototype` applied to `arguments`.
    ///
    /// Returns `None` when the result is not a compile-time constant, either because the
    /// operation is not understood or because it would not complete normally (integer
    /// division by zero, for instance).
    fn evaluate(&self, prototype: &InstructionPrototype, arguments: &[Constant]) -> Option<Constant>;
}

/// Folds constants, copies, integer casts and arithmetic intrinsics.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEvaluator;

impl ConstantEvaluator for DefaultEvaluator {
    fn evaluate(&self, prototype: &InstructionPrototype, arguments: &[Constant]) -> Option<Constant> {
        match prototype {
            InstructionPrototype::Constant { value, .. } => Some(value.clone()),
            InstructionPrototype::Copy { .. } => arguments.first().cloned(),
            InstructionPrototype::ReinterpretCast { target_type } => {
                reinterpret(arguments.first()?, target_type)
            }
            InstructionPrototype::Intrinsic { .. } => {
                let op = prototype.as_arithmetic()?;
                if arguments.len() != op.arity() {
                    return None;
                }
                match arguments {
                    [operand] => evaluate_unary(op, operand),
                    [left, right] => evaluate_binary(op, left, right),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

fn reinterpret(value: &Constant, target: &Type) -> Option<Constant> {
    match (value, target) {
        (Constant::Int(int), Type::Int(spec)) => Some(Constant::Int(int.cast(*spec))),
        (Constant::Bool(_), Type::Bool) | (Constant::Char(_), Type::Char) => Some(value.clone()),
        (Constant::Null, Type::Pointer(..)) => Some(Constant::Null),
        _ => None,
    }
}

fn evaluate_unary(op: ArithmeticOp, operand: &Constant) -> Option<Constant> {
    match (op, operand) {
        (ArithmeticOp::Not, Constant::Int(value)) => Some(Constant::Int(value.bitwise_not())),
        (ArithmeticOp::Not, Constant::Bool(value)) => Some(Constant::Bool(!value)),
        _ => None,
    }
}

fn evaluate_binary(op: ArithmeticOp, left: &Constant, right: &Constant) -> Option<Constant> {
    match (left, right) {
        (Constant::Int(a), Constant::Int(b)) => evaluate_integers(op, a, b),
        (Constant::Bool(a), Constant::Bool(b)) => evaluate_booleans(op, *a, *b),
        (Constant::Float32(a), Constant::Float32(b)) => {
            evaluate_floats(op, f64::from(*a), f64::from(*b)).map(|result| match result {
                #[allow(clippy::cast_possible_truncation)]
                Constant::Float64(value) => Constant::Float32(value as f32),
                other => other,
            })
        }
        (Constant::Float64(a), Constant::Float64(b)) => evaluate_floats(op, *a, *b),
        _ if op.is_comparison() => compare_by_equality(op, left, right),
        _ => None,
    }
}

fn evaluate_integers(op: ArithmeticOp, a: &IntegerConstant, b: &IntegerConstant) -> Option<Constant> {
    let int = |value: IntegerConstant| Some(Constant::Int(value));
    let compare = |result: bool| Some(Constant::Bool(result));
    match op {
        ArithmeticOp::Add => int(a.add(b)),
        ArithmeticOp::Subtract => int(a.subtract(b)),
        ArithmeticOp::Multiply => int(a.multiply(b)),
        ArithmeticOp::Divide => int(a.divide(b)?),
        ArithmeticOp::Remainder => int(a.remainder(b)?),
        ArithmeticOp::And => int(a.bitwise_and(b)),
        ArithmeticOp::Or => int(a.bitwise_or(b)),
        ArithmeticOp::Xor => int(a.bitwise_xor(b)),
        ArithmeticOp::LeftShift => int(a.shift_left(b)),
        ArithmeticOp::RightShift => int(a.shift_right(b)),
        ArithmeticOp::IsEqualTo => compare(a.value() == b.value()),
        ArithmeticOp::IsNotEqualTo => compare(a.value() != b.value()),
        ArithmeticOp::IsLessThan => compare(a.value() < b.value()),
        ArithmeticOp::IsGreaterThan => compare(a.value() > b.value()),
        ArithmeticOp::IsLessThanOrEqualTo => compare(a.value() <= b.value()),
        ArithmeticOp::IsGreaterThanOrEqualTo => compare(a.value() >= b.value()),
        ArithmeticOp::Not => None,
    }
}

fn evaluate_booleans(op: ArithmeticOp, a: bool, b: bool) -> Option<Constant> {
    let result = match op {
        ArithmeticOp::And => a & b,
        ArithmeticOp::Or => a | b,
        ArithmeticOp::Xor | ArithmeticOp::IsNotEqualTo => a ^ b,
        ArithmeticOp::IsEqualTo => a == b,
        _ => return None,
    };
    Some(Constant::Bool(result))
}

fn evaluate_floats(op: ArithmeticOp, a: f64, b: f64) -> Option<Constant> {
    let result = match op {
        ArithmeticOp::Add => a + b,
        ArithmeticOp::Subtract => a - b,
        ArithmeticOp::Multiply => a * b,
        ArithmeticOp::Divide => a / b,
        ArithmeticOp::IsEqualTo => return Some(Constant::Bool(a == b)),
        ArithmeticOp::IsNotEqualTo => return Some(Constant::Bool(a != b)),
        ArithmeticOp::IsLessThan => return Some(Constant::Bool(a < b)),
        ArithmeticOp::IsGreaterThan => return Some(Constant::Bool(a > b)),
        ArithmeticOp::IsLessThanOrEqualTo => return Some(Constant::Bool(a <= b)),
        ArithmeticOp::IsGreaterThanOrEqualTo => return Some(Constant::Bool(a >= b)),
        _ => return None,
    };
    Some(Constant::Float64(result))
}

/// Equality of chars, strings and null. Ordering comparisons do not fold.
fn compare_by_equality(op: ArithmeticOp, left: &Constant, right: &Constant) -> Option<Constant> {
    let comparable = matches!(
        (left, right),
        (Constant::Char(_), Constant::Char(_))
            | (Constant::String(_), Constant::String(_))
            | (Constant::Null, Constant::Null)
    );
    if !comparable {
        return None;
    }
    match op {
        ArithmeticOp::IsEqualTo => Some(Constant::Bool(left == right)),
        ArithmeticOp::IsNotEqualTo => Some(Constant::Bool(left != right)),
        _ => None,
    }
}
