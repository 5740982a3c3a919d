//! Compile-time constant values.
//!
//! Constants appear in `constant` instruction prototypes and in switch case lists, and
//! they are the payload of the `Constant` lattice cell during constant propagation.
//! Floating-point constants compare and hash by bit pattern so that `Constant` can be
//! used as a map key; `NaN` therefore equals an identical `NaN`.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::ir::types::{IntegerSpec, Type};

/// An integer constant together with the width and signedness it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegerConstant {
    value: i128,
    spec: IntegerSpec,
}

impl IntegerConstant {
    /// Creates an integer constant, wrapping `value` into `spec`'s range.
    #[must_use]
    pub fn new(value: i128, spec: IntegerSpec) -> Self {
        Self {
            value: spec.normalize(value),
            spec,
        }
    }

    /// Returns the (normalized) value.
    #[must_use]
    pub const fn value(&self) -> i128 {
        self.value
    }

    /// Returns the integer spec.
    #[must_use]
    pub const fn spec(&self) -> IntegerSpec {
        self.spec
    }

    /// Reinterprets this constant under another spec, wrapping as needed.
    #[must_use]
    pub fn cast(&self, spec: IntegerSpec) -> Self {
        Self::new(self.value, spec)
    }

    /// Wrapping addition.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        Self::new(self.value.wrapping_add(other.value), self.spec)
    }

    /// Wrapping subtraction.
    #[must_use]
    pub fn subtract(&self, other: &Self) -> Self {
        Self::new(self.value.wrapping_sub(other.value), self.spec)
    }

    /// Wrapping multiplication.
    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        Self::new(self.value.wrapping_mul(other.value), self.spec)
    }

    /// Truncating division; `None` on division by zero.
    #[must_use]
    pub fn divide(&self, other: &Self) -> Option<Self> {
        if other.value == 0 {
            return None;
        }
        Some(Self::new(self.value.wrapping_div(other.value), self.spec))
    }

    /// Remainder with the sign of the dividend; `None` on division by zero.
    #[must_use]
    pub fn remainder(&self, other: &Self) -> Option<Self> {
        if other.value == 0 {
            return None;
        }
        Some(Self::new(self.value.wrapping_rem(other.value), self.spec))
    }

    /// Bitwise and.
    #[must_use]
    pub fn bitwise_and(&self, other: &Self) -> Self {
        Self::new(self.value & other.value, self.spec)
    }

    /// Bitwise or.
    #[must_use]
    pub fn bitwise_or(&self, other: &Self) -> Self {
        Self::new(self.value | other.value, self.spec)
    }

    /// Bitwise exclusive or.
    #[must_use]
    pub fn bitwise_xor(&self, other: &Self) -> Self {
        Self::new(self.value ^ other.value, self.spec)
    }

    /// Bitwise complement.
    #[must_use]
    pub fn bitwise_not(&self) -> Self {
        Self::new(!self.value, self.spec)
    }

    /// Left shift; the shift amount is taken modulo the bit width.
    #[must_use]
    pub fn shift_left(&self, amount: &Self) -> Self {
        let shift = Self::shift_amount(amount, self.spec);
        Self::new(self.value << shift, self.spec)
    }

    /// Right shift, arithmetic for signed specs and logical for unsigned ones.
    #[must_use]
    pub fn shift_right(&self, amount: &Self) -> Self {
        let shift = Self::shift_amount(amount, self.spec);
        // `value` is already normalized, so an arithmetic shift of the i128 matches the
        // spec's own shift for signed values, and unsigned values are non-negative.
        Self::new(self.value >> shift, self.spec)
    }

    fn shift_amount(amount: &Self, spec: IntegerSpec) -> u32 {
        let bits = i128::from(spec.bits.max(1));
        u32::try_from(amount.value.rem_euclid(bits)).unwrap_or(0)
    }
}

impl PartialOrd for IntegerConstant {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.value.cmp(&other.value))
    }
}

impl fmt::Display for IntegerConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.spec)
    }
}

/// A constant value.
#[derive(Debug, Clone)]
pub enum Constant {
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(IntegerConstant),
    /// A single-precision float.
    Float32(f32),
    /// A double-precision float.
    Float64(f64),
    /// A character.
    Char(char),
    /// A string literal.
    String(Arc<str>),
    /// The null pointer / null reference.
    Null,
}

impl Constant {
    /// Creates an integer constant.
    #[must_use]
    pub fn int(value: i128, spec: IntegerSpec) -> Self {
        Constant::Int(IntegerConstant::new(value, spec))
    }

    /// Creates a 32-bit signed integer constant.
    #[must_use]
    pub fn i32(value: i32) -> Self {
        Constant::int(i128::from(value), IntegerSpec::INT32)
    }

    /// Returns the default value of a type: zero, `false`, `'\0'` or null.
    #[must_use]
    pub fn default_for(ty: &Type) -> Self {
        match ty {
            Type::Bool => Constant::Bool(false),
            Type::Char => Constant::Char('\0'),
            Type::Int(spec) => Constant::int(0, *spec),
            Type::Float32 => Constant::Float32(0.0),
            Type::Float64 => Constant::Float64(0.0),
            Type::Void
            | Type::Pointer(..)
            | Type::Named(_)
            | Type::GenericParameter(_) => Constant::Null,
        }
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_int(&self) -> Option<&IntegerConstant> {
        match self {
            Constant::Int(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Constant::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns `true` for the null constant.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Constant::Null)
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Float32(a), Constant::Float32(b)) => a.to_bits() == b.to_bits(),
            (Constant::Float64(a), Constant::Float64(b)) => a.to_bits() == b.to_bits(),
            (Constant::Char(a), Constant::Char(b)) => a == b,
            (Constant::String(a), Constant::String(b)) => a == b,
            (Constant::Null, Constant::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Constant::Bool(value) => value.hash(state),
            Constant::Int(value) => value.hash(state),
            Constant::Float32(value) => value.to_bits().hash(state),
            Constant::Float64(value) => value.to_bits().hash(state),
            Constant::Char(value) => value.hash(state),
            Constant::String(value) => value.hash(state),
            Constant::Null => {}
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Bool(value) => write!(f, "{}", value),
            Constant::Int(value) => write!(f, "{}", value),
            Constant::Float32(value) => write!(f, "{}f32", value),
            Constant::Float64(value) => write!(f, "{}f64", value),
            Constant::Char(value) => write!(f, "{:?}", value),
            Constant::String(value) => write!(f, "{:?}", value),
            Constant::Null => write!(f, "null"),
        }
    }
}
