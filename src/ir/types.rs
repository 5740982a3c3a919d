//! The type and method surface the IR consumes.
//!
//! The middle-end treats types and methods as opaque capabilities owned by a front-end:
//! it only compares them for equality, asks pointer types for their kind, and asks
//! methods for their exception and memory behavior. The small concrete model below is
//! enough to build, analyze and optimize graphs; a front-end with a richer type system
//! maps its types onto [`Type::Named`] and [`Type::GenericParameter`] and keeps the
//! details to itself.

use std::{fmt, sync::Arc};

use bitflags::bitflags;

/// The width and signedness of an integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntegerSpec {
    /// Number of bits, between 1 and 64.
    pub bits: u8,
    /// Whether values are interpreted as two's-complement signed integers.
    pub is_signed: bool,
}

impl IntegerSpec {
    /// A signed 8-bit integer.
    pub const INT8: IntegerSpec = IntegerSpec::new(8, true);
    /// A signed 16-bit integer.
    pub const INT16: IntegerSpec = IntegerSpec::new(16, true);
    /// A signed 32-bit integer.
    pub const INT32: IntegerSpec = IntegerSpec::new(32, true);
    /// A signed 64-bit integer.
    pub const INT64: IntegerSpec = IntegerSpec::new(64, true);
    /// An unsigned 8-bit integer.
    pub const UINT8: IntegerSpec = IntegerSpec::new(8, false);
    /// An unsigned 16-bit integer.
    pub const UINT16: IntegerSpec = IntegerSpec::new(16, false);
    /// An unsigned 32-bit integer.
    pub const UINT32: IntegerSpec = IntegerSpec::new(32, false);
    /// An unsigned 64-bit integer.
    pub const UINT64: IntegerSpec = IntegerSpec::new(64, false);

    /// Creates a new integer spec.
    #[must_use]
    pub const fn new(bits: u8, is_signed: bool) -> Self {
        Self { bits, is_signed }
    }

    /// Wraps an arbitrary integer into the range representable by this spec.
    ///
    /// Signed specs sign-extend the low `bits` bits; unsigned specs zero-extend them.
    #[must_use]
    pub fn normalize(&self, value: i128) -> i128 {
        let bits = u32::from(self.bits.clamp(1, 64));
        let mask: i128 = (1i128 << bits) - 1;
        let truncated = value & mask;
        if self.is_signed && (truncated >> (bits - 1)) & 1 == 1 {
            truncated - (1i128 << bits)
        } else {
            truncated
        }
    }
}

impl fmt::Display for IntegerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.is_signed { "i" } else { "u" }, self.bits)
    }
}

/// The flavor of a pointer, which determines what the IR may assume about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// A raw pointer; may be null and may dangle.
    Transient,
    /// A managed reference; never null.
    Reference,
    /// A pointer to a boxed heap object; may be null, dereferenceable when not.
    Box,
}

/// An opaque type as far as the IR is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// The empty type of instructions that produce no meaningful value.
    Void,
    /// Booleans.
    Bool,
    /// Unicode scalar values.
    Char,
    /// Fixed-width integers.
    Int(IntegerSpec),
    /// IEEE 754 single precision.
    Float32,
    /// IEEE 754 double precision.
    Float64,
    /// A pointer to an element type.
    Pointer(Arc<Type>, PointerKind),
    /// A nominal type defined by the front-end.
    Named(Arc<str>),
    /// A generic parameter; nothing is known about its values.
    GenericParameter(Arc<str>),
}

impl Type {
    /// Shorthand for a 32-bit signed integer.
    #[must_use]
    pub const fn int32() -> Self {
        Type::Int(IntegerSpec::INT32)
    }

    /// Shorthand for a 64-bit signed integer.
    #[must_use]
    pub const fn int64() -> Self {
        Type::Int(IntegerSpec::INT64)
    }

    /// Creates a pointer type of the given kind to `element`.
    #[must_use]
    pub fn pointer_to(element: Type, kind: PointerKind) -> Self {
        Type::Pointer(Arc::new(element), kind)
    }

    /// Creates a named (nominal) type.
    #[must_use]
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Type::Named(name.into())
    }

    /// Returns the element type and kind if this is a pointer type.
    #[must_use]
    pub fn as_pointer(&self) -> Option<(&Type, PointerKind)> {
        match self {
            Type::Pointer(element, kind) => Some((element, *kind)),
            _ => None,
        }
    }

    /// Returns the integer spec if this is an integer type.
    #[must_use]
    pub const fn as_integer(&self) -> Option<IntegerSpec> {
        match self {
            Type::Int(spec) => Some(*spec),
            _ => None,
        }
    }

    /// Applies `map` to this type and, structurally, to every type nested inside it.
    ///
    /// The mapping is applied bottom-up: a pointer's element type is mapped first, then
    /// the rebuilt pointer type itself.
    #[must_use]
    pub fn map(&self, map: &dyn Fn(&Type) -> Type) -> Type {
        match self {
            Type::Pointer(element, kind) => map(&Type::Pointer(Arc::new(element.map(map)), *kind)),
            other => map(other),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::Int(spec) => write!(f, "{}", spec),
            Type::Float32 => write!(f, "f32"),
            Type::Float64 => write!(f, "f64"),
            Type::Pointer(element, PointerKind::Transient) => write!(f, "{}*", element),
            Type::Pointer(element, PointerKind::Reference) => write!(f, "{}&", element),
            Type::Pointer(element, PointerKind::Box) => write!(f, "box<{}>", element),
            Type::Named(name) => write!(f, "{}", name),
            Type::GenericParameter(name) => write!(f, "'{}", name),
        }
    }
}

bitflags! {
    /// Behavioral attributes a front-end can attach to a method.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodAttributes: u32 {
        /// The method never throws.
        const NO_THROW = 0x0001;
        /// The method neither reads nor writes memory visible to the caller.
        const READ_NONE = 0x0002;
        /// The method may read but never writes memory visible to the caller.
        const READ_ONLY = 0x0004;
    }
}

/// How a call resolves its callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodLookup {
    /// The callee is exactly the referenced method.
    Static,
    /// The callee is resolved through the receiver's dynamic type.
    Virtual,
}

/// An opaque method reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method {
    /// Fully qualified name.
    pub name: Arc<str>,
    /// Types of the explicit parameters.
    pub parameter_types: Arc<[Type]>,
    /// Return type.
    pub return_type: Type,
    /// Static methods take no `this` argument.
    pub is_static: bool,
    /// Exception and memory attributes.
    pub attributes: MethodAttributes,
}

impl Method {
    /// Creates a new method reference with no attributes.
    #[must_use]
    pub fn new(
        name: impl Into<Arc<str>>,
        parameter_types: Vec<Type>,
        return_type: Type,
        is_static: bool,
    ) -> Self {
        Self {
            name: name.into(),
            parameter_types: parameter_types.into(),
            return_type,
            is_static,
            attributes: MethodAttributes::empty(),
        }
    }

    /// Returns a copy of this method with the given attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: MethodAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Applies a type mapping to the method's signature.
    #[must_use]
    pub fn map_types(&self, map: &dyn Fn(&Type) -> Type) -> Method {
        Method {
            name: Arc::clone(&self.name),
            parameter_types: self.parameter_types.iter().map(|t| t.map(map)).collect(),
            return_type: self.return_type.map(map),
            is_static: self.is_static,
            attributes: self.attributes,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (index, ty) in self.parameter_types.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ty)?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}
