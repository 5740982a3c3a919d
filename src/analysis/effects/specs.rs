//! Exception and memory specifications, and the rule-based tables that assign them to
//! instruction prototypes.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::ir::{InstructionPrototype, Method, MethodAttributes, MethodLookup, Type};

/// Name of the intrinsic that computes the address of an array element.
pub const ARRAY_GET_ELEMENT_POINTER: &str = "array.get_element_pointer";
/// Name of the intrinsic that loads an array element.
pub const ARRAY_LOAD_ELEMENT: &str = "array.load_element";
/// Name of the intrinsic that stores an array element.
pub const ARRAY_STORE_ELEMENT: &str = "array.store_element";
/// Name of the intrinsic that reads an array's length.
pub const ARRAY_GET_LENGTH: &str = "array.get_length";
/// Name of the intrinsic that allocates an array.
pub const ARRAY_NEW: &str = "array.new";
/// Name of the intrinsic that throws its argument.
pub const EXCEPTION_THROW: &str = "exception.throw";
/// Name of the intrinsic that rethrows the exception being handled.
pub const EXCEPTION_RETHROW: &str = "exception.rethrow";

/// What an instruction may throw.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExceptionSpecification {
    /// Never throws.
    NoThrow,
    /// May throw anything.
    ThrowAny,
    /// May throw exactly this exception type.
    Exact(Type),
    /// Throws if and only if the argument at this index is null.
    NullCheck {
        /// Index of the checked argument.
        argument: usize,
    },
}

impl ExceptionSpecification {
    /// Returns `true` unless the specification rules out every exception.
    #[must_use]
    pub const fn can_throw_something(&self) -> bool {
        !matches!(self, ExceptionSpecification::NoThrow)
    }

    /// The specification implied by a method's attributes.
    #[must_use]
    pub fn of_method(method: &Method) -> Self {
        if method.attributes.contains(MethodAttributes::NO_THROW) {
            ExceptionSpecification::NoThrow
        } else {
            ExceptionSpecification::ThrowAny
        }
    }
}

/// Which memory an instruction may read or write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemorySpecification {
    /// Touches no memory.
    Nothing,
    /// May read and write any memory.
    Unknown,
    /// May read any memory; never writes.
    UnknownRead,
    /// May write any memory; never reads.
    UnknownWrite,
    /// Reads only through the pointer argument at this index.
    ArgumentRead(usize),
    /// Writes only through the pointer argument at this index.
    ArgumentWrite(usize),
    /// Every effect of every element.
    Union(Vec<MemorySpecification>),
}

impl MemorySpecification {
    /// Returns `true` if the instruction may read memory.
    #[must_use]
    pub fn may_read(&self) -> bool {
        match self {
            MemorySpecification::Unknown
            | MemorySpecification::UnknownRead
            | MemorySpecification::ArgumentRead(_) => true,
            MemorySpecification::Nothing
            | MemorySpecification::UnknownWrite
            | MemorySpecification::ArgumentWrite(_) => false,
            MemorySpecification::Union(elements) => elements.iter().any(Self::may_read),
        }
    }

    /// Returns `true` if the instruction may write memory.
    #[must_use]
    pub fn may_write(&self) -> bool {
        match self {
            MemorySpecification::Unknown
            | MemorySpecification::UnknownWrite
            | MemorySpecification::ArgumentWrite(_) => true,
            MemorySpecification::Nothing
            | MemorySpecification::UnknownRead
            | MemorySpecification::ArgumentRead(_) => false,
            MemorySpecification::Union(elements) => elements.iter().any(Self::may_write),
        }
    }

    /// The specification implied by a method's attributes.
    #[must_use]
    pub fn of_method(method: &Method) -> Self {
        if method.attributes.contains(MethodAttributes::READ_NONE) {
            MemorySpecification::Nothing
        } else if method.attributes.contains(MethodAttributes::READ_ONLY) {
            MemorySpecification::UnknownRead
        } else {
            MemorySpecification::Unknown
        }
    }
}

/// Assigns exception specifications to instruction prototypes.
///
/// Built-in prototypes follow fixed rules; intrinsics are looked up by name and fall back
/// to [`ExceptionSpecification::ThrowAny`] when unknown. Arithmetic intrinsics never throw
/// except for division and remainder.
#[derive(Debug, Clone)]
pub struct PrototypeExceptionSpecs {
    intrinsics: FxHashMap<Arc<str>, ExceptionSpecification>,
}

impl PrototypeExceptionSpecs {
    /// A table with only the built-in rules and no intrinsic entries.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            intrinsics: FxHashMap::default(),
        }
    }

    /// Registers the specification of an intrinsic, replacing any previous entry.
    pub fn register_intrinsic(
        &mut self,
        name: impl Into<Arc<str>>,
        specification: ExceptionSpecification,
    ) -> &mut Self {
        self.intrinsics.insert(name.into(), specification);
        self
    }

    /// The exception specification of instructions with this prototype.
    #[must_use]
    pub fn get_exception_specification(
        &self,
        prototype: &InstructionPrototype,
    ) -> ExceptionSpecification {
        match prototype {
            InstructionPrototype::Constant { .. }
            | InstructionPrototype::Copy { .. }
            | InstructionPrototype::Alloca { .. }
            | InstructionPrototype::ReinterpretCast { .. } => ExceptionSpecification::NoThrow,
            InstructionPrototype::Load { .. } | InstructionPrototype::Store { .. } => {
                ExceptionSpecification::NullCheck { argument: 0 }
            }
            InstructionPrototype::Call { callee, lookup } => {
                let specification = ExceptionSpecification::of_method(callee);
                if *lookup == MethodLookup::Virtual
                    && !callee.is_static
                    && !specification.can_throw_something()
                {
                    ExceptionSpecification::NullCheck { argument: 0 }
                } else {
                    specification
                }
            }
            InstructionPrototype::NewObject { constructor, .. } => {
                ExceptionSpecification::of_method(constructor)
            }
            InstructionPrototype::Intrinsic {
                name,
                parameter_types,
                ..
            } => {
                if let Some(op) = prototype.as_arithmetic() {
                    let traps = op.may_trap()
                        && parameter_types.iter().all(|ty| ty.as_integer().is_some());
                    return if traps {
                        ExceptionSpecification::ThrowAny
                    } else {
                        ExceptionSpecification::NoThrow
                    };
                }
                if &**name == EXCEPTION_THROW {
                    return parameter_types
                        .first()
                        .cloned()
                        .map_or(ExceptionSpecification::ThrowAny, ExceptionSpecification::Exact);
                }
                self.intrinsics
                    .get(name)
                    .cloned()
                    .unwrap_or(ExceptionSpecification::ThrowAny)
            }
        }
    }
}

impl Default for PrototypeExceptionSpecs {
    fn default() -> Self {
        let mut specs = Self::empty();
        specs
            .register_intrinsic(ARRAY_GET_ELEMENT_POINTER, ExceptionSpecification::ThrowAny)
            .register_intrinsic(ARRAY_LOAD_ELEMENT, ExceptionSpecification::ThrowAny)
            .register_intrinsic(ARRAY_STORE_ELEMENT, ExceptionSpecification::ThrowAny)
            .register_intrinsic(
                ARRAY_GET_LENGTH,
                ExceptionSpecification::NullCheck { argument: 0 },
            )
            .register_intrinsic(ARRAY_NEW, ExceptionSpecification::NoThrow)
            .register_intrinsic(EXCEPTION_RETHROW, ExceptionSpecification::ThrowAny);
        specs
    }
}

/// Assigns memory specifications to instruction prototypes.
///
/// Volatile loads and stores are [`MemorySpecification::Unknown`] so that they are never
/// reordered with other memory operations. Virtual calls are always `Unknown`; static
/// calls and object construction follow the method's attributes.
#[derive(Debug, Clone)]
pub struct PrototypeMemorySpecs {
    intrinsics: FxHashMap<Arc<str>, MemorySpecification>,
}

impl PrototypeMemorySpecs {
    /// A table with only the built-in rules and no intrinsic entries.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            intrinsics: FxHashMap::default(),
        }
    }

    /// Registers the specification of an intrinsic, replacing any previous entry.
    pub fn register_intrinsic(
        &mut self,
        name: impl Into<Arc<str>>,
        specification: MemorySpecification,
    ) -> &mut Self {
        self.intrinsics.insert(name.into(), specification);
        self
    }

    /// The memory specification of instructions with this prototype.
    #[must_use]
    pub fn get_memory_specification(&self, prototype: &InstructionPrototype) -> MemorySpecification {
        match prototype {
            InstructionPrototype::Constant { .. }
            | InstructionPrototype::Copy { .. }
            | InstructionPrototype::Alloca { .. }
            | InstructionPrototype::ReinterpretCast { .. } => MemorySpecification::Nothing,
            InstructionPrototype::Load { is_volatile, .. } => {
                if *is_volatile {
                    MemorySpecification::Unknown
                } else {
                    MemorySpecification::ArgumentRead(0)
                }
            }
            InstructionPrototype::Store { is_volatile, .. } => {
                if *is_volatile {
                    MemorySpecification::Unknown
                } else {
                    MemorySpecification::ArgumentWrite(0)
                }
            }
            InstructionPrototype::Call { callee, lookup } => match lookup {
                MethodLookup::Static => MemorySpecification::of_method(callee),
                MethodLookup::Virtual => MemorySpecification::Unknown,
            },
            InstructionPrototype::NewObject { constructor, .. } => {
                MemorySpecification::of_method(constructor)
            }
            InstructionPrototype::Intrinsic { name, .. } => {
                if prototype.as_arithmetic().is_some() {
                    return MemorySpecification::Nothing;
                }
                self.intrinsics
                    .get(name)
                    .cloned()
                    .unwrap_or(MemorySpecification::Unknown)
            }
        }
    }
}

impl Default for PrototypeMemorySpecs {
    fn default() -> Self {
        let mut specs = Self::empty();
        specs
            .register_intrinsic(ARRAY_GET_ELEMENT_POINTER, MemorySpecification::Nothing)
            .register_intrinsic(ARRAY_LOAD_ELEMENT, MemorySpecification::UnknownRead)
            .register_intrinsic(ARRAY_STORE_ELEMENT, MemorySpecification::UnknownWrite)
            .register_intrinsic(ARRAY_GET_LENGTH, MemorySpecification::Nothing)
            .register_intrinsic(ARRAY_NEW, MemorySpecification::Nothing)
            .register_intrinsic(EXCEPTION_THROW, MemorySpecification::Nothing)
            .register_intrinsic(EXCEPTION_RETHROW, MemorySpecification::Nothing);
        specs
    }
}
