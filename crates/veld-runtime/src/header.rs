//! Type identity headers.

use crate::ids::TypeId;

/// A built-in scalar type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Builtin {
    /// One-byte truth value.
    Bool,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// Unowned, null-terminated string reference; pointer-sized.
    Str,
}

impl Builtin {
    /// Size of an instance in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Bool => size_of::<bool>(),
            Self::I32 => size_of::<i32>(),
            Self::I64 => size_of::<i64>(),
            Self::Str => size_of::<*const std::ffi::c_char>(),
        }
    }

    /// Required alignment of an instance.
    pub fn alignment(self) -> usize {
        match self {
            Self::Bool => align_of::<bool>(),
            Self::I32 => align_of::<i32>(),
            Self::I64 => align_of::<i64>(),
            Self::Str => align_of::<*const std::ffi::c_char>(),
        }
    }

    /// Surface-language name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::I32 => "Int32",
            Self::I64 => "Int64",
            Self::Str => "String",
        }
    }
}

/// Name and type arguments shared by struct and enum headers.
///
/// Arguments are canonical ids from the same store the header is destined
/// for; their order is significant (`Pair<A, B>` is not `Pair<B, A>`).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Composite {
    name: Box<str>,
    arguments: Vec<TypeId>,
}

impl Composite {
    /// Creates a header body with the given name and type arguments.
    pub fn new(name: impl Into<Box<str>>, arguments: Vec<TypeId>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Name of the type, without arguments.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type arguments in declaration order.
    pub fn arguments(&self) -> &[TypeId] {
        &self.arguments
    }
}

/// The information necessary to uniquely identify a type at runtime.
///
/// Headers compare and hash structurally; [`TypeStore::declare`] collapses
/// structurally-equal headers onto one canonical [`TypeId`], after which
/// identity comparison is id equality.
///
/// [`TypeStore::declare`]: crate::TypeStore::declare
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeHeader {
    /// The absent type; equal only to itself, renders as `nil`.
    None,
    /// A built-in scalar.
    Builtin(Builtin),
    /// Record with ordered fields.
    Struct(Composite),
    /// Discriminated union with tagged variants.
    Enum(Composite),
}

impl TypeHeader {
    /// Creates a struct header.
    pub fn struct_type(name: impl Into<Box<str>>, arguments: Vec<TypeId>) -> Self {
        Self::Struct(Composite::new(name, arguments))
    }

    /// Creates an enum header.
    pub fn enum_type(name: impl Into<Box<str>>, arguments: Vec<TypeId>) -> Self {
        Self::Enum(Composite::new(name, arguments))
    }

    /// Whether this is a built-in scalar header.
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Builtin(_))
    }

    /// Whether this is a struct header.
    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct(_))
    }

    /// Whether this is an enum header.
    pub fn is_enum(&self) -> bool {
        matches!(self, Self::Enum(_))
    }

    /// The composite body of a struct or enum header.
    pub fn composite(&self) -> Option<&Composite> {
        match self {
            Self::Struct(c) | Self::Enum(c) => Some(c),
            _ => None,
        }
    }
}
