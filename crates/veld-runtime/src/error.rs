//! Store misuse errors.

/// Errors surfaced when a collaborator misuses the type store.
///
/// Nothing here is retried or recovered locally; the embedded strings are
/// type descriptions. Allocation failure is not represented: it aborts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The id does not name a type interned in this store.
    ///
    /// An unknown id has no header to describe, so the description falls
    /// back to the raw id (`type id N`).
    #[error("{0} is unknown")]
    UnknownType(String),

    /// `define` was called twice for the same type.
    #[error("{0} is already defined")]
    Redefinition(String),

    /// A layout or value operation ran before `define`.
    #[error("{0} is not defined")]
    UndefinedType(String),

    /// An in-line field references a type whose layout is not known yet.
    #[error("cannot lay out {ty}: in-line field of type {field} is not defined")]
    UndefinedDependency { ty: String, field: String },

    /// `define_struct` on an enum, `define_enum` on a struct, and the like.
    #[error("{ty} is not {expected}")]
    RoleMismatch { ty: String, expected: &'static str },

    /// Mismatched scalar width, out-of-range variant ordinal.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
