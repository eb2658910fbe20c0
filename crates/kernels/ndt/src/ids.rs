//! Type identifiers and kinds.
//!
//! Every type descriptor carries a [`TypeId`], the exact tag used for
//! exact-match dispatch, and a [`TypeKind`], the coarse category used for
//! broad dispatch. Several ids share a kind (all signed integers are
//! [`TypeKind::SInt`], all date/time types are [`TypeKind::DateTime`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Exact type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeId {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Float128,
    Complex64,
    Complex128,
    FixedString,
    String,
    FixedBytes,
    Date,
    Time,
    DateTime,
    Option,
    Tuple,
    Struct,
    Adapt,
}

/// Coarse type category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Bool,
    SInt,
    UInt,
    Real,
    Complex,
    String,
    Bytes,
    DateTime,
    Option,
    Tuple,
    Struct,
    Expression,
}

impl TypeId {
    /// All builtin scalar ids, in declaration order.
    ///
    /// Builtins are the leading variants, so `id as usize` indexes this array.
    pub const BUILTINS: [TypeId; 15] = [
        TypeId::Bool,
        TypeId::Int8,
        TypeId::Int16,
        TypeId::Int32,
        TypeId::Int64,
        TypeId::UInt8,
        TypeId::UInt16,
        TypeId::UInt32,
        TypeId::UInt64,
        TypeId::Float16,
        TypeId::Float32,
        TypeId::Float64,
        TypeId::Float128,
        TypeId::Complex64,
        TypeId::Complex128,
    ];

    /// The kind this id belongs to.
    pub const fn kind(self) -> TypeKind {
        match self {
            TypeId::Bool => TypeKind::Bool,
            TypeId::Int8 | TypeId::Int16 | TypeId::Int32 | TypeId::Int64 => TypeKind::SInt,
            TypeId::UInt8 | TypeId::UInt16 | TypeId::UInt32 | TypeId::UInt64 => TypeKind::UInt,
            TypeId::Float16 | TypeId::Float32 | TypeId::Float64 | TypeId::Float128 => {
                TypeKind::Real
            }
            TypeId::Complex64 | TypeId::Complex128 => TypeKind::Complex,
            TypeId::FixedString | TypeId::String => TypeKind::String,
            TypeId::FixedBytes => TypeKind::Bytes,
            TypeId::Date | TypeId::Time | TypeId::DateTime => TypeKind::DateTime,
            TypeId::Option => TypeKind::Option,
            TypeId::Tuple => TypeKind::Tuple,
            TypeId::Struct => TypeKind::Struct,
            TypeId::Adapt => TypeKind::Expression,
        }
    }

    /// Whether this id names a builtin scalar.
    pub const fn is_builtin(self) -> bool {
        self.builtin_size().is_some()
    }

    /// Storage width of a builtin scalar, `None` for everything else.
    pub const fn builtin_size(self) -> Option<usize> {
        match self {
            TypeId::Bool | TypeId::Int8 | TypeId::UInt8 => Some(1),
            TypeId::Int16 | TypeId::UInt16 | TypeId::Float16 => Some(2),
            TypeId::Int32 | TypeId::UInt32 | TypeId::Float32 => Some(4),
            TypeId::Int64 | TypeId::UInt64 | TypeId::Float64 | TypeId::Complex64 => Some(8),
            TypeId::Float128 | TypeId::Complex128 => Some(16),
            _ => None,
        }
    }

    /// Storage alignment of a builtin scalar.
    ///
    /// Sixteen-byte scalars are aligned to eight, matching the kernel arena.
    pub const fn builtin_alignment(self) -> Option<usize> {
        match self {
            TypeId::Complex64 => Some(4),
            TypeId::Float128 | TypeId::Complex128 => Some(8),
            _ => self.builtin_size(),
        }
    }

    /// Canonical lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            TypeId::Bool => "bool",
            TypeId::Int8 => "int8",
            TypeId::Int16 => "int16",
            TypeId::Int32 => "int32",
            TypeId::Int64 => "int64",
            TypeId::UInt8 => "uint8",
            TypeId::UInt16 => "uint16",
            TypeId::UInt32 => "uint32",
            TypeId::UInt64 => "uint64",
            TypeId::Float16 => "float16",
            TypeId::Float32 => "float32",
            TypeId::Float64 => "float64",
            TypeId::Float128 => "float128",
            TypeId::Complex64 => "complex[float32]",
            TypeId::Complex128 => "complex[float64]",
            TypeId::FixedString => "fixed_string",
            TypeId::String => "string",
            TypeId::FixedBytes => "fixed_bytes",
            TypeId::Date => "date",
            TypeId::Time => "time",
            TypeId::DateTime => "datetime",
            TypeId::Option => "option",
            TypeId::Tuple => "tuple",
            TypeId::Struct => "struct",
            TypeId::Adapt => "adapt",
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TypeKind {
    /// Signed or unsigned integer.
    pub const fn is_integer(self) -> bool {
        matches!(self, TypeKind::SInt | TypeKind::UInt)
    }

    /// Any kind handled by the scalar numeric kernels.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            TypeKind::Bool | TypeKind::SInt | TypeKind::UInt | TypeKind::Real | TypeKind::Complex
        )
    }

    /// Tuple or struct.
    pub const fn is_container(self) -> bool {
        matches!(self, TypeKind::Tuple | TypeKind::Struct)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeKind::Bool => "bool",
            TypeKind::SInt => "sint",
            TypeKind::UInt => "uint",
            TypeKind::Real => "real",
            TypeKind::Complex => "complex",
            TypeKind::String => "string",
            TypeKind::Bytes => "bytes",
            TypeKind::DateTime => "datetime",
            TypeKind::Option => "option",
            TypeKind::Tuple => "tuple",
            TypeKind::Struct => "struct",
            TypeKind::Expression => "expression",
        };
        f.write_str(name)
    }
}
