//! Value types of SSA variables.
//!
//! The optimizer only needs a coarse view of types: whether a value is a
//! scalar it may keep in a temporary, or an aggregate that must never be
//! duplicated through one.

use std::fmt;

/// Type of an SSA variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SsaType {
    /// Type not known.
    #[default]
    Unknown,
    /// Boolean value.
    Bool,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// 64-bit float.
    F64,
    /// Pointer or object reference.
    Ref,
    /// Aggregate value identified by a layout index.
    Struct(u32),
}

impl SsaType {
    /// Returns `true` for aggregate values.
    #[must_use]
    pub const fn is_aggregate(&self) -> bool {
        matches!(self, Self::Struct(_))
    }

    /// Returns `true` for integer types.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::I32 | Self::I64 | Self::U32 | Self::U64)
    }

    /// Returns `true` for unsigned integer types.
    #[must_use]
    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::U32 | Self::U64)
    }

    /// Returns `true` for floating point types.
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F64)
    }
}

impl fmt::Display for SsaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "?"),
            Self::Bool => write!(f, "bool"),
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::U32 => write!(f, "u32"),
            Self::U64 => write!(f, "u64"),
            Self::F64 => write!(f, "f64"),
            Self::Ref => write!(f, "ref"),
            Self::Struct(layout) => write!(f, "struct#{layout}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_categories() {
        assert!(SsaType::Struct(0).is_aggregate());
        assert!(!SsaType::I64.is_aggregate());
        assert!(SsaType::U32.is_integer());
        assert!(SsaType::U32.is_unsigned());
        assert!(!SsaType::I32.is_unsigned());
        assert!(SsaType::F64.is_float());
        assert_eq!(SsaType::default(), SsaType::Unknown);
        assert_eq!(format!("{}", SsaType::Struct(2)), "struct#2");
    }
}
