//! Runtime type identifiers.
//!
//! Builtin value kinds occupy the ids below `FIRST_USER_TYPE`; user-defined
//! object types are allocated by the [`TypeRegistry`](crate::TypeRegistry).

use std::fmt;

/// Identifier of a runtime type.
///
/// Type guards compare these directly, so equality must be cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const NONE: Self = Self(1);
    pub const BOOL: Self = Self(2);
    pub const INT: Self = Self(3);
    pub const FLOAT: Self = Self(4);
    pub const STR: Self = Self(5);
    pub const TYPE: Self = Self(6);
    pub const WEAKREF: Self = Self(7);
    pub const NATIVE: Self = Self(8);
    /// Plain object with no registered user type.
    pub const OBJECT: Self = Self(9);

    /// First id handed out to user types.
    pub const FIRST_USER_TYPE: u32 = 256;

    /// Get raw value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check whether this is one of the builtin ids.
    #[inline]
    pub const fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_USER_TYPE
    }

    /// Name of a builtin type, `None` for user types.
    pub const fn builtin_name(self) -> Option<&'static str> {
        match self.0 {
            1 => Some("NoneType"),
            2 => Some("bool"),
            3 => Some("int"),
            4 => Some("float"),
            5 => Some("str"),
            6 => Some("type"),
            7 => Some("weakref"),
            8 => Some("native"),
            9 => Some("object"),
            _ => None,
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.builtin_name() {
            Some(name) => f.write_str(name),
            None => match crate::registry::global_registry().name_of(*self) {
                Some(name) => f.write_str(&name),
                None => write!(f, "<type {}>", self.0),
            },
        }
    }
}
