//! Dynamically typed values.
//!
//! `Value` is what call sites receive as arguments and return as results,
//! and what computation trees embed as constants.

use crate::object::{Instance, NativeRef, ObjectRef, WeakRef};
use crate::type_id::TypeId;
use std::fmt;
use std::sync::Arc;

/// A dynamic value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// A type token, as produced by `TypeOf` and embedded by type guards.
    Type(TypeId),
    Object(ObjectRef),
    Weak(WeakRef),
    Native(NativeRef),
}

impl Value {
    /// Create a string value.
    #[inline]
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Create a fresh object of the given type.
    #[inline]
    pub fn new_object(type_id: TypeId) -> Self {
        Value::Object(Instance::new(type_id))
    }

    /// Runtime type of this value.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        match self {
            Value::None => TypeId::NONE,
            Value::Bool(_) => TypeId::BOOL,
            Value::Int(_) => TypeId::INT,
            Value::Float(_) => TypeId::FLOAT,
            Value::Str(_) => TypeId::STR,
            Value::Type(_) => TypeId::TYPE,
            Value::Object(obj) => obj.type_id(),
            Value::Weak(_) => TypeId::WEAKREF,
            Value::Native(_) => TypeId::NATIVE,
        }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_type(&self) -> Option<TypeId> {
        match self {
            Value::Type(t) => Some(*t),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    #[inline]
    pub fn as_native(&self) -> Option<&NativeRef> {
        match self {
            Value::Native(n) => Some(n),
            _ => None,
        }
    }

    /// Truthiness used by conditionals and short-circuit operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Weak(w) => w.is_alive(),
            Value::Type(_) | Value::Object(_) | Value::Native(_) => true,
        }
    }

    /// Reference identity.
    ///
    /// Heap values compare by address; immediates fall back to
    /// `same_constant`.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => self.same_constant(other),
        }
    }

    /// Constant identity, as used when comparing two computation trees.
    ///
    /// Floats compare by bit pattern so that `NaN` constants are stable and
    /// `0.0`/`-0.0` stay distinct.
    pub fn same_constant(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Weak(a), Value::Weak(b)) => a.ptr_eq(b),
            (Value::Native(a), Value::Native(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Hashable key with the same notion of identity as `same_constant`.
    pub fn constant_key(&self) -> ConstantKey {
        match self {
            Value::None => ConstantKey::None,
            Value::Bool(b) => ConstantKey::Bool(*b),
            Value::Int(i) => ConstantKey::Int(*i),
            Value::Float(f) => ConstantKey::Float(f.to_bits()),
            Value::Str(s) => ConstantKey::Str(Arc::clone(s)),
            Value::Type(t) => ConstantKey::Type(*t),
            Value::Object(obj) => ConstantKey::Addr(Arc::as_ptr(obj) as *const () as usize),
            Value::Weak(w) => ConstantKey::Addr(w.addr()),
            Value::Native(n) => ConstantKey::Addr(n.addr()),
        }
    }
}

/// Hashable projection of a constant value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstantKey {
    None,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Arc<str>),
    Type(TypeId),
    Addr(usize),
}

impl PartialEq for Value {
    /// Value equality for scalars, identity for heap handles.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Float(a), Value::Float(b)) => a == b,
            _ => self.same_constant(other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<TypeId> for Value {
    fn from(t: TypeId) -> Self {
        Value::Type(t)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Type(t) => write!(f, "<class '{}'>", t),
            Value::Object(obj) => write!(f, "{:?}", obj),
            Value::Weak(w) => write!(f, "{:?}", w),
            Value::Native(n) => write!(f, "{:?}", n),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => fmt::Debug::fmt(other, f),
        }
    }
}
