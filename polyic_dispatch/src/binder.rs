//! Binder interface and binder identity.
//!
//! A binder turns a concrete argument snapshot into a guarded `Binding`.
//! Binders are compared by value, not by reference: two binders of the same
//! concrete type performing the same operation on the same operand shape
//! have the same `BinderIdentity`, and the registry gives them one shared
//! rule cache per signature.

use crate::rule::Binding;
use polyic_core::Value;
use polyic_expr::{BinaryOp, UnaryOp};
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Operation Kind
// =============================================================================

/// The dynamic operation a binder implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    GetMember,
    SetMember,
    DeleteMember,
    Binary(BinaryOp),
    Unary(UnaryOp),
    Invoke,
    Convert,
    /// Embedder-defined operation.
    Custom(&'static str),
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::GetMember => f.write_str("get-member"),
            OperationKind::SetMember => f.write_str("set-member"),
            OperationKind::DeleteMember => f.write_str("delete-member"),
            OperationKind::Binary(op) => write!(f, "binary({})", op.symbol()),
            OperationKind::Unary(op) => write!(f, "unary({op:?})"),
            OperationKind::Invoke => f.write_str("invoke"),
            OperationKind::Convert => f.write_str("convert"),
            OperationKind::Custom(name) => write!(f, "custom({name})"),
        }
    }
}

// =============================================================================
// Operand Shape
// =============================================================================

/// Static description of the operands: member name, count and flags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct OperandShape {
    pub name: Option<Arc<str>>,
    pub arity: usize,
    /// Binder-specific bits, such as case-insensitive lookup.
    pub flags: u32,
}

impl OperandShape {
    pub fn new(arity: usize) -> Self {
        Self {
            name: None,
            arity,
            flags: 0,
        }
    }

    pub fn named(name: &str, arity: usize) -> Self {
        Self {
            name: Some(Arc::from(name)),
            arity,
            flags: 0,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }
}

// =============================================================================
// Signature
// =============================================================================

/// Whether a site's callable produces a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Returns {
    #[default]
    Value,
    Void,
}

/// The callable shape of a call site; keys the per-binder cache dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub arity: usize,
    pub returns: Returns,
}

impl Signature {
    #[inline]
    pub const fn new(arity: usize) -> Self {
        Self {
            arity,
            returns: Returns::Value,
        }
    }

    #[inline]
    pub const fn void(arity: usize) -> Self {
        Self {
            arity,
            returns: Returns::Void,
        }
    }
}

// =============================================================================
// Binder
// =============================================================================

/// Produces rules on a cache miss.
///
/// `bind` must be pure with respect to the snapshot: given the same
/// arguments it must produce a rule whose guards hold for them. Returning
/// `None` is a contract violation and surfaces as
/// `DispatchError::NoRuleProduced`.
pub trait Binder: Send + Sync + fmt::Debug + 'static {
    fn operation(&self) -> OperationKind;

    fn operand_shape(&self) -> OperandShape;

    fn bind(&self, args: &[Value], signature: &Signature) -> Option<Binding>;

    /// Human-readable description used in errors and logs.
    fn describe(&self) -> String {
        format!("{}", self.operation())
    }

    /// Concrete binder type, part of the identity.
    fn binder_type(&self) -> std::any::TypeId {
        std::any::TypeId::of::<Self>()
    }
}

/// Value identity of a binder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinderIdentity {
    binder_type: std::any::TypeId,
    operation: OperationKind,
    shape: OperandShape,
}

impl BinderIdentity {
    pub fn of(binder: &dyn Binder) -> Self {
        Self {
            binder_type: binder.binder_type(),
            operation: binder.operation(),
            shape: binder.operand_shape(),
        }
    }

    #[inline]
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    #[inline]
    pub fn shape(&self) -> &OperandShape {
        &self.shape
    }
}
