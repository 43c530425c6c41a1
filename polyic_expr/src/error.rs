//! Evaluation and compilation errors.

use crate::node::VarId;
use polyic_core::Value;
use std::sync::Arc;
use thiserror::Error;

/// Result of evaluating a computation tree.
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors raised while running a compiled computation.
///
/// A guard miss is *not* an error; it is reported through the miss signal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("TypeError: {0}")]
    Type(String),

    #[error("ZeroDivisionError: division by zero")]
    DivisionByZero,

    /// A value raised by an explicit `Throw` node.
    #[error("raised: {0}")]
    Raised(Value),

    #[error("AttributeError: '{type_name}' object has no attribute '{name}'")]
    Attribute { type_name: String, name: Arc<str> },

    /// Failure reported by a native method.
    #[error("{0}")]
    Native(String),
}

impl EvalError {
    /// Build a type error for a binary operator.
    pub fn unsupported_binary(op: &str, left: &Value, right: &Value) -> Self {
        EvalError::Type(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op,
            left.type_id(),
            right.type_id()
        ))
    }

    /// Build a type error for a unary operator.
    pub fn unsupported_unary(op: &str, operand: &Value) -> Self {
        EvalError::Type(format!("bad operand type for {}: '{}'", op, operand.type_id()))
    }
}

/// Errors detected while lowering a tree to closures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("parameter {index} out of range for arity {arity}")]
    ParameterOutOfRange { index: usize, arity: usize },

    #[error("variable {0} is not declared by an enclosing block")]
    UnboundVariable(VarId),

    #[error("template slot {index} out of range for {arity} bound values")]
    TemplateSlotOutOfRange { index: usize, arity: usize },
}
