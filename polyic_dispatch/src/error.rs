//! Dispatch errors.
//!
//! Guard misses never surface here. Only binder contract violations and
//! errors raised by a matched rule's body reach the caller.

use polyic_expr::{CompileError, EvalError};
use thiserror::Error;

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The binder declined to produce a rule.
    #[error("binder {binder} produced no rule for the given arguments")]
    NoRuleProduced { binder: String },

    /// The binder produced a tree that does not compile.
    #[error("binder {binder} produced an invalid rule: {source}")]
    InvalidRule {
        binder: String,
        #[source]
        source: CompileError,
    },

    #[error("call site expects {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },

    /// The binder kept producing rules that do not match.
    #[error("binder {binder} produced {attempts} rules without a match")]
    BindLimit { binder: String, attempts: usize },

    /// Raised by the body of the matching rule.
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl DispatchError {
    /// Whether this is a binder contract violation rather than a runtime
    /// error of the dynamic operation itself.
    pub fn is_binder_fault(&self) -> bool {
        matches!(
            self,
            DispatchError::NoRuleProduced { .. }
                | DispatchError::InvalidRule { .. }
                | DispatchError::BindLimit { .. }
        )
    }
}
