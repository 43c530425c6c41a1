//! Computation trees for polyic rules.
//!
//! A rule's guard and body are an `Expr` tree wrapped in a `Lambda`. This
//! crate provides:
//! - The tree itself and the single traversal order every pass shares
//! - A closure compiler (`compile`) producing `CompiledLambda`
//! - The tree comparer and template rewriter behind auto-templating

pub mod compare;
pub mod compile;
pub mod error;
pub mod node;
pub mod ops;
pub mod template;
pub mod visit;

pub use compare::{CompareResult, Comparison, compare_trees};
pub use compile::{CompiledLambda, MissSignal, compile, compile_template};
pub use error::{CompileError, EvalError, EvalResult};
pub use node::{BinaryOp, Expr, Lambda, Method, NodeKind, UnaryOp, VarId};
pub use template::{ShapeKey, Template, build_template, extract_constants};
pub use visit::{constants, flatten};
