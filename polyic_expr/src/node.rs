//! Computation tree nodes.
//!
//! A rule's guard and body are expressed as an `Expr` tree inside a
//! `Lambda`. Trees are plain data: they can be compared, rewritten into
//! templates and compiled to closures.

use crate::error::EvalResult;
use polyic_core::{TypeId, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// Variables
// =============================================================================

/// Identity of a block-local variable.
///
/// Ids are process-unique; the comparer matches variables by the order in
/// which they are first seen, never by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u32);

static NEXT_VAR: AtomicU32 = AtomicU32::new(1);

impl VarId {
    /// Allocate a fresh variable.
    #[inline]
    pub fn fresh() -> Self {
        VarId(NEXT_VAR.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$v{}", self.0)
    }
}

// =============================================================================
// Operators
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    /// Runtime type token of the operand.
    TypeOf,
    /// Upgrade a weak handle; a collected referent yields `None`.
    Deref,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Short-circuit conjunction.
    AndAlso,
    /// Short-circuit disjunction.
    OrElse,
    /// Reference identity.
    ReferenceEqual,
}

impl BinaryOp {
    /// Operator symbol used in diagnostics.
    pub const fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::AndAlso => "and",
            BinaryOp::OrElse => "or",
            BinaryOp::ReferenceEqual => "is",
        }
    }
}

// =============================================================================
// Methods
// =============================================================================

/// Native function body callable from a tree.
pub type NativeFn = dyn Fn(&[Value]) -> EvalResult<Value> + Send + Sync;

/// A named native function, compared by identity.
#[derive(Clone)]
pub struct Method {
    name: Arc<str>,
    func: Arc<NativeFn>,
}

impl Method {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[Value]) -> EvalResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn call(&self, args: &[Value]) -> EvalResult<Value> {
        (self.func)(args)
    }

    /// Address of the function body, used as its identity.
    #[inline]
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.func) as *const () as usize
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Method {}

impl Hash for Method {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<method {} at {:#x}>", self.name, self.addr())
    }
}

// =============================================================================
// Expressions
// =============================================================================

/// A computation tree node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Embedded constant. Constants are numbered by pre-order position.
    Constant(Value),
    /// Read of a lambda argument.
    Parameter(usize),
    /// Read of a block-local variable.
    Variable(VarId),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Exact runtime type test.
    TypeIs {
        operand: Box<Expr>,
        type_id: TypeId,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    /// Sequence with block-scoped variables; yields the last value.
    Block {
        variables: Vec<VarId>,
        body: Vec<Expr>,
    },
    Assign {
        target: VarId,
        value: Box<Expr>,
    },
    Call {
        method: Method,
        args: Vec<Expr>,
    },
    /// Raise the operand as an error.
    Throw(Box<Expr>),
    /// Read of the template parameter array.
    TemplateSlot(usize),
    /// "No match" sentinel: clears the caller's match flag.
    Miss,
}

/// Discriminant of an `Expr`, ignoring payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Constant,
    Parameter,
    Variable,
    Unary,
    Binary,
    TypeIs,
    Conditional,
    Block,
    Assign,
    Call,
    Throw,
    TemplateSlot,
    Miss,
}

impl Expr {
    #[inline]
    pub fn kind(&self) -> NodeKind {
        match self {
            Expr::Constant(_) => NodeKind::Constant,
            Expr::Parameter(_) => NodeKind::Parameter,
            Expr::Variable(_) => NodeKind::Variable,
            Expr::Unary { .. } => NodeKind::Unary,
            Expr::Binary { .. } => NodeKind::Binary,
            Expr::TypeIs { .. } => NodeKind::TypeIs,
            Expr::Conditional { .. } => NodeKind::Conditional,
            Expr::Block { .. } => NodeKind::Block,
            Expr::Assign { .. } => NodeKind::Assign,
            Expr::Call { .. } => NodeKind::Call,
            Expr::Throw(_) => NodeKind::Throw,
            Expr::TemplateSlot(_) => NodeKind::TemplateSlot,
            Expr::Miss => NodeKind::Miss,
        }
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    #[inline]
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    #[inline]
    pub fn param(index: usize) -> Self {
        Expr::Parameter(index)
    }

    #[inline]
    pub fn var(id: VarId) -> Self {
        Expr::Variable(id)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `TypeOf(operand)`.
    pub fn type_of(operand: Expr) -> Self {
        Expr::unary(UnaryOp::TypeOf, operand)
    }

    pub fn type_is(operand: Expr, type_id: TypeId) -> Self {
        Expr::TypeIs {
            operand: Box::new(operand),
            type_id,
        }
    }

    pub fn and_also(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::AndAlso, left, right)
    }

    pub fn reference_equal(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::ReferenceEqual, left, right)
    }

    pub fn condition(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        Expr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    pub fn block(variables: Vec<VarId>, body: Vec<Expr>) -> Self {
        Expr::Block { variables, body }
    }

    pub fn assign(target: VarId, value: Expr) -> Self {
        Expr::Assign {
            target,
            value: Box::new(value),
        }
    }

    pub fn call(method: Method, args: Vec<Expr>) -> Self {
        Expr::Call { method, args }
    }

    pub fn throw(operand: Expr) -> Self {
        Expr::Throw(Box::new(operand))
    }

    /// Conjunction of `terms`; `true` when empty.
    pub fn all(terms: impl IntoIterator<Item = Expr>) -> Self {
        let mut iter = terms.into_iter();
        match iter.next() {
            None => Expr::constant(true),
            Some(first) => iter.fold(first, Expr::and_also),
        }
    }
}

// =============================================================================
// Lambda
// =============================================================================

/// A computation over a fixed number of arguments.
#[derive(Debug, Clone)]
pub struct Lambda {
    pub arity: usize,
    pub body: Expr,
}

impl Lambda {
    pub fn new(arity: usize, body: Expr) -> Self {
        Self { arity, body }
    }
}
