//! Shared traversal.
//!
//! `children` and `map_children` are the single definition of child order.
//! Everything that numbers constants by position (the comparer, the
//! template rewriter, constant extraction, shape keys) goes through these
//! two functions, so numbering agrees across passes:
//!
//! ```text
//!   Conditional               pre-order:  0 Conditional
//!   +-- Eq                                1 Eq
//!   |   +-- TypeOf                        2 TypeOf
//!   |   |   +-- Param 0                   3 Param 0
//!   |   +-- Const int       <- const #0   4 Const int
//!   +-- Const 7             <- const #1   5 Const 7
//!   +-- Miss                              6 Miss
//! ```

use crate::node::Expr;
use polyic_core::Value;
use smallvec::SmallVec;

/// Child list; most nodes have at most three.
pub type Children<'a> = SmallVec<[&'a Expr; 4]>;

impl Expr {
    /// Direct children in traversal order.
    pub fn children(&self) -> Children<'_> {
        let mut out = Children::new();
        match self {
            Expr::Constant(_)
            | Expr::Parameter(_)
            | Expr::Variable(_)
            | Expr::TemplateSlot(_)
            | Expr::Miss => {}
            Expr::Unary { operand, .. } | Expr::TypeIs { operand, .. } | Expr::Throw(operand) => {
                out.push(operand);
            }
            Expr::Binary { left, right, .. } => {
                out.push(left);
                out.push(right);
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                out.push(test);
                out.push(if_true);
                out.push(if_false);
            }
            Expr::Block { body, .. } => out.extend(body.iter()),
            Expr::Assign { value, .. } => out.push(value),
            Expr::Call { args, .. } => out.extend(args.iter()),
        }
        out
    }

    /// Rebuild this node with every child passed through `f`, in the same
    /// order as `children`.
    pub fn map_children(self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        match self {
            leaf @ (Expr::Constant(_)
            | Expr::Parameter(_)
            | Expr::Variable(_)
            | Expr::TemplateSlot(_)
            | Expr::Miss) => leaf,
            Expr::Unary { op, operand } => Expr::Unary {
                op,
                operand: Box::new(f(*operand)),
            },
            Expr::TypeIs { operand, type_id } => Expr::TypeIs {
                operand: Box::new(f(*operand)),
                type_id,
            },
            Expr::Throw(operand) => Expr::Throw(Box::new(f(*operand))),
            Expr::Binary { op, left, right } => {
                let left = f(*left);
                let right = f(*right);
                Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                let test = f(*test);
                let if_true = f(*if_true);
                let if_false = f(*if_false);
                Expr::Conditional {
                    test: Box::new(test),
                    if_true: Box::new(if_true),
                    if_false: Box::new(if_false),
                }
            }
            Expr::Block { variables, body } => Expr::Block {
                variables,
                body: body.into_iter().map(&mut *f).collect(),
            },
            Expr::Assign { target, value } => Expr::Assign {
                target,
                value: Box::new(f(*value)),
            },
            Expr::Call { method, args } => Expr::Call {
                method,
                args: args.into_iter().map(&mut *f).collect(),
            },
        }
    }
}

/// Visit every node in pre-order.
pub fn walk<'a>(expr: &'a Expr, visit: &mut impl FnMut(&'a Expr)) {
    visit(expr);
    for child in expr.children() {
        walk(child, visit);
    }
}

/// Pre-order node list.
pub fn flatten(expr: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    walk(expr, &mut |e| out.push(e));
    out
}

/// Constants in position order.
pub fn constants(expr: &Expr) -> Vec<&Value> {
    let mut out = Vec::new();
    walk(expr, &mut |e| {
        if let Expr::Constant(v) = e {
            out.push(v);
        }
    });
    out
}

/// Rebuild a tree bottom-up in pre-order, handing each constant its
/// position number.
///
/// `f` sees every constant exactly once, in the order `constants` lists
/// them, and returns the node to put in its place.
pub fn rewrite_constants(expr: Expr, f: &mut impl FnMut(usize, Value) -> Expr) -> Expr {
    let mut next = 0usize;
    rewrite_rec(expr, &mut next, f)
}

fn rewrite_rec(expr: Expr, next: &mut usize, f: &mut impl FnMut(usize, Value) -> Expr) -> Expr {
    match expr {
        Expr::Constant(value) => {
            let position = *next;
            *next += 1;
            f(position, value)
        }
        other => other.map_children(&mut |child| rewrite_rec(child, next, f)),
    }
}
