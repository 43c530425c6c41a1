//! Template rewriting.
//!
//! A template is a tree whose designated constant leaves have been
//! replaced by reads of a parameter array. Rules that differ only in
//! those constants then share one compiled body:
//!
//! ```text
//!   before:  TypeOf(p0) == <int> ? p0 + 1 : Miss
//!
//!   after:   Block [t0, t1] {
//!              t0 = slot[0]
//!              t1 = slot[1]
//!              TypeOf(p0) == t0 ? p0 + t1 : Miss
//!            }
//! ```
//!
//! Each slot is read exactly once at entry into a fresh block variable.

use crate::compile::{CompiledLambda, compile_template};
use crate::error::CompileError;
use crate::node::{BinaryOp, Expr, Lambda, Method, NodeKind, UnaryOp, VarId};
use crate::visit::{constants, rewrite_constants, walk};
use polyic_core::{ConstantKey, TypeId, Value};
use rustc_hash::{FxHashMap, FxHasher};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// =============================================================================
// Rewriting
// =============================================================================

/// Rewrite the constants at `positions` (sorted ascending) into template
/// slot reads. Slot `i` corresponds to `positions[i]`.
pub fn build_template(lambda: &Lambda, positions: &[usize]) -> Lambda {
    let vars: Vec<VarId> = positions.iter().map(|_| VarId::fresh()).collect();

    let body = rewrite_constants(lambda.body.clone(), &mut |position, value| {
        match positions.binary_search(&position) {
            Ok(slot) => Expr::Variable(vars[slot]),
            Err(_) => Expr::Constant(value),
        }
    });

    let mut stmts = Vec::with_capacity(vars.len() + 1);
    for (slot, var) in vars.iter().enumerate() {
        stmts.push(Expr::assign(*var, Expr::TemplateSlot(slot)));
    }
    stmts.push(body);

    Lambda::new(lambda.arity, Expr::block(vars, stmts))
}

/// Values of the constants at `positions`, in slot order.
///
/// Returns `None` if a position is past the last constant.
pub fn extract_constants(lambda: &Lambda, positions: &[usize]) -> Option<Vec<Value>> {
    let all = constants(&lambda.body);
    positions.iter().map(|p| all.get(*p).map(|v| (*v).clone())).collect()
}

// =============================================================================
// Shape Key
// =============================================================================

/// Constant compared by identity.
#[derive(Clone, Debug)]
struct ConstToken(Value);

impl PartialEq for ConstToken {
    fn eq(&self, other: &Self) -> bool {
        self.0.same_constant(&other.0)
    }
}

impl Eq for ConstToken {}

impl Hash for ConstToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let key: ConstantKey = self.0.constant_key();
        key.hash(state);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Token {
    Node(NodeKind, usize),
    Param(usize),
    Var(usize),
    Slot(usize),
    Unary(UnaryOp),
    Binary(BinaryOp),
    TypeIs(TypeId),
    Method(Method),
    Constant(ConstToken),
    Hole,
}

/// Exact structural key of a lambda with its templated constants masked.
///
/// Two lambdas with equal keys for the same positions compare `Compatible`
/// against each other, so a rule whose key matches an existing template
/// can reuse it without running the comparer or the rewriter.
#[derive(Clone)]
pub struct ShapeKey {
    arity: usize,
    tokens: Arc<[Token]>,
    hash: u64,
}

impl ShapeKey {
    pub fn of(lambda: &Lambda, positions: &[usize]) -> Self {
        let mut tokens = Vec::new();
        let mut vars: FxHashMap<VarId, usize> = FxHashMap::default();
        let mut position = 0usize;

        walk(&lambda.body, &mut |e: &Expr| {
            tokens.push(Token::Node(e.kind(), e.children().len()));
            match e {
                Expr::Constant(v) => {
                    if positions.binary_search(&position).is_ok() {
                        tokens.push(Token::Hole);
                    } else {
                        tokens.push(Token::Constant(ConstToken(v.clone())));
                    }
                    position += 1;
                }
                Expr::Parameter(i) => tokens.push(Token::Param(*i)),
                Expr::Variable(v) => tokens.push(Token::Var(ordinal(*v, &mut vars))),
                Expr::TemplateSlot(i) => tokens.push(Token::Slot(*i)),
                Expr::Unary { op, .. } => tokens.push(Token::Unary(*op)),
                Expr::Binary { op, .. } => tokens.push(Token::Binary(*op)),
                Expr::TypeIs { type_id, .. } => tokens.push(Token::TypeIs(*type_id)),
                Expr::Block { variables, .. } => {
                    for v in variables {
                        tokens.push(Token::Var(ordinal(*v, &mut vars)));
                    }
                }
                Expr::Assign { target, .. } => tokens.push(Token::Var(ordinal(*target, &mut vars))),
                Expr::Call { method, .. } => tokens.push(Token::Method(method.clone())),
                Expr::Conditional { .. } | Expr::Throw(_) | Expr::Miss => {}
            }
        });

        let mut hasher = FxHasher::default();
        lambda.arity.hash(&mut hasher);
        tokens.hash(&mut hasher);

        Self {
            arity: lambda.arity,
            tokens: Arc::from(tokens),
            hash: hasher.finish(),
        }
    }

    /// Precomputed hash.
    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }
}

/// First-use ordinal of `v`.
fn ordinal(v: VarId, vars: &mut FxHashMap<VarId, usize>) -> usize {
    let next = vars.len();
    *vars.entry(v).or_insert(next)
}

impl PartialEq for ShapeKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.arity == other.arity
            && (Arc::ptr_eq(&self.tokens, &other.tokens) || self.tokens == other.tokens)
    }
}

impl Eq for ShapeKey {}

impl Hash for ShapeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeKey")
            .field("arity", &self.arity)
            .field("tokens", &self.tokens.len())
            .field("hash", &format_args!("{:#018x}", self.hash))
            .finish()
    }
}

// =============================================================================
// Template
// =============================================================================

/// A compiled template: shared code plus the positions it parameterizes.
pub struct Template {
    positions: Arc<[usize]>,
    code: Arc<CompiledLambda>,
    shape: ShapeKey,
}

impl Template {
    /// Rewrite and compile `lambda` with `positions` parameterized.
    pub fn build(lambda: &Lambda, positions: &[usize]) -> Result<Self, CompileError> {
        let mut sorted = positions.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let rewritten = build_template(lambda, &sorted);
        let code = compile_template(&rewritten, sorted.len())?;
        Ok(Self {
            shape: ShapeKey::of(lambda, &sorted),
            positions: Arc::from(sorted),
            code: Arc::new(code),
        })
    }

    #[inline]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    #[inline]
    pub fn code(&self) -> &Arc<CompiledLambda> {
        &self.code
    }

    #[inline]
    pub fn shape(&self) -> &ShapeKey {
        &self.shape
    }

    /// Check whether `lambda` has this template's shape.
    pub fn matches(&self, lambda: &Lambda) -> bool {
        ShapeKey::of(lambda, &self.positions) == self.shape
    }

    /// Bound values for running this template as `lambda`.
    pub fn bind(&self, lambda: &Lambda) -> Option<Arc<[Value]>> {
        extract_constants(lambda, &self.positions).map(Arc::from)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("positions", &self.positions)
            .field("shape", &self.shape)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use std::cell::Cell;

    fn typed_add(type_id: TypeId, addend: i64) -> Lambda {
        Lambda::new(
            1,
            Expr::condition(
                Expr::binary(
                    BinaryOp::Eq,
                    Expr::type_of(Expr::param(0)),
                    Expr::constant(type_id),
                ),
                Expr::binary(BinaryOp::Add, Expr::param(0), Expr::constant(addend)),
                Expr::Miss,
            ),
        )
    }

    fn run(code: &CompiledLambda, bound: &[Value], arg: Value) -> (Value, bool) {
        let flag = Cell::new(true);
        let out = code.invoke(&[arg], bound, &flag).unwrap();
        (out, flag.get())
    }

    #[test]
    fn test_template_reproduces_original() {
        let original = typed_add(TypeId::INT, 5);
        let template = Template::build(&original, &[0, 1]).unwrap();
        let bound = template.bind(&original).unwrap();
        let direct = compile(&original).unwrap();

        for arg in [Value::Int(3), Value::Float(1.0), Value::str("x")] {
            assert_eq!(
                run(template.code(), &bound, arg.clone()),
                run(&direct, &[], arg)
            );
        }
    }

    #[test]
    fn test_template_serves_sibling_rule() {
        let template = Template::build(&typed_add(TypeId::INT, 1), &[0, 1]).unwrap();
        let sibling = typed_add(TypeId::FLOAT, 10);
        assert!(template.matches(&sibling));

        let bound = template.bind(&sibling).unwrap();
        assert_eq!(run(template.code(), &bound, Value::Float(0.5)), (Value::Float(10.5), true));
        assert!(!run(template.code(), &bound, Value::Int(1)).1);
    }

    #[test]
    fn test_shape_key_masks_only_templated_positions() {
        let a = typed_add(TypeId::INT, 1);
        let b = typed_add(TypeId::FLOAT, 1);
        let c = typed_add(TypeId::FLOAT, 2);
        assert_eq!(ShapeKey::of(&a, &[0]), ShapeKey::of(&b, &[0]));
        assert_ne!(ShapeKey::of(&a, &[0]), ShapeKey::of(&c, &[0]));
        assert_ne!(ShapeKey::of(&a, &[]), ShapeKey::of(&b, &[]));
    }

    #[test]
    fn test_extract_out_of_range() {
        let lambda = typed_add(TypeId::INT, 1);
        assert_eq!(extract_constants(&lambda, &[1]), Some(vec![Value::Int(1)]));
        assert_eq!(extract_constants(&lambda, &[2]), None);
    }

    #[test]
    fn test_build_sorts_positions() {
        let template = Template::build(&typed_add(TypeId::INT, 1), &[1, 0, 1]).unwrap();
        assert_eq!(template.positions(), &[0, 1]);
        assert_eq!(template.code().template_arity(), 2);
    }
}
