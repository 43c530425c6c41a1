//! Structural tree comparison for auto-templating.
//!
//! Two lambdas are walked in lock step over their pre-order node lists.
//! They are compatible if they agree everywhere except at constant leaves;
//! the constants that differ (or that the old template already
//! parameterizes) are reported by position.
//!
//! ```text
//!   new: TypeOf(p0) == <int>   ? p0 + 1 : Miss
//!   old: TypeOf(p0) == <float> ? p0 + 1 : Miss
//!                      ^^^^^^^
//!                      const #0 differs -> TooSpecific, replacements [(0, <int>)]
//! ```

use crate::node::{BinaryOp, Expr, Lambda, VarId};
use crate::visit::flatten;
use polyic_core::Value;
use rustc_hash::FxHashMap;

/// Outcome of comparing a new tree against an old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    /// Structurally different; no code can be shared.
    Incompatible,
    /// Only constants at already-templated positions may differ.
    Compatible,
    /// Constants differ outside the templated positions.
    TooSpecific,
}

/// Result of `compare_trees`.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub result: CompareResult,
    /// `(position, value in the new tree)` for every templated position and
    /// every differing constant, in position order.
    pub replacements: Vec<(usize, Value)>,
}

impl Comparison {
    fn incompatible() -> Self {
        Self {
            result: CompareResult::Incompatible,
            replacements: Vec::new(),
        }
    }

    /// Positions listed in `replacements`.
    pub fn positions(&self) -> Vec<usize> {
        self.replacements.iter().map(|(p, _)| *p).collect()
    }

    /// Values listed in `replacements`.
    pub fn values(&self) -> Vec<Value> {
        self.replacements.iter().map(|(_, v)| v.clone()).collect()
    }
}

/// Compare `new` against `old`.
///
/// `templated` holds the constant positions the old rule's template
/// already reads from its parameter array, sorted ascending.
pub fn compare_trees(new: &Lambda, old: &Lambda, templated: &[usize]) -> Comparison {
    if new.arity != old.arity {
        return Comparison::incompatible();
    }

    let new_nodes = flatten(&new.body);
    let old_nodes = flatten(&old.body);
    if new_nodes.len() != old_nodes.len() {
        return Comparison::incompatible();
    }

    let mut vars = VarMatcher::default();
    let mut replacements = Vec::new();
    let mut too_specific = false;
    let mut position = 0usize;

    for (a, b) in new_nodes.iter().copied().zip(old_nodes.iter().copied()) {
        if a.kind() != b.kind() || a.children().len() != b.children().len() {
            return Comparison::incompatible();
        }

        match (a, b) {
            (Expr::Constant(ca), Expr::Constant(cb)) => {
                if templated.binary_search(&position).is_ok() {
                    replacements.push((position, ca.clone()));
                } else if !ca.same_constant(cb) {
                    too_specific = true;
                    replacements.push((position, ca.clone()));
                }
                position += 1;
            }
            (Expr::Parameter(i), Expr::Parameter(j)) => {
                if i != j {
                    return Comparison::incompatible();
                }
            }
            (Expr::Variable(x), Expr::Variable(y)) => {
                if !vars.matches(*x, *y) {
                    return Comparison::incompatible();
                }
            }
            (Expr::TemplateSlot(i), Expr::TemplateSlot(j)) => {
                if i != j {
                    return Comparison::incompatible();
                }
            }
            (Expr::Unary { op: x, .. }, Expr::Unary { op: y, .. }) => {
                if x != y {
                    return Comparison::incompatible();
                }
            }
            (
                Expr::Binary {
                    op: x,
                    left: l1,
                    right: r1,
                },
                Expr::Binary {
                    op: y,
                    left: l2,
                    right: r2,
                },
            ) => {
                if x != y {
                    return Comparison::incompatible();
                }
                // Identity between two literal constants is decided by the
                // constants themselves, so they cannot be parameterized.
                if *x == BinaryOp::ReferenceEqual && !identity_operands_agree(l1, r1, l2, r2) {
                    return Comparison::incompatible();
                }
            }
            (Expr::TypeIs { type_id: x, .. }, Expr::TypeIs { type_id: y, .. }) => {
                if x != y {
                    return Comparison::incompatible();
                }
            }
            (Expr::Block { variables: vx, .. }, Expr::Block { variables: vy, .. }) => {
                if vx.len() != vy.len() {
                    return Comparison::incompatible();
                }
                for (x, y) in vx.iter().zip(vy.iter()) {
                    if !vars.matches(*x, *y) {
                        return Comparison::incompatible();
                    }
                }
            }
            (Expr::Assign { target: x, .. }, Expr::Assign { target: y, .. }) => {
                if !vars.matches(*x, *y) {
                    return Comparison::incompatible();
                }
            }
            (Expr::Call { method: x, .. }, Expr::Call { method: y, .. }) => {
                if x != y {
                    return Comparison::incompatible();
                }
            }
            // Kind equality is all these need.
            _ => {}
        }
    }

    Comparison {
        result: if too_specific {
            CompareResult::TooSpecific
        } else {
            CompareResult::Compatible
        },
        replacements,
    }
}

fn identity_operands_agree(l1: &Expr, r1: &Expr, l2: &Expr, r2: &Expr) -> bool {
    match (l1, r1, l2, r2) {
        (Expr::Constant(a1), Expr::Constant(b1), Expr::Constant(a2), Expr::Constant(b2)) => {
            a1.same_constant(a2) && b1.same_constant(b2)
        }
        _ => true,
    }
}

/// Matches variables by first-use ordinal on each side.
#[derive(Default)]
struct VarMatcher {
    new: FxHashMap<VarId, usize>,
    old: FxHashMap<VarId, usize>,
}

impl VarMatcher {
    fn matches(&mut self, x: VarId, y: VarId) -> bool {
        let next_new = self.new.len();
        let next_old = self.old.len();
        let a = *self.new.entry(x).or_insert(next_new);
        let b = *self.old.entry(y).or_insert(next_old);
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Method;
    use polyic_core::TypeId;

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

    #[test]
    fn test_identical_trees_are_compatible() {
        let c = compare_trees(&typed_add(TypeId::INT, 1), &typed_add(TypeId::INT, 1), &[]);
        assert_eq!(c.result, CompareResult::Compatible);
        assert!(c.replacements.is_empty());
    }

    #[test]
    fn test_differing_constant_is_too_specific() {
        let c = compare_trees(&typed_add(TypeId::FLOAT, 1), &typed_add(TypeId::INT, 1), &[]);
        assert_eq!(c.result, CompareResult::TooSpecific);
        assert_eq!(c.positions(), vec![0]);
        assert_eq!(c.values(), vec![Value::Type(TypeId::FLOAT)]);
    }

    #[test]
    fn test_templated_positions_always_reported() {
        let c = compare_trees(&typed_add(TypeId::FLOAT, 1), &typed_add(TypeId::INT, 1), &[0, 1]);
        assert_eq!(c.result, CompareResult::Compatible);
        assert_eq!(c.positions(), vec![0, 1]);
        assert_eq!(c.values(), vec![Value::Type(TypeId::FLOAT), Value::Int(1)]);

        // A difference outside the template still widens it.
        let c = compare_trees(&typed_add(TypeId::FLOAT, 2), &typed_add(TypeId::INT, 1), &[0]);
        assert_eq!(c.result, CompareResult::TooSpecific);
        assert_eq!(c.positions(), vec![0, 1]);
    }

    #[test]
    fn test_structural_mismatch() {
        let other = Lambda::new(
            1,
            Expr::condition(
                Expr::type_is(Expr::param(0), TypeId::INT),
                Expr::param(0),
                Expr::Miss,
            ),
        );
        let c = compare_trees(&other, &typed_add(TypeId::INT, 1), &[]);
        assert_eq!(c.result, CompareResult::Incompatible);

        let wrong_arity = Lambda::new(2, typed_add(TypeId::INT, 1).body);
        let c = compare_trees(&wrong_arity, &typed_add(TypeId::INT, 1), &[]);
        assert_eq!(c.result, CompareResult::Incompatible);
    }

    #[test]
    fn test_operator_and_parameter_must_match() {
        let sub = Lambda::new(1, Expr::binary(BinaryOp::Sub, Expr::param(0), Expr::constant(1i64)));
        let add = Lambda::new(1, Expr::binary(BinaryOp::Add, Expr::param(0), Expr::constant(1i64)));
        assert_eq!(compare_trees(&sub, &add, &[]).result, CompareResult::Incompatible);

        let p0 = Lambda::new(2, Expr::param(0));
        let p1 = Lambda::new(2, Expr::param(1));
        assert_eq!(compare_trees(&p0, &p1, &[]).result, CompareResult::Incompatible);
    }

    #[test]
    fn test_method_identity_must_match() {
        let f = Method::new("f", |_| Ok(Value::None));
        let g = Method::new("f", |_| Ok(Value::None));
        let a = Lambda::new(0, Expr::call(f.clone(), vec![Expr::constant(1i64)]));
        let b = Lambda::new(0, Expr::call(f, vec![Expr::constant(2i64)]));
        let c = Lambda::new(0, Expr::call(g, vec![Expr::constant(1i64)]));
        assert_eq!(compare_trees(&a, &b, &[]).result, CompareResult::TooSpecific);
        assert_eq!(compare_trees(&a, &c, &[]).result, CompareResult::Incompatible);
    }

    #[test]
    fn test_variables_match_by_ordinal() {
        let build = |x: VarId, y: VarId, read: VarId| {
            Lambda::new(
                0,
                Expr::block(
                    vec![x, y],
                    vec![
                        Expr::assign(x, Expr::constant(1i64)),
                        Expr::assign(y, Expr::constant(2i64)),
                        Expr::var(read),
                    ],
                ),
            )
        };
        let (a, b, c, d) = (VarId::fresh(), VarId::fresh(), VarId::fresh(), VarId::fresh());
        let left = build(a, b, a);
        let same = build(c, d, c);
        let swapped = build(c, d, d);
        assert_eq!(compare_trees(&left, &same, &[]).result, CompareResult::Compatible);
        assert_eq!(compare_trees(&left, &swapped, &[]).result, CompareResult::Incompatible);
    }

    #[test]
    fn test_reference_equal_between_constants() {
        let a = Value::new_object(TypeId::OBJECT);
        let b = Value::new_object(TypeId::OBJECT);
        let build = |x: &Value| {
            Lambda::new(
                0,
                Expr::reference_equal(Expr::Constant(x.clone()), Expr::Constant(Value::None)),
            )
        };
        assert_eq!(compare_trees(&build(&a), &build(&b), &[]).result, CompareResult::Incompatible);

        // Against a parameter the constant is an ordinary leaf.
        let build = |x: &Value| Lambda::new(1, Expr::reference_equal(Expr::param(0), Expr::Constant(x.clone())));
        assert_eq!(compare_trees(&build(&a), &build(&b), &[]).result, CompareResult::TooSpecific);
    }
}
