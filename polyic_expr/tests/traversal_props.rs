//! Property tests for the traversal/numbering coupling.
//!
//! The comparer numbers constants over `flatten`, the rewriter numbers them
//! while rebuilding through `map_children`. If the two orders ever drift a
//! template would read the wrong slot, so these properties pin them
//! together on arbitrary trees.

use polyic_core::{TypeId, Value};
use polyic_expr::visit::rewrite_constants;
use polyic_expr::{
    BinaryOp, CompareResult, Expr, Lambda, Method, Template, UnaryOp, VarId, compare_trees, compile,
    constants, flatten,
};
use proptest::prelude::*;
use std::cell::Cell;
use std::sync::OnceLock;

// =============================================================================
// Strategies
// =============================================================================

fn pick() -> &'static Method {
    static PICK: OnceLock<Method> = OnceLock::new();
    PICK.get_or_init(|| Method::new("pick", |args| Ok(args.last().cloned().unwrap_or_default())))
}

fn arb_constant() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-50i64..50).prop_map(Value::Int),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Type(TypeId::INT)),
        Just(Value::Type(TypeId::STR)),
        Just(Value::None),
    ]
}

fn arb_binary_op() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Add),
        Just(BinaryOp::Mul),
        Just(BinaryOp::Eq),
        Just(BinaryOp::Lt),
        Just(BinaryOp::AndAlso),
        Just(BinaryOp::OrElse),
    ]
}

/// Trees over two parameters using every variable-arity node kind.
fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        arb_constant().prop_map(Expr::Constant),
        (0usize..2).prop_map(Expr::Parameter),
    ];
    leaf.prop_recursive(5, 48, 4, |inner| {
        prop_oneof![
            (arb_binary_op(), inner.clone(), inner.clone())
                .prop_map(|(op, l, r)| Expr::binary(op, l, r)),
            inner.clone().prop_map(|e| Expr::unary(UnaryOp::Not, e)),
            inner.clone().prop_map(Expr::type_of),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(t, a, b)| Expr::condition(t, a, b)),
            prop::collection::vec(inner.clone(), 0..4)
                .prop_map(|args| Expr::call(pick().clone(), args)),
            (inner.clone(), prop::collection::vec(inner, 1..3)).prop_map(|(init, mut rest)| {
                let v = VarId::fresh();
                rest.insert(0, Expr::assign(v, init));
                rest.push(Expr::var(v));
                Expr::block(vec![v], rest)
            }),
        ]
    })
}

/// Replace every constant with a value from `values`, cycling.
fn substitute(expr: &Expr, values: &[Value]) -> Expr {
    rewrite_constants(expr.clone(), &mut |pos, original| {
        if values.is_empty() {
            Expr::Constant(original)
        } else {
            Expr::Constant(values[pos % values.len()].clone())
        }
    })
}

fn run(lambda: &Lambda) -> Result<(Value, bool), String> {
    let code = compile(lambda).map_err(|e| e.to_string())?;
    let flag = Cell::new(true);
    let args = [Value::Int(3), Value::Int(-2)];
    code.invoke(&args, &[], &flag)
        .map(|v| (v, flag.get()))
        .map_err(|e| e.to_string())
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn rewrite_visits_constants_in_flatten_order(expr in arb_expr()) {
        let expected: Vec<Value> = constants(&expr).into_iter().cloned().collect();
        let mut seen = Vec::new();
        rewrite_constants(expr.clone(), &mut |pos, v| {
            seen.push((pos, v.clone()));
            Expr::Constant(v)
        });
        prop_assert_eq!(seen.len(), expected.len());
        for (i, ((pos, v), e)) in seen.iter().zip(expected.iter()).enumerate() {
            prop_assert_eq!(*pos, i);
            prop_assert!(v.same_constant(e));
        }
    }

    #[test]
    fn constant_substitution_never_changes_shape(
        expr in arb_expr(),
        values in prop::collection::vec(arb_constant(), 1..4),
    ) {
        let original = Lambda::new(2, expr.clone());
        let varied = Lambda::new(2, substitute(&expr, &values));
        prop_assert_eq!(flatten(&original.body).len(), flatten(&varied.body).len());

        let cmp = compare_trees(&varied, &original, &[]);
        prop_assert_ne!(cmp.result, CompareResult::Incompatible);
    }

    #[test]
    fn template_reproduces_every_substitution(
        expr in arb_expr(),
        values in prop::collection::vec(arb_constant(), 1..4),
    ) {
        let original = Lambda::new(2, expr.clone());
        let varied = Lambda::new(2, substitute(&expr, &values));
        let positions: Vec<usize> = (0..constants(&expr).len()).collect();

        let template = Template::build(&original, &positions).unwrap();
        prop_assert!(template.matches(&varied));

        for lambda in [&original, &varied] {
            let bound = template.bind(lambda).unwrap();
            let flag = Cell::new(true);
            let templated = template
                .code()
                .invoke(&[Value::Int(3), Value::Int(-2)], &bound, &flag)
                .map(|v| (v, flag.get()))
                .map_err(|e| e.to_string());
            let direct = run(lambda);
            prop_assert_eq!(format!("{:?}", templated), format!("{:?}", direct));
        }
    }
}
