//! Operator semantics.
//!
//! Int and Float mix with promotion to Float. Integer arithmetic wraps on
//! overflow. `AndAlso`/`OrElse` are short-circuited by the compiler and
//! never reach `binary`.

use crate::error::{EvalError, EvalResult};
use crate::node::{BinaryOp, UnaryOp};
use polyic_core::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// Apply a unary operator.
pub fn unary(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    match op {
        UnaryOp::Neg => match operand {
            Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(EvalError::unsupported_unary("unary -", other)),
        },
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::TypeOf => Ok(Value::Type(operand.type_id())),
        UnaryOp::Deref => match operand {
            Value::Weak(w) => Ok(w.upgrade().map(Value::Object).unwrap_or(Value::None)),
            other => Err(EvalError::unsupported_unary("deref", other)),
        },
    }
}

/// Apply a strict binary operator.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => arith(op, left, right, i64::wrapping_sub, |a, b| a - b),
        BinaryOp::Mul => arith(op, left, right, i64::wrapping_mul, |a, b| a * b),
        BinaryOp::Div => divide(op, left, right, i64::wrapping_div, |a, b| a / b),
        BinaryOp::Rem => divide(op, left, right, i64::wrapping_rem, |a, b| a % b),
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),
        BinaryOp::Lt => compare(op, left, right, Ordering::is_lt),
        BinaryOp::Le => compare(op, left, right, Ordering::is_le),
        BinaryOp::Gt => compare(op, left, right, Ordering::is_gt),
        BinaryOp::Ge => compare(op, left, right, Ordering::is_ge),
        BinaryOp::ReferenceEqual => Ok(Value::Bool(left.is_same(right))),
        BinaryOp::AndAlso => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::OrElse => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
    }
}

// =============================================================================
// Numeric Helpers
// =============================================================================

enum Numeric {
    Int(i64, i64),
    Float(f64, f64),
}

#[inline]
fn numeric(left: &Value, right: &Value) -> Option<Numeric> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(Numeric::Int(*a, *b)),
        (Value::Int(a), Value::Float(b)) => Some(Numeric::Float(*a as f64, *b)),
        (Value::Float(a), Value::Int(b)) => Some(Numeric::Float(*a, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Some(Numeric::Float(*a, *b)),
        _ => None,
    }
}

fn add(left: &Value, right: &Value) -> EvalResult<Value> {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        let mut s = String::with_capacity(a.len() + b.len());
        s.push_str(a);
        s.push_str(b);
        return Ok(Value::Str(Arc::from(s)));
    }
    arith(BinaryOp::Add, left, right, i64::wrapping_add, |a, b| a + b)
}

#[inline]
fn arith(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> EvalResult<Value> {
    match numeric(left, right) {
        Some(Numeric::Int(a, b)) => Ok(Value::Int(int_op(a, b))),
        Some(Numeric::Float(a, b)) => Ok(Value::Float(float_op(a, b))),
        None => Err(EvalError::unsupported_binary(op.symbol(), left, right)),
    }
}

fn divide(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> EvalResult<Value> {
    match numeric(left, right) {
        Some(Numeric::Int(_, 0)) => Err(EvalError::DivisionByZero),
        Some(Numeric::Int(a, b)) => Ok(Value::Int(int_op(a, b))),
        Some(Numeric::Float(a, b)) => Ok(Value::Float(float_op(a, b))),
        None => Err(EvalError::unsupported_binary(op.symbol(), left, right)),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value, test: fn(Ordering) -> bool) -> EvalResult<Value> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match numeric(left, right) {
            Some(Numeric::Int(a, b)) => Some(a.cmp(&b)),
            // NaN compares false under every ordering operator.
            Some(Numeric::Float(a, b)) => match a.partial_cmp(&b) {
                Some(ord) => Some(ord),
                None => return Ok(Value::Bool(false)),
            },
            None => None,
        },
    };
    match ordering {
        Some(ord) => Ok(Value::Bool(test(ord))),
        None => Err(EvalError::Type(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            left.type_id(),
            right.type_id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyic_core::{Instance, TypeId, WeakRef};

    #[test]
    fn test_int_float_promotion() {
        assert_eq!(binary(BinaryOp::Add, &Value::Int(1), &Value::Int(2)), Ok(Value::Int(3)));
        assert_eq!(
            binary(BinaryOp::Mul, &Value::Int(2), &Value::Float(1.5)),
            Ok(Value::Float(3.0))
        );
        assert_eq!(
            binary(BinaryOp::Sub, &Value::Float(1.0), &Value::Int(3)),
            Ok(Value::Float(-2.0))
        );
    }

    #[test]
    fn test_integer_overflow_wraps() {
        assert_eq!(
            binary(BinaryOp::Add, &Value::Int(i64::MAX), &Value::Int(1)),
            Ok(Value::Int(i64::MIN))
        );
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            binary(BinaryOp::Add, &Value::str("ab"), &Value::str("cd")),
            Ok(Value::str("abcd"))
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            binary(BinaryOp::Div, &Value::Int(1), &Value::Int(0)),
            Err(EvalError::DivisionByZero)
        );
        assert_eq!(
            binary(BinaryOp::Rem, &Value::Int(1), &Value::Int(0)),
            Err(EvalError::DivisionByZero)
        );
        // Float division follows IEEE.
        match binary(BinaryOp::Div, &Value::Float(1.0), &Value::Int(0)) {
            Ok(Value::Float(f)) => assert!(f.is_infinite()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_operands() {
        let err = binary(BinaryOp::Sub, &Value::str("a"), &Value::Int(1)).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
        assert!(err.to_string().contains("'str' and 'int'"));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(binary(BinaryOp::Lt, &Value::Int(1), &Value::Float(1.5)), Ok(Value::Bool(true)));
        assert_eq!(binary(BinaryOp::Ge, &Value::str("b"), &Value::str("a")), Ok(Value::Bool(true)));
        assert_eq!(
            binary(BinaryOp::Lt, &Value::Float(f64::NAN), &Value::Int(0)),
            Ok(Value::Bool(false))
        );
        assert!(binary(BinaryOp::Lt, &Value::None, &Value::Int(0)).is_err());
    }

    #[test]
    fn test_reference_equal() {
        let a = Value::new_object(TypeId::OBJECT);
        let b = Value::new_object(TypeId::OBJECT);
        assert_eq!(binary(BinaryOp::ReferenceEqual, &a, &a.clone()), Ok(Value::Bool(true)));
        assert_eq!(binary(BinaryOp::ReferenceEqual, &a, &b), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_type_of_and_deref() {
        assert_eq!(unary(UnaryOp::TypeOf, &Value::Int(1)), Ok(Value::Type(TypeId::INT)));

        let obj = Instance::new(TypeId::OBJECT);
        let weak = Value::Weak(WeakRef::new(&obj));
        assert_eq!(unary(UnaryOp::Deref, &weak), Ok(Value::Object(obj.clone())));
        drop(obj);
        assert_eq!(unary(UnaryOp::Deref, &weak), Ok(Value::None));
    }
}
