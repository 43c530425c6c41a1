//! Operator binders.
//!
//! Every rule is `TypeOf(pN) == <type>` for each operand followed by the
//! operator itself. Rules for different operand types differ only in the
//! embedded type tokens, so all of them share one template.

use crate::binder::{Binder, OperandShape, OperationKind, Signature};
use crate::guard::{Guard, Restrictions};
use crate::rule::Binding;
use polyic_core::Value;
use polyic_expr::{BinaryOp, Expr, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinaryOperationBinder {
    op: BinaryOp,
}

impl BinaryOperationBinder {
    pub const fn new(op: BinaryOp) -> Self {
        Self { op }
    }

    #[inline]
    pub fn op(&self) -> BinaryOp {
        self.op
    }
}

impl Binder for BinaryOperationBinder {
    fn operation(&self) -> OperationKind {
        OperationKind::Binary(self.op)
    }

    fn operand_shape(&self) -> OperandShape {
        OperandShape::new(2)
    }

    fn bind(&self, args: &[Value], _signature: &Signature) -> Option<Binding> {
        let [left, right] = args else {
            return None;
        };
        let restrictions = Restrictions::new()
            .with(Guard::type_of(0, left.type_id()))
            .with(Guard::type_of(1, right.type_id()));
        Some(Binding::new(
            restrictions,
            Expr::binary(self.op, Expr::param(0), Expr::param(1)),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnaryOperationBinder {
    op: UnaryOp,
}

impl UnaryOperationBinder {
    pub const fn new(op: UnaryOp) -> Self {
        Self { op }
    }
}

impl Binder for UnaryOperationBinder {
    fn operation(&self) -> OperationKind {
        OperationKind::Unary(self.op)
    }

    fn operand_shape(&self) -> OperandShape {
        OperandShape::new(1)
    }

    fn bind(&self, args: &[Value], _signature: &Signature) -> Option<Binding> {
        let [operand] = args else {
            return None;
        };
        Some(Binding::new(
            Restrictions::new().with(Guard::type_of(0, operand.type_id())),
            Expr::unary(self.op, Expr::param(0)),
        ))
    }
}
