//! Expando member binders.
//!
//! A rule for an object argument is guarded on the object's type and on its
//! expando class, and embeds the slot index resolved against that class:
//!
//! ```text
//!   TypeOf(p0) == <type> && has_class(p0, <class>)
//!       ? get_slot(p0, <class>, <index>, <name>)
//!       : Miss
//! ```
//!
//! The class, index and type are constants, so rules for objects of
//! different layouts template against each other. Non-object arguments and
//! missing members get a rule that raises `EvalError::Attribute`.

use crate::binder::{Binder, OperandShape, OperationKind, Signature};
use crate::guard::{Guard, Restrictions};
use crate::rule::Binding;
use polyic_core::{ExpandoClass, NativeRef, ObjectRef, Value};
use polyic_expr::{EvalError, EvalResult, Expr, Method};
use std::sync::{Arc, OnceLock};

// =============================================================================
// Native Methods
// =============================================================================

fn object_arg(value: &Value) -> EvalResult<&ObjectRef> {
    value
        .as_object()
        .ok_or_else(|| EvalError::Native(format!("expected an object, got {}", value.type_id())))
}

fn class_arg(value: &Value) -> EvalResult<Arc<ExpandoClass>> {
    value
        .as_native()
        .and_then(NativeRef::downcast_arc::<ExpandoClass>)
        .ok_or_else(|| EvalError::Native("expected an expando class".to_string()))
}

/// Negative indices encode "not present in the class".
fn index_arg(value: &Value) -> Option<usize> {
    value.as_int().and_then(|i| usize::try_from(i).ok())
}

fn name_arg(value: &Value) -> EvalResult<&str> {
    value
        .as_str()
        .ok_or_else(|| EvalError::Native("expected a member name".to_string()))
}

fn attribute_error(object: &Value, name: &str) -> EvalError {
    EvalError::Attribute {
        type_name: object.type_id().to_string(),
        name: Arc::from(name),
    }
}

fn has_class() -> &'static Method {
    static HAS_CLASS: OnceLock<Method> = OnceLock::new();
    HAS_CLASS.get_or_init(|| {
        Method::new("has_class", |args| match args {
            [Value::Object(obj), class] => Ok(Value::Bool(obj.attrs().has_class(&class_arg(class)?))),
            _ => Ok(Value::Bool(false)),
        })
    })
}

fn get_slot() -> &'static Method {
    static GET_SLOT: OnceLock<Method> = OnceLock::new();
    GET_SLOT.get_or_init(|| {
        Method::new("get_slot", |args| {
            let [target, class, index, name] = args else {
                return Err(EvalError::Native("get_slot takes 4 arguments".to_string()));
            };
            let name = name_arg(name)?;
            object_arg(target)?
                .attrs()
                .try_get(&class_arg(class)?, index_arg(index), name)
                .ok_or_else(|| attribute_error(target, name))
        })
    })
}

fn set_slot() -> &'static Method {
    static SET_SLOT: OnceLock<Method> = OnceLock::new();
    SET_SLOT.get_or_init(|| {
        Method::new("set_slot", |args| {
            let [target, class, index, name, value] = args else {
                return Err(EvalError::Native("set_slot takes 5 arguments".to_string()));
            };
            object_arg(target)?
                .attrs()
                .try_set(&class_arg(class)?, index_arg(index), name_arg(name)?, value.clone());
            Ok(value.clone())
        })
    })
}

fn delete_slot() -> &'static Method {
    static DELETE_SLOT: OnceLock<Method> = OnceLock::new();
    DELETE_SLOT.get_or_init(|| {
        Method::new("delete_slot", |args| {
            let [target, class, index, name] = args else {
                return Err(EvalError::Native("delete_slot takes 4 arguments".to_string()));
            };
            let name = name_arg(name)?;
            if object_arg(target)?
                .attrs()
                .try_delete(&class_arg(class)?, index_arg(index), name)
            {
                Ok(Value::None)
            } else {
                Err(attribute_error(target, name))
            }
        })
    })
}

// =============================================================================
// Shared Binding Logic
// =============================================================================

/// Object guards and the constants a member body needs.
struct ObjectLayout {
    restrictions: Restrictions,
    class: Expr,
    index: Expr,
}

impl ObjectLayout {
    fn of(object: &ObjectRef, name: &str) -> Self {
        let class = object.attrs().class();
        let index = class
            .index_of(name)
            .and_then(|i| i64::try_from(i).ok())
            .unwrap_or(-1);
        let class = Expr::constant(Value::Native(NativeRef::from_arc(class)));
        let restrictions = Restrictions::new()
            .with(Guard::type_of(0, object.type_id()))
            .with(Guard::expr(Expr::call(
                has_class().clone(),
                vec![Expr::param(0), class.clone()],
            )));
        Self {
            restrictions,
            class,
            index: Expr::constant(index),
        }
    }
}

/// Rule for a non-object receiver: raise an attribute error.
fn raise_for(receiver: &Value, name: &str) -> Binding {
    let error = attribute_error(receiver, name);
    Binding::new(
        Restrictions::new().with(Guard::type_of(0, receiver.type_id())),
        Expr::throw(Expr::constant(Value::Native(NativeRef::new(error)))),
    )
}

fn named_shape(name: &str, arity: usize) -> OperandShape {
    OperandShape::named(name, arity)
}

// =============================================================================
// Binders
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GetMemberBinder {
    name: Arc<str>,
}

impl GetMemberBinder {
    pub fn new(name: &str) -> Self {
        Self { name: Arc::from(name) }
    }
}

impl Binder for GetMemberBinder {
    fn operation(&self) -> OperationKind {
        OperationKind::GetMember
    }

    fn operand_shape(&self) -> OperandShape {
        named_shape(&self.name, 1)
    }

    fn bind(&self, args: &[Value], _signature: &Signature) -> Option<Binding> {
        let [receiver] = args else {
            return None;
        };
        let Value::Object(object) = receiver else {
            return Some(raise_for(receiver, &self.name));
        };
        let layout = ObjectLayout::of(object, &self.name);
        let body = Expr::call(
            get_slot().clone(),
            vec![
                Expr::param(0),
                layout.class,
                layout.index,
                Expr::constant(&*self.name),
            ],
        );
        Some(Binding::new(layout.restrictions, body))
    }

    fn describe(&self) -> String {
        format!("get-member({})", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetMemberBinder {
    name: Arc<str>,
}

impl SetMemberBinder {
    pub fn new(name: &str) -> Self {
        Self { name: Arc::from(name) }
    }
}

impl Binder for SetMemberBinder {
    fn operation(&self) -> OperationKind {
        OperationKind::SetMember
    }

    fn operand_shape(&self) -> OperandShape {
        named_shape(&self.name, 2)
    }

    fn bind(&self, args: &[Value], _signature: &Signature) -> Option<Binding> {
        let [receiver, _value] = args else {
            return None;
        };
        let Value::Object(object) = receiver else {
            return Some(raise_for(receiver, &self.name));
        };
        let layout = ObjectLayout::of(object, &self.name);
        let body = Expr::call(
            set_slot().clone(),
            vec![
                Expr::param(0),
                layout.class,
                layout.index,
                Expr::constant(&*self.name),
                Expr::param(1),
            ],
        );
        Some(Binding::new(layout.restrictions, body))
    }

    fn describe(&self) -> String {
        format!("set-member({})", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeleteMemberBinder {
    name: Arc<str>,
}

impl DeleteMemberBinder {
    pub fn new(name: &str) -> Self {
        Self { name: Arc::from(name) }
    }
}

impl Binder for DeleteMemberBinder {
    fn operation(&self) -> OperationKind {
        OperationKind::DeleteMember
    }

    fn operand_shape(&self) -> OperandShape {
        named_shape(&self.name, 1)
    }

    fn bind(&self, args: &[Value], _signature: &Signature) -> Option<Binding> {
        let [receiver] = args else {
            return None;
        };
        let Value::Object(object) = receiver else {
            return Some(raise_for(receiver, &self.name));
        };
        let layout = ObjectLayout::of(object, &self.name);
        let body = Expr::call(
            delete_slot().clone(),
            vec![
                Expr::param(0),
                layout.class,
                layout.index,
                Expr::constant(&*self.name),
            ],
        );
        Some(Binding::new(layout.restrictions, body))
    }

    fn describe(&self) -> String {
        format!("delete-member({})", self.name)
    }
}
