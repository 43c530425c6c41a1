//! Guards and restriction sets.
//!
//! A rule applies only while all of its guards hold. Guards are lowered to
//! ordinary tree nodes so they take part in templating like any other
//! computation:
//!
//! ```text
//!   Type { arg: 0, int }        ->  TypeOf(p0) == <int>
//!   Instance { arg: 1, obj }    ->  refers_to(p1, <weak obj>)
//!   Expr(e)                     ->  e
//! ```
//!
//! The embedded `<int>` and `<weak obj>` are constants, so two rules that
//! differ only in which type or instance they guard on can share code.

use bitflags::bitflags;
use polyic_core::{ObjectRef, TypeId, Value, WeakRef};
use polyic_expr::{BinaryOp, Expr, Lambda, Method, ShapeKey};
use smallvec::SmallVec;
use std::sync::OnceLock;

bitflags! {
    /// Which kinds of guard a restriction set contains.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GuardKinds: u8 {
        const TYPE = 1 << 0;
        const INSTANCE = 1 << 1;
        const EXPR = 1 << 2;
    }
}

// =============================================================================
// Guard
// =============================================================================

/// A precondition over the invocation's arguments.
#[derive(Debug, Clone)]
pub enum Guard {
    /// Argument's runtime type equals `type_id`.
    Type { arg: usize, type_id: TypeId },
    /// Argument is the captured instance. Held weakly; false once the
    /// instance has been dropped.
    Instance { arg: usize, target: WeakRef },
    /// Arbitrary boolean tree over immutable properties of the arguments.
    Expr(Expr),
}

impl Guard {
    #[inline]
    pub fn type_of(arg: usize, type_id: TypeId) -> Self {
        Guard::Type { arg, type_id }
    }

    #[inline]
    pub fn instance(arg: usize, object: &ObjectRef) -> Self {
        Guard::Instance {
            arg,
            target: WeakRef::new(object),
        }
    }

    #[inline]
    pub fn expr(expr: Expr) -> Self {
        Guard::Expr(expr)
    }

    pub fn kind(&self) -> GuardKinds {
        match self {
            Guard::Type { .. } => GuardKinds::TYPE,
            Guard::Instance { .. } => GuardKinds::INSTANCE,
            Guard::Expr(_) => GuardKinds::EXPR,
        }
    }

    /// Boolean tree for this guard.
    pub fn to_expr(&self) -> Expr {
        match self {
            Guard::Type { arg, type_id } => Expr::binary(
                BinaryOp::Eq,
                Expr::type_of(Expr::param(*arg)),
                Expr::constant(*type_id),
            ),
            Guard::Instance { arg, target } => Expr::call(
                refers_to().clone(),
                vec![Expr::param(*arg), Expr::Constant(Value::Weak(target.clone()))],
            ),
            Guard::Expr(e) => e.clone(),
        }
    }

    /// Same kind and payload.
    fn same_as(&self, other: &Guard) -> bool {
        match (self, other) {
            (Guard::Type { arg: a, type_id: x }, Guard::Type { arg: b, type_id: y }) => a == b && x == y,
            (Guard::Instance { arg: a, target: x }, Guard::Instance { arg: b, target: y }) => {
                a == b && x.ptr_eq(y)
            }
            (Guard::Expr(x), Guard::Expr(y)) => {
                let x = Lambda::new(0, x.clone());
                let y = Lambda::new(0, y.clone());
                ShapeKey::of(&x, &[]) == ShapeKey::of(&y, &[])
            }
            _ => false,
        }
    }
}

/// Native predicate behind instance guards.
///
/// One shared method so that instance guards on different objects compare
/// as the same call and template against each other.
fn refers_to() -> &'static Method {
    static REFERS_TO: OnceLock<Method> = OnceLock::new();
    REFERS_TO.get_or_init(|| {
        Method::new("refers_to", |args| {
            let hit = match args {
                [Value::Object(obj), Value::Weak(target)] => target.refers_to(obj),
                _ => false,
            };
            Ok(Value::Bool(hit))
        })
    })
}

// =============================================================================
// Restrictions
// =============================================================================

/// Conjunction of guards with duplicates elided.
#[derive(Debug, Clone, Default)]
pub struct Restrictions {
    guards: SmallVec<[Guard; 4]>,
}

impl Restrictions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `push`.
    pub fn with(mut self, guard: Guard) -> Self {
        self.push(guard);
        self
    }

    /// Add a guard unless an identical one is already present.
    pub fn push(&mut self, guard: Guard) {
        if !self.guards.iter().any(|g| g.same_as(&guard)) {
            self.guards.push(guard);
        }
    }

    /// Combine the guards contributed by two sub-bindings.
    pub fn merge(mut self, other: Restrictions) -> Self {
        for guard in other.guards {
            self.push(guard);
        }
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Guard> {
        self.guards.iter()
    }

    pub fn kinds(&self) -> GuardKinds {
        self.guards.iter().fold(GuardKinds::empty(), |acc, g| acc | g.kind())
    }

    /// Conjunction tree; `true` when there are no guards.
    pub fn to_expr(&self) -> Expr {
        Expr::all(self.guards.iter().map(Guard::to_expr))
    }
}

impl FromIterator<Guard> for Restrictions {
    fn from_iter<I: IntoIterator<Item = Guard>>(iter: I) -> Self {
        let mut r = Restrictions::new();
        for guard in iter {
            r.push(guard);
        }
        r
    }
}
