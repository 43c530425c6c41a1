//! Heap objects and handles.
//!
//! Objects are reference counted. Identity (pointer equality) is what
//! instance guards and `ReferenceEqual` observe, never structural equality.

use crate::expando::Expando;
use crate::type_id::TypeId;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

// =============================================================================
// Instance
// =============================================================================

/// A heap object: a runtime type plus an expando attribute record.
pub struct Instance {
    type_id: TypeId,
    attrs: Expando,
}

/// Strong reference to an instance.
pub type ObjectRef = Arc<Instance>;

impl Instance {
    /// Create a new instance of the given type with no attributes.
    pub fn new(type_id: TypeId) -> ObjectRef {
        Arc::new(Self {
            type_id,
            attrs: Expando::new(),
        })
    }

    /// Runtime type of this instance.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Attribute storage.
    #[inline]
    pub fn attrs(&self) -> &Expando {
        &self.attrs
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} object at {:p}>", self.type_id, self as *const Self)
    }
}

// =============================================================================
// Weak Handle
// =============================================================================

/// Weak handle to an instance.
///
/// Held by instance guards so cached rules never keep application objects
/// alive. Once the referent is dropped `upgrade` returns `None`.
#[derive(Clone)]
pub struct WeakRef(Weak<Instance>);

impl WeakRef {
    /// Create a weak handle to `object`.
    #[inline]
    pub fn new(object: &ObjectRef) -> Self {
        Self(Arc::downgrade(object))
    }

    /// Get the referent if it is still alive.
    #[inline]
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade()
    }

    /// Check if the referent is still alive.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Check whether this handle refers to `object`.
    ///
    /// Compares addresses only, so it stays meaningful after the referent
    /// is gone (it then simply never matches a live object).
    #[inline]
    pub fn refers_to(&self, object: &ObjectRef) -> bool {
        self.is_alive() && std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(object))
    }

    /// Handle identity.
    #[inline]
    pub fn ptr_eq(&self, other: &WeakRef) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }

    /// Address used for hashing handle identity.
    #[inline]
    pub fn addr(&self) -> usize {
        self.0.as_ptr() as *const () as usize
    }
}

impl fmt::Debug for WeakRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_alive() {
            write!(f, "<weakref to {:#x}>", self.addr())
        } else {
            f.write_str("<weakref (dead)>")
        }
    }
}

// =============================================================================
// Native Handle
// =============================================================================

/// Opaque host value compared by identity.
///
/// Binders use this to embed runtime handles (expando classes, host
/// callbacks) as constants in rule bodies.
#[derive(Clone)]
pub struct NativeRef(Arc<dyn Any + Send + Sync>);

impl NativeRef {
    /// Wrap a host value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wrap an already shared host value, preserving its identity.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    /// Borrow the payload as `T`.
    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Recover the shared payload as `Arc<T>`.
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }

    /// Handle identity.
    #[inline]
    pub fn ptr_eq(&self, other: &NativeRef) -> bool {
        self.addr() == other.addr()
    }

    /// Address used for hashing handle identity.
    #[inline]
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for NativeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native {:#x}>", self.addr())
    }
}
