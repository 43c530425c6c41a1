//! Type registry for user-defined object types.
//!
//! Hands out `TypeId`s at or above `TypeId::FIRST_USER_TYPE` and remembers
//! their names for diagnostics.

use crate::type_id::TypeId;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Registry of user types.
///
/// Builtin types are implicit; only user types are recorded here.
pub struct TypeRegistry {
    /// Map from TypeId to the declared type name.
    names: RwLock<FxHashMap<TypeId, Arc<str>>>,
    /// Counter for generating new TypeIds.
    next_id: AtomicU32,
}

impl TypeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            names: RwLock::new(FxHashMap::default()),
            next_id: AtomicU32::new(TypeId::FIRST_USER_TYPE),
        }
    }

    /// Allocate a fresh TypeId without a name.
    pub fn allocate_type_id(&self) -> TypeId {
        TypeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate a TypeId and record its name.
    pub fn register(&self, name: &str) -> TypeId {
        let type_id = self.allocate_type_id();
        self.names.write().insert(type_id, Arc::from(name));
        type_id
    }

    /// Look up the name of a registered type.
    #[inline]
    pub fn name_of(&self, type_id: TypeId) -> Option<Arc<str>> {
        self.names.read().get(&type_id).cloned()
    }

    /// Check if a type is registered.
    #[inline]
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.names.read().contains_key(&type_id)
    }

    /// Get the number of named types.
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Global Registry Access
// =============================================================================

use std::sync::OnceLock;

/// Global type registry singleton. Lives for the whole process.
static GLOBAL_REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

/// Get the global type registry.
pub fn global_registry() -> &'static TypeRegistry {
    GLOBAL_REGISTRY.get_or_init(TypeRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = TypeRegistry::new();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_allocate_type_id() {
        let registry = TypeRegistry::new();
        let id1 = registry.allocate_type_id();
        let id2 = registry.allocate_type_id();
        assert_eq!(id1.raw(), 256);
        assert_eq!(id2.raw(), 257);
        assert!(!id1.is_builtin());
    }

    #[test]
    fn test_register_named() {
        let registry = TypeRegistry::new();
        let point = registry.register("Point");
        assert!(registry.contains(point));
        assert_eq!(registry.name_of(point).as_deref(), Some("Point"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_global_display_uses_name() {
        let id = global_registry().register("GlobalWidget");
        assert_eq!(id.to_string(), "GlobalWidget");
    }
}
