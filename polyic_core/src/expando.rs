//! Expando records: versioned, open attribute storage.
//!
//! # Architecture
//!
//! Every record points at an `ExpandoClass`, an immutable ordered key
//! layout. Records that gained the same keys in the same order share one
//! class, so a binder can guard on the class and bake the slot index into
//! its rule:
//!
//! ```text
//!     Empty []
//!        |
//!     +--+---+
//!     |      |
//!    "x"    "y"
//!     |      |
//!   [x]    [y]
//!     |
//!    "y"
//!     |
//!   [x, y]
//! ```
//!
//! Deleting a key keeps the class and marks the slot vacant.
//!
//! # Versioning
//!
//! Each record carries a counter bumped on every successful set or delete.
//! Call sites that cache an attribute *value* (rather than a slot) can use
//! "version unchanged since bind" as an extra guard term.

use crate::value::Value;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

// =============================================================================
// Expando Class
// =============================================================================

/// Immutable ordered key layout shared by records.
pub struct ExpandoClass {
    /// Keys in insertion order; the position is the slot index.
    keys: Arc<[Arc<str>]>,
    /// Cached transitions to child classes, held weakly so unused layouts
    /// can be dropped.
    transitions: Mutex<FxHashMap<Arc<str>, Weak<ExpandoClass>>>,
}

static EMPTY_CLASS: OnceLock<Arc<ExpandoClass>> = OnceLock::new();

impl ExpandoClass {
    /// The shared root class with no keys.
    pub fn empty() -> Arc<ExpandoClass> {
        Arc::clone(EMPTY_CLASS.get_or_init(|| {
            Arc::new(Self {
                keys: Arc::from(Vec::new()),
                transitions: Mutex::new(FxHashMap::default()),
            })
        }))
    }

    /// Keys in slot order.
    #[inline]
    pub fn keys(&self) -> &[Arc<str>] {
        &self.keys
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Slot index of `name`, if this layout has it.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.keys.iter().position(|k| &**k == name)
    }

    /// Name stored at `index`.
    #[inline]
    pub fn name_at(&self, index: usize) -> Option<&Arc<str>> {
        self.keys.get(index)
    }

    /// Class reached by appending `name` to this layout.
    ///
    /// Transitions are cached so that records growing the same way end up
    /// sharing a class.
    pub fn transition(self: &Arc<Self>, name: &str) -> Arc<ExpandoClass> {
        let mut transitions = self.transitions.lock();
        if let Some(existing) = transitions.get(name).and_then(Weak::upgrade) {
            return existing;
        }

        let mut keys = Vec::with_capacity(self.keys.len() + 1);
        keys.extend(self.keys.iter().cloned());
        let name: Arc<str> = Arc::from(name);
        keys.push(Arc::clone(&name));

        let child = Arc::new(ExpandoClass {
            keys: Arc::from(keys),
            transitions: Mutex::new(FxHashMap::default()),
        });
        transitions.insert(name, Arc::downgrade(&child));
        child
    }
}

impl fmt::Debug for ExpandoClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpandoClass")
            .field("keys", &self.keys)
            .finish()
    }
}

// =============================================================================
// Expando Record
// =============================================================================

struct ExpandoData {
    class: Arc<ExpandoClass>,
    /// One entry per class slot; `None` marks a vacant (deleted or never
    /// assigned) slot.
    values: Vec<Option<Value>>,
}

/// Versioned key -> value record.
pub struct Expando {
    data: RwLock<ExpandoData>,
    version: AtomicU64,
}

impl Expando {
    /// Create an empty record.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(ExpandoData {
                class: ExpandoClass::empty(),
                values: Vec::new(),
            }),
            version: AtomicU64::new(0),
        }
    }

    /// Current class of this record.
    #[inline]
    pub fn class(&self) -> Arc<ExpandoClass> {
        Arc::clone(&self.data.read().class)
    }

    /// Check the current class by identity.
    #[inline]
    pub fn has_class(&self, class: &Arc<ExpandoClass>) -> bool {
        Arc::ptr_eq(&self.data.read().class, class)
    }

    /// Modification counter.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Read a value.
    ///
    /// `index` is the slot the caller resolved against `class`; if the
    /// record has since moved to another class the slot is re-resolved by
    /// name.
    pub fn try_get(&self, class: &Arc<ExpandoClass>, index: Option<usize>, name: &str) -> Option<Value> {
        let data = self.data.read();
        let index = if Arc::ptr_eq(&data.class, class) {
            index?
        } else {
            data.class.index_of(name)?
        };
        data.values.get(index).cloned().flatten()
    }

    /// Write a value, promoting the record to a wider class if `name` is
    /// new to it.
    ///
    /// Returns `true` if the key was not present before.
    pub fn try_set(&self, class: &Arc<ExpandoClass>, index: Option<usize>, name: &str, value: Value) -> bool {
        let mut data = self.data.write();
        let resolved = match index {
            Some(i) if Arc::ptr_eq(&data.class, class) => Some(i),
            _ => data.class.index_of(name),
        };

        let (slot, added) = match resolved {
            Some(slot) => (slot, data.values.get(slot).is_none_or(Option::is_none)),
            None => {
                let promoted = data.class.transition(name);
                let slot = promoted.len() - 1;
                data.class = promoted;
                (slot, true)
            }
        };

        if data.values.len() <= slot {
            data.values.resize(slot + 1, None);
        }
        data.values[slot] = Some(value);
        self.version.fetch_add(1, Ordering::AcqRel);
        added
    }

    /// Vacate a slot.
    ///
    /// Returns `true` if a value was removed.
    pub fn try_delete(&self, class: &Arc<ExpandoClass>, index: Option<usize>, name: &str) -> bool {
        let mut data = self.data.write();
        let resolved = match index {
            Some(i) if Arc::ptr_eq(&data.class, class) => Some(i),
            _ => data.class.index_of(name),
        };
        let Some(slot) = resolved else {
            return false;
        };

        let removed = data.values.get_mut(slot).and_then(Option::take).is_some();
        if removed {
            self.version.fetch_add(1, Ordering::AcqRel);
        }
        removed
    }

    /// Convenience read by name against the current class.
    pub fn get(&self, name: &str) -> Option<Value> {
        let class = self.class();
        let index = class.index_of(name);
        self.try_get(&class, index, name)
    }

    /// Convenience write by name against the current class.
    pub fn set(&self, name: &str, value: Value) -> bool {
        let class = self.class();
        let index = class.index_of(name);
        self.try_set(&class, index, name, value)
    }

    /// Live (non-vacant) keys in slot order.
    pub fn keys(&self) -> Vec<Arc<str>> {
        let data = self.data.read();
        data.class
            .keys()
            .iter()
            .zip(data.values.iter())
            .filter(|(_, v)| v.is_some())
            .map(|(k, _)| Arc::clone(k))
            .collect()
    }
}

impl Default for Expando {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Expando {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expando")
            .field("keys", &self.keys())
            .field("version", &self.version())
            .finish()
    }
}
