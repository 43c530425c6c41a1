//! Shared per-binder rule cache (L2).
//!
//! One cache exists per canonical binder and signature. Readers load the
//! current array with a lock-free `ArcSwap` load and scan it; writers
//! serialize on the cache's monitor and publish a fresh array.
//!
//! # Insertion Policy
//!
//! ```text
//!   len < cap/2        append                 [a b c] + r -> [a b c r]
//!   cap/2 <= len < cap insert at cap/2        [a b c d e f] + r -> [a b c r d e f]
//!   len == cap         overwrite slot cap/2   evicts the rule that sat there
//! ```
//!
//! Neither end of a full cache is evicted by a single insert, so both long
//! lived rules at the front and recent arrivals near the back survive.

use crate::config::CacheConfig;
use crate::rule::Rule;
use crate::templating::TemplateTable;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// How far past its last known index `move_toward_front` looks for a rule.
const MOVE_SEARCH_WINDOW: usize = 8;

/// An immutable L2 array as seen by one reader.
pub type RuleSnapshot = Arc<Vec<Arc<Rule>>>;

pub struct RuleCache {
    /// Serializes writers. Readers never take it.
    monitor: Mutex<()>,
    rules: ArcSwap<Vec<Arc<Rule>>>,
    capacity: usize,
    insert_position: usize,
    templates: TemplateTable,
}

impl RuleCache {
    /// A cache holding at most `capacity` rules (at least one).
    pub fn new(capacity: usize) -> Self {
        Self::with_insert_position(capacity, capacity / 2)
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_insert_position(config.rule_cache_capacity, config.insert_position())
    }

    fn with_insert_position(capacity: usize, insert_position: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            monitor: Mutex::new(()),
            rules: ArcSwap::from_pointee(Vec::new()),
            capacity,
            insert_position: insert_position.min(capacity - 1),
            templates: TemplateTable::new(capacity),
        }
    }

    /// Current array. It may be replaced right after this returns.
    #[inline]
    pub fn snapshot(&self) -> RuleSnapshot {
        self.rules.load_full()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rules.load().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, rule: &Arc<Rule>) -> bool {
        self.rules.load().iter().any(|r| Arc::ptr_eq(r, rule))
    }

    /// Templates built for rules of this cache.
    #[inline]
    pub fn templates(&self) -> &TemplateTable {
        &self.templates
    }

    pub fn add(&self, rule: Arc<Rule>) {
        let _guard = self.monitor.lock();
        let current = self.snapshot();
        self.publish(self.with_added(&current, rule));
    }

    fn with_added(&self, current: &[Arc<Rule>], rule: Arc<Rule>) -> Vec<Arc<Rule>> {
        let mut rules = current.to_vec();
        let len = rules.len();
        if len < self.insert_position {
            rules.push(rule);
        } else if len < self.capacity {
            rules.insert(self.insert_position, rule);
        } else {
            let slot = self.insert_position.min(len - 1);
            debug!(evicted = rules[slot].id(), added = rule.id(), slot, "rule cache eviction");
            rules[slot] = rule;
        }
        rules
    }

    /// Move `rule` toward the front, looking for it from `hint` (its index
    /// in the caller's snapshot) onward. A rule that has drifted out of the
    /// search window or been evicted is left alone.
    pub fn move_toward_front(&self, rule: &Arc<Rule>, hint: usize) {
        let _guard = self.monitor.lock();
        let current = self.snapshot();
        let len = current.len();
        if len == 0 {
            return;
        }
        let start = hint.min(len - 1);
        let end = (start + MOVE_SEARCH_WINDOW).min(len);
        let Some(index) = (start..end).find(|&i| Arc::ptr_eq(&current[i], rule)) else {
            return;
        };
        if index < 2 {
            return;
        }
        let mut rules = current.to_vec();
        rules[index - 2..=index].rotate_right(1);
        self.publish(rules);
    }

    /// Swap `old` for `new` in place, or add `new` if `old` is gone.
    pub fn replace(&self, old: &Arc<Rule>, new: Arc<Rule>) {
        let _guard = self.monitor.lock();
        let current = self.snapshot();
        let rules = match current.iter().position(|r| Arc::ptr_eq(r, old)) {
            Some(index) => {
                let mut rules = current.to_vec();
                rules[index] = new;
                rules
            }
            None => self.with_added(&current, new),
        };
        self.publish(rules);
    }

    /// Remove `rule` if present. Returns whether it was found.
    pub fn remove(&self, rule: &Arc<Rule>) -> bool {
        let _guard = self.monitor.lock();
        let current = self.snapshot();
        let Some(index) = current.iter().position(|r| Arc::ptr_eq(r, rule)) else {
            return false;
        };
        let mut rules = current.to_vec();
        rules.remove(index);
        self.publish(rules);
        true
    }

    /// Must be called with the monitor held.
    #[inline]
    fn publish(&self, rules: Vec<Arc<Rule>>) {
        self.rules.store(Arc::new(rules));
    }
}

impl fmt::Debug for RuleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("templates", &self.templates.len())
            .finish()
    }
}
