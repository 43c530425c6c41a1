//! Per-site rule set (L0).
//!
//! A small, immutable, most-recent-first list of rules. Every change
//! produces a new set; readers holding the old one keep a consistent view.
//!
//! ```text
//!   add(r)        [a, b, c]        ->  [r, a, b, c]   (truncated to capacity)
//!   promote(2)    [a, b, c, d]     ->  [c, a, b, d]   (two-slot rotation)
//!   promote(3)    [a, b, c, d]     ->  [a, d, b, c]
//! ```

use crate::config::Promotion;
use crate::rule::Rule;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct RuleSet {
    rules: Arc<[Arc<Rule>]>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self {
            rules: Arc::from(Vec::new()),
        }
    }

    #[inline]
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn contains(&self, rule: &Arc<Rule>) -> bool {
        self.rules.iter().any(|r| Arc::ptr_eq(r, rule))
    }

    /// New set with `rule` first, keeping at most `capacity` rules (at
    /// least one).
    pub fn add(&self, rule: Arc<Rule>, capacity: usize) -> RuleSet {
        let capacity = capacity.max(1);
        let keep = self.rules.len().min(capacity.saturating_sub(1));
        let mut rules = Vec::with_capacity(keep + 1);
        rules.push(rule);
        rules.extend(self.rules[..keep].iter().cloned());
        RuleSet {
            rules: Arc::from(rules),
        }
    }

    /// New set with the rule at `index` moved forward, or `None` when the
    /// policy leaves the order unchanged.
    pub fn promote(&self, index: usize, policy: Promotion) -> Option<RuleSet> {
        if index >= self.rules.len() {
            return None;
        }
        let mut rules = self.rules.to_vec();
        match policy {
            Promotion::TwoSlot => {
                if index < 2 {
                    return None;
                }
                rules[index - 2..=index].rotate_right(1);
            }
            Promotion::MoveToFront => {
                if index == 0 {
                    return None;
                }
                rules[..=index].rotate_right(1);
            }
        }
        Some(RuleSet {
            rules: Arc::from(rules),
        })
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rules.iter().map(|r| r.id())).finish()
    }
}
