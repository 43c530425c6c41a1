//! Auto-templating engine.
//!
//! When a site that was monomorphic needs a second rule, the new rule is
//! compared against the original one. If the trees differ only in embedded
//! constants, the new rule runs shared template code instead of its own:
//!
//! ```text
//!   original (maybe templated)      new (freshly bound)
//!            \                        /
//!             +---- compare_trees ---+
//!                        |
//!      Incompatible  ----+----> new rule, unchanged
//!      Compatible    ----+----> original's template, new rule's constants
//!      TooSpecific   ----+----> wider template (shared via the table)
//! ```
//!
//! Templates are shared by reference through `TemplateInfo`; a rule whose
//! shape key matches an existing template skips comparison and rewriting.

use crate::rule::{Computation, Rule};
use dashmap::DashMap;
use polyic_core::Value;
use polyic_expr::{CompareResult, ShapeKey, Template, compare_trees};
use rustc_hash::FxBuildHasher;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_TEMPLATE: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Template Info
// =============================================================================

/// A shared template and its factory.
pub struct TemplateInfo {
    id: u64,
    template: Template,
}

impl TemplateInfo {
    fn new(template: Template) -> Self {
        Self {
            id: NEXT_TEMPLATE.fetch_add(1, Ordering::Relaxed),
            template,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Constant positions read from the parameter array.
    #[inline]
    pub fn positions(&self) -> &[usize] {
        self.template.positions()
    }

    #[inline]
    pub fn shape(&self) -> &ShapeKey {
        self.template.shape()
    }

    /// The factory: shared code bound to `values`.
    pub fn instantiate(&self, values: Arc<[Value]>) -> Computation {
        Computation::new(Arc::clone(self.template.code()), values)
    }
}

impl fmt::Debug for TemplateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateInfo")
            .field("id", &self.id)
            .field("positions", &self.positions())
            .finish()
    }
}

// =============================================================================
// Template Table
// =============================================================================

/// Templates built for one rule cache, keyed by masked shape.
pub struct TemplateTable {
    templates: DashMap<ShapeKey, Arc<TemplateInfo>, FxBuildHasher>,
    capacity: usize,
}

impl TemplateTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            templates: DashMap::with_hasher(FxBuildHasher),
            capacity,
        }
    }

    pub fn get(&self, shape: &ShapeKey) -> Option<Arc<TemplateInfo>> {
        self.templates.get(shape).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert unless full. Returns the template now registered for the
    /// shape, which is `info` unless another thread got there first.
    fn insert(&self, info: Arc<TemplateInfo>) -> Arc<TemplateInfo> {
        if self.templates.len() >= self.capacity {
            return info;
        }
        Arc::clone(
            self.templates
                .entry(info.shape().clone())
                .or_insert(info)
                .value(),
        )
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl fmt::Debug for TemplateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateTable")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// =============================================================================
// Copy Or Create
// =============================================================================

/// What `copy_or_create` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateOutcome {
    /// The new rule is used as bound.
    Unchanged,
    /// The new rule runs an existing template.
    Reused,
    /// A new template was built for the new rule.
    Built,
}

/// Turn `new` into a templated rule sharing code with `original` where
/// their trees allow it.
pub fn copy_or_create(original: &Rule, new: &Arc<Rule>, table: &TemplateTable) -> (Arc<Rule>, TemplateOutcome) {
    let existing = original.template();

    // Same masked shape as the original's template: no comparison needed.
    if let Some(info) = existing {
        if let Some(rule) = reuse(info, new) {
            debug!(template = info.id(), rule = rule.id(), "reused template by shape");
            return (rule, TemplateOutcome::Reused);
        }
    }

    let templated: &[usize] = existing.map(|info| info.positions()).unwrap_or(&[]);
    let comparison = compare_trees(new.tree(), original.tree(), templated);

    match comparison.result {
        CompareResult::Incompatible => (Arc::clone(new), TemplateOutcome::Unchanged),
        CompareResult::Compatible => match existing {
            Some(info) => {
                let rule = Rule::templated(new, Arc::clone(info), Arc::from(comparison.values()));
                debug!(template = info.id(), rule = rule.id(), "reused template");
                (Arc::new(rule), TemplateOutcome::Reused)
            }
            // Identical constants and nothing to share yet.
            None => (Arc::clone(new), TemplateOutcome::Unchanged),
        },
        CompareResult::TooSpecific => {
            let positions = comparison.positions();
            let shape = ShapeKey::of(new.tree(), &positions);
            if let Some(info) = table.get(&shape) {
                let rule = Rule::templated(new, Arc::clone(&info), Arc::from(comparison.values()));
                debug!(template = info.id(), rule = rule.id(), "reused template from table");
                return (Arc::new(rule), TemplateOutcome::Reused);
            }

            match Template::build(new.tree(), &positions) {
                Ok(template) => {
                    let info = table.insert(Arc::new(TemplateInfo::new(template)));
                    let rule = Rule::templated(new, Arc::clone(&info), Arc::from(comparison.values()));
                    debug!(
                        template = info.id(),
                        rule = rule.id(),
                        slots = positions.len(),
                        "built template"
                    );
                    (Arc::new(rule), TemplateOutcome::Built)
                }
                Err(err) => {
                    debug!(rule = new.id(), error = %err, "template build failed, using rule as bound");
                    (Arc::clone(new), TemplateOutcome::Unchanged)
                }
            }
        }
    }
}

fn reuse(info: &Arc<TemplateInfo>, new: &Rule) -> Option<Arc<Rule>> {
    if !info.template.matches(new.tree()) {
        return None;
    }
    let values = info.template.bind(new.tree())?;
    Some(Arc::new(Rule::templated(new, Arc::clone(info), values)))
}
