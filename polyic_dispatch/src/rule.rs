//! Guarded rules.
//!
//! A rule pairs a restriction set with a body. Its tree is always
//!
//! ```text
//!   Conditional(guards, body, Miss)
//! ```
//!
//! so running it either yields the body's value or fires the miss signal.
//! The untemplated tree is kept on the rule for later comparisons even when
//! the rule runs shared template code.

use crate::guard::Restrictions;
use crate::templating::TemplateInfo;
use polyic_core::Value;
use polyic_expr::{
    CompileError, CompiledLambda, EvalError, EvalResult, Expr, Lambda, MissSignal, compile,
};
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Process-unique rule identifier, for diagnostics.
pub type RuleId = u64;

static NEXT_RULE: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Binding
// =============================================================================

/// What a binder produces: guards plus the body to run when they hold.
#[derive(Debug, Clone)]
pub struct Binding {
    pub restrictions: Restrictions,
    pub body: Expr,
}

impl Binding {
    pub fn new(restrictions: Restrictions, body: Expr) -> Self {
        Self { restrictions, body }
    }

    /// Rule tree over `arity` arguments.
    pub fn to_lambda(&self, arity: usize) -> Lambda {
        Lambda::new(
            arity,
            Expr::condition(self.restrictions.to_expr(), self.body.clone(), Expr::Miss),
        )
    }
}

// =============================================================================
// Computation
// =============================================================================

/// Compiled code plus the template values it is bound to.
///
/// Untemplated rules carry an empty value array.
#[derive(Clone)]
pub struct Computation {
    code: Arc<CompiledLambda>,
    bound: Arc<[Value]>,
}

impl Computation {
    pub fn new(code: Arc<CompiledLambda>, bound: Arc<[Value]>) -> Self {
        Self { code, bound }
    }

    pub fn direct(code: Arc<CompiledLambda>) -> Self {
        Self {
            code,
            bound: Arc::from(Vec::new()),
        }
    }

    #[inline]
    pub fn invoke(&self, args: &[Value], signal: &dyn MissSignal) -> EvalResult<Value> {
        self.code.invoke(args, &self.bound, signal)
    }

    /// Whether two computations run the same compiled code.
    #[inline]
    pub fn shares_code(&self, other: &Computation) -> bool {
        Arc::ptr_eq(&self.code, &other.code)
    }

    #[inline]
    pub fn bound(&self) -> &[Value] {
        &self.bound
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("code", &Arc::as_ptr(&self.code))
            .field("bound", &self.bound)
            .finish()
    }
}

// =============================================================================
// Rule
// =============================================================================

/// An immutable (guard, computation) pair.
pub struct Rule {
    id: RuleId,
    tree: Arc<Lambda>,
    restrictions: Restrictions,
    computation: Computation,
    template: Option<Arc<TemplateInfo>>,
    /// Guard-only code, compiled on first use by `guard_holds`.
    guard: OnceLock<Result<CompiledLambda, CompileError>>,
}

impl Rule {
    /// Compile a binding into a standalone rule.
    pub fn from_binding(binding: Binding, arity: usize) -> Result<Self, CompileError> {
        let tree = binding.to_lambda(arity);
        let code = compile(&tree)?;
        Ok(Self::assemble(
            Arc::new(tree),
            binding.restrictions,
            Computation::direct(Arc::new(code)),
            None,
        ))
    }

    /// A rule with the tree of `source` running `template`'s code.
    pub(crate) fn templated(source: &Rule, template: Arc<TemplateInfo>, bound: Arc<[Value]>) -> Self {
        let computation = template.instantiate(bound);
        Self::assemble(
            Arc::clone(&source.tree),
            source.restrictions.clone(),
            computation,
            Some(template),
        )
    }

    fn assemble(
        tree: Arc<Lambda>,
        restrictions: Restrictions,
        computation: Computation,
        template: Option<Arc<TemplateInfo>>,
    ) -> Self {
        Self {
            id: NEXT_RULE.fetch_add(1, Ordering::Relaxed),
            tree,
            restrictions,
            computation,
            template,
            guard: OnceLock::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> RuleId {
        self.id
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.tree.arity
    }

    /// Untemplated tree.
    #[inline]
    pub fn tree(&self) -> &Lambda {
        &self.tree
    }

    #[inline]
    pub fn restrictions(&self) -> &Restrictions {
        &self.restrictions
    }

    #[inline]
    pub fn computation(&self) -> &Computation {
        &self.computation
    }

    #[inline]
    pub fn template(&self) -> Option<&Arc<TemplateInfo>> {
        self.template.as_ref()
    }

    #[inline]
    pub fn is_templated(&self) -> bool {
        self.template.is_some()
    }

    /// Run the rule. A guard failure fires `signal` and returns `None`.
    #[inline]
    pub fn invoke(&self, args: &[Value], signal: &dyn MissSignal) -> EvalResult<Value> {
        self.computation.invoke(args, signal)
    }

    /// Evaluate only the guards.
    pub fn guard_holds(&self, args: &[Value]) -> EvalResult<bool> {
        let code = self
            .guard
            .get_or_init(|| compile(&Lambda::new(self.arity(), self.restrictions.to_expr())));
        match code {
            Ok(code) => Ok(code.invoke(args, &[], &Cell::new(true))?.is_truthy()),
            Err(e) => Err(EvalError::Native(e.to_string())),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("arity", &self.arity())
            .field("guards", &self.restrictions.len())
            .field("templated", &self.is_templated())
            .finish()
    }
}
