//! Self-updating call sites.
//!
//! Each invocation walks a cache hierarchy until some rule's guards hold:
//!
//! ```text
//!   invoke(args)
//!     |
//!     +-- target rule ------------------------ hit -> return
//!     |
//!     +-- L0: this site's rule set ----------- hit -> promote, retarget
//!     |
//!     +-- L2: binder's shared rule cache ----- hit -> add to L0, move up in L2
//!     |
//!     +-- miss loop: bind -> add to L2 -> template -> probe
//!                                  \-- no match: remove placeholder, bind again
//! ```
//!
//! # Concurrency
//!
//! Any number of threads may invoke one site. The target and the L0 set are
//! read with lock-free `ArcSwap` loads. The target is overwritten with a
//! plain store and the L0 set is replaced by read-copy-update, so a racing
//! retarget may be lost, which only costs a later rediscovery. Rules are
//! immutable, so a rule probed from an outdated snapshot is still correct.

use crate::binder::{Returns, Signature};
use crate::config::CacheConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::matchmaker::Matchmaker;
use crate::registry::CanonicalBinder;
use crate::rule::Rule;
use crate::rule_cache::RuleCache;
use crate::rule_set::RuleSet;
use crate::stats::{SiteStats, StatsSnapshot};
use crate::templating::{TemplateOutcome, copy_or_create};
use arc_swap::{ArcSwap, ArcSwapOption};
use polyic_core::Value;
use polyic_expr::EvalResult;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

pub type SiteId = u64;

static NEXT_SITE: AtomicU64 = AtomicU64::new(1);

pub struct CallSite {
    id: SiteId,
    binder: Arc<CanonicalBinder>,
    signature: Signature,
    config: CacheConfig,
    target: ArcSwapOption<Rule>,
    rules: ArcSwap<RuleSet>,
    cache: Arc<RuleCache>,
    stats: SiteStats,
}

impl CallSite {
    pub(crate) fn new(binder: Arc<CanonicalBinder>, signature: Signature) -> Self {
        let mut config = binder.config().clone();
        config.rule_set_capacity = config.rule_set_capacity.max(1);
        let cache = binder.rule_cache(signature);
        Self {
            id: NEXT_SITE.fetch_add(1, Ordering::Relaxed),
            binder,
            signature,
            config,
            target: ArcSwapOption::empty(),
            rules: ArcSwap::from_pointee(RuleSet::empty()),
            cache,
            stats: SiteStats::default(),
        }
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Perform the site's operation on `args`.
    pub fn invoke(&self, args: &[Value]) -> DispatchResult<Value> {
        if args.len() != self.signature.arity {
            return Err(DispatchError::Arity {
                expected: self.signature.arity,
                actual: args.len(),
            });
        }

        if !self.config.caching {
            return self.invoke_uncached(args);
        }

        let target = self.target.load_full();
        if let Some(rule) = &target {
            if let Some(result) = Matchmaker::new().probe(rule, args) {
                self.stats.record_fast_hit();
                return self.finish(result);
            }
            trace!(site = self.id, rule = rule.id(), "fast path miss");
        }

        self.update_and_execute(args, target)
    }

    fn update_and_execute(&self, args: &[Value], failed: Option<Arc<Rule>>) -> DispatchResult<Value> {
        let is_failed = |rule: &Arc<Rule>| failed.as_ref().is_some_and(|f| Arc::ptr_eq(f, rule));
        let matchmaker = Matchmaker::new();

        // L0
        let set = self.rules.load_full();
        for (index, rule) in set.rules().iter().enumerate() {
            if is_failed(rule) {
                continue;
            }
            if let Some(result) = matchmaker.probe(rule, args) {
                self.promote(rule, index);
                self.retarget(rule);
                self.stats.record_l0_hit();
                trace!(site = self.id, rule = rule.id(), index, "L0 hit");
                return self.finish(result);
            }
        }

        // L2
        let snapshot = self.cache.snapshot();
        for (index, rule) in snapshot.iter().enumerate() {
            if is_failed(rule) {
                continue;
            }
            if let Some(result) = matchmaker.probe(rule, args) {
                self.add_to_set(rule);
                self.cache.move_toward_front(rule, index);
                self.retarget(rule);
                self.stats.record_l2_hit();
                trace!(site = self.id, rule = rule.id(), index, "L2 hit");
                return self.finish(result);
            }
        }

        self.bind_until_match(args, failed)
    }

    /// Ask the binder for rules until one matches `args`.
    fn bind_until_match(&self, args: &[Value], original: Option<Arc<Rule>>) -> DispatchResult<Value> {
        let matchmaker = Matchmaker::new();
        let mut placeholder: Option<Arc<Rule>> = None;
        let mut attempts = 0;

        loop {
            if let Some(stale) = placeholder.take() {
                self.cache.remove(&stale);
            }
            self.check_attempts(attempts)?;
            attempts += 1;

            let rule = self.bind_rule(args)?;
            self.cache.add(Arc::clone(&rule));
            placeholder = Some(Arc::clone(&rule));

            let chosen = match &original {
                Some(original) if self.config.templating => self.template(original, &rule),
                _ => Arc::clone(&rule),
            };

            if let Some(result) = matchmaker.probe(&chosen, args) {
                self.add_to_set(&chosen);
                if !Arc::ptr_eq(&chosen, &rule) {
                    self.cache.replace(&rule, Arc::clone(&chosen));
                }
                self.retarget(&chosen);
                debug!(
                    site = self.id,
                    rule = chosen.id(),
                    templated = chosen.is_templated(),
                    attempts,
                    "installed new rule"
                );
                return self.finish(result);
            }
            debug!(site = self.id, rule = rule.id(), "bound rule does not match its own arguments");
        }
    }

    /// Every invocation binds afresh; nothing is installed.
    fn invoke_uncached(&self, args: &[Value]) -> DispatchResult<Value> {
        let matchmaker = Matchmaker::new();
        let mut attempts = 0;
        loop {
            self.check_attempts(attempts)?;
            attempts += 1;
            let rule = self.bind_rule(args)?;
            if let Some(result) = matchmaker.probe(&rule, args) {
                return self.finish(result);
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn bind_rule(&self, args: &[Value]) -> DispatchResult<Arc<Rule>> {
        self.stats.record_bind();
        let Some(binding) = self.binder.bind(args, &self.signature) else {
            let binder = self.binder.describe();
            warn!(site = self.id, %binder, "binder produced no rule");
            return Err(DispatchError::NoRuleProduced { binder });
        };
        match Rule::from_binding(binding, self.signature.arity) {
            Ok(rule) => Ok(Arc::new(rule)),
            Err(source) => {
                let binder = self.binder.describe();
                warn!(site = self.id, %binder, error = %source, "binder produced an invalid rule");
                Err(DispatchError::InvalidRule { binder, source })
            }
        }
    }

    fn check_attempts(&self, attempts: usize) -> DispatchResult<()> {
        match self.config.bind_attempt_limit {
            Some(limit) if attempts >= limit => {
                let binder = self.binder.describe();
                warn!(site = self.id, %binder, attempts, "bind attempt limit reached");
                Err(DispatchError::BindLimit { binder, attempts })
            }
            _ => Ok(()),
        }
    }

    fn template(&self, original: &Rule, rule: &Arc<Rule>) -> Arc<Rule> {
        let (chosen, outcome) = copy_or_create(original, rule, self.cache.templates());
        match outcome {
            TemplateOutcome::Built => self.stats.record_template_build(),
            TemplateOutcome::Reused => self.stats.record_template_reuse(),
            TemplateOutcome::Unchanged => {}
        }
        chosen
    }

    /// Promote the rule at `index` if it is still there.
    fn promote(&self, rule: &Arc<Rule>, index: usize) {
        let current = self.rules.load();
        let still_there = current.rules().get(index).is_some_and(|r| Arc::ptr_eq(r, rule));
        if !still_there {
            return;
        }
        if let Some(promoted) = current.promote(index, self.config.promotion) {
            // Dropped if another thread replaced the set in the meantime.
            self.rules.compare_and_swap(&*current, Arc::new(promoted));
        }
    }

    fn add_to_set(&self, rule: &Arc<Rule>) {
        self.rules
            .rcu(|set| Arc::new(set.add(Arc::clone(rule), self.config.rule_set_capacity)));
    }

    #[inline]
    fn retarget(&self, rule: &Arc<Rule>) {
        self.target.store(Some(Arc::clone(rule)));
    }

    #[inline]
    fn finish(&self, result: EvalResult<Value>) -> DispatchResult<Value> {
        let value = result?;
        Ok(match self.signature.returns {
            Returns::Value => value,
            Returns::Void => Value::None,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn id(&self) -> SiteId {
        self.id
    }

    #[inline]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    #[inline]
    pub fn binder(&self) -> &Arc<CanonicalBinder> {
        &self.binder
    }

    #[inline]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current fast-path rule.
    pub fn target(&self) -> Option<Arc<Rule>> {
        self.target.load_full()
    }

    /// Current L0 set.
    pub fn rule_set(&self) -> RuleSet {
        RuleSet::clone(&self.rules.load())
    }

    /// The binder's shared L2 cache for this site's signature.
    #[inline]
    pub fn rule_cache(&self) -> &Arc<RuleCache> {
        &self.cache
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSite")
            .field("id", &self.id)
            .field("binder", &self.binder.describe())
            .field("signature", &self.signature)
            .field("rules", &**self.rules.load())
            .field("cache", &self.cache)
            .finish()
    }
}
