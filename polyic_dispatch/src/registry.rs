//! Binder identity registry.
//!
//! Binders are canonicalized by value through a weak deduplicating map, so
//! every call site performing the same logical operation sees the same
//! per-signature rule caches:
//!
//! ```text
//!   BinaryOperationBinder(+) --\
//!                               +--> CanonicalBinder --> { Signature(2) -> RuleCache }
//!   BinaryOperationBinder(+) --/
//! ```
//!
//! The map holds canonical binders weakly; a binder no call site refers to
//! is dropped together with its caches. Its dead entry is replaced on the
//! next canonicalization of the same identity, or swept once the map grows
//! past a threshold that doubles with the live entry count.

use crate::binder::{Binder, BinderIdentity, Signature};
use crate::config::CacheConfig;
use crate::rule::Binding;
use crate::rule_cache::RuleCache;
use crate::site::CallSite;
use dashmap::DashMap;
use polyic_core::Value;
use rustc_hash::FxBuildHasher;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::debug;

// =============================================================================
// Canonical Binder
// =============================================================================

/// The representative of every binder with one identity.
pub struct CanonicalBinder {
    binder: Arc<dyn Binder>,
    identity: BinderIdentity,
    config: CacheConfig,
    caches: DashMap<Signature, Arc<RuleCache>, FxBuildHasher>,
}

impl CanonicalBinder {
    fn new(binder: Arc<dyn Binder>, identity: BinderIdentity, config: CacheConfig) -> Self {
        Self {
            binder,
            identity,
            config,
            caches: DashMap::with_hasher(FxBuildHasher),
        }
    }

    #[inline]
    pub fn binder(&self) -> &dyn Binder {
        self.binder.as_ref()
    }

    #[inline]
    pub fn identity(&self) -> &BinderIdentity {
        &self.identity
    }

    #[inline]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn describe(&self) -> String {
        self.binder.describe()
    }

    #[inline]
    pub fn bind(&self, args: &[Value], signature: &Signature) -> Option<Binding> {
        self.binder.bind(args, signature)
    }

    /// The shared cache for `signature`, created on first request. Racing
    /// creators all receive the instance that won.
    pub fn rule_cache(&self, signature: Signature) -> Arc<RuleCache> {
        Arc::clone(
            self.caches
                .entry(signature)
                .or_insert_with(|| Arc::new(RuleCache::from_config(&self.config)))
                .value(),
        )
    }
}

impl fmt::Debug for CanonicalBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanonicalBinder")
            .field("binder", &self.binder)
            .field("caches", &self.caches.len())
            .finish()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Entry count below which dead entries are never swept.
const MIN_SWEEP_THRESHOLD: usize = 64;

pub struct BinderRegistry {
    config: CacheConfig,
    binders: DashMap<BinderIdentity, Weak<CanonicalBinder>, FxBuildHasher>,
    /// Entry count that triggers the next sweep of dead entries.
    sweep_at: AtomicUsize,
}

impl BinderRegistry {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            config,
            binders: DashMap::with_hasher(FxBuildHasher),
            sweep_at: AtomicUsize::new(MIN_SWEEP_THRESHOLD),
        }
    }

    #[inline]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Resolve `binder` to the representative of its identity.
    pub fn canonicalize(&self, binder: Arc<dyn Binder>) -> Arc<CanonicalBinder> {
        let identity = BinderIdentity::of(binder.as_ref());
        let canonical = {
            let mut entry = self.binders.entry(identity.clone()).or_default();
            if let Some(canonical) = entry.upgrade() {
                return canonical;
            }
            debug!(binder = %binder.describe(), "new canonical binder");
            let canonical = Arc::new(CanonicalBinder::new(binder, identity, self.config.clone()));
            *entry = Arc::downgrade(&canonical);
            canonical
        };
        // The entry guard must be released before sweeping the map.
        self.maybe_sweep();
        canonical
    }

    fn maybe_sweep(&self) {
        if self.binders.len() < self.sweep_at.load(Ordering::Relaxed) {
            return;
        }
        let purged = self.purge();
        let live = self.binders.len();
        self.sweep_at
            .store(live.saturating_mul(2).max(MIN_SWEEP_THRESHOLD), Ordering::Relaxed);
        debug!(purged, live, "swept dead binder entries");
    }

    /// A new call site for `binder` with the given callable shape.
    pub fn site(&self, binder: Arc<dyn Binder>, signature: Signature) -> CallSite {
        CallSite::new(self.canonicalize(binder), signature)
    }

    /// Drop entries whose canonical binder is gone. Returns how many.
    /// `canonicalize` also does this on its own as the map grows.
    pub fn purge(&self) -> usize {
        let before = self.binders.len();
        self.binders.retain(|_, weak| weak.strong_count() > 0);
        before - self.binders.len()
    }

    /// Number of entries, live or not yet purged.
    pub fn len(&self) -> usize {
        self.binders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binders.is_empty()
    }
}

impl Default for BinderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BinderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinderRegistry")
            .field("config", &self.config)
            .field("binders", &self.binders.len())
            .finish()
    }
}

/// Process-wide registry configured from the environment on first use.
/// It lives for the whole process.
pub fn global_registry() -> &'static BinderRegistry {
    static GLOBAL: OnceLock<BinderRegistry> = OnceLock::new();
    GLOBAL.get_or_init(|| BinderRegistry::with_config(CacheConfig::from_env()))
}
