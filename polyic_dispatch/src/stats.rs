//! Per-site statistics.
//!
//! Counters use relaxed atomics; a snapshot is only approximately
//! consistent across fields while other threads are dispatching.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SiteStats {
    fast_hits: AtomicU64,
    l0_hits: AtomicU64,
    l2_hits: AtomicU64,
    binds: AtomicU64,
    template_reuses: AtomicU64,
    template_builds: AtomicU64,
}

/// Point-in-time copy of `SiteStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Invocations served by the current target.
    pub fast_hits: u64,
    /// Invocations served by another rule of the site's own set.
    pub l0_hits: u64,
    /// Invocations served from the binder's shared cache.
    pub l2_hits: u64,
    /// Calls into the binder.
    pub binds: u64,
    /// New rules that reused an existing template.
    pub template_reuses: u64,
    /// Templates built.
    pub template_builds: u64,
}

impl SiteStats {
    #[inline(always)]
    pub(crate) fn record_fast_hit(&self) {
        self.fast_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_l0_hit(&self) {
        self.l0_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_bind(&self) {
        self.binds.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_template_reuse(&self) {
        self.template_reuses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_template_build(&self) {
        self.template_builds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fast_hits: self.fast_hits.load(Ordering::Relaxed),
            l0_hits: self.l0_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            binds: self.binds.load(Ordering::Relaxed),
            template_reuses: self.template_reuses.load(Ordering::Relaxed),
            template_builds: self.template_builds.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Invocations that completed without calling the binder.
    ///
    /// A bind that follows a full miss is not counted, so this undercounts
    /// total invocations by the number of misses.
    #[inline]
    pub fn cache_hits(&self) -> u64 {
        self.fast_hits + self.l0_hits + self.l2_hits
    }

    /// Fraction of hits served by the fast path.
    pub fn fast_path_ratio(&self) -> f64 {
        let hits = self.cache_hits();
        if hits == 0 {
            0.0
        } else {
            self.fast_hits as f64 / hits as f64
        }
    }
}
