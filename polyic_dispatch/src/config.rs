//! Cache configuration resolved from defaults and environment variables.
//!
//! A single struct captures every tuning knob of the dispatch caches. It is
//! resolved once (per registry) and copied into each call site, so the hot
//! path never consults the environment.

// =============================================================================
// Promotion Policy
// =============================================================================

/// How an L0 hit is moved toward the front of its rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Promotion {
    /// Rotate the hit rule two slots forward (hit slot and its two
    /// predecessors). Hits in slots 0 and 1 are left alone.
    #[default]
    TwoSlot,
    /// Move the hit rule to slot 0.
    MoveToFront,
}

impl Promotion {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "two-slot" | "two_slot" | "twoslot" | "2" => Some(Promotion::TwoSlot),
            "move-to-front" | "move_to_front" | "mtf" | "front" => Some(Promotion::MoveToFront),
            _ => None,
        }
    }
}

// =============================================================================
// Cache Configuration
// =============================================================================

/// Tuning parameters for the L0/L2 caches and the miss loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum rules kept per call site (L0).
    pub rule_set_capacity: usize,

    /// Maximum rules kept per binder and signature (L2).
    pub rule_cache_capacity: usize,

    /// L0 promotion policy.
    pub promotion: Promotion,

    /// Share compiled code between rules differing only in constants.
    pub templating: bool,

    /// Use the fast path, L0 and L2 at all. When off, every invocation
    /// binds a fresh rule.
    pub caching: bool,

    /// Give up after this many consecutive non-matching rules from the
    /// binder. `None` loops until the binder produces a match.
    pub bind_attempt_limit: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            rule_set_capacity: Self::DEFAULT_RULE_SET_CAPACITY,
            rule_cache_capacity: Self::DEFAULT_RULE_CACHE_CAPACITY,
            promotion: Promotion::TwoSlot,
            templating: true,
            caching: true,
            bind_attempt_limit: None,
        }
    }
}

impl CacheConfig {
    pub const DEFAULT_RULE_SET_CAPACITY: usize = 10;
    pub const DEFAULT_RULE_CACHE_CAPACITY: usize = 128;

    /// Resolve from the defaults overridden by `POLYIC_*` environment
    /// variables. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = Self::env_usize("POLYIC_RULE_SET_CAPACITY") {
            config.rule_set_capacity = n.max(1);
        }
        if let Some(n) = Self::env_usize("POLYIC_RULE_CACHE_CAPACITY") {
            config.rule_cache_capacity = n.max(1);
        }
        if let Some(p) = std::env::var("POLYIC_PROMOTION")
            .ok()
            .as_deref()
            .and_then(Promotion::parse)
        {
            config.promotion = p;
        }
        if let Some(b) = Self::env_flag("POLYIC_TEMPLATING") {
            config.templating = b;
        }
        if let Some(b) = Self::env_flag("POLYIC_CACHING") {
            config.caching = b;
        }

        config
    }

    /// Every invocation binds afresh; no rule is reused.
    pub fn uncached() -> Self {
        Self {
            caching: false,
            templating: false,
            ..Self::default()
        }
    }

    /// Small caches and a bounded miss loop, so eviction and promotion are
    /// easy to exercise.
    pub fn for_testing() -> Self {
        Self {
            rule_set_capacity: 4,
            rule_cache_capacity: 8,
            bind_attempt_limit: Some(16),
            ..Self::default()
        }
    }

    /// L2 index at which new rules are inserted once the cache is half full.
    #[inline]
    pub fn insert_position(&self) -> usize {
        self.rule_cache_capacity / 2
    }

    #[inline]
    fn env_usize(var: &str) -> Option<usize> {
        std::env::var(var).ok().and_then(|v| v.trim().parse().ok())
    }

    /// `0`/`false`/`off` disable, any other non-empty value enables.
    #[inline]
    fn env_flag(var: &str) -> Option<bool> {
        match std::env::var(var) {
            Ok(v) if v.is_empty() => None,
            Ok(v) => Some(!matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off")),
            Err(_) => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.rule_set_capacity, 10);
        assert_eq!(config.rule_cache_capacity, 128);
        assert_eq!(config.insert_position(), 64);
        assert_eq!(config.promotion, Promotion::TwoSlot);
        assert!(config.templating);
        assert!(config.caching);
        assert_eq!(config.bind_attempt_limit, None);
    }

    #[test]
    fn test_presets() {
        let uncached = CacheConfig::uncached();
        assert!(!uncached.caching);
        assert!(!uncached.templating);

        let testing = CacheConfig::for_testing();
        assert_eq!(testing.insert_position(), 4);
        assert!(testing.bind_attempt_limit.is_some());
    }

    #[test]
    fn test_promotion_parse() {
        assert_eq!(Promotion::parse("move-to-front"), Some(Promotion::MoveToFront));
        assert_eq!(Promotion::parse(" TwoSlot "), Some(Promotion::TwoSlot));
        assert_eq!(Promotion::parse("lru"), None);
    }

    #[test]
    fn test_from_env_without_overrides_matches_default() {
        // Only meaningful when the variables are unset, which is the normal
        // test environment.
        if std::env::vars().any(|(k, _)| k.starts_with("POLYIC_")) {
            return;
        }
        assert_eq!(CacheConfig::from_env(), CacheConfig::default());
    }
}
