//! Probing candidate rules without touching the real site.
//!
//! A matchmaker is a throwaway match flag. It is armed before a rule runs;
//! the rule's `Miss` branch clears it. The flag lives on the probing
//! thread's stack, so there is nothing to allocate or pool per miss.

use crate::rule::Rule;
use polyic_core::Value;
use polyic_expr::{EvalResult, MissSignal};
use std::cell::Cell;

#[derive(Debug)]
pub(crate) struct Matchmaker {
    matched: Cell<bool>,
}

impl Matchmaker {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            matched: Cell::new(true),
        }
    }

    /// Run `rule` against `args`. `None` means its guards did not hold.
    ///
    /// An error raised while evaluating the guards or the body counts as a
    /// match and is returned to the caller.
    #[inline]
    pub(crate) fn probe(&self, rule: &Rule, args: &[Value]) -> Option<EvalResult<Value>> {
        self.matched.set(true);
        let result = rule.invoke(args, self);
        self.matched.get().then_some(result)
    }
}

impl MissSignal for Matchmaker {
    #[inline]
    fn miss(&self) {
        self.matched.set(false);
    }
}
