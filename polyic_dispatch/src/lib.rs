//! Call-site polymorphic inline caching.
//!
//! A `CallSite` performs one dynamic operation. It keeps its current rule as
//! a fast path, a small per-site rule set (L0), and shares a larger rule
//! cache (L2) with every site whose binder has the same identity. Misses go
//! to the binder, and new rules are templated against the rule they replace
//! so that rules differing only in embedded constants share compiled code.
//!
//! ```text
//!   BinderRegistry ──canonicalize──> CanonicalBinder ──signature──> RuleCache (L2)
//!         │                                                            ▲
//!         └──site()──> CallSite ── target ── RuleSet (L0) ─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use polyic_core::Value;
//! use polyic_dispatch::{BinderRegistry, Signature, binders::BinaryOperationBinder};
//! use polyic_expr::BinaryOp;
//! use std::sync::Arc;
//!
//! let registry = BinderRegistry::new();
//! let add = registry.site(Arc::new(BinaryOperationBinder::new(BinaryOp::Add)), Signature::new(2));
//! assert_eq!(add.invoke(&[Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(3));
//! assert_eq!(add.invoke(&[Value::str("a"), Value::str("b")]).unwrap(), Value::str("ab"));
//! ```

pub mod binder;
pub mod binders;
pub mod config;
pub mod error;
pub mod guard;
mod matchmaker;
pub mod registry;
pub mod rule;
pub mod rule_cache;
pub mod rule_set;
pub mod site;
pub mod stats;
pub mod templating;

pub use binder::{Binder, BinderIdentity, OperandShape, OperationKind, Returns, Signature};
pub use config::{CacheConfig, Promotion};
pub use error::{DispatchError, DispatchResult};
pub use guard::{Guard, GuardKinds, Restrictions};
pub use registry::{BinderRegistry, CanonicalBinder, global_registry};
pub use rule::{Binding, Computation, Rule, RuleId};
pub use rule_cache::{RuleCache, RuleSnapshot};
pub use rule_set::RuleSet;
pub use site::{CallSite, SiteId};
pub use stats::StatsSnapshot;
pub use templating::{TemplateInfo, TemplateOutcome, TemplateTable, copy_or_create};
