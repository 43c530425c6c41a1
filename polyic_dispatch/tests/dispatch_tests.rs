//! End-to-end dispatch behavior: cache correctness, binder identity,
//! weak instance guards, cache bounds and concurrent use of one site.

use polyic_core::{Instance, ObjectRef, TypeId, Value, global_registry as type_registry};
use polyic_dispatch::binders::GetMemberBinder;
use polyic_dispatch::{
    Binder, BinderRegistry, Binding, CacheConfig, CallSite, Guard, OperandShape, OperationKind,
    Restrictions, Rule, RuleCache, RuleSet, Signature,
};
use polyic_expr::Expr;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

// =============================================================================
// Fixtures
// =============================================================================

fn custom_type() -> TypeId {
    static CUSTOM: OnceLock<TypeId> = OnceLock::new();
    *CUSTOM.get_or_init(|| type_registry().register("Custom"))
}

fn tag(value: &Value) -> &'static str {
    match value.type_id() {
        TypeId::INT => "int",
        TypeId::FLOAT => "float",
        TypeId::STR => "str",
        TypeId::BOOL => "bool",
        t if t == custom_type() => "custom",
        _ => "other",
    }
}

/// Dispatches on the argument's type to a fixed tag.
#[derive(Debug)]
struct TypeTag;

impl Binder for TypeTag {
    fn operation(&self) -> OperationKind {
        OperationKind::Custom("type-tag")
    }

    fn operand_shape(&self) -> OperandShape {
        OperandShape::new(1)
    }

    fn bind(&self, args: &[Value], _signature: &Signature) -> Option<Binding> {
        let arg = args.first()?;
        Some(Binding::new(
            Restrictions::new().with(Guard::type_of(0, arg.type_id())),
            Expr::constant(tag(arg)),
        ))
    }
}

/// Matches one specific object instance.
#[derive(Debug)]
struct SameObject;

impl Binder for SameObject {
    fn operation(&self) -> OperationKind {
        OperationKind::Custom("same-object")
    }

    fn operand_shape(&self) -> OperandShape {
        OperandShape::new(1)
    }

    fn bind(&self, args: &[Value], _signature: &Signature) -> Option<Binding> {
        let obj = args.first()?.as_object()?;
        Some(Binding::new(
            Restrictions::new().with(Guard::instance(0, obj)),
            Expr::constant(Arc::as_ptr(obj) as usize as i64),
        ))
    }
}

fn type_tag_site(registry: &BinderRegistry) -> CallSite {
    registry.site(Arc::new(TypeTag), Signature::new(1))
}

fn custom_object() -> Value {
    Value::Object(Instance::new(custom_type()))
}

fn plain_rule(n: i64) -> Arc<Rule> {
    Arc::new(Rule::from_binding(Binding::new(Restrictions::new(), Expr::constant(n)), 0).unwrap())
}

// =============================================================================
// Cache Correctness
// =============================================================================

#[test]
fn test_cached_results_match_uncached_in_random_order() {
    let cached = type_tag_site(&BinderRegistry::new());
    let uncached = type_tag_site(&BinderRegistry::with_config(CacheConfig::uncached()));
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..1000 {
        let arg = match rng.gen_range(0..3) {
            0 => Value::Int(rng.gen_range(-100..100)),
            1 => Value::str("s"),
            _ => custom_object(),
        };
        let expected = Value::str(tag(&arg));
        assert_eq!(cached.invoke(&[arg.clone()]).unwrap(), expected);
        assert_eq!(uncached.invoke(&[arg]).unwrap(), expected);
    }

    let stats = cached.stats();
    assert_eq!(stats.binds, 3);
    assert_eq!(stats.cache_hits(), 997);
    assert_eq!(uncached.stats().binds, 1000);
}

#[test]
fn test_templating_does_not_change_results() {
    let templated = type_tag_site(&BinderRegistry::new());
    let plain = type_tag_site(&BinderRegistry::with_config(CacheConfig {
        templating: false,
        ..CacheConfig::default()
    }));
    let args = [
        Value::Int(1),
        Value::Float(1.0),
        Value::str("x"),
        Value::Bool(false),
        custom_object(),
    ];
    for round in 0..3 {
        for arg in args.iter().cycle().skip(round).take(args.len()) {
            assert_eq!(
                templated.invoke(&[arg.clone()]).unwrap(),
                plain.invoke(&[arg.clone()]).unwrap()
            );
        }
    }
    assert!(templated.stats().template_builds >= 1);
}

// =============================================================================
// Binder Identity
// =============================================================================

#[test]
fn test_equal_binders_share_rule_cache() {
    let registry = BinderRegistry::new();
    let a = type_tag_site(&registry);
    let b = type_tag_site(&registry);
    assert!(Arc::ptr_eq(a.rule_cache(), b.rule_cache()));

    // A rule bound through one site is found by a site that never ran.
    a.invoke(&[Value::Int(1)]).unwrap();
    assert_eq!(b.invoke(&[Value::Int(2)]).unwrap(), Value::str("int"));
    assert_eq!(b.stats().binds, 0);
    assert_eq!(b.stats().l2_hits, 1);
}

#[test]
fn test_registries_are_independent() {
    let a = type_tag_site(&BinderRegistry::new());
    let b = type_tag_site(&BinderRegistry::new());
    assert!(!Arc::ptr_eq(a.rule_cache(), b.rule_cache()));
}

#[test]
fn test_dropped_sites_do_not_grow_registry() {
    let registry = BinderRegistry::new();
    for i in 0..10_000 {
        let site = registry.site(Arc::new(GetMemberBinder::new(&format!("m{i}"))), Signature::new(1));
        drop(site);
    }
    assert!(registry.len() <= 128, "{} entries left", registry.len());

    // Live identities keep their canonical binder across sweeps.
    let kept = type_tag_site(&registry);
    for i in 0..1000 {
        registry.site(Arc::new(GetMemberBinder::new(&format!("n{i}"))), Signature::new(1));
    }
    assert!(Arc::ptr_eq(kept.rule_cache(), type_tag_site(&registry).rule_cache()));
}

// =============================================================================
// Weak Instance Guards
// =============================================================================

#[test]
fn test_instance_guard_false_after_collection() {
    let obj = Instance::new(TypeId::OBJECT);
    let rule = Rule::from_binding(
        Binding::new(Restrictions::new().with(Guard::instance(0, &obj)), Expr::constant(1i64)),
        1,
    )
    .unwrap();

    assert_eq!(rule.guard_holds(&[Value::Object(obj.clone())]), Ok(true));
    drop(obj);

    let other = Instance::new(TypeId::OBJECT);
    assert_eq!(rule.guard_holds(&[Value::Object(other)]), Ok(false));
    assert_eq!(rule.guard_holds(&[Value::None]), Ok(false));
}

#[test]
fn test_cached_instance_rule_does_not_pin_object() {
    let registry = BinderRegistry::new();
    let site = registry.site(Arc::new(SameObject), Signature::new(1));

    let obj: ObjectRef = Instance::new(TypeId::OBJECT);
    let weak = Arc::downgrade(&obj);
    site.invoke(&[Value::Object(obj.clone())]).unwrap();
    drop(obj);
    assert!(weak.upgrade().is_none());

    let fresh = Instance::new(TypeId::OBJECT);
    let expected = Value::Int(Arc::as_ptr(&fresh) as usize as i64);
    assert_eq!(site.invoke(&[Value::Object(fresh)]).unwrap(), expected);
    assert_eq!(site.stats().binds, 2);
}

// =============================================================================
// Properties
// =============================================================================

fn arb_arg() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        any::<bool>().prop_map(Value::Bool),
        "[a-z]{0,4}".prop_map(|s| Value::str(&s)),
        (-1.0e6f64..1.0e6).prop_map(Value::Float),
        Just(Value::None),
    ]
}

proptest! {
    #[test]
    fn prop_guard_soundness(bound in arb_arg(), probe in arb_arg()) {
        let rule = Rule::from_binding(
            Binding::new(
                Restrictions::new().with(Guard::type_of(0, bound.type_id())),
                Expr::constant(0i64),
            ),
            1,
        )
        .unwrap();
        let args = [probe];
        let first = rule.guard_holds(&args);
        let second = rule.guard_holds(&args);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_rule_set_bound(capacity in 1usize..12, extra in 1usize..20) {
        let mut set = RuleSet::empty();
        let mut last = None;
        for i in 0..capacity + extra {
            let rule = plain_rule(i as i64);
            set = set.add(Arc::clone(&rule), capacity);
            prop_assert!(set.len() <= capacity);
            last = Some(rule);
        }
        let last = last.unwrap();
        prop_assert!(set.contains(&last));
        prop_assert!(Arc::ptr_eq(&set.rules()[0], &last));
    }

    #[test]
    fn prop_rule_cache_midpoint_insertion(capacity in 3usize..40) {
        let cache = RuleCache::new(capacity);
        for i in 0..capacity {
            cache.add(plain_rule(i as i64));
        }
        let before = cache.snapshot();
        prop_assert_eq!(before.len(), capacity);

        cache.add(plain_rule(-1));
        let after = cache.snapshot();
        prop_assert_eq!(after.len(), capacity);
        prop_assert!(Arc::ptr_eq(&after[0], &before[0]));
        prop_assert!(Arc::ptr_eq(&after[capacity - 1], &before[capacity - 1]));
    }
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_invocations_on_one_site() {
    const THREADS: usize = 8;
    const MIN_CALLS: usize = 500;
    let duration = Duration::from_millis(200);

    let registry = BinderRegistry::new();
    let site = type_tag_site(&registry);
    let custom = custom_object();
    let patterns = [
        Value::Int(1),
        Value::Float(2.0),
        Value::str("three"),
        Value::Bool(true),
        custom,
    ];

    std::thread::scope(|scope| {
        for worker in 0..THREADS {
            let site = &site;
            let patterns = &patterns;
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(worker as u64);
                let start = Instant::now();
                let mut calls = 0;
                while calls < MIN_CALLS || start.elapsed() < duration {
                    let arg = &patterns[rng.gen_range(0..patterns.len())];
                    let result = site.invoke(std::slice::from_ref(arg)).unwrap();
                    assert_eq!(result, Value::str(tag(arg)));
                    calls += 1;
                }
            });
        }
    });

    let snapshot = site.rule_cache().snapshot();
    for pattern in &patterns {
        let args = std::slice::from_ref(pattern);
        assert!(
            snapshot.iter().any(|rule| rule.guard_holds(args) == Ok(true)),
            "no cached rule for {pattern:?}"
        );
    }
    assert!(site.rule_set().len() <= registry.config().rule_set_capacity);
}
