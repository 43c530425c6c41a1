//! Dispatch Performance Benchmarks
//!
//! # Benchmark Categories
//!
//! 1. **Fast Path**: monomorphic site, target rule hits every time
//! 2. **Polymorphic**: rotating operand types served from L0
//! 3. **Cold Sites**: new sites warmed from a shared L2 cache
//! 4. **Uncached**: every invocation binds, as a baseline
//! 5. **Member Access**: expando get through the member binder

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use polyic_core::{Instance, TypeId, Value};
use polyic_dispatch::binders::{BinaryOperationBinder, GetMemberBinder};
use polyic_dispatch::{BinderRegistry, CacheConfig, Signature};
use polyic_expr::BinaryOp;
use std::sync::Arc;

fn add_binder() -> Arc<BinaryOperationBinder> {
    Arc::new(BinaryOperationBinder::new(BinaryOp::Add))
}

fn operand_pairs(n: usize) -> Vec<[Value; 2]> {
    let all = [
        [Value::Int(1), Value::Int(2)],
        [Value::Float(1.0), Value::Float(2.0)],
        [Value::Int(1), Value::Float(2.0)],
        [Value::str("a"), Value::str("b")],
        [Value::Float(1.0), Value::Int(2)],
        [Value::Bool(true), Value::Bool(false)],
    ];
    all.into_iter().cycle().take(n).collect()
}

// =============================================================================
// Site Benchmarks
// =============================================================================

fn bench_fast_path(c: &mut Criterion) {
    let registry = BinderRegistry::new();
    let site = registry.site(add_binder(), Signature::new(2));
    let args = [Value::Int(1), Value::Int(2)];
    site.invoke(&args).ok();

    c.bench_function("fast_path_int_add", |b| {
        b.iter(|| black_box(site.invoke(black_box(&args))))
    });
}

fn bench_polymorphic(c: &mut Criterion) {
    let mut group = c.benchmark_group("polymorphic_l0");
    for degree in [2usize, 4, 6] {
        let registry = BinderRegistry::new();
        let site = registry.site(add_binder(), Signature::new(2));
        let pairs = operand_pairs(degree);
        for args in &pairs {
            site.invoke(args).ok();
        }

        group.throughput(Throughput::Elements(pairs.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(degree), &pairs, |b, pairs| {
            b.iter(|| {
                for args in pairs {
                    black_box(site.invoke(args)).ok();
                }
            })
        });
    }
    group.finish();
}

fn bench_cold_site_from_l2(c: &mut Criterion) {
    let registry = BinderRegistry::new();
    let warm = registry.site(add_binder(), Signature::new(2));
    let pairs = operand_pairs(4);
    for args in &pairs {
        warm.invoke(args).ok();
    }

    c.bench_function("cold_site_l2_warm", |b| {
        b.iter(|| {
            let site = registry.site(add_binder(), Signature::new(2));
            for args in &pairs {
                black_box(site.invoke(args)).ok();
            }
        })
    });
}

fn bench_uncached(c: &mut Criterion) {
    let registry = BinderRegistry::with_config(CacheConfig::uncached());
    let site = registry.site(add_binder(), Signature::new(2));
    let args = [Value::Int(1), Value::Int(2)];

    c.bench_function("uncached_int_add", |b| {
        b.iter(|| black_box(site.invoke(black_box(&args))))
    });
}

fn bench_member_get(c: &mut Criterion) {
    let registry = BinderRegistry::new();
    let site = registry.site(Arc::new(GetMemberBinder::new("x")), Signature::new(1));
    let obj = Instance::new(TypeId::OBJECT);
    obj.attrs().set("x", Value::Int(1));
    let args = [Value::Object(obj)];
    site.invoke(&args).ok();

    c.bench_function("member_get_fast_path", |b| {
        b.iter(|| black_box(site.invoke(black_box(&args))))
    });
}

criterion_group!(
    dispatch_benches,
    bench_fast_path,
    bench_polymorphic,
    bench_cold_site_from_l2,
    bench_uncached,
    bench_member_get,
);

criterion_main!(dispatch_benches);
