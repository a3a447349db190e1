//! Benchmarks for dependency tracking and batched collection mutation.
//!
//! Performance budgets:
//! - Steady-state re-evaluation (dependency set unchanged): no allocation,
//!   cost linear in the number of dependencies read
//! - Batched array mutation: one delivery per batch regardless of call count
//!
//! Run with: cargo bench -p sinew-runtime --bench connectable_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::rc::{Rc, Weak};

use sinew_core::{Array, Object, Result, Scope, Value};
use sinew_runtime::binding::{Binding, PropertyBinding, Services};
use sinew_runtime::config::ObservationStrategy;
use sinew_runtime::expression::{BinaryOp, Expression};
use sinew_runtime::flags::LifecycleFlags;
use sinew_runtime::reactive::{
    ArrayObserver, CollectionObserver, CollectionSubscriber, IndexMap, batch,
};

// =============================================================================
// Dependency tracking
// =============================================================================

/// `v0 + v1 + ... + v{n-1}` over a view model holding `v0..v{n-1}`.
fn sum_of(n: usize) -> (Rc<Object>, Expression) {
    let vm = Object::from_entries((0..n).map(|i| (format!("v{i}"), Value::from(i))));
    let expr = (1..n).fold(Expression::scope("v0"), |acc, i| {
        Expression::binary(BinaryOp::Add, acc, Expression::scope(&format!("v{i}")))
    });
    (vm, expr)
}

fn bench_steady_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("connectable/steady_state");

    for &deps in &[1usize, 3, 8, 32] {
        group.throughput(Throughput::Elements(deps as u64));
        group.bench_with_input(BenchmarkId::new("reevaluate", deps), &deps, |b, &deps| {
            let (vm, expr) = sum_of(deps);
            let target = Object::new();
            let binding = PropertyBinding::builder()
                .expression(expr)
                .target(Rc::clone(&target))
                .target_property("value")
                .services(Services::default())
                .build()
                .expect("binding");
            binding
                .bind(LifecycleFlags::empty(), &Scope::create(Rc::clone(&vm)))
                .expect("bind");
            let mut n = 0i64;
            b.iter(|| {
                n += 1;
                vm.set("v0", Value::from(n)).expect("set");
                black_box(target.peek("value"));
            });
        });
    }

    group.finish();
}

fn bench_conditional_switch(c: &mut Criterion) {
    let mut group = c.benchmark_group("connectable/conditional");
    group.bench_function("toggle_branch", |b| {
        let vm = Object::from_entries([
            ("a", Value::Bool(true)),
            ("b", Value::from(1)),
            ("c", Value::from(2)),
        ]);
        let binding = PropertyBinding::builder()
            .expression(Expression::conditional(
                Expression::scope("a"),
                Expression::scope("b"),
                Expression::scope("c"),
            ))
            .target(Object::new())
            .target_property("value")
            .services(Services::default())
            .build()
            .expect("binding");
        binding
            .bind(LifecycleFlags::empty(), &Scope::create(Rc::clone(&vm)))
            .expect("bind");
        let mut flag = true;
        b.iter(|| {
            flag = !flag;
            vm.set("a", Value::Bool(flag)).expect("set");
            black_box(binding.dependency_count());
        });
    });
    group.finish();
}

// =============================================================================
// Batched array mutation
// =============================================================================

struct Sink;

impl CollectionSubscriber for Sink {
    fn handle_collection_change(&self, index_map: &IndexMap, _: LifecycleFlags) -> Result<()> {
        black_box(index_map.len());
        Ok(())
    }
}

fn bench_batched_mutation(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection/batched");

    for &ops in &[10usize, 100, 1000] {
        group.throughput(Throughput::Elements(ops as u64));
        group.bench_with_input(BenchmarkId::new("push_shift", ops), &ops, |b, &ops| {
            let sink = Rc::new(Sink);
            b.iter(|| {
                let array = Array::from_values((0..16).map(Value::from));
                let observer = ArrayObserver::new(array, ObservationStrategy::Intercept);
                observer.subscribe(Rc::downgrade(&sink) as Weak<dyn CollectionSubscriber>);
                batch(|| {
                    for i in 0..ops {
                        observer.push([Value::from(i)]).expect("push");
                        observer.shift().expect("shift");
                    }
                })
                .expect("batch");
                black_box(observer.array().snapshot_len())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_steady_state,
    bench_conditional_switch,
    bench_batched_mutation
);
criterion_main!(benches);
