//! Benchmarks for expression compilation and evaluation
//!
//! Run with: cargo bench -p tendril-core

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use tendril_core::expr::{parse, Evaluator, ExpressionCache, Scope, Value};
use tendril_core::Store;

const SOURCES: [(&str, &str); 4] = [
    ("literal", "42"),
    ("arithmetic", "(a + b) * 2 - a / 4"),
    ("member", "user.name + ' (' + user.age + ')'"),
    ("arrow", "((x) => x > 3 ? 'big' : 'small')(a)"),
];

fn scope(store: &Store) -> Scope {
    let scope = Scope::new();
    scope.define("a", Value::from(7));
    scope.define("b", Value::from(5));
    scope.define(
        "user",
        Value::object(
            [
                ("name".to_string(), Value::from("Ada")),
                ("age".to_string(), Value::from(36)),
            ]
            .into_iter()
            .collect(),
        ),
    );
    scope.define("count", Value::Signal(store.create_signal(Value::from(0))));
    scope
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("expr/parse");
    for (name, source) in SOURCES {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| black_box(parse(source)))
        });
    }
    group.finish();
}

fn bench_cached_compile(c: &mut Criterion) {
    let cache = ExpressionCache::new();
    let source = SOURCES[2].1;
    c.bench_function("expr/cache_hit", |b| {
        b.iter(|| black_box(cache.compile(source)))
    });
}

fn bench_eval(c: &mut Criterion) {
    let store = Store::new();
    let scope = scope(&store);
    let mut group = c.benchmark_group("expr/eval");
    for (name, source) in SOURCES {
        let Ok(expr) = parse(source) else { continue };
        group.bench_with_input(BenchmarkId::from_parameter(name), &expr, |b, expr| {
            b.iter(|| black_box(Evaluator::untracked().eval(expr, &scope)))
        });
    }
    group.finish();
}

fn bench_signal_write(c: &mut Criterion) {
    let store = Store::new();
    let scope = scope(&store);
    let Ok(expr) = parse("count.value++") else { return };
    c.bench_function("expr/signal_increment", |b| {
        b.iter(|| black_box(Evaluator::untracked().eval(&expr, &scope)))
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_cached_compile,
    bench_eval,
    bench_signal_write
);
criterion_main!(benches);
