//! Benchmarks for host dispatch overhead

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use opal_host::{Features, HostValue, Hints, Library};

fn bench_construction(c: &mut Criterion) {
    let lib = Library::new(Features::all());
    let mut group = c.benchmark_group("construction");

    group.bench_function("make_base_laplace", |b| {
        b.iter(|| lib.make_base_laplace(black_box(1.0), &Hints::new()).unwrap())
    });

    group.bench_function("chain_mean_laplace", |b| {
        b.iter(|| {
            let mean = lib.make_bounded_mean(0.0, 10.0, 10, &Hints::new()).unwrap();
            let laplace = lib.make_base_laplace(0.5, &Hints::new()).unwrap();
            lib.chain_mt(mean, laplace).unwrap()
        })
    });

    group.finish();
}

fn bench_entity_calls(c: &mut Criterion) {
    let lib = Library::new(Features::all());
    let mean = lib.make_bounded_mean(0.0, 10.0, 100, &Hints::new()).unwrap();
    let laplace = lib.make_base_laplace(0.5, &Hints::new()).unwrap();
    let measurement = lib.chain_mt(mean, laplace).unwrap();
    let data = HostValue::from((0..100).map(|i| (i % 10) as f64).collect::<Vec<_>>());

    let mut group = c.benchmark_group("entity");

    group.bench_function("map", |b| b.iter(|| measurement.map(black_box(1)).unwrap()));

    group.bench_function("check", |b| {
        b.iter(|| measurement.check(black_box(1), black_box(1.0)).unwrap())
    });

    group.bench_function("invoke_100", |b| {
        b.iter(|| measurement.invoke(black_box(data.clone())).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_construction, bench_entity_calls);
criterion_main!(benches);
