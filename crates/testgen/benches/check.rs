use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use storecop_core::CheckConfig;
use storecop_testgen::fixture::Layout;
use storecop_testgen::generator::{generate_stores, GenParams};

fn params(n_node: u64, n_relationship: u64) -> GenParams {
    GenParams::builder()
        .n_node(n_node)
        .n_relationship(n_relationship)
        .n_label(9)
        .n_rel_type(4)
        .n_property_key(5)
        .build()
}

fn bench_check(c: &mut Criterion) {
    let root = tempfile::tempdir().unwrap();
    let sizes = [("small", params(100, 400)), ("medium", params(1_000, 5_000))];

    let mut group = c.benchmark_group("full_check");
    group.sample_size(20);

    for (name, params) in &sizes {
        let store = generate_stores(&root.path().join(name), 1, params, &Layout::default())
            .unwrap()
            .remove(0);
        let config = CheckConfig::default();
        assert!(
            storecop_core::check(store.get_dir(), &config)
                .unwrap()
                .is_consistent(),
            "benchmark stores must be consistent",
        );

        group.bench_function(*name, |b| {
            b.iter(|| {
                let _ = storecop_core::check(black_box(store.get_dir()), black_box(&config));
            });
        });

        // Two partitions force every relationship to be visited twice.
        let partitioned = CheckConfig::builder()
            .memory_limit(params.n_node * 26 / 2)
            .build();
        group.bench_function(format!("{name}_partitioned"), |b| {
            b.iter(|| {
                let _ = storecop_core::check(black_box(store.get_dir()), black_box(&partitioned));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_check);
criterion_main!(benches);
