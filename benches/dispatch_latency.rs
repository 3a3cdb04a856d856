//! Dispatch latency benchmarks.
//!
//! Mirrors the teacher's `bench_monitor_collect`-style shape: an async
//! criterion benchmark that sets up fresh state per iteration and measures
//! one hot-path call.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;
use trini::{Config, WorkerId};

fn bench_dispatch_plain_rr(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("dispatch_plain_round_robin", |b| {
        let cluster = rt.block_on(async { trini::Cluster::start(Config::default(), 8) });

        b.to_async(&rt).iter(|| {
            let cluster = Arc::clone(&cluster);
            async move {
                let id: WorkerId = cluster.dispatch("benchmark payload").await.unwrap();
                black_box(id)
            }
        });
    });
}

fn bench_dispatch_by_algorithm(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("dispatch_by_algorithm");

    for algorithm in ["RR", "RAN", "WRR", "WRAN"] {
        group.bench_with_input(BenchmarkId::from_parameter(algorithm), &algorithm, |b, &algorithm| {
            let cluster = rt.block_on(async { trini::Cluster::start(Config::default(), 8) });
            cluster.set_policy(algorithm, true, 2_000, 30).unwrap();

            b.to_async(&rt).iter(|| {
                let cluster = Arc::clone(&cluster);
                async move {
                    let id = cluster.dispatch("benchmark payload").await.unwrap();
                    black_box(id)
                }
            });
        });
    }

    group.finish();
}

fn bench_submit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("submit_one_task", |b| {
        let cluster = rt.block_on(async { trini::Cluster::start(Config::default(), 4) });

        b.to_async(&rt).iter(|| {
            let cluster = Arc::clone(&cluster);
            async move {
                let result = cluster.submit("benchmark payload".to_string()).await.unwrap();
                black_box(result)
            }
        });
    });
}

criterion_group!(benches, bench_dispatch_plain_rr, bench_dispatch_by_algorithm, bench_submit);
criterion_main!(benches);
