//! Cost of a full all-pairs pass on the in-process transport.
//!
//! Useful as a floor for what the orchestration itself costs, independent
//! of any real interconnect.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pingpong::bench::benchmark_all_pairs;
use pingpong::transport::local::LocalCluster;
use pingpong::{PassConfig, PassKind, Pairs};

fn bench_all_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_all_pairs");
    group.sample_size(10);

    for ranks in [2usize, 4, 8] {
        let pass = PassConfig {
            kind: PassKind::Latency,
            repetitions: 100,
            payload_bytes: 1,
        };
        group.throughput(Throughput::Elements(Pairs::count_for(ranks) as u64));
        group.bench_with_input(BenchmarkId::new("latency", ranks), &ranks, |b, &ranks| {
            let cluster = LocalCluster::new(ranks);
            b.iter(|| {
                let rows = cluster
                    .run(|w| {
                        let mut payload = vec![0u8; pass.payload_bytes];
                        benchmark_all_pairs(w, &pass, &mut payload).map(|(row, _)| row)
                    })
                    .unwrap();
                black_box(rows);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_all_pairs);
criterion_main!(benches);
