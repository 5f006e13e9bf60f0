use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use flowwatch::features::FeatureAggregator;
use flowwatch::FlowRecord;

fn synthetic_flows(n: usize) -> Vec<FlowRecord> {
    (0..n)
        .map(|i| {
            FlowRecord::new(
                Utc.timestamp_opt(1_709_280_000 + (i as i64) * 7, 0).unwrap(),
                &format!("10.{}.{}.{}", i % 4, i % 251, i % 17),
                "192.168.0.1",
                443,
                if i % 3 == 0 { "UDP" } else { "TCP" },
                (i as u64 * 7919) % 65_536,
            )
        })
        .collect()
}

fn bench_aggregate(c: &mut Criterion) {
    let flows = synthetic_flows(200_000);
    let mut group = c.benchmark_group("aggregate");

    for partitions in [1usize, 4, 8] {
        let aggregator = FeatureAggregator::new(3600, partitions);
        group.bench_with_input(
            BenchmarkId::from_parameter(partitions),
            &flows,
            |b, flows| b.iter(|| aggregator.aggregate(black_box(flows))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_aggregate);
criterion_main!(benches);
