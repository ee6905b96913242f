//! Microbenchmarks for the `log_sample()` path.
//!
//! Measures the cost of merging an unchanged sample and of flushing a
//! changed one, across metric counts.
//!
//! Run with: `cargo bench -p coalesce -- ingest`

#![allow(missing_docs, clippy::cast_precision_loss)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use coalesce::{Compression, Consolidator, MetricDescriptor, MetricIndex, MetricNames, RecorderConfig, Run, Sample};
use tempfile::tempdir;

/// Builds descriptor/names pairs for `count` metrics of one source.
fn metrics(count: u32) -> Vec<(MetricDescriptor, MetricNames)> {
    (0..count)
        .map(|i| {
            (
                MetricDescriptor::new("sar-net", "L2-Gbps"),
                MetricNames::new().with("dev", format!("eth{i}")).with("direction", "rx"),
            )
        })
        .collect()
}

fn open_run(compression: Compression) -> (Run, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = RecorderConfig::new(temp_dir.path()).with_compression(compression);
    let run = Run::open("bench", &config).unwrap();
    (run, temp_dir)
}

fn bench_consolidator_merge(c: &mut Criterion) {
    let mut consolidator = Consolidator::new();
    let index = MetricIndex(0);
    let mut end = 0i64;

    c.bench_function("ingest/consolidator_merge", |b| {
        b.iter(|| {
            end += 1000;
            consolidator
                .ingest(black_box(index), black_box(Sample::new(end, 42.5)))
                .unwrap();
        });
    });
}

fn bench_log_sample_unchanged(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest/unchanged");

    for count in [1, 10, 100] {
        let (mut run, _dir) = open_run(Compression::None);
        let metrics = metrics(count);
        let mut end = 0i64;

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                end += 1000;
                for (desc, names) in &metrics {
                    run.log_sample(black_box(desc), black_box(names), Sample::new(end, 99.9))
                        .unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_log_sample_changing(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest/changing");

    for compression in [Compression::None, Compression::Snappy] {
        let (mut run, _dir) = open_run(compression);
        let metrics = metrics(30);
        let mut end = 0i64;

        let name = format!("{compression:?}").to_lowercase();
        group.bench_function(name, |b| {
            b.iter(|| {
                end += 1000;
                // A new value every sample forces a record per metric.
                let value = end as f64;
                for (desc, names) in &metrics {
                    run.log_sample(black_box(desc), black_box(names), Sample::new(end, value))
                        .unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_consolidator_merge,
    bench_log_sample_unchanged,
    bench_log_sample_changing,
);
criterion_main!(benches);
