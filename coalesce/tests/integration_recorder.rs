//! Integration tests for the recorder lifecycle.
//!
//! Covers concurrent runs in one recorder, finishing semantics, snappy
//! artifacts, configuration loaded from disk, and a shared recorder fed
//! from several threads.

use std::io::Read;

use coalesce::error::UsageError;
use coalesce::run::read_metadata;
use coalesce::writer::read_records;
use coalesce::{
    CoalesceError, Compression, MetricDescriptor, MetricIndex, MetricNames, Recorder, RecorderConfig,
    Sample, SharedRecorder,
};
use tempfile::tempdir;

fn latency() -> MetricDescriptor {
    MetricDescriptor::new("uperf", "latency-usec").with_class("count")
}

fn names(client: &str, server: &str) -> MetricNames {
    MetricNames::new().with("client", client).with("server", server)
}

/// Feeds the same two-value stream to run `id`.
fn feed(recorder: &mut Recorder, id: &str, names: &MetricNames, offset: f64) {
    for k in 1..=20i64 {
        let value = if k <= 10 { 10.0 + offset } else { 20.0 + offset };
        recorder.log_sample(id, &latency(), names, Sample::new(k * 100, value)).unwrap();
    }
}

#[test]
fn test_interleaved_runs_do_not_contaminate() {
    let dir = tempdir().unwrap();
    let mut recorder = Recorder::new(RecorderConfig::new(dir.path())).unwrap();

    // Interleave two runs sample by sample; run "b" sees an extra metric.
    for k in 1..=20i64 {
        let a = if k <= 10 { 1.0 } else { 2.0 };
        recorder.log_sample("a", &latency(), &names("c1", "s1"), Sample::new(k * 100, a)).unwrap();
        recorder.log_sample("b", &latency(), &names("c9", "s9"), Sample::new(k * 100, 7.0)).unwrap();
        recorder.log_sample("b", &latency(), &names("c1", "s1"), Sample::new(k * 100, 3.0)).unwrap();
    }

    let a = recorder.finish_with_summary("a", false).unwrap();
    let b = recorder.finish_with_summary("b", false).unwrap();

    assert_eq!((a.metrics, a.records, a.samples_ingested), (1, 2, 20));
    assert_eq!((b.metrics, b.records, b.samples_ingested), (2, 2, 40));

    let a_records = read_records(&a.samples_path, Compression::None).unwrap();
    assert!(a_records.iter().all(|r| r.index == MetricIndex(0)));
    assert_eq!(a_records.iter().map(|r| r.value).collect::<Vec<_>>(), vec![1.0, 2.0]);

    let b_records = read_records(&b.samples_path, Compression::None).unwrap();
    assert_eq!(b_records.iter().map(|r| r.value).collect::<Vec<_>>(), vec![7.0, 3.0]);

    let b_meta = read_metadata(b.metadata_path.unwrap(), Compression::None).unwrap();
    assert_eq!(b_meta[0].names, names("c9", "s9"));
    assert_eq!(b_meta[1].names, names("c1", "s1"));
}

#[test]
fn test_finish_twice_fails() {
    let dir = tempdir().unwrap();
    let mut recorder = Recorder::new(RecorderConfig::new(dir.path())).unwrap();
    feed(&mut recorder, "0", &names("c1", "s1"), 0.0);

    let prefix = recorder.finish("0", false).unwrap();
    assert_eq!(prefix, dir.path().join("metric-data-0"));
    assert!(dir.path().join("metric-data-0.csv").exists());
    assert!(dir.path().join("metric-data-0.json").exists());

    match recorder.finish("0", false) {
        Err(CoalesceError::Usage(UsageError::NoActiveRun { id })) => assert_eq!(id, "0"),
        other => panic!("Expected NoActiveRun, got: {:?}", other),
    }
}

#[test]
fn test_id_reused_after_finish_starts_fresh_run() {
    let dir = tempdir().unwrap();
    let mut recorder = Recorder::new(RecorderConfig::new(dir.path())).unwrap();

    feed(&mut recorder, "0", &names("c1", "s1"), 0.0);
    recorder.finish("0", false).unwrap();

    // The artifacts are truncated and indices restart at zero.
    let index = recorder
        .log_sample("0", &latency(), &names("c2", "s2"), Sample::new(100, 5.0))
        .unwrap();
    assert_eq!(index, MetricIndex(0));

    let summary = recorder.finish_with_summary("0", false).unwrap();
    let records = read_records(&summary.samples_path, Compression::None).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, 5.0);
}

#[test]
fn test_snappy_artifacts_match_plain() {
    let dir = tempdir().unwrap();
    let plain_dir = dir.path().join("plain");
    let snappy_dir = dir.path().join("snappy");

    for (out, compression) in [(&plain_dir, Compression::None), (&snappy_dir, Compression::Snappy)] {
        let config = RecorderConfig::new(out).with_compression(compression);
        let mut recorder = Recorder::new(config).unwrap();
        feed(&mut recorder, "7", &names("c1", "s1"), 0.0);
        feed(&mut recorder, "7", &names("c2", "s2"), 0.5);
        recorder.finish("7", false).unwrap();
    }

    for (plain_name, snappy_name) in [
        ("metric-data-7.csv", "metric-data-7.csv.sz"),
        ("metric-data-7.json", "metric-data-7.json.sz"),
    ] {
        let plain = std::fs::read(plain_dir.join(plain_name)).unwrap();
        let packed = std::fs::read(snappy_dir.join(snappy_name)).unwrap();

        let mut unpacked = Vec::new();
        snap::read::FrameDecoder::new(packed.as_slice())
            .read_to_end(&mut unpacked)
            .unwrap();
        assert_eq!(unpacked, plain, "{snappy_name}");
    }
}

#[test]
fn test_config_loaded_from_file() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("nested/out");
    let config_path = dir.path().join("coalesce.json");
    std::fs::write(
        &config_path,
        serde_json::json!({ "output_dir": out, "keep_constant_zero": true }).to_string(),
    )
    .unwrap();

    let config = RecorderConfig::load(&config_path).unwrap();
    let mut recorder = Recorder::new(config).unwrap();
    assert!(out.is_dir());

    recorder
        .log_sample("z", &latency(), &names("c1", "s1"), Sample::new(100, 0.0))
        .unwrap();
    let summary = recorder.finish_with_summary("z", false).unwrap();
    assert!(summary.purged.is_empty());
    assert_eq!(summary.records, 1);
}

#[test]
fn test_shared_recorder_runs_per_thread() {
    let dir = tempdir().unwrap();
    let shared = SharedRecorder::new(RecorderConfig::new(dir.path())).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let shared = shared.clone();
            std::thread::spawn(move || {
                let id = format!("thread-{t}");
                for k in 1..=50i64 {
                    let value = if k % 10 == 0 { 1.0 } else { 2.0 };
                    shared
                        .log_sample(&id, &latency(), &names("c1", "s1"), Sample::new(k * 10, value))
                        .unwrap();
                }
                shared.finish(&id, false).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let prefix = handle.join().unwrap();
        let mut samples = prefix.into_os_string();
        samples.push(".csv");
        let records = read_records(&samples, Compression::None).unwrap();
        // 2 x9, 1, repeated five times.
        assert_eq!(records.len(), 10);
    }
    assert!(shared.active_runs().is_empty());
}
