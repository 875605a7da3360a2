//! Query planning and cursor scan throughput over an imported survey.
//!
//! The dataset is a 100 x 100 ground grid, one point per cell, split into
//! ~40 pages. Every benchmark runs against a warm cache; the first
//! iteration pays the page loads.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use silvadb::{Box3, ClassificationSet, DatasetOpenSettings, Editor, ImportRecord, ImportSettings, Where};
use tempfile::tempdir;

const POINTS: usize = 10_000;

fn survey_editor() -> (tempfile::TempDir, Editor) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bench.spf");
    let records: Vec<ImportRecord> = (0..POINTS)
        .map(|i| ImportRecord {
            position: [(i % 100) as f64, (i / 100) as f64, (i % 7) as f64],
            intensity: (i % 100) as f64 / 100.0,
            classification: (i % 8) as u8,
            ..ImportRecord::default()
        })
        .collect();
    let settings = ImportSettings {
        leaf_capacity: 256,
        ..ImportSettings::default()
    };
    silvadb::import_points(&path, &records, &settings).unwrap();

    let editor = Editor::builder().cache_capacity(256).build();
    editor
        .open_dataset(&path, DatasetOpenSettings::default())
        .unwrap();
    (dir, editor)
}

fn bench_plan(c: &mut Criterion) {
    let (_dir, editor) = survey_editor();
    let mut group = c.benchmark_group("plan");

    group.bench_function("full", |b| {
        b.iter(|| {
            let mut query = editor.query();
            query.exec();
            black_box(query.candidate_pages())
        })
    });

    group.bench_function("boxed", |b| {
        b.iter(|| {
            let mut where_ = Where::new();
            where_.set_box(Box3::new([10.0, 10.0, 0.0], [40.0, 40.0, 7.0]));
            let mut query = editor.query();
            query.set_where(where_);
            query.exec();
            black_box(query.candidate_pages())
        })
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let (_dir, editor) = survey_editor();
    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(POINTS as u64));

    group.bench_function("all_points", |b| {
        b.iter(|| {
            let mut query = editor.query();
            query.exec();
            let mut sum = 0.0;
            while query.next_point().unwrap() {
                sum += query.x();
            }
            black_box(sum)
        })
    });

    group.bench_function("classified", |b| {
        b.iter(|| {
            let mut where_ = Where::new();
            where_.set_classifications(ClassificationSet::from_codes([2, 3]));
            let mut query = editor.query();
            query.set_where(where_);
            query.exec();
            let mut seen = 0usize;
            while query.next_point().unwrap() {
                seen += 1;
            }
            black_box(seen)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_plan, bench_scan);
criterion_main!(benches);
