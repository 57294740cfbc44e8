//! Benchmarks for gnode processing.
//!
//! Target: a 1000-row update batch against 100k stored rows in well under a
//! millisecond per column.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rill_context::{AggSpec, Aggregate, ViewConfig};
use rill_core::{DataTable, DataType, OpCode, Scalar, Schema, PSP_OP, PSP_PKEY};
use rill_incremental::{Gnode, GnodeOptions};

const SECTORS: [&str; 5] = ["Tech", "Finance", "Health", "Energy", "Consumer"];

fn create_schema(extra_columns: usize) -> Schema {
    let mut schema = Schema::from_pairs(&[
        ("sector", DataType::String),
        ("price", DataType::Float64),
    ])
    .unwrap();
    for i in 0..extra_columns {
        schema
            .add_column(&format!("metric_{}", i), DataType::Int64)
            .unwrap();
    }
    schema
}

fn batch(gnode: &Gnode, keys: std::ops::Range<usize>, op: OpCode, seed: usize) -> DataTable {
    let schema = gnode.input_schema().clone();
    let mut table = DataTable::with_len(&schema, keys.len());
    for (row, key) in keys.enumerate() {
        table.set_scalar(PSP_PKEY, row, &Scalar::Int64(key as i64)).unwrap();
        table.set_scalar(PSP_OP, row, &Scalar::UInt8(op.as_u8())).unwrap();
        table
            .set_scalar("sector", row, &Scalar::str(SECTORS[key % SECTORS.len()]))
            .unwrap();
        table
            .set_scalar("price", row, &Scalar::Float64((key * 7 + seed) as f64 * 0.5))
            .unwrap();
        for (name, _) in schema.iter().filter(|(n, _)| n.starts_with("metric_")) {
            table
                .set_scalar(name, row, &Scalar::Int64((key + seed) as i64))
                .unwrap();
        }
    }
    table
}

fn loaded_gnode(rows: usize, extra_columns: usize, options: GnodeOptions) -> Gnode {
    let output = create_schema(extra_columns);
    let input = output.to_input_schema(DataType::Int64).unwrap();
    let mut gnode = Gnode::new(input, output, options).unwrap();
    gnode.init().unwrap();
    let data = batch(&gnode, 0..rows, OpCode::Insert, 0);
    gnode.send(0, data).unwrap();
    gnode.process(0).unwrap();
    gnode
}

fn process_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("gnode_process");

    for rows in [1000usize, 10000, 100000].iter() {
        group.bench_with_input(BenchmarkId::new("initial_load", rows), rows, |b, &rows| {
            b.iter(|| black_box(loaded_gnode(rows, 0, GnodeOptions::new())));
        });

        group.bench_with_input(BenchmarkId::new("update_1000", rows), rows, |b, &rows| {
            let mut gnode = loaded_gnode(rows, 0, GnodeOptions::new());
            let mut seed = 0;
            b.iter(|| {
                seed += 1;
                let data = batch(&gnode, 0..1000.min(rows), OpCode::Update, seed);
                gnode.send(0, data).unwrap();
                black_box(gnode.process(0).unwrap())
            });
        });
    }

    group.finish();
}

fn parallel_diff_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("gnode_wide_diff");

    for threshold in [usize::MAX, 4].iter() {
        let label = if *threshold == usize::MAX { "sequential" } else { "parallel" };
        group.bench_function(BenchmarkId::new(label, 64), |b| {
            let options = GnodeOptions::new().parallel_threshold(*threshold);
            let mut gnode = loaded_gnode(10000, 64, options);
            let mut seed = 0;
            b.iter(|| {
                seed += 1;
                let data = batch(&gnode, 0..10000, OpCode::Update, seed);
                gnode.send(0, data).unwrap();
                black_box(gnode.process(0).unwrap())
            });
        });
    }

    group.finish();
}

fn notify_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("gnode_notify");

    group.bench_function("ctx1_update_1000", |b| {
        let mut gnode = loaded_gnode(100000, 0, GnodeOptions::new());
        let view = ViewConfig::new()
            .row_pivot("sector")
            .aggregate(AggSpec::new("price", Aggregate::Sum));
        gnode.register_context("by_sector", &view).unwrap();
        let mut seed = 0;
        b.iter(|| {
            seed += 1;
            let data = batch(&gnode, 0..1000, OpCode::Update, seed);
            gnode.send(0, data).unwrap();
            black_box(gnode.process(0).unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    process_benchmark,
    parallel_diff_benchmark,
    notify_benchmark
);
criterion_main!(benches);
