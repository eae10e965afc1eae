//! Benchmarks for revision-id derivation, graph loading and schema digests.
//!
//! Run with: `cargo bench --bench revision_ids`

use std::collections::BTreeSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use revision_kernel::{
    rev_id, schema_digest, ColumnShape, ColumnType, InMemoryScriptStore, PostgresDialect,
    RevisionGraphBuilder, RevisionId, TableShape,
};

/// Create a table with `columns` columns and one foreign key.
fn make_table(index: usize, columns: usize) -> TableShape {
    let mut table = TableShape::new(format!("table_{index}"))
        .column(ColumnShape::new("id", ColumnType::BigInteger).primary_key());
    for c in 0..columns {
        table = table.column(ColumnShape::new(format!("col_{c}"), ColumnType::String(Some(64))));
    }
    table.foreign_key(format!("table_{index}_fk"), ["col_0"])
}

/// Benchmark id derivation for roots and steps.
fn bench_rev_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("rev_id");
    group.throughput(Throughput::Elements(1));

    group.bench_function("root", |b| b.iter(|| RevisionId::root(black_box("datasets"))));
    group.bench_function("step", |b| {
        b.iter(|| {
            rev_id(black_box(&[
                "datasets",
                "ByDimensionsDatasetRecordStorageManagerUUID",
                "1.0.0",
            ]))
        })
    });

    group.finish();
}

/// Benchmark schema digests over growing schemas.
fn bench_schema_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("schema_digest");
    let overrides = BTreeSet::new();

    for table_count in [1, 10, 50] {
        let tables: Vec<_> = (0..table_count).map(|i| make_table(i, 8)).collect();

        group.throughput(Throughput::Elements(table_count as u64));
        group.bench_with_input(BenchmarkId::new("tables", table_count), &tables, |b, tables| {
            b.iter(|| schema_digest(black_box(tables), &PostgresDialect, &overrides))
        });
    }

    group.finish();
}

/// Benchmark loading a tree with a long linear history.
fn bench_graph_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_load");

    for steps in [10, 100] {
        let store = InMemoryScriptStore::new();
        let builder = RevisionGraphBuilder::new(&store);
        builder.create_tree("datasets", false).expect("create tree");
        for version in 1..=steps {
            builder
                .add_step("datasets", "Manager", &format!("{version}.0.0"), false)
                .expect("add step");
        }

        group.bench_with_input(BenchmarkId::new("steps", steps), &builder, |b, builder| {
            b.iter(|| {
                let graph = builder.load_tree("datasets").expect("load");
                assert_eq!(graph.len(), steps + 1);
                graph
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_rev_id, bench_schema_digest, bench_graph_load);
criterion_main!(benches);
