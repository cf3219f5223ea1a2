//! Aggregate hash table benchmarks

use aggregation_engine::common::{Chunk, Column};
use aggregation_engine::execution::{EngineConfig, ExecutionContext};
use aggregation_engine::expr::{
    AggregateExpr, AggregateFunction, AggregateHashTable, Expr, HashTableStrategy,
    LinearProbingHashTable, StandardAggregateHashTable,
};
use aggregation_engine::datagen::GroupedDataGenerator;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;

fn key_value_chunks(rows: usize, groups: i32) -> Vec<(Chunk, Chunk)> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..rows / 1024)
        .map(|_| {
            let keys: Vec<i32> = (0..1024).map(|_| rng.gen_range(0..groups)).collect();
            let values: Vec<i32> = (0..1024).map(|_| rng.gen_range(0..100)).collect();
            (
                Chunk::from_columns(vec![Column::from(keys)]).unwrap(),
                Chunk::from_columns(vec![Column::from(values)]).unwrap(),
            )
        })
        .collect()
}

fn benchmark_add_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_chunk");
    group.sample_size(10);

    for groups in [100, 10_000, 1_000_000] {
        let chunks = key_value_chunks(1 << 20, groups);

        group.bench_with_input(BenchmarkId::new("standard", groups), &chunks, |b, chunks| {
            b.iter(|| {
                let mut table = StandardAggregateHashTable::new();
                for (keys, values) in chunks {
                    table.add_chunk(keys, values).unwrap();
                }
                black_box(table.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("linear_probing", groups), &chunks, |b, chunks| {
            b.iter(|| {
                let mut table = LinearProbingHashTable::<i32>::new();
                for (keys, values) in chunks {
                    table.add_chunk(keys, values).unwrap();
                }
                black_box(table.len())
            });
        });
    }

    group.finish();
}

fn benchmark_group_by(c: &mut Criterion) {
    let batches = GroupedDataGenerator::new(10_000).generate(1 << 18, 1024).unwrap();

    let mut group = c.benchmark_group("group_by");
    group.sample_size(10);

    for strategy in [HashTableStrategy::Standard, HashTableStrategy::LinearProbing] {
        let mut ctx = ExecutionContext::with_config(EngineConfig::default().with_hash_table(strategy));
        ctx.register_batches("sales", &batches).unwrap();

        group.bench_function(BenchmarkId::new("sum_by_key", strategy), |b| {
            b.iter(|| {
                let scan = ctx.scan("sales", None).unwrap();
                let mut plan = ctx
                    .aggregate(
                        scan,
                        vec![Expr::column_at(0, "k")],
                        vec![AggregateExpr::new(AggregateFunction::Sum, Expr::column_at(2, "quantity"))],
                    )
                    .unwrap();
                black_box(ctx.execute(plan.as_mut()).unwrap().row_count)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_add_chunk, benchmark_group_by);
criterion_main!(benches);
