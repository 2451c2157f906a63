//! Compile throughput, direct and through the plan cache.
//!
//! Run with: `cargo bench`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sqlforge::ast::*;
use sqlforge::{compile, compile_with_cache, Dialect, DialectDescriptor, PlanCache};

fn simple_select() -> Query {
    table("users")
        .filter(field("active").eq(true))
        .select([col("id"), col("email")])
}

fn join_with_params() -> Query {
    table("users")
        .join("orders", column("users", "id").eq(column("orders", "user_id")))
        .filter(column("orders", "total").gt(param(SqlType::Double, "min_total")))
        .select([column("users", "name"), column("orders", "total")])
        .order_by([column("orders", "total").desc()])
        .limit(param(SqlType::BigInt, "limit"))
}

fn aggregation() -> Query {
    table("employees")
        .filter(field("hired_at").gt(param(SqlType::Timestamp, "since")))
        .group_by([col("department")])
        .having(count_star().gt(5))
        .select([
            SelectItem::from(col("department")),
            count_star().alias("headcount"),
        ])
}

fn cte_with_union() -> Query {
    let active = table("users").filter(field("status").eq("active"));
    let recent = table("orders")
        .filter(field("placed_at").gt(param(SqlType::Timestamp, "since")))
        .select([col("user_id")]);
    let flagged = table("flags").select([col("user_id")]);
    let main = table("active_users")
        .filter(field("id").in_subquery(recent.union(flagged)))
        .select([col("id"), col("email")]);
    Query::with(vec![Cte::new("active_users", active)], main)
}

fn queries() -> Vec<(&'static str, Query)> {
    vec![
        ("simple_select", simple_select()),
        ("join_with_params", join_with_params()),
        ("aggregation", aggregation()),
        ("cte_with_union", cte_with_union()),
    ]
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let dialect = DialectDescriptor::postgres();

    for (name, query) in queries() {
        group.bench_with_input(BenchmarkId::new("direct", name), &query, |b, query| {
            b.iter(|| compile(black_box(&dialect), black_box(query)))
        });
    }

    group.finish();
}

fn bench_cached_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_compile");
    let dialect = DialectDescriptor::postgres();

    for (name, query) in queries() {
        let cache = PlanCache::new(64).unwrap();
        group.bench_with_input(BenchmarkId::new("hit", name), &query, |b, query| {
            b.iter(|| compile_with_cache(&cache, black_box(&dialect), black_box(query)))
        });
    }

    // Every lookup misses and evicts.
    let cache = PlanCache::new(1).unwrap();
    let alternating = [simple_select(), aggregation()];
    let mut i = 0;
    group.bench_function("miss_evict", |b| {
        b.iter(|| {
            i += 1;
            compile_with_cache(&cache, &dialect, black_box(&alternating[i % 2]))
        })
    });

    group.finish();
}

fn bench_dialects(c: &mut Criterion) {
    let mut group = c.benchmark_group("dialects");
    let query = join_with_params();

    for dialect in [
        DialectDescriptor::postgres(),
        DialectDescriptor::mysql(),
        DialectDescriptor::sqlite(),
        DialectDescriptor::ansi(),
    ] {
        let name = dialect.name().to_string();
        group.bench_function(name, |b| {
            b.iter(|| compile(&dialect, black_box(&query)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_cached_compile, bench_dialects);
criterion_main!(benches);
