//! Query pipeline benchmarks
//!
//! - compile: query text → descriptor
//! - filter + order + limit over a single relation
//! - hash equi-join
//! - GROUP BY aggregation
//! - exact vs approximate COUNT(DISTINCT)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flatquery::types::row_from_pairs;
use flatquery::{execute_select_query, parse_select_query, MemoryStorage, Relation, Value};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tokio::runtime::Runtime;

fn setup_storage(customers: usize, orders: usize) -> MemoryStorage {
    let mut rng = StdRng::seed_from_u64(42);
    let storage = MemoryStorage::new();

    let customer_rows: Relation = (0..customers)
        .map(|i| {
            row_from_pairs([
                ("id", Value::from(i.to_string())),
                ("name", Value::from(format!("customer_{}", i))),
                ("region", Value::from(format!("r{}", i % 8))),
            ])
        })
        .collect();
    storage.insert_relation("customers", customer_rows);

    let order_rows: Relation = (0..orders)
        .map(|i| {
            row_from_pairs([
                ("id", Value::from(i.to_string())),
                ("customer_id", Value::from(rng.gen_range(0..customers).to_string())),
                ("amount", Value::from(rng.gen_range(1..1000).to_string())),
            ])
        })
        .collect();
    storage.insert_relation("orders", order_rows);

    storage
}

fn bench_compile(c: &mut Criterion) {
    let sql = "SELECT customers.name, orders.amount FROM customers \
               LEFT JOIN orders ON customers.id = orders.customer_id \
               WHERE orders.amount > 100 AND customers.name LIKE 'customer_1%' \
               ORDER BY orders.amount DESC LIMIT 10";
    c.bench_function("compile_select", |b| {
        b.iter(|| black_box(parse_select_query(black_box(sql)).unwrap()))
    });
}

fn bench_queries(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("select");

    for size in [1_000, 10_000, 50_000] {
        let storage = setup_storage(size / 10, size);
        group.throughput(Throughput::Elements(size as u64));

        let queries = [
            ("filter_order_limit", "SELECT id, amount FROM orders WHERE amount >= 500 ORDER BY amount DESC LIMIT 20"),
            ("inner_join", "SELECT customers.name, orders.amount FROM customers INNER JOIN orders ON customers.id = orders.customer_id"),
            ("group_by", "SELECT customer_id, SUM(amount), COUNT(*) FROM orders GROUP BY customer_id"),
            ("count_distinct", "SELECT COUNT(DISTINCT (customer_id)) FROM orders"),
            ("approx_count_distinct", "SELECT APPROXIMATE_COUNT(DISTINCT (customer_id)) FROM orders"),
        ];

        for (name, sql) in queries {
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| black_box(rt.block_on(execute_select_query(&storage, sql)).unwrap()))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_queries);
criterion_main!(benches);
