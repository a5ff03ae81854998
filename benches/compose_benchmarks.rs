//! Benchmarks for composition and SQL rendering.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use relcompose::dialect::{PostgresDialect, SqlServerDialect};
use relcompose::expr::{
    client_call, constant, lambda, param, record, source, Expr, SequenceOperator,
};
use relcompose::provider::ComposerProvider;
use relcompose::render::SqlRenderer;

// ---------------------------------------------------------------------------
// Operator chains organized by complexity
// ---------------------------------------------------------------------------

fn orders() -> Expr {
    source("orders", &["Id", "CustomerId", "Total", "Status"])
}

fn customers() -> Expr {
    source("customers", &["Id", "Name", "Country"])
}

fn filter_project() -> Expr {
    orders()
        .call(
            SequenceOperator::Where,
            vec![lambda(&["o"], param("o").member("Total").greater_than(constant(100)))],
        )
        .call(
            SequenceOperator::Select,
            vec![lambda(
                &["o"],
                record(vec![("Id", param("o").member("Id")), ("Total", param("o").member("Total"))]),
            )],
        )
}

fn paged() -> Expr {
    filter_project()
        .call(SequenceOperator::Distinct, vec![])
        .call(
            SequenceOperator::OrderBy,
            vec![lambda(&["o"], param("o").member("Total"))],
        )
        .call(SequenceOperator::Skip, vec![constant(20)])
        .call(SequenceOperator::Take, vec![constant(10)])
}

fn join() -> Expr {
    orders().call(
        SequenceOperator::Join,
        vec![
            customers().call(
                SequenceOperator::Where,
                vec![lambda(&["c"], param("c").member("Country").equal(constant("NZ")))],
            ),
            lambda(&["o"], param("o").member("CustomerId")),
            lambda(&["c"], param("c").member("Id")),
            lambda(
                &["o", "c"],
                record(vec![("Order", param("o").member("Id")), ("Name", param("c").member("Name"))]),
            ),
        ],
    )
}

fn group_join_count() -> Expr {
    customers().call(
        SequenceOperator::GroupJoin,
        vec![
            orders(),
            lambda(&["c"], param("c").member("Id")),
            lambda(&["o"], param("o").member("CustomerId")),
            lambda(
                &["c", "g"],
                record(vec![
                    ("Name", param("c").member("Name")),
                    ("Orders", param("g").call(SequenceOperator::Count, vec![])),
                ]),
            ),
        ],
    )
}

fn group_by_aggregate() -> Expr {
    orders()
        .call(
            SequenceOperator::GroupBy,
            vec![lambda(&["o"], param("o").member("Status"))],
        )
        .call(
            SequenceOperator::Select,
            vec![lambda(
                &["g"],
                record(vec![
                    ("Status", param("g").member("Key")),
                    (
                        "Total",
                        param("g").call(
                            SequenceOperator::Sum,
                            vec![lambda(&["o"], param("o").member("Total"))],
                        ),
                    ),
                ]),
            )],
        )
}

fn split_predicate() -> Expr {
    orders().call(
        SequenceOperator::Where,
        vec![lambda(
            &["o"],
            param("o")
                .member("Total")
                .greater_than(constant(100))
                .and(client_call("IsFlagged", vec![param("o").member("Id")])),
        )],
    )
}

fn cases() -> Vec<(&'static str, Expr)> {
    vec![
        ("filter_project", filter_project()),
        ("paged", paged()),
        ("join", join()),
        ("group_join_count", group_join_count()),
        ("group_by_aggregate", group_by_aggregate()),
        ("split_predicate", split_predicate()),
    ]
}

fn bench_composition(c: &mut Criterion) {
    let mut group = c.benchmark_group("composition");
    let provider = ComposerProvider::default();

    for (name, query) in cases() {
        group.bench_with_input(BenchmarkId::new("compose", name), &query, |b, query| {
            b.iter(|| provider.compose(black_box(query.clone())).unwrap());
        });
    }

    group.finish();
}

fn bench_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("rendering");
    let provider = ComposerProvider::for_dialect(&PostgresDialect);
    let postgres = SqlRenderer::new(&PostgresDialect);
    let sql_server = SqlRenderer::new(&SqlServerDialect);

    for (name, query) in cases() {
        let composed = provider.compose(query).unwrap();
        group.bench_with_input(BenchmarkId::new("postgres", name), &composed, |b, q| {
            b.iter(|| postgres.render(black_box(q)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("sql_server", name), &composed, |b, q| {
            b.iter(|| sql_server.render(black_box(q)).unwrap());
        });
    }

    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");
    let provider = ComposerProvider::for_dialect(&PostgresDialect);
    let renderer = SqlRenderer::new(&PostgresDialect);

    for (name, query) in cases() {
        group.bench_with_input(BenchmarkId::new("compose_render", name), &query, |b, query| {
            b.iter(|| {
                let composed = provider.compose(black_box(query.clone())).unwrap();
                renderer.render(&composed).unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_composition, bench_rendering, bench_round_trip);
criterion_main!(benches);
