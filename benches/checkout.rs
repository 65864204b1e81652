use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use hylladb::hyql::{
    BuildSection, BuildShelf, CheckOut, CheckOutItem, Condition, Filters, LogicalOp, Revise,
    SortItem, Write,
};
use hylladb::{Library, Record, Value};

const SHELVES: i64 = 512;

fn make_library() -> Library {
    let mut lib = Library::in_memory().unwrap();
    lib.execute(BuildSection::new(None, "zoo").unwrap()).unwrap();
    for i in 0..SHELVES {
        let name = format!("a{i}");
        lib.execute(BuildShelf::new(Some("zoo"), &name).unwrap()).unwrap();
        let mut data = Record::new();
        data.insert("name".into(), Value::from(name.as_str()));
        data.insert("age".into(), Value::Int(i % 17));
        data.insert("weight".into(), Value::Float(1.5 * (i % 31) as f64));
        lib.execute(Write::new(&format!("zoo.{name}"), data).unwrap())
            .unwrap();
    }
    lib
}

fn bench_checkout_filtered(c: &mut Criterion) {
    let lib = make_library();
    let filters = Filters::new(vec![
        Condition::new("age", ">=", 8).unwrap().into(),
        LogicalOp::And.into(),
        Condition::new("name", "matches", "^a[0-9]*7$").unwrap().into(),
    ])
    .unwrap();
    let query = CheckOut::builder()
        .item(CheckOutItem::new("zoo", ["name", "weight"]).unwrap())
        .filters(filters)
        .sort(SortItem::desc("weight").unwrap())
        .limit(20)
        .build()
        .unwrap();

    let mut group = c.benchmark_group("checkout");
    group.throughput(Throughput::Elements(SHELVES as u64));
    group.bench_function("filter_sort_limit", |b| {
        b.iter(|| lib.checkout(&query).unwrap());
    });
    group.bench_function("all_fields", |b| {
        let all = CheckOut::builder()
            .item(CheckOutItem::all("zoo").unwrap())
            .build()
            .unwrap();
        b.iter(|| lib.checkout(&all).unwrap());
    });
    group.finish();
}

fn bench_revise(c: &mut Criterion) {
    let mut group = c.benchmark_group("revise");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_shelf", |b| {
        b.iter_custom(|iters| {
            // Fresh state per sample.
            let mut lib = make_library();
            let start = Instant::now();
            for i in 0..iters {
                let mut data = Record::new();
                data.insert("fed".into(), Value::Int(i64::try_from(i).unwrap_or(0)));
                lib.execute(Revise::new("zoo.a7", None, data).unwrap()).unwrap();
            }
            start.elapsed()
        })
    });

    group.finish();
}

criterion_group!(checkout, bench_checkout_filtered, bench_revise);
criterion_main!(checkout);
