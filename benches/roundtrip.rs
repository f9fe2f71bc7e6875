//! Decode and encode throughput for a container dominated by one large array of records.
//!
//! Run with `cargo bench`.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use krds_pack::spec::*;
use krds_pack::*;

fn registry_and_file(bookmarks: usize) -> (Registry, Vec<u8>) {
    let position = Arc::new(Spec::position());
    let long = Arc::new(Spec::basic(Kind::Long));
    let bookmark = Arc::new(
        RecordSpec::new()
            .req_add("start", position.clone())
            .req_add("end", position.clone())
            .req_add("created", long.clone())
            .req_add("modified", long)
            .opt_add("template", Spec::basic(Kind::Utf8))
            .opt_add("note", Spec::basic(Kind::Utf8)),
    );
    let list = Arc::new(
        ArraySpec::new(Spec::Structural(Structure::Record(bookmark.clone())))
            .named("annotation.personal.bookmark"),
    );
    let registry = Registry::new()
        .add("sync_lpr", Spec::basic(Kind::Bool))
        .add("erl", position)
        .add("bookmarks", Spec::Structural(Structure::Array(list.clone())));

    let mut array = Array::new(list);
    for i in 0..bookmarks {
        let mut record = Record::new(bookmark.clone()).expect("bookmark defaults");
        let at = i as u32 * 64;
        record
            .insert("start", Value::from(Position::with_chunk(i as u32, at, at as i64)))
            .expect("start");
        record
            .insert("end", Value::from(Position::with_chunk(i as u32, at + 40, at as i64 + 40)))
            .expect("end");
        record.insert("created", Value::from(1_600_000_000_000i64 + i as i64)).expect("created");
        if i % 3 == 0 {
            record.insert("template", Value::from("")).expect("template");
            record.insert("note", Value::from(format!("note number {}", i))).expect("note");
        }
        array.push(Value::from(record)).expect("push");
    }

    let mut file = Container::new();
    file.insert("sync_lpr", Value::from(true), &registry).expect("sync_lpr");
    file.insert("erl", Value::from(Position::new(5050)), &registry).expect("erl");
    file.insert("bookmarks", Value::from(array), &registry).expect("bookmarks");
    let bytes = file.encode().expect("encode");
    (registry, bytes)
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("container");
    for size in [10, 100, 1000] {
        let (registry, bytes) = registry_and_file(size);
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("decode", size), &bytes, |b, bytes| {
            b.iter(|| Container::decode(black_box(bytes), &registry).expect("decode"))
        });

        let decoded = Container::decode(&bytes, &registry).expect("decode");
        group.bench_with_input(BenchmarkId::new("encode", size), &decoded, |b, file| {
            b.iter(|| black_box(file).encode().expect("encode"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_roundtrip);
criterion_main!(benches);
