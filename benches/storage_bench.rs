//! Benchmarks for filekv store operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use filekv::{CancellationToken, Config, Document, FileStore, JsonCodec};
use tempfile::TempDir;

fn open_store() -> (TempDir, FileStore<JsonCodec<Document>>) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().data_dir(temp_dir.path()).build();
    let store = FileStore::open_json(config).unwrap();
    (temp_dir, store)
}

fn session_doc(i: u64) -> Document {
    Document::new()
        .with("user", format!("user-{}", i))
        .with("turns", i)
        .with("locale", "en-US")
}

fn storage_benchmarks(c: &mut Criterion) {
    let cancel = CancellationToken::new();

    c.bench_function("write_single_key", |b| {
        let (_temp, store) = open_store();
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            store
                .write_blocking([("session", session_doc(i))], &cancel)
                .unwrap();
        });
    });

    c.bench_function("read_single_key", |b| {
        let (_temp, store) = open_store();
        store
            .write_blocking([("session", session_doc(1))], &cancel)
            .unwrap();
        b.iter(|| black_box(store.read_blocking(["session"], &cancel).unwrap()));
    });

    c.bench_function("write_batch_16", |b| {
        let (_temp, store) = open_store();
        b.iter(|| {
            let changes: Vec<(String, Document)> = (0..16)
                .map(|i| (format!("conv/{}", i), session_doc(i)))
                .collect();
            store.write_blocking(changes, &cancel).unwrap();
        });
    });

    c.bench_function("conditional_write", |b| {
        let (_temp, store) = open_store();
        store
            .write_blocking([("session", session_doc(0))], &cancel)
            .unwrap();
        b.iter(|| {
            let current = store
                .read_blocking(["session"], &cancel)
                .unwrap()
                .remove("session")
                .unwrap();
            store
                .write_blocking([("session", current.with("touched", true))], &cancel)
                .unwrap();
        });
    });
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
