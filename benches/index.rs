use criterion::{criterion_group, criterion_main, Criterion};
use lsm_core::{Config, SearchPredicate};
use rand::Rng;

fn insert(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();

    let index = Config::new(&dir).durable(false).open().unwrap();
    index.create().unwrap();
    index.activate().unwrap();

    let mut i = 0_u64;

    c.bench_function("insert", |b| {
        b.iter(|| {
            index.insert(i.to_be_bytes(), "value").unwrap();
            i += 1;
        });
    });
}

fn point_read(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();

    let index = Config::new(&dir).durable(false).open().unwrap();
    index.create().unwrap();
    index.activate().unwrap();

    for round in 0..4_u64 {
        for i in 0..10_000_u64 {
            index
                .insert((round * 10_000 + i).to_be_bytes(), "value")
                .unwrap();
        }
        index.flush_memory_component().unwrap();
    }

    c.bench_function("point read (4 disk components)", |b| {
        let mut rng = rand::rng();

        b.iter(|| {
            let key = rng.random_range(0..40_000_u64);
            assert!(index.get(key.to_be_bytes()).unwrap().is_some());
        });
    });

    c.bench_function("full search (4 disk components)", |b| {
        b.iter(|| {
            assert_eq!(40_000, index.search(&SearchPredicate::all()).unwrap().len());
        });
    });
}

criterion_group!(benches, insert, point_read);
criterion_main!(benches);
