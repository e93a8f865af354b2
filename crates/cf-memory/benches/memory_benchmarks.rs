use cf_memory::MemoryManager;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_accessors(c: &mut Criterion) {
    let mem = MemoryManager::new().expect("reserve guest memory");

    c.bench_function("read_be32", |b| {
        b.iter(|| mem.read_be32(black_box(0x1_0000)).unwrap())
    });

    c.bench_function("write_be64", |b| {
        b.iter(|| mem.write_be64(black_box(0x1_0008), black_box(0x0123_4567_89AB_CDEF)).unwrap())
    });

    c.bench_function("fetch", |b| b.iter(|| mem.fetch(black_box(0x1_0000)).unwrap()));
}

criterion_group!(benches, bench_accessors);
criterion_main!(benches);
