use cf_ppu::decoder;
use cf_ppu::Instruction;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const WORDS: [u32; 8] = [
    0x7C642A14, // add
    0x38630001, // addi
    0x4E800020, // blr
    0x48000011, // bl
    0xFC22182A, // fadd
    0x10221880, // vadduwm
    0x80640008, // lwz
    0x5483463E, // rlwinm
];

fn bench_decoder(c: &mut Criterion) {
    decoder::init_tables();

    c.bench_function("decode", |b| {
        b.iter(|| {
            for word in WORDS {
                black_box(decoder::decode(Instruction(black_box(word))));
            }
        })
    });

    c.bench_function("mnemonic", |b| b.iter(|| decoder::mnemonic(black_box(0x7C642A14))));
}

criterion_group!(benches, bench_decoder);
criterion_main!(benches);
