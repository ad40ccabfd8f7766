use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pal_drivers::{FramedByteBuffer, DEFAULT_BUFFER_SIZE};

fn push_and_drain(c: &mut Criterion) {
    let buffer = FramedByteBuffer::<DEFAULT_BUFFER_SIZE>::new();
    let mut out = [0u8; DEFAULT_BUFFER_SIZE];

    let mut group = c.benchmark_group("receive_path");
    group.throughput(Throughput::Bytes(DEFAULT_BUFFER_SIZE as u64));

    group.bench_function("push_byte then drain", |b| {
        b.iter(|| {
            for byte in 0..DEFAULT_BUFFER_SIZE {
                buffer.push_byte(black_box(byte as u8));
            }
            black_box(buffer.drain(&mut out))
        })
    });

    group.finish();
}

fn delimiter_scan(c: &mut Criterion) {
    let buffer = FramedByteBuffer::<DEFAULT_BUFFER_SIZE>::new();
    for _ in 0..DEFAULT_BUFFER_SIZE - 1 {
        buffer.push_byte(b'x');
    }
    buffer.push_byte(b'\n');

    c.bench_function("find_delimiter worst case", |b| {
        b.iter(|| buffer.find_delimiter(black_box(b'\n')))
    });
}

criterion_group!(benches, push_and_drain, delimiter_scan);
criterion_main!(benches);
