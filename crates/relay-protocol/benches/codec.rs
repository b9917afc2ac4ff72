//! Codec benchmarks for relay-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use relay_protocol::{codec, ControlMessage, Identity};

fn bench_tag_small(c: &mut Criterion) {
    let mut payload = b"chat||".to_vec();
    payload.extend_from_slice(&[b'x'; 58]);

    let mut group = c.benchmark_group("tag");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("small_64B", |b| b.iter(|| codec::tag_of(black_box(&payload))));
    group.finish();
}

fn bench_tag_untagged(c: &mut Criterion) {
    let payload = vec![b'x'; 4096];

    let mut group = c.benchmark_group("tag");
    group.throughput(Throughput::Bytes(4096));
    group.bench_function("untagged_4KB", |b| {
        b.iter(|| codec::tag_of(black_box(&payload)))
    });
    group.finish();
}

fn bench_control(c: &mut Criterion) {
    let msg = ControlMessage::disconnect(Identity::new(42));

    c.bench_function("control_encode_parse", |b| {
        b.iter(|| {
            let encoded = black_box(&msg).encode();
            ControlMessage::parse(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(benches, bench_tag_small, bench_tag_untagged, bench_control);
criterion_main!(benches);
