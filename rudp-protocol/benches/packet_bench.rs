use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rudp_protocol::packet::{self, Delivery, PacketHeader};
use rudp_protocol::{AckBitfield, RemoteSeq, RetransmitBuffer, SeqNumber, SequenceTracker};
use bytes::Bytes;
use std::time::Instant;

fn header() -> PacketHeader {
    PacketHeader::new(
        Delivery::Reliable(SeqNumber::new(1000)),
        RemoteSeq::Seen(SeqNumber::new(900)),
        AckBitfield::from_bits(0xDEAD_BEEF),
    )
}

fn bench_packet_encode(c: &mut Criterion) {
    let header = header();
    let payload = vec![0u8; 1200]; // Typical game-state payload

    let mut group = c.benchmark_group("packet");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("encode", |b| {
        b.iter(|| {
            let bytes = packet::encode(black_box(&header), black_box(&payload));
            black_box(bytes);
        });
    });
    group.finish();
}

fn bench_packet_decode(c: &mut Criterion) {
    let bytes = packet::encode(&header(), &[0u8; 1200]);
    let mut out = vec![0u8; 1500];

    c.bench_function("packet_decode_into", |b| {
        b.iter(|| {
            let decoded = packet::decode_into(black_box(&bytes), &mut out).unwrap();
            black_box(decoded);
        });
    });
}

fn bench_tracker_update(c: &mut Criterion) {
    c.bench_function("tracker_update_in_order", |b| {
        let mut tracker = SequenceTracker::new();
        let mut seq = SeqNumber::new(0);
        b.iter(|| {
            seq.increment();
            black_box(tracker.update(black_box(seq)));
        });
    });
}

fn bench_process_ack(c: &mut Criterion) {
    let now = Instant::now();
    let frame = Bytes::from(vec![0u8; 64]);

    c.bench_function("process_ack_32_in_flight", |bencher| {
        bencher.iter(|| {
            let mut buffer = RetransmitBuffer::default();
            for seq in 0..32 {
                buffer.record(SeqNumber::new(seq), frame.clone(), now);
            }
            let report = buffer.process_ack(
                RemoteSeq::Seen(SeqNumber::new(31)),
                AckBitfield::from_bits(u32::MAX),
                now,
            );
            black_box(report);
        });
    });
}

criterion_group!(
    benches,
    bench_packet_encode,
    bench_packet_decode,
    bench_tracker_update,
    bench_process_ack
);
criterion_main!(benches);
