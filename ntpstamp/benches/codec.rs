use criterion::{criterion_group, criterion_main, Criterion};
use ntpstamp::{
    calculate, from_ntp_fraction, to_ntp_fraction, LocalTimestamp, NtpPacket, NtpTimestamp,
    Units,
};
use std::hint::black_box;

fn codec_benchmark(c: &mut Criterion) {
    let mut packet = NtpPacket::client_request();
    packet.receive_timestamp = NtpTimestamp::from_parts(3_900_000_000, 0x8000_0000);
    packet.transmit_timestamp = NtpTimestamp::from_parts(3_900_000_000, 0x8000_1000);
    let raw = packet.encode();

    c.bench_function("packet_encode", |b| {
        b.iter(|| black_box(black_box(&packet).encode()));
    });
    c.bench_function("packet_decode", |b| {
        b.iter(|| black_box(NtpPacket::decode(black_box(&raw.0))));
    });
}

fn epoch_benchmark(c: &mut Criterion) {
    let local = LocalTimestamp::new(1_700_000_000, 123_456, Units::Microseconds);

    c.bench_function("fraction_roundtrip", |b| {
        b.iter(|| {
            let ntp = to_ntp_fraction(black_box(123_456), Units::Microseconds);
            black_box(from_ntp_fraction(ntp, Units::Microseconds))
        });
    });
    c.bench_function("timestamp_from_local", |b| {
        b.iter(|| black_box(NtpTimestamp::from_local(black_box(local))));
    });
}

fn calculator_benchmark(c: &mut Criterion) {
    let t1 = NtpTimestamp::from_parts(3_900_000_000, 0);
    let t2 = NtpTimestamp::from_parts(3_900_000_000, 0x1999_9999);
    let t3 = NtpTimestamp::from_parts(3_900_000_000, 0x3333_3333);
    let t4 = NtpTimestamp::from_parts(3_900_000_000, 0x4ccc_cccc);

    c.bench_function("offset_delay_calculate", |b| {
        b.iter(|| {
            black_box(calculate(
                black_box(t1),
                black_box(t2),
                black_box(t3),
                black_box(t4),
            ))
        });
    });
}

criterion_group!(
    codec_benches,
    codec_benchmark,
    epoch_benchmark,
    calculator_benchmark
);
criterion_main!(codec_benches);
