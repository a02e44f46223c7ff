use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use packet_bridge::core::codec::{decode, encode};
use packet_bridge::core::format::{parse, FormatCache};
use packet_bridge::core::framing::EnvelopeCodec;
use packet_bridge::core::packet::{RawPacket, SessionId};
use packet_bridge::core::value::Value;
use tokio_util::codec::{Decoder, Encoder};

fn sample(len: usize) -> Vec<(&'static str, Vec<Value>)> {
    vec![
        ("scalars", vec![Value::I32(7), Value::F64(1.5), Value::Str("player".into())]),
        ("seq_i", vec![Value::from((0..len as i32).collect::<Vec<_>>())]),
        (
            "map_i_S",
            vec![Value::map((0..len as i32).map(|i| (i, format!("name-{i}"))))],
        ),
    ]
}

fn spec_for(name: &str) -> &'static str {
    match name {
        "scalars" => "idS",
        "seq_i" => "[i]",
        _ => "{i:S}",
    }
}

#[allow(clippy::unwrap_used)]
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_encode_decode");

    for &len in &[16usize, 256, 4096] {
        for (name, values) in sample(len) {
            let descriptors = parse(spec_for(name)).unwrap();
            let bytes = encode(&descriptors, &values).unwrap();
            group.throughput(Throughput::Bytes(bytes.len() as u64));

            group.bench_function(format!("encode_{name}_{len}"), |b| {
                b.iter(|| encode(&descriptors, &values).unwrap())
            });
            group.bench_function(format!("decode_{name}_{len}"), |b| {
                b.iter(|| {
                    let (decoded, consumed) = decode(&descriptors, &bytes).unwrap();
                    assert_eq!(consumed, bytes.len());
                    decoded
                })
            });
        }
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_format_cache(c: &mut Criterion) {
    let cache = FormatCache::new();
    c.bench_function("format_cache_hit", |b| {
        b.iter(|| cache.get_or_parse("b(hH)[{L:d}]S").unwrap())
    });
    c.bench_function("format_parse_uncached", |b| {
        b.iter(|| parse("b(hH)[{L:d}]S").unwrap())
    });
}

#[allow(clippy::unwrap_used)]
fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_frame");

    for &size in &[64usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || RawPacket::from_wire(1, SessionId(1), 0, vec![0u8; size]),
                |packet| {
                    let mut buf = BytesMut::with_capacity(size + 16);
                    EnvelopeCodec::new(SessionId(1)).encode(packet, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("decode_{size}b"), |b| {
            let mut frame = BytesMut::new();
            EnvelopeCodec::new(SessionId(1))
                .encode(RawPacket::from_wire(1, SessionId(1), 0, vec![0u8; size]), &mut frame)
                .unwrap();
            b.iter_batched(
                || frame.clone(),
                |mut buf| {
                    let packet = EnvelopeCodec::new(SessionId(1)).decode(&mut buf).unwrap();
                    assert!(packet.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_format_cache, bench_envelope);
criterion_main!(benches);
