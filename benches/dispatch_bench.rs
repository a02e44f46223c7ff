use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use packet_bridge::core::format::FormatCache;
use packet_bridge::core::packet::{Packet, RawPacket, SessionId};
use packet_bridge::core::value::{fields, Value};
use packet_bridge::error::CodecError;
use packet_bridge::protocol::{Dispatcher, PacketData, Registry, ServiceEvent};
use packet_bridge::transport::MemoryTransport;

struct Move {
    x: i32,
    y: i32,
    path: Vec<Value>,
}

impl PacketData for Move {
    const FORMAT: &'static str = "ii[(ii)]";

    fn to_values(&self) -> Vec<Value> {
        vec![self.x.into(), self.y.into(), Value::Seq(self.path.clone())]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, CodecError> {
        let [x, y, path] = fields(values)?;
        Ok(Move {
            x: x.as_i32()?,
            y: y.as_i32()?,
            path: path.into_seq()?,
        })
    }
}

#[allow(clippy::unwrap_used)]
fn started(registry: Registry) -> (Dispatcher, MemoryTransport) {
    let mut dispatcher = Dispatcher::new("bench", registry);
    let mut transport = MemoryTransport::new();
    dispatcher
        .dispatch(&mut transport, ServiceEvent::Initialize)
        .unwrap();
    dispatcher.dispatch(&mut transport, ServiceEvent::Start).unwrap();
    (dispatcher, transport)
}

#[allow(clippy::unwrap_used)]
fn bench_dispatch(c: &mut Criterion) {
    let mut registry = Registry::new();
    registry
        .register::<Move, _>(20, |_ctx, packet: Packet<Move>| {
            assert!(packet.payload.x <= packet.payload.y);
            Ok(None)
        })
        .unwrap();
    let (mut dispatcher, mut transport) = started(registry);

    let mut group = c.benchmark_group("dispatch_packet");
    for &steps in &[1usize, 32, 512] {
        let path = (0..steps as i32)
            .map(|i| Value::Tuple(vec![i.into(), (i * 2).into()]))
            .collect::<Vec<_>>();
        let payload = FormatCache::new()
            .pack(Move::FORMAT, &[1i32.into(), 2i32.into(), Value::Seq(path)])
            .unwrap();
        group.throughput(Throughput::Bytes(payload.len() as u64));

        group.bench_function(format!("handled_{steps}_steps"), |b| {
            b.iter_batched(
                || {
                    ServiceEvent::PacketReceived(RawPacket::from_wire(
                        20,
                        SessionId(1),
                        0,
                        payload.clone(),
                    ))
                },
                |event| dispatcher.dispatch(&mut transport, event).unwrap(),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();

    c.bench_function("dispatch_unhandled", |b| {
        b.iter_batched(
            || ServiceEvent::PacketReceived(RawPacket::from_wire(99, SessionId(1), 0, Vec::new())),
            |event| dispatcher.dispatch(&mut transport, event).unwrap(),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("dispatch_update", |b| {
        b.iter(|| dispatcher.dispatch(&mut transport, ServiceEvent::Update).unwrap())
    });
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
