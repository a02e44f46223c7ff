use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use packet_bridge::core::format::FormatCache;
use packet_bridge::core::packet::Packet;
use packet_bridge::core::value::{fields, Value};
use packet_bridge::error::CodecError;
use packet_bridge::protocol::{PacketData, Registry};
use packet_bridge::service::Service;
use packet_bridge::transport::MemoryTransport;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq)]
struct Tick {
    seq: u64,
    tags: Vec<String>,
}

impl PacketData for Tick {
    const FORMAT: &'static str = "L[S]";

    fn to_values(&self) -> Vec<Value> {
        vec![self.seq.into(), self.tags.clone().into()]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, CodecError> {
        let [seq, tags] = fields(values)?;
        Ok(Tick {
            seq: seq.as_u64()?,
            tags: tags
                .into_seq()?
                .into_iter()
                .map(Value::into_string)
                .collect::<Result<_, _>>()?,
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_format_cache_shared_across_tasks() {
    let cache = FormatCache::new();
    let specs = ["i", "iS", "[i]", "{i:S}", "(bL)[d]", "L[S]"];

    let mut tasks = JoinSet::new();
    for worker in 0..16usize {
        let cache = cache.clone();
        tasks.spawn(async move {
            for i in 0..2_000usize {
                let spec = specs[(worker + i) % specs.len()];
                let descriptors = cache.get_or_parse(spec).unwrap();
                assert!(!descriptors.is_empty());
            }
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }
    assert_eq!(cache.len(), specs.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn independent_services_on_separate_tasks() {
    let services = 8usize;
    let packets = 500u64;
    let handled = Arc::new(AtomicUsize::new(0));

    let mut tasks = JoinSet::new();
    for index in 0..services {
        let handled = Arc::clone(&handled);
        tasks.spawn(async move {
            let mut registry = Registry::new();
            registry
                .register::<Tick, _>(1, move |_ctx, packet: Packet<Tick>| {
                    handled.fetch_add(1, Ordering::Relaxed);
                    assert_eq!(packet.payload.tags.len(), 2);
                    Ok(None)
                })
                .unwrap();

            let mut service = Service::new(format!("svc-{index}"), registry, MemoryTransport::new());
            service.start().unwrap();
            let port = 7000 + index as u16;
            service.listen("127.0.0.1", port).unwrap();
            let client = service.connect("127.0.0.1", port).unwrap();
            service.drain_events();

            for seq in 0..packets {
                let tick = Tick {
                    seq,
                    tags: vec![format!("svc-{index}"), seq.to_string()],
                };
                service.send(client, &tick).unwrap();
            }
            assert_eq!(service.drain_events(), packets as usize);

            let snapshot = service.metrics().snapshot();
            assert_eq!(snapshot.packets_handled, packets);
            assert_eq!(snapshot.total_failures(), 0);
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }
    assert_eq!(handled.load(Ordering::Relaxed), services * packets as usize);
}
