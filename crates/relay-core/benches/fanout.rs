//! Fan-out and dispatch benchmarks for the relay.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use relay_core::{ConnectionId, Relay};
use relay_protocol::{Envelope, Event};
use relay_transport::{memory, ConnectionMetadata};
use serde_json::json;
use tokio::runtime::Runtime;

/// Register `members` connections in `room`, draining their peers in the
/// background so outbound queues stay short.
fn populate(rt: &Runtime, relay: &Relay, room: &str, members: usize) -> Vec<ConnectionId> {
    let _guard = rt.enter();
    let join = format!(r#"{{"type":"join","room":"{room}"}}"#);

    (0..members)
        .map(|_| {
            let (sink, _stream, mut peer) = memory::channel();
            let id = relay.register(sink, ConnectionMetadata::default());
            relay.dispatcher().dispatch(&id, join.as_bytes());
            rt.spawn(async move { while peer.recv().await.is_some() {} });
            id
        })
        .collect()
}

fn bench_room_fanout(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("room_fanout");

    for members in [1usize, 100, 1000] {
        let relay = Relay::new();
        populate(&rt, &relay, "bench", members);
        let envelope = Envelope::new(Event::Broadcast {
            data: json!({"text": "hello", "seq": 1}),
        });

        group.throughput(Throughput::Elements(members as u64));
        group.bench_with_input(BenchmarkId::from_parameter(members), &members, |b, _| {
            b.iter(|| {
                relay
                    .broadcaster()
                    .to_room(black_box("bench"), envelope.clone(), None)
            });
        });
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let relay = Relay::new();
    let ids = populate(&rt, &relay, "bench", 10);
    let sender = &ids[0];

    let mut group = c.benchmark_group("dispatch");

    group.bench_function("ping", |b| {
        b.iter(|| relay.dispatcher().dispatch(sender, black_box(br#"{"type":"ping"}"#)));
    });

    let broadcast = br#"{"type":"broadcast","room":"bench","data":{"text":"hello"}}"#;
    group.bench_function("broadcast_10", |b| {
        b.iter(|| relay.dispatcher().dispatch(sender, black_box(broadcast)));
    });

    group.bench_function("malformed", |b| {
        b.iter(|| relay.dispatcher().dispatch(sender, black_box(b"not json")));
    });

    group.finish();
}

criterion_group!(benches, bench_room_fanout, bench_dispatch);
criterion_main!(benches);
