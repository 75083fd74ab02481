use std::collections::HashSet;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use gossamer::gossip::codec;
use gossamer::gossip::{Message, SnapshotEntry};
use gossamer::membership::MembershipTable;
use gossamer::node::NodeId;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn peer(n: u32) -> NodeId {
    NodeId::new((n + 2).to_le_bytes(), 0)
}

fn full_table(size: u32) -> MembershipTable {
    let mut table = MembershipTable::new(NodeId::new([1, 0, 0, 0], 0));
    for n in 0..size {
        table.upsert(peer(n), n as u64, 0);
    }
    table
}

fn benchmark_join_reply_codec(c: &mut Criterion) {
    let reply = Message::JoinRep {
        sender: peer(0),
        heartbeat: 42,
        members: full_table(100)
            .snapshot()
            .iter()
            .map(SnapshotEntry::from)
            .collect(),
    };
    let encoded = codec::encode(&reply);

    c.bench_function("join_reply_encode_100", |b| {
        b.iter(|| black_box(codec::encode(black_box(&reply))))
    });
    c.bench_function("join_reply_decode_100", |b| {
        b.iter(|| black_box(codec::decode(black_box(&encoded))))
    });
}

fn benchmark_table_upsert(c: &mut Criterion) {
    c.bench_function("table_upsert_refresh", |b| {
        let mut table = full_table(100);
        let mut heartbeat = 100u64;
        b.iter(|| {
            heartbeat += 1;
            black_box(table.upsert(peer((heartbeat % 100) as u32), heartbeat, heartbeat))
        })
    });
}

fn benchmark_table_sample(c: &mut Criterion) {
    let table = full_table(100);
    let excluding: HashSet<NodeId> = [peer(0)].into_iter().collect();
    let mut rng = StdRng::seed_from_u64(0);

    c.bench_function("table_sample_one_of_100", |b| {
        b.iter(|| black_box(table.sample(1, &excluding, &mut rng)))
    });
}

fn benchmark_sweep(c: &mut Criterion) {
    c.bench_function("table_sweep_100", |b| {
        let mut table = full_table(100);
        b.iter(|| black_box(table.mark_stale_and_evict(3, 5, 20)))
    });
}

criterion_group!(
    benches,
    benchmark_join_reply_codec,
    benchmark_table_upsert,
    benchmark_table_sample,
    benchmark_sweep
);
criterion_main!(benches);
