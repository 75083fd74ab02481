use std::collections::{HashMap, HashSet};

use gossamer::gossip::codec;
use gossamer::gossip::{GossipEntry, Message, SnapshotEntry};
use gossamer::membership::{MemberStatus, MembershipTable};
use gossamer::node::NodeId;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

const TFAIL: u64 = 5;
const TREMOVE: u64 = 20;

fn owner() -> NodeId {
    NodeId::new([1, 0, 0, 0], 0)
}

fn arb_node_id() -> impl Strategy<Value = NodeId> {
    (any::<[u8; 4]>(), any::<u16>())
        .prop_map(|(addr, port)| NodeId::new(addr, port))
        .prop_filter("null id is never a peer", |id| !id.is_null())
}

/// Small id space so sequences revisit the same members
fn arb_small_node_id() -> impl Strategy<Value = NodeId> {
    (0u8..8).prop_map(|n| NodeId::new([1, 0, 0, n], 0))
}

fn arb_status() -> impl Strategy<Value = MemberStatus> {
    prop_oneof![Just(MemberStatus::Alive), Just(MemberStatus::Suspect)]
}

fn arb_gossip() -> impl Strategy<Value = Option<GossipEntry>> {
    proptest::option::of((arb_node_id(), any::<u64>(), arb_status()).prop_map(
        |(id, heartbeat, status)| GossipEntry {
            id,
            heartbeat,
            status,
        },
    ))
}

fn arb_message() -> impl Strategy<Value = Message> {
    prop_oneof![
        (arb_node_id(), any::<u64>())
            .prop_map(|(sender, heartbeat)| Message::JoinReq { sender, heartbeat }),
        (
            arb_node_id(),
            any::<u64>(),
            proptest::collection::vec((arb_node_id(), any::<u64>()), 0..16)
        )
            .prop_map(|(sender, heartbeat, members)| Message::JoinRep {
                sender,
                heartbeat,
                members: members
                    .into_iter()
                    .map(|(id, heartbeat)| SnapshotEntry { id, heartbeat })
                    .collect(),
            }),
        (arb_node_id(), any::<u64>(), arb_gossip()).prop_map(|(sender, heartbeat, gossip)| {
            Message::Ping {
                sender,
                heartbeat,
                gossip,
            }
        }),
        (arb_node_id(), any::<u64>(), arb_gossip()).prop_map(|(sender, heartbeat, gossip)| {
            Message::Pong {
                sender,
                heartbeat,
                gossip,
            }
        }),
    ]
}

proptest! {
    #[test]
    fn test_stored_heartbeat_is_max_reported(
        reports in proptest::collection::vec((arb_small_node_id(), 0u64..50), 1..200)
    ) {
        let mut table = MembershipTable::new(owner());
        let mut highest: HashMap<NodeId, u64> = HashMap::new();

        for (now, (id, heartbeat)) in reports.into_iter().enumerate() {
            let before = table.get(&id).map(|e| e.heartbeat);
            table.upsert(id, heartbeat, now as u64);

            if id == owner() {
                prop_assert!(!table.contains(&id));
                continue;
            }
            let best = highest.entry(id).or_insert(heartbeat);
            *best = (*best).max(heartbeat);

            let stored = table.get(&id).map(|e| e.heartbeat);
            prop_assert_eq!(stored, Some(*best));
            if let Some(before) = before {
                prop_assert!(stored.unwrap_or(0) >= before);
            }
        }
    }

    #[test]
    fn test_table_keys_unique_and_exclude_owner(
        ids in proptest::collection::vec(arb_small_node_id(), 0..100)
    ) {
        let mut table = MembershipTable::new(owner());
        for (hb, id) in ids.iter().enumerate() {
            table.upsert(*id, hb as u64, 0);
        }
        let snapshot = table.snapshot();
        let distinct: HashSet<NodeId> = snapshot.iter().map(|e| e.id).collect();
        prop_assert_eq!(distinct.len(), snapshot.len());
        prop_assert!(!distinct.contains(&owner()));
        let expected: HashSet<NodeId> = ids.into_iter().filter(|id| *id != owner()).collect();
        prop_assert_eq!(distinct, expected);
    }

    #[test]
    fn test_suspect_at_tfail_and_remove_at_tremove(
        joined_at in proptest::collection::vec(0u64..30, 1..8)
    ) {
        let mut table = MembershipTable::new(owner());
        let ids: Vec<NodeId> = (0..joined_at.len())
            .map(|i| NodeId::new([10, 0, 0, i as u8], 1))
            .collect();
        let mut suspected_at = HashMap::new();
        let mut removed_at = HashMap::new();

        for now in 0..(30 + TREMOVE + 1) {
            for (id, at) in ids.iter().zip(&joined_at) {
                if *at == now {
                    table.upsert(*id, 0, now);
                }
            }
            let sweep = table.mark_stale_and_evict(now, TFAIL, TREMOVE);
            for id in sweep.suspected {
                suspected_at.insert(id, now);
            }
            for id in sweep.removed {
                removed_at.insert(id, now);
            }
        }

        for (id, at) in ids.iter().zip(&joined_at) {
            prop_assert_eq!(suspected_at.get(id), Some(&(at + TFAIL)));
            prop_assert_eq!(removed_at.get(id), Some(&(at + TREMOVE)));
        }
        prop_assert!(table.is_empty());
    }

    #[test]
    fn test_sample_respects_exclusions(
        ids in proptest::collection::hash_set(arb_small_node_id(), 0..8),
        excluded in proptest::collection::hash_set(arb_small_node_id(), 0..4),
        k in 0usize..10,
        seed in any::<u64>()
    ) {
        let mut table = MembershipTable::new(owner());
        for id in &ids {
            table.upsert(*id, 1, 0);
        }
        let eligible = table
            .snapshot()
            .iter()
            .filter(|e| !excluded.contains(&e.id))
            .count();

        let sample = table.sample(k, &excluded, &mut StdRng::seed_from_u64(seed));
        prop_assert_eq!(sample.len(), k.min(eligible));
        let distinct: HashSet<NodeId> = sample.iter().map(|e| e.id).collect();
        prop_assert_eq!(distinct.len(), sample.len());
        prop_assert!(distinct.is_disjoint(&excluded));
    }

    #[test]
    fn test_reapplying_gossip_is_idempotent(
        entries in proptest::collection::vec((arb_small_node_id(), 0u64..20), 1..20)
    ) {
        let mut table = MembershipTable::new(owner());
        for (id, heartbeat) in &entries {
            table.upsert(*id, *heartbeat, 3);
        }
        let once = table.snapshot();
        for (id, heartbeat) in &entries {
            table.upsert(*id, *heartbeat, 4);
        }
        prop_assert_eq!(table.snapshot(), once);
    }

    #[test]
    fn test_decode_inverts_encode(message in arb_message()) {
        let encoded = codec::encode(&message);
        prop_assert_eq!(encoded.len(), codec::encoded_len(&message));
        prop_assert_eq!(codec::decode(&encoded), Ok(message));
    }

    #[test]
    fn test_truncated_or_padded_messages_rejected(
        message in arb_message(),
        cut in any::<prop::sample::Index>(),
        extra in any::<u8>()
    ) {
        let encoded = codec::encode(&message);
        let prefix = &encoded[..cut.index(encoded.len())];
        prop_assert!(codec::decode(prefix).is_err());

        let mut padded = encoded.to_vec();
        padded.push(extra);
        prop_assert!(codec::decode(&padded).is_err());
    }
}
