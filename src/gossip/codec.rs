//! Wire codec for membership messages
//!
//! Every multi-byte integer is written in network byte order (big-endian),
//! which is what the plain `Buf`/`BufMut` accessors use.
//!
//! ```text
//! header  = tag:u8 | sender:addr[4] port:u16 | sender_heartbeat:u64
//! JOINREQ = header
//! JOINREP = header | count:u64 | count x (addr[4] port:u16 heartbeat:u64)
//! PING    = header | has_gossip:u8 [| addr[4] port:u16 heartbeat:u64 status:u8]
//! PONG    = same layout as PING
//! ```
use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::messages::{GossipEntry, Message, MessageType, SnapshotEntry};
use crate::error::MalformedMessage;
use crate::membership::MemberStatus;
use crate::node::NodeId;

/// tag + sender id + sender heartbeat
pub const HEADER_SIZE: usize = 1 + NodeId::WIRE_SIZE + 8;
/// JOINREP element count
pub const COUNT_SIZE: usize = 8;
/// id + heartbeat
pub const SNAPSHOT_ENTRY_SIZE: usize = NodeId::WIRE_SIZE + 8;
/// id + heartbeat + status
pub const GOSSIP_ENTRY_SIZE: usize = NodeId::WIRE_SIZE + 8 + 1;
/// Largest payload a single UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

const STATUS_ALIVE: u8 = 0;
const STATUS_SUSPECT: u8 = 1;
const NO_GOSSIP: u8 = 0;
const HAS_GOSSIP: u8 = 1;

/// Exact encoded size of a message
pub fn encoded_len(msg: &Message) -> usize {
    match msg {
        Message::JoinReq { .. } => HEADER_SIZE,
        Message::JoinRep { members, .. } => {
            HEADER_SIZE + COUNT_SIZE + members.len() * SNAPSHOT_ENTRY_SIZE
        }
        Message::Ping { gossip, .. } | Message::Pong { gossip, .. } => {
            HEADER_SIZE + 1 + gossip.map_or(0, |_| GOSSIP_ENTRY_SIZE)
        }
    }
}

/// Encode a message into its wire representation
pub fn encode(msg: &Message) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(msg));
    buf.put_u8(msg.message_type().tag());
    put_node_id(&mut buf, msg.sender());
    buf.put_u64(msg.sender_heartbeat());

    match msg {
        Message::JoinReq { .. } => {}
        Message::JoinRep { members, .. } => {
            buf.put_u64(members.len() as u64);
            for entry in members {
                put_node_id(&mut buf, entry.id);
                buf.put_u64(entry.heartbeat);
            }
        }
        Message::Ping { gossip, .. } | Message::Pong { gossip, .. } => match gossip {
            Some(entry) => {
                buf.put_u8(HAS_GOSSIP);
                put_node_id(&mut buf, entry.id);
                buf.put_u64(entry.heartbeat);
                buf.put_u8(status_to_wire(entry.status));
            }
            None => buf.put_u8(NO_GOSSIP),
        },
    }

    buf.freeze()
}

/// Decode a message, rejecting anything whose length or fields do not match
/// the layout exactly
pub fn decode(data: &[u8]) -> Result<Message, MalformedMessage> {
    let total = data.len();
    let Some(&tag) = data.first() else {
        return Err(MalformedMessage::Truncated {
            needed: HEADER_SIZE,
            available: 0,
        });
    };
    let kind = MessageType::from_tag(tag).ok_or(MalformedMessage::UnknownMessageType(tag))?;
    ensure_remaining(data, HEADER_SIZE, total)?;

    let mut buf = &data[1..];
    let sender = get_node_id(&mut buf);
    if sender.is_null() {
        return Err(MalformedMessage::NullSender);
    }
    let heartbeat = buf.get_u64();

    let msg = match kind {
        MessageType::JoinReq => Message::JoinReq { sender, heartbeat },
        MessageType::JoinRep => {
            ensure_remaining(buf, COUNT_SIZE, total)?;
            let declared = buf.get_u64();
            let expected = usize::try_from(declared)
                .ok()
                .and_then(|n| n.checked_mul(SNAPSHOT_ENTRY_SIZE))
                .and_then(|n| n.checked_add(HEADER_SIZE + COUNT_SIZE))
                .unwrap_or(usize::MAX);
            if expected != total {
                return Err(MalformedMessage::LengthMismatch {
                    declared,
                    expected,
                    actual: total,
                });
            }
            let mut members = Vec::with_capacity(declared as usize);
            for _ in 0..declared {
                let id = get_node_id(&mut buf);
                let heartbeat = buf.get_u64();
                members.push(SnapshotEntry { id, heartbeat });
            }
            Message::JoinRep {
                sender,
                heartbeat,
                members,
            }
        }
        MessageType::Ping | MessageType::Pong => {
            ensure_remaining(buf, 1, total)?;
            let gossip = match buf.get_u8() {
                NO_GOSSIP => None,
                HAS_GOSSIP => {
                    ensure_remaining(buf, GOSSIP_ENTRY_SIZE, total)?;
                    let id = get_node_id(&mut buf);
                    let heartbeat = buf.get_u64();
                    let status = status_from_wire(buf.get_u8())?;
                    Some(GossipEntry {
                        id,
                        heartbeat,
                        status,
                    })
                }
                flag => return Err(MalformedMessage::InvalidGossipFlag(flag)),
            };
            if kind == MessageType::Ping {
                Message::Ping {
                    sender,
                    heartbeat,
                    gossip,
                }
            } else {
                Message::Pong {
                    sender,
                    heartbeat,
                    gossip,
                }
            }
        }
    };

    if buf.has_remaining() {
        return Err(MalformedMessage::TrailingBytes(buf.remaining()));
    }
    Ok(msg)
}

fn ensure_remaining(buf: &[u8], needed: usize, total: usize) -> Result<(), MalformedMessage> {
    if buf.len() < needed {
        return Err(MalformedMessage::Truncated {
            needed: total - buf.len() + needed,
            available: total,
        });
    }
    Ok(())
}

fn put_node_id(buf: &mut BytesMut, id: NodeId) {
    buf.put_slice(&id.addr());
    buf.put_u16(id.port());
}

fn get_node_id(buf: &mut &[u8]) -> NodeId {
    let mut addr = [0u8; 4];
    buf.copy_to_slice(&mut addr);
    let port = buf.get_u16();
    NodeId::new(addr, port)
}

fn status_to_wire(status: MemberStatus) -> u8 {
    match status {
        MemberStatus::Alive => STATUS_ALIVE,
        MemberStatus::Suspect => STATUS_SUSPECT,
    }
}

fn status_from_wire(byte: u8) -> Result<MemberStatus, MalformedMessage> {
    match byte {
        STATUS_ALIVE => Ok(MemberStatus::Alive),
        STATUS_SUSPECT => Ok(MemberStatus::Suspect),
        other => Err(MalformedMessage::InvalidStatus(other)),
    }
}
