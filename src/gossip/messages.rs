//! Membership Message Protocol
//!
//! Defines the four message types exchanged between nodes. Messages are plain
//! values; encoding to bytes lives in [`super::codec`].
use serde::{Deserialize, Serialize};

use crate::membership::{MemberEntry, MemberStatus};
use crate::node::NodeId;

/// Wire tag of each message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    JoinReq = 0,
    JoinRep = 1,
    Ping = 2,
    Pong = 3,
}

impl MessageType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(MessageType::JoinReq),
            1 => Some(MessageType::JoinRep),
            2 => Some(MessageType::Ping),
            3 => Some(MessageType::Pong),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::JoinReq => write!(f, "JOINREQ"),
            MessageType::JoinRep => write!(f, "JOINREP"),
            MessageType::Ping => write!(f, "PING"),
            MessageType::Pong => write!(f, "PONG"),
        }
    }
}

/// One member fact as carried in a JOINREP snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub id: NodeId,
    pub heartbeat: u64,
}

/// One member fact piggybacked on a PING or PONG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipEntry {
    pub id: NodeId,
    pub heartbeat: u64,
    pub status: MemberStatus,
}

impl From<&MemberEntry> for SnapshotEntry {
    fn from(entry: &MemberEntry) -> Self {
        SnapshotEntry {
            id: entry.id,
            heartbeat: entry.heartbeat,
        }
    }
}

impl From<&MemberEntry> for GossipEntry {
    fn from(entry: &MemberEntry) -> Self {
        GossipEntry {
            id: entry.id,
            heartbeat: entry.heartbeat,
            status: entry.status,
        }
    }
}

/// Membership protocol messages
///
/// Every message names its sender and the sender's own heartbeat at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A new node asking an existing member to admit it
    JoinReq { sender: NodeId, heartbeat: u64 },

    /// The admitting member's full table, including the joiner
    JoinRep {
        sender: NodeId,
        heartbeat: u64,
        members: Vec<SnapshotEntry>,
    },

    /// Periodic liveness check with at most one gossiped member
    Ping {
        sender: NodeId,
        heartbeat: u64,
        gossip: Option<GossipEntry>,
    },

    /// Reply to a PING with at most one gossiped member
    Pong {
        sender: NodeId,
        heartbeat: u64,
        gossip: Option<GossipEntry>,
    },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::JoinReq { .. } => MessageType::JoinReq,
            Message::JoinRep { .. } => MessageType::JoinRep,
            Message::Ping { .. } => MessageType::Ping,
            Message::Pong { .. } => MessageType::Pong,
        }
    }

    pub fn sender(&self) -> NodeId {
        match self {
            Message::JoinReq { sender, .. }
            | Message::JoinRep { sender, .. }
            | Message::Ping { sender, .. }
            | Message::Pong { sender, .. } => *sender,
        }
    }

    pub fn sender_heartbeat(&self) -> u64 {
        match self {
            Message::JoinReq { heartbeat, .. }
            | Message::JoinRep { heartbeat, .. }
            | Message::Ping { heartbeat, .. }
            | Message::Pong { heartbeat, .. } => *heartbeat,
        }
    }
}
