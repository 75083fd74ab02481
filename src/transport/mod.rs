//! Transport Module
//!
//! Moves encoded membership messages between nodes. Delivery is best-effort,
//! unordered and may drop; inbound buffers are queued per node and drained
//! once per tick. Two implementations are provided: an in-process network for
//! simulations and tests, and a UDP socket for real clusters.

pub mod memory;
pub mod udp;

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::node::NodeId;
pub use memory::InMemoryNetwork;
pub use udp::UdpTransport;

/// Per-node queue of inbound message buffers
pub type Inbox = mpsc::UnboundedReceiver<Bytes>;

/// Trait for moving bytes between cluster nodes
pub trait Transport: Send + Sync {
    /// Fire-and-forget send. An `Ok` only means the bytes were handed off.
    fn send(&self, from: NodeId, to: NodeId, data: Bytes) -> Result<()>;

    /// Register `local` and return the queue its inbound messages land in
    fn register_receiver(&self, local: NodeId) -> Result<Inbox>;

    /// Counters for monitoring
    fn stats(&self) -> TransportStatsSnapshot;
}

/// Transport statistics
#[derive(Debug, Default)]
pub struct TransportStats {
    pub messages_sent: AtomicU64,
    pub messages_delivered: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub send_errors: AtomicU64,
    pub receive_errors: AtomicU64,
}

impl TransportStats {
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TransportStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransportStatsSnapshot {
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub send_errors: u64,
    pub receive_errors: u64,
}
