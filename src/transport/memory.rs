//! In-process network
//!
//! Routes buffers between nodes living in the same process, optionally losing
//! a fraction of them. Used by simulations and tests in place of sockets.
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::trace;

use super::{Inbox, Transport, TransportStats, TransportStatsSnapshot};
use crate::error::Result;
use crate::node::NodeId;
use crate::{config_error, transport_error};

struct NetworkState {
    inboxes: HashMap<NodeId, mpsc::UnboundedSender<Bytes>>,
    rng: StdRng,
    drop_rate: f64,
}

/// Lossy in-memory message router
pub struct InMemoryNetwork {
    state: Mutex<NetworkState>,
    stats: TransportStats,
}

impl std::fmt::Debug for InMemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryNetwork")
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl Default for InMemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNetwork {
    /// A network that delivers everything
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NetworkState {
                inboxes: HashMap::new(),
                rng: StdRng::seed_from_u64(0),
                drop_rate: 0.0,
            }),
            stats: TransportStats::default(),
        }
    }

    /// A network that drops each message with probability `drop_rate`
    pub fn lossy(drop_rate: f64, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&drop_rate) {
            return Err(config_error!("drop rate must be in [0, 1), got {}", drop_rate));
        }
        let network = Self::new();
        {
            let mut state = network.lock()?;
            state.rng = StdRng::seed_from_u64(seed);
            state.drop_rate = drop_rate;
        }
        Ok(network)
    }

    /// Stop delivering to `id`; later sends to it are dropped
    pub fn disconnect(&self, id: NodeId) -> Result<()> {
        self.lock()?.inboxes.remove(&id);
        Ok(())
    }

    pub fn is_registered(&self, id: &NodeId) -> bool {
        self.lock()
            .map(|state| state.inboxes.contains_key(id))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, NetworkState>> {
        self.state
            .lock()
            .map_err(|e| transport_error!("network state lock poisoned: {}", e))
    }
}

impl Transport for InMemoryNetwork {
    fn send(&self, from: NodeId, to: NodeId, data: Bytes) -> Result<()> {
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock()?;

        let drop_rate = state.drop_rate;
        if drop_rate > 0.0 && state.rng.gen_bool(drop_rate) {
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Dropped {} bytes {} -> {}", data.len(), from, to);
            return Ok(());
        }

        let delivered = match state.inboxes.get(&to) {
            Some(inbox) => inbox.send(data).is_ok(),
            None => {
                self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                trace!("No route {} -> {}", from, to);
                return Ok(());
            }
        };
        if delivered {
            self.stats.messages_delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            // receiver half is gone
            state.inboxes.remove(&to);
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn register_receiver(&self, local: NodeId) -> Result<Inbox> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock()?;
        if state.inboxes.contains_key(&local) {
            return Err(transport_error!("{} is already registered", local));
        }
        state.inboxes.insert(local, tx);
        Ok(rx)
    }

    fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }
}
