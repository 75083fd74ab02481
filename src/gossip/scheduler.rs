//! Gossip & failure-detection scheduler
//!
//! One call to [`GossipScheduler::run_round`] is one protocol round: bump our
//! own heartbeat, ping one random peer with one random piggybacked member, and
//! sweep the table for silent peers. Failure is inferred purely from silence;
//! there are no per-request timers.
use std::collections::HashSet;

use rand::Rng;
use tracing::{debug, info};

use super::engine::{Effects, Outbound};
use super::messages::{GossipEntry, Message};
use crate::audit::AuditEvent;
use crate::membership::MembershipTable;
use crate::node::NodeId;
use crate::settings::ProtocolConfig;

/// Upper bound on redraws when the gossip draw collides with the target
const MAX_GOSSIP_DRAWS: usize = 3;

/// Owns the node's logical clock and its own heartbeat counter
#[derive(Debug, Clone)]
pub struct GossipScheduler {
    local: NodeId,
    tfail: u64,
    tremove: u64,
    min_peers_for_ping: usize,
    now: u64,
    heartbeat: u64,
    rounds: u64,
}

impl GossipScheduler {
    pub fn new(local: NodeId, config: &ProtocolConfig) -> Self {
        Self {
            local,
            tfail: config.tfail,
            tremove: config.tremove,
            min_peers_for_ping: config.min_peers_for_ping,
            now: 0,
            heartbeat: 0,
            rounds: 0,
        }
    }

    /// Current tick
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Our own heartbeat; never decreases
    pub fn heartbeat(&self) -> u64 {
        self.heartbeat
    }

    /// Rounds run since the node became a member
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Advance the logical clock by one tick
    pub fn advance_clock(&mut self) -> u64 {
        self.now += 1;
        self.now
    }

    /// Run one gossip and failure-detection round against `table`
    pub fn run_round<R: Rng + ?Sized>(
        &mut self,
        table: &mut MembershipTable,
        rng: &mut R,
    ) -> Effects {
        self.heartbeat += 1;
        self.rounds += 1;
        let mut effects = Effects::default();

        if table.size() >= self.min_peers_for_ping.max(1) {
            if let Some(outbound) = self.build_ping(table, rng) {
                effects.outbound.push(outbound);
            }
        }

        let sweep = table.mark_stale_and_evict(self.now, self.tfail, self.tremove);
        for id in sweep.removed {
            info!("[{}] Removing {} after {} silent ticks", self.local, id, self.tremove);
            effects.events.push(AuditEvent::NodeRemove(id));
        }
        for id in sweep.suspected {
            debug!("[{}] Suspecting {} at tick {}", self.local, id, self.now);
            effects.events.push(AuditEvent::NodeSuspect(id));
        }

        effects
    }

    fn build_ping<R: Rng + ?Sized>(
        &self,
        table: &MembershipTable,
        rng: &mut R,
    ) -> Option<Outbound> {
        let mut excluding: HashSet<NodeId> = [self.local].into_iter().collect();
        let target = table.sample(1, &excluding, rng).pop()?;
        excluding.insert(target.id);

        let mut gossip = None;
        for _ in 0..MAX_GOSSIP_DRAWS {
            match table.sample(1, &excluding, rng).pop() {
                Some(entry) if entry.id != target.id => {
                    gossip = Some(GossipEntry::from(&entry));
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }

        debug!(
            "[{}] Round {}: ping {} (gossip {:?})",
            self.local,
            self.rounds,
            target.id,
            gossip.map(|g| g.id.to_string())
        );
        Some(Outbound {
            to: target.id,
            message: Message::Ping {
                sender: self.local,
                heartbeat: self.heartbeat,
                gossip,
            },
        })
    }
}
