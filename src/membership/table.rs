use std::collections::{BTreeMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::node::NodeId;

/// Liveness of a remote member as observed locally. A dead member is simply
/// absent from the table.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum MemberStatus {
    Alive,
    Suspect,
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberStatus::Alive => write!(f, "alive"),
            MemberStatus::Suspect => write!(f, "suspect"),
        }
    }
}

/// One row of the membership table
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct MemberEntry {
    pub id: NodeId,
    pub heartbeat: u64,
    pub status: MemberStatus,
    pub last_update_tick: u64,
}

impl MemberEntry {
    /// Ticks since this entry was last refreshed
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_update_tick)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Reported heartbeat was not newer than the stored one
    Ignored,
}

/// Ids whose state changed during a staleness sweep
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub suspected: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

impl SweepOutcome {
    pub fn is_empty(&self) -> bool {
        self.suspected.is_empty() && self.removed.is_empty()
    }
}

/// The local view of the cluster, keyed by node id.
///
/// Keys are kept ordered so that sampling with a seeded rng is reproducible.
/// The owning node is never stored.
#[derive(Clone, Debug)]
pub struct MembershipTable {
    owner: NodeId,
    members: BTreeMap<NodeId, MemberEntry>,
}

impl MembershipTable {
    pub fn new(owner: NodeId) -> Self {
        Self {
            owner,
            members: BTreeMap::new(),
        }
    }

    /// Insert a member, or refresh it if `heartbeat` is strictly newer than
    /// what we hold. A refresh also clears suspicion.
    pub fn upsert(&mut self, id: NodeId, heartbeat: u64, now: u64) -> UpsertOutcome {
        if id == self.owner || id.is_null() {
            return UpsertOutcome::Ignored;
        }

        match self.members.get_mut(&id) {
            None => {
                self.members.insert(
                    id,
                    MemberEntry {
                        id,
                        heartbeat,
                        status: MemberStatus::Alive,
                        last_update_tick: now,
                    },
                );
                UpsertOutcome::Inserted
            }
            Some(entry) if heartbeat > entry.heartbeat => {
                if entry.status == MemberStatus::Suspect {
                    debug!(
                        "[{}] {} is alive again (heartbeat {} -> {})",
                        self.owner, id, entry.heartbeat, heartbeat
                    );
                }
                entry.heartbeat = heartbeat;
                entry.status = MemberStatus::Alive;
                entry.last_update_tick = now;
                UpsertOutcome::Updated
            }
            Some(_) => UpsertOutcome::Ignored,
        }
    }

    /// Remove entries silent for at least `tremove` ticks and mark entries
    /// silent for at least `tfail` ticks as suspect.
    pub fn mark_stale_and_evict(&mut self, now: u64, tfail: u64, tremove: u64) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        self.members.retain(|id, entry| {
            let age = entry.age(now);
            if age >= tremove {
                outcome.removed.push(*id);
                return false;
            }
            if age >= tfail && entry.status == MemberStatus::Alive {
                entry.status = MemberStatus::Suspect;
                outcome.suspected.push(*id);
            }
            true
        });

        outcome
    }

    /// Choose up to `k` distinct entries uniformly at random from those not in
    /// `excluding`.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        k: usize,
        excluding: &HashSet<NodeId>,
        rng: &mut R,
    ) -> Vec<MemberEntry> {
        let candidates: Vec<&MemberEntry> = self
            .members
            .values()
            .filter(|entry| !excluding.contains(&entry.id))
            .collect();

        candidates
            .choose_multiple(rng, k)
            .map(|entry| (*entry).clone())
            .collect()
    }

    pub fn get(&self, id: &NodeId) -> Option<&MemberEntry> {
        self.members.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.members.contains_key(id)
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// All entries, ordered by id
    pub fn snapshot(&self) -> Vec<MemberEntry> {
        self.members.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}
